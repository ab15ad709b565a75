//! Credential loading and client tuning.
//!
//! Credentials are resolved once, at the edge, into an immutable
//! [`Credentials`] value that is handed to [`RevClient`](crate::RevClient).
//! Nothing below this module reads the environment.
//!
//! Sources, highest priority first:
//! 1. `REV_API_KEY`
//! 2. `REV_CLIENT_API_KEY` + `REV_USER_API_KEY`
//! 3. a JSON config file (`./config.json`, then
//!    `$XDG_CONFIG_HOME/rev-exporter/config.json` or
//!    `$HOME/.config/rev-exporter/config.json`) holding `api_key` or
//!    `client_api_key` + `user_api_key`
//! 4. `./docs/key.md`, first non-empty line not starting with `#`, consulted
//!    only when no config file exists

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{CONNECT_TIMEOUT_SECS, DEFAULT_BASE_URL, READ_TIMEOUT_SECS, RetryPolicy};

/// Env var holding a single combined credential.
pub const ENV_API_KEY: &str = "REV_API_KEY";
/// Env var holding the client half of a key pair.
pub const ENV_CLIENT_API_KEY: &str = "REV_CLIENT_API_KEY";
/// Env var holding the user half of a key pair.
pub const ENV_USER_API_KEY: &str = "REV_USER_API_KEY";

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_DIR_NAME: &str = "rev-exporter";
const KEY_FILE_PATH: &str = "docs/key.md";

/// Errors raised while resolving credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No source produced a credential.
    #[error(
        "no Rev API credentials found; set {ENV_API_KEY}, or {ENV_CLIENT_API_KEY} and {ENV_USER_API_KEY}, or create config.json"
    )]
    NotConfigured,

    /// An explicitly requested config file does not exist.
    #[error("config file not found: {path}")]
    ConfigFileNotFound {
        /// Path that was requested.
        path: PathBuf,
    },

    /// An explicitly requested config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An explicitly requested config file is not valid JSON.
    #[error("invalid config file {path}: {source}")]
    InvalidConfigFile {
        /// Path of the file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// How a credential is rendered into the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// A combined `client:user` credential, sent verbatim.
    Combined,
    /// A lone key with no separator, sent as `key:key`.
    ///
    /// Not a documented API contract; kept for configurations that relied on it.
    SingleKeyFallback,
    /// Separate client and user keys.
    KeyPair,
}

/// API credential, resolved once at startup.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A single credential string.
    ApiKey(String),
    /// Client and user keys.
    KeyPair {
        /// Client API key.
        client_key: String,
        /// User API key.
        user_key: String,
    },
}

impl Credentials {
    /// Creates a single-string credential.
    #[must_use]
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(key.into())
    }

    /// Creates a client/user key pair.
    #[must_use]
    pub fn key_pair(client_key: impl Into<String>, user_key: impl Into<String>) -> Self {
        Self::KeyPair {
            client_key: client_key.into(),
            user_key: user_key.into(),
        }
    }

    /// Returns how this credential will be rendered.
    #[must_use]
    pub fn scheme(&self) -> AuthScheme {
        match self {
            Self::ApiKey(key) if key.contains(':') => AuthScheme::Combined,
            Self::ApiKey(_) => AuthScheme::SingleKeyFallback,
            Self::KeyPair { .. } => AuthScheme::KeyPair,
        }
    }

    /// Renders the `Authorization` header value.
    #[must_use]
    pub fn auth_header(&self) -> String {
        match (self, self.scheme()) {
            (Self::ApiKey(key), AuthScheme::SingleKeyFallback) => {
                debug!("single API key without separator, using key:key fallback");
                format!("Rev {key}:{key}")
            }
            (Self::ApiKey(key), _) => format!("Rev {key}"),
            (
                Self::KeyPair {
                    client_key,
                    user_key,
                },
                _,
            ) => format!("Rev {client_key}:{user_key}"),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.debug_tuple("ApiKey").field(&"[REDACTED]").finish(),
            Self::KeyPair { .. } => f
                .debug_struct("KeyPair")
                .field("client_key", &"[REDACTED]")
                .field("user_key", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Where a credential was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Environment variable(s).
    Env,
    /// JSON config file.
    ConfigFile(PathBuf),
    /// Plain-text key file.
    KeyFile(PathBuf),
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env => f.write_str("environment"),
            Self::ConfigFile(path) => write!(f, "config file {}", path.display()),
            Self::KeyFile(path) => write!(f, "key file {}", path.display()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileCredentials {
    api_key: Option<String>,
    client_api_key: Option<String>,
    user_api_key: Option<String>,
}

impl FileCredentials {
    fn into_credentials(self) -> Option<Credentials> {
        if let Some(key) = non_empty(self.api_key) {
            return Some(Credentials::ApiKey(key));
        }
        match (non_empty(self.client_api_key), non_empty(self.user_api_key)) {
            (Some(client_key), Some(user_key)) => Some(Credentials::KeyPair {
                client_key,
                user_key,
            }),
            _ => None,
        }
    }
}

/// File locations searched after the environment.
#[derive(Debug, Clone, Default)]
pub struct CredentialSearch {
    /// Candidate JSON config files; the first that exists is used.
    pub config_files: Vec<PathBuf>,
    /// Plain-text key file, consulted only when no config file exists.
    pub key_file: Option<PathBuf>,
    /// Whether a missing or broken config file is an error instead of a warning.
    pub require_config_file: bool,
}

impl CredentialSearch {
    /// Default search: `./config.json`, the user config dir, then `./docs/key.md`.
    #[must_use]
    pub fn discover() -> Self {
        let mut config_files = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(path) = resolve_default_config_path() {
            config_files.push(path);
        }
        Self {
            config_files,
            key_file: Some(PathBuf::from(KEY_FILE_PATH)),
            require_config_file: false,
        }
    }

    /// Searches only `path`, which must exist and parse.
    #[must_use]
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        Self {
            config_files: vec![path.into()],
            key_file: None,
            require_config_file: true,
        }
    }

    /// Resolves credentials using the process environment.
    ///
    /// # Errors
    ///
    /// See [`CredentialSearch::load_with_env`].
    pub fn load(&self) -> Result<(Credentials, CredentialSource), ConfigError> {
        self.load_with_env(|name| env::var(name).ok())
    }

    /// Resolves credentials using `lookup` in place of the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotConfigured`] when no source yields a
    /// credential, or a file error when an explicit config file is missing or
    /// invalid.
    pub fn load_with_env<F>(&self, lookup: F) -> Result<(Credentials, CredentialSource), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = non_empty(lookup(ENV_API_KEY)) {
            debug!(var = ENV_API_KEY, "credentials from environment");
            return Ok((Credentials::ApiKey(key), CredentialSource::Env));
        }
        if let (Some(client_key), Some(user_key)) = (
            non_empty(lookup(ENV_CLIENT_API_KEY)),
            non_empty(lookup(ENV_USER_API_KEY)),
        ) {
            debug!("credentials from client/user environment pair");
            return Ok((
                Credentials::KeyPair {
                    client_key,
                    user_key,
                },
                CredentialSource::Env,
            ));
        }

        let config_file = self.config_files.iter().find(|path| path.is_file());
        match config_file {
            Some(path) => {
                if let Some(credentials) = self.read_config_file(path)? {
                    debug!(path = %path.display(), "credentials from config file");
                    return Ok((credentials, CredentialSource::ConfigFile(path.clone())));
                }
            }
            None => {
                if self.require_config_file
                    && let Some(path) = self.config_files.first()
                {
                    return Err(ConfigError::ConfigFileNotFound { path: path.clone() });
                }
                if let Some(path) = &self.key_file
                    && let Some(credentials) = read_key_file(path)
                {
                    debug!(path = %path.display(), "credentials from key file");
                    return Ok((credentials, CredentialSource::KeyFile(path.clone())));
                }
            }
        }

        Err(ConfigError::NotConfigured)
    }

    fn read_config_file(&self, path: &Path) -> Result<Option<Credentials>, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(source) if self.require_config_file => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "could not read config file");
                return Ok(None);
            }
        };

        match serde_json::from_str::<FileCredentials>(&raw) {
            Ok(parsed) => Ok(parsed.into_credentials()),
            Err(source) if self.require_config_file => Err(ConfigError::InvalidConfigFile {
                path: path.to_path_buf(),
                source,
            }),
            Err(error) => {
                warn!(path = %path.display(), %error, "could not parse config file");
                Ok(None)
            }
        }
    }
}

fn read_key_file(path: &Path) -> Option<Credentials> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            if path.exists() {
                warn!(path = %path.display(), %error, "could not read key file");
            }
            return None;
        }
    };
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| Credentials::ApiKey(line.to_string()))
}

/// Resolves the per-user config file path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/rev-exporter/config.json`
/// 2. `$HOME/.config/rev-exporter/config.json`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Transport tuning shared by every client built from it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, without trailing slash.
    pub base_url: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Longest wait for response headers or the next body chunk. A transfer
    /// that keeps making progress is not cut off, so large media files can
    /// take longer than this in total.
    pub read_timeout: Duration,
    /// Retry policy applied to every request.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Returns a copy targeting another base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns a copy with a different retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
