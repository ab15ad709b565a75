//! Record enumeration: paged listing with a date cutoff, and detail lookups.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiError, RevClient};
use crate::model::{ModelError, Record};

/// Records requested per listing page unless overridden.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Errors from record listing and lookup.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The API answered with a record that could not be decoded.
    #[error("malformed record {record_id}: {source}")]
    Malformed {
        /// Record that was requested.
        record_id: String,
        /// Decode failure.
        #[source]
        source: ModelError,
    },
}

#[derive(Debug, Deserialize)]
struct OrderPageWire {
    #[serde(default)]
    total_count: Option<u64>,
    #[serde(default)]
    orders: Option<Value>,
}

/// One page of the record listing.
#[derive(Debug, Clone)]
pub struct OrderPage {
    /// Total records the server reports, when it reports one.
    pub total_count: Option<u64>,
    /// Records on this page, in server order (newest first).
    pub orders: Vec<Record>,
    /// Listing entries on this page that could not be decoded.
    pub skipped: u64,
}

/// Listing and detail operations over `/orders`.
#[derive(Debug, Clone)]
pub struct OrderClient {
    client: RevClient,
}

impl OrderClient {
    /// Wraps an API client.
    #[must_use]
    pub fn new(client: RevClient) -> Self {
        Self { client }
    }

    /// Fetches one listing page (`page_index` is zero-based).
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Api`] when the request fails.
    pub async fn list_page(&self, page_index: u32, page_size: u32) -> Result<OrderPage, OrderError> {
        fetch_page(&self.client, page_index, page_size).await
    }

    /// Starts a lazy enumeration of all records, newest first.
    ///
    /// With `since`, the sequence ends at the first record placed before it;
    /// records with no placement time are never cut off.
    #[must_use]
    pub fn enumerate(&self, page_size: u32, since: Option<DateTime<Utc>>) -> RecordPager {
        RecordPager {
            client: self.client.clone(),
            page_size: page_size.max(1),
            since,
            next_page: 0,
            buffer: VecDeque::new(),
            produced: 0,
            skipped: 0,
            total: None,
            finished: false,
        }
    }

    /// Collects the whole enumeration.
    ///
    /// # Errors
    ///
    /// Returns the first page-fetch failure.
    pub async fn fetch_all(
        &self,
        page_size: u32,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>, OrderError> {
        let mut pager = self.enumerate(page_size, since);
        let mut records = Vec::new();
        while let Some(record) = pager.next_record().await? {
            records.push(record);
        }
        info!(count = records.len(), "retrieved records");
        Ok(records)
    }

    /// Fetches the full detail of one record, attachments included.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError`] when the request fails or the payload is not a record.
    #[instrument(skip(self))]
    pub async fn get_record_detail(&self, record_id: &str) -> Result<Record, OrderError> {
        let path = format!("/orders/{}", urlencoding::encode(record_id));
        let value: Value = self.client.get_json(&path, &[]).await?;
        let record = Record::from_value(value).map_err(|source| OrderError::Malformed {
            record_id: record_id.to_string(),
            source,
        })?;
        debug!(attachments = record.attachments.len(), "retrieved record detail");
        Ok(record)
    }

    /// Keeps only completed records.
    #[must_use]
    pub fn filter_completed(records: Vec<Record>) -> Vec<Record> {
        let total = records.len();
        let completed: Vec<Record> = records.into_iter().filter(Record::is_completed).collect();
        info!(completed = completed.len(), total, "filtered completed records");
        completed
    }
}

#[instrument(skip(client))]
async fn fetch_page(client: &RevClient, page_index: u32, page_size: u32) -> Result<OrderPage, OrderError> {
    let wire: OrderPageWire = client
        .get_json(
            "/orders",
            &[
                ("page", page_index.to_string()),
                ("results_per_page", page_size.to_string()),
            ],
        )
        .await?;

    let raw_orders = match wire.orders {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    let mut orders = Vec::with_capacity(raw_orders.len());
    let mut skipped = 0;
    for raw in raw_orders {
        match Record::from_value(raw) {
            Ok(record) => orders.push(record),
            Err(error) => {
                warn!(page = page_index, %error, "skipping malformed record in listing");
                skipped += 1;
            }
        }
    }

    Ok(OrderPage {
        total_count: wire.total_count,
        orders,
        skipped,
    })
}

/// Lazy, single-use pull sequence over the record listing.
///
/// Pages are fetched only when the buffered page is exhausted, so a cutoff
/// hit on page N means page N+1 is never requested.
#[derive(Debug)]
pub struct RecordPager {
    client: RevClient,
    page_size: u32,
    since: Option<DateTime<Utc>>,
    next_page: u32,
    buffer: VecDeque<Record>,
    produced: u64,
    // Malformed listing entries; they still count toward the declared total.
    skipped: u64,
    total: Option<u64>,
    finished: bool,
}

impl RecordPager {
    /// Returns the next record, or `None` once the sequence has ended.
    ///
    /// # Errors
    ///
    /// A page-fetch failure ends the sequence and is returned.
    pub async fn next_record(&mut self) -> Result<Option<Record>, OrderError> {
        loop {
            if self.finished {
                return Ok(None);
            }

            if let Some(record) = self.buffer.pop_front() {
                if let (Some(since), Some(placed_at)) = (self.since, record.placed_at)
                    && placed_at < since
                {
                    info!(
                        record_id = %record.record_id,
                        %placed_at,
                        %since,
                        "reached record older than cutoff, stopping enumeration"
                    );
                    self.finish();
                    return Ok(None);
                }
                self.produced += 1;
                return Ok(Some(record));
            }

            if let Some(total) = self.total
                && self.produced + self.skipped >= total
            {
                debug!(
                    produced = self.produced,
                    skipped = self.skipped,
                    total,
                    "declared total reached"
                );
                self.finish();
                return Ok(None);
            }

            let page = match fetch_page(&self.client, self.next_page, self.page_size).await {
                Ok(page) => page,
                Err(error) => {
                    self.finish();
                    return Err(error);
                }
            };

            if page.orders.is_empty() && page.skipped == 0 {
                debug!(page = self.next_page, "empty page, enumeration complete");
                self.finish();
                return Ok(None);
            }

            debug!(
                page = self.next_page,
                count = page.orders.len(),
                total = ?page.total_count,
                "fetched listing page"
            );
            self.total = page.total_count;
            self.skipped += page.skipped;
            self.buffer.extend(page.orders);
            self.next_page += 1;
        }
    }

    /// Number of records yielded so far.
    #[must_use]
    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn finish(&mut self) {
        self.finished = true;
        self.buffer.clear();
    }
}
