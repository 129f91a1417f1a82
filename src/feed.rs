//! Newline-delimited JSON event feed.
//!
//! Each line is one change event:
//!
//! ```json
//! {"store": "APPL_DB", "table": "BGP_GLOBAL", "key": "default", "op": "SET", "fields": {"local_asn": "65001"}}
//! ```
//!
//! Field values are strings upstream; numbers and booleans are accepted and
//! converted to their string form.

use std::collections::HashMap;
use std::io;

use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::models::{Fields, Notification, Operation, TableId};
use crate::transport::{Publisher, TransportError};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Could not read event feed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Deserialize)]
struct FeedRecord {
    store: String,
    table: String,
    key: String,
    op: Operation,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

impl From<FeedRecord> for Notification {
    fn from(record: FeedRecord) -> Self {
        let fields: Fields = record
            .fields
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect();
        Notification {
            table: TableId::new(record.store, record.table),
            key: record.key,
            op: record.op,
            fields,
        }
    }
}

/// Parse one feed line; blank lines yield `None`
pub fn parse_line(line: &str) -> Result<Option<Notification>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let record: FeedRecord = serde_json::from_str(line)?;
    Ok(Some(record.into()))
}

/// Publish every event read from `reader` until end of input.
/// Returns how many events were published.
pub async fn forward<R>(reader: R, publisher: Publisher) -> Result<usize, FeedError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut count = 0;
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Ok(Some(notification)) => {
                publisher.publish(notification)?;
                count += 1;
            }
            Ok(None) => (),
            Err(err) => warn!("Skipping malformed event '{}': {}", line.trim(), err),
        }
    }
    info!("Event feed reached end of input after {} events", count);
    Ok(count)
}
