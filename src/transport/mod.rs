mod channel;

pub use channel::{ChannelTransport, Publisher};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{Notification, TableId};

/// Result of waiting on every subscribed table
#[derive(Debug, PartialEq)]
pub enum Wake {
    /// Tables with pending events, in order of their first pending event
    Ready(Vec<TableId>),
    Timeout,
    Shutdown,
}

#[derive(Debug, Error, PartialEq)]
pub enum TransportError {
    #[error("Notification channel closed")]
    Closed,
    #[error("Transport failure: {0}")]
    Other(String),
}

/// Delivers change events per subscribed table
#[async_trait]
pub trait Transport {
    /// Start listening to `table`; events for other tables are never delivered
    fn subscribe(&mut self, table: &TableId);

    /// Block until at least one subscribed table has pending events,
    /// `timeout` elapses, or `shutdown` is cancelled
    async fn wait(
        &mut self,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> Result<Wake, TransportError>;

    /// Non-blocking pop of the next pending event for `table`
    fn pop(&mut self, table: &TableId) -> Option<Notification>;
}
