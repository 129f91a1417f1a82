use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::{Transport, TransportError, Wake};
use crate::models::{Notification, TableId};

/// Producer side of a [`ChannelTransport`]
#[derive(Clone, Debug)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Publisher {
    pub fn publish(&self, notification: Notification) -> Result<(), TransportError> {
        self.tx
            .send(notification)
            .map_err(|_| TransportError::Closed)
    }
}

/// In-process transport: producers publish notifications into one channel,
/// which is demultiplexed into a queue per subscribed table
pub struct ChannelTransport {
    rx: mpsc::UnboundedReceiver<Notification>,
    queues: HashMap<TableId, VecDeque<Notification>>,
    ready: Vec<TableId>,
    closed: bool,
}

impl ChannelTransport {
    pub fn new() -> (Self, Publisher) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            rx,
            queues: HashMap::new(),
            ready: Vec::new(),
            closed: false,
        };
        (transport, Publisher { tx })
    }

    fn accept(&mut self, notification: Notification) {
        match self.queues.get_mut(&notification.table) {
            Some(queue) => {
                if !self.ready.contains(&notification.table) {
                    self.ready.push(notification.table.clone());
                }
                queue.push_back(notification);
            }
            None => trace!("Dropping {}: no listener for table", notification),
        }
    }

    /// Move everything already sitting in the channel into table queues
    fn collect(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(notification) => self.accept(notification),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn subscribe(&mut self, table: &TableId) {
        if !self.queues.contains_key(table) {
            debug!("Listening to {}", table);
            self.queues.insert(table.clone(), VecDeque::new());
        }
    }

    async fn wait(
        &mut self,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> Result<Wake, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.collect();
            if !self.ready.is_empty() {
                return Ok(Wake::Ready(self.ready.clone()));
            }
            if self.closed {
                return Err(TransportError::Closed);
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(Wake::Shutdown),
                received = self.rx.recv() => match received {
                    Some(notification) => self.accept(notification),
                    None => self.closed = true,
                },
                _ = sleep_until(deadline) => return Ok(Wake::Timeout),
            }
        }
    }

    fn pop(&mut self, table: &TableId) -> Option<Notification> {
        let queue = self.queues.get_mut(table)?;
        let notification = queue.pop_front();
        if queue.is_empty() {
            self.ready.retain(|t| t != table);
        }
        notification
    }
}
