mod dry_run;
mod vtysh;

pub use dry_run::LogBackend;
pub use vtysh::VtyshBackend;

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::mem;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use thiserror::Error;

use crate::utils::{format_elapsed, summarize_commands};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Could not stage configuration: {0}")]
    Io(#[from] io::Error),
    /// The routing daemon refused the batch
    #[error("{program} exited with {status}: {stderr}")]
    Rejected {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Applies an ordered batch of commands to the routing daemon as one unit
pub trait ConfigBackend {
    fn apply(&mut self, commands: &[String]) -> Result<(), SinkError>;
}

#[derive(Clone, Debug, Default)]
pub struct CommitStats {
    pub commits: u64,
    pub failures: u64,
    pub commands: u64,
    pub last_commit: Option<DateTime<Utc>>,
}

impl fmt::Display for CommitStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let last = self
            .last_commit
            .map(format_elapsed)
            .unwrap_or_else(|| "never".to_string());
        write!(
            f,
            "<CommitStats commits={} failures={} commands={} last={}>",
            self.commits, self.failures, self.commands, last
        )
    }
}

struct Inner {
    pending: Vec<Vec<String>>,
    backend: Box<dyn ConfigBackend>,
    stats: CommitStats,
}

/// Accumulates command batches until the end of a processing cycle
/// and then applies them all at once.
///
/// Cloning gives another handle to the same queue.
#[derive(Clone)]
pub struct ConfigSink {
    inner: Rc<RefCell<Inner>>,
}

impl ConfigSink {
    pub fn new<B>(backend: B) -> Self
    where
        B: ConfigBackend + 'static,
    {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(backend: Box<dyn ConfigBackend>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                pending: Vec::with_capacity(8),
                backend,
                stats: CommitStats::default(),
            })),
        }
    }

    /// Queue a batch; nothing is applied until `commit`
    pub fn push(&self, commands: Vec<String>) {
        if commands.is_empty() {
            return;
        }
        debug!("Pushing cmds: {:?}", commands);
        self.inner.borrow_mut().pending.push(commands);
    }

    /// All queued commands, in push order
    pub fn pending(&self) -> Vec<String> {
        self.inner.borrow().pending.concat()
    }

    pub fn pending_batches(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Apply every queued batch as a single unit.
    ///
    /// The queue is emptied whether or not the backend accepts the batch,
    /// so a failed cycle is never retried from here. Returns the number of
    /// commands applied.
    pub fn commit(&self) -> Result<usize, SinkError> {
        let mut inner = self.inner.borrow_mut();
        let batches = mem::take(&mut inner.pending);
        if batches.is_empty() {
            return Ok(0);
        }
        let commands = batches.concat();
        match inner.backend.apply(&commands) {
            Ok(()) => {
                inner.stats.commits += 1;
                inner.stats.commands += commands.len() as u64;
                inner.stats.last_commit = Some(Utc::now());
                info!(
                    "Pushed configuration ({} commands from {} batches): {}",
                    commands.len(),
                    batches.len(),
                    summarize_commands(&commands, 3)
                );
                Ok(commands.len())
            }
            Err(err) => {
                inner.stats.failures += 1;
                Err(err)
            }
        }
    }

    pub fn stats(&self) -> CommitStats {
        self.inner.borrow().stats.clone()
    }
}

impl fmt::Debug for ConfigSink {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<ConfigSink pending={}>", self.pending_batches())
    }
}
