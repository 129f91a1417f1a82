use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use log::{debug, error, info, trace};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::directory::Directory;
use crate::managers::{Manager, ManagerContext};
use crate::models::{Notification, Operation, TableId};
use crate::sink::ConfigSink;
use crate::transport::{Transport, TransportError, Wake};

/// Upper bound on a single wait, so shutdown is observed periodically
pub const SELECT_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RunnerState {
    Idle,
    Draining,
    Committing,
    Stopped,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            RunnerState::Idle => "Idle",
            RunnerState::Draining => "Draining",
            RunnerState::Committing => "Committing",
            RunnerState::Stopped => "Stopped",
        };
        write!(f, "{}", word)
    }
}

/// What a single wait/drain/commit cycle did
#[derive(Debug, PartialEq)]
pub enum CycleOutcome {
    /// Woke up without events
    Idle,
    Committed {
        events: usize,
        rejected: usize,
        commands: usize,
    },
    CommitFailed {
        events: usize,
        rejected: usize,
    },
    Stopped,
}

#[derive(Debug, Error, PartialEq)]
pub enum RunnerError {
    #[error("Received error from transport: {0}")]
    Transport(#[from] TransportError),
}

/// Callbacks for one subscribed table
#[derive(Debug, Default)]
struct Route {
    // Another manager depends on this table
    cache: bool,
    // Indexes into Runner::managers, in registration order
    managers: Vec<usize>,
}

/// Main loop: waits on every subscribed table, feeds the events to the
/// managers owning them and commits everything they pushed once per wake-up
pub struct Runner<T: Transport> {
    transport: T,
    directory: Directory,
    sink: ConfigSink,
    managers: Vec<Box<dyn Manager>>,
    routes: HashMap<TableId, Route>,
    timeout: Duration,
    state: RunnerState,
}

impl<T: Transport> Runner<T> {
    pub fn new(transport: T, ctx: &ManagerContext) -> Self {
        let mut runner = Self {
            transport,
            directory: ctx.directory.clone(),
            sink: ctx.sink.clone(),
            managers: Vec::with_capacity(2),
            routes: HashMap::new(),
            timeout: SELECT_TIMEOUT,
            state: RunnerState::Idle,
        };
        for table in ctx.directory.subscriptions() {
            debug!("Directory subscription -> {}", table);
            runner.listen(&table).cache = true;
        }
        runner
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Register a manager; its events are delivered after any that were
    /// registered before it for the same table
    pub fn add_manager(&mut self, manager: Box<dyn Manager>) {
        let idx = self.managers.len();
        for dep in manager.dependencies() {
            self.listen(&dep.table).cache = true;
        }
        let table = manager.table().clone();
        self.listen(&table).managers.push(idx);
        debug!("Add callback for table {} in DB {}", table.table, table.store);
        self.managers.push(manager);
    }

    fn listen(&mut self, table: &TableId) -> &mut Route {
        if !self.routes.contains_key(table) {
            self.transport.subscribe(table);
            debug!("Add subscriber for table {} in DB {}", table.table, table.store);
        }
        self.routes.entry(table.clone()).or_default()
    }

    fn update_state(&mut self, new_state: RunnerState) {
        if self.state != new_state {
            trace!("Runner went from {} to {}", self.state, new_state);
            self.state = new_state;
        }
    }

    /// Returns whether a manager accepted the event; cache-only tables
    /// always accept
    fn dispatch(&mut self, notification: &Notification) -> bool {
        let route = match self.routes.get(&notification.table) {
            Some(route) => route,
            None => {
                trace!("No callbacks for {}", notification);
                return true;
            }
        };
        // Owned tables are published by their manager
        if route.cache && route.managers.is_empty() {
            match notification.op {
                Operation::Set => self.directory.put(
                    &notification.table,
                    &notification.key,
                    notification.fields.clone(),
                ),
                Operation::Delete => self
                    .directory
                    .remove(&notification.table, &notification.key),
            }
        }
        let mut accepted = true;
        for &idx in &route.managers {
            accepted &= self.managers[idx].handler(
                &notification.key,
                notification.op,
                &notification.fields,
            );
        }
        accepted
    }

    /// One wait/drain/commit cycle. Every event ready at wake-up is handled
    /// before a single commit of everything the managers pushed.
    pub async fn run_cycle(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<CycleOutcome, RunnerError> {
        let tables = match self.transport.wait(self.timeout, shutdown).await? {
            Wake::Timeout => return Ok(CycleOutcome::Idle),
            Wake::Shutdown => {
                self.update_state(RunnerState::Stopped);
                return Ok(CycleOutcome::Stopped);
            }
            Wake::Ready(tables) => tables,
        };

        self.update_state(RunnerState::Draining);
        let mut events = 0;
        let mut rejected = 0;
        for table in tables {
            while let Some(notification) = self.transport.pop(&table) {
                debug!("Received message : {}", notification);
                events += 1;
                if !self.dispatch(&notification) {
                    rejected += 1;
                }
            }
        }

        self.update_state(RunnerState::Committing);
        let outcome = match self.sink.commit() {
            Ok(commands) => CycleOutcome::Committed {
                events,
                rejected,
                commands,
            },
            Err(err) => {
                error!("CRITICAL: Runner::commit was unsuccessful: {}", err);
                CycleOutcome::CommitFailed { events, rejected }
            }
        };
        self.update_state(RunnerState::Idle);
        Ok(outcome)
    }

    /// Run cycles until `shutdown` is cancelled. A cycle in progress always
    /// completes first. Transport errors are fatal.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), RunnerError> {
        info!(
            "Starting event loop on {} tables with {} managers",
            self.routes.len(),
            self.managers.len()
        );
        while !shutdown.is_cancelled() {
            if let CycleOutcome::Stopped = self.run_cycle(&shutdown).await? {
                break;
            }
        }
        self.update_state(RunnerState::Stopped);
        info!("Event loop stopped");
        Ok(())
    }
}
