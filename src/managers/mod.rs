//! Per-table reconcilers.
//!
//! A manager owns one table: it turns that table's change events into
//! routing daemon commands pushed to the shared [`ConfigSink`], keeps the
//! derived state needed to emit only deltas on replay, and publishes the
//! records it accepted into the shared [`Directory`] for other managers.

mod bgp_global;
mod bgp_neighbor;

pub use crate::directory::Dependency;
pub use bgp_global::{BgpGlobalManager, GlobalState};
pub use bgp_neighbor::{split_key, AdminStatus, BgpNeighborManager};

use std::str::FromStr;

use log::error;
use thiserror::Error;

use crate::directory::{Directory, DirectoryError};
use crate::models::{Fields, Operation, TableId};
use crate::sink::ConfigSink;

/// The only VRF commands can currently be generated for
pub const DEFAULT_VRF: &str = "default";

#[derive(Debug, Error, PartialEq)]
pub enum ManagerError {
    // Non-default VRF support is not implemented
    #[error("VRF must be default, got '{0}'")]
    UnsupportedVrf(String),
    #[error("Invalid value for '{field}': '{value}'")]
    InvalidField { field: &'static str, value: String },
    #[error("Required field '{0}' is missing")]
    MissingField(&'static str),
    #[error("Dependency {dependency} is not available: {source}")]
    DependencyAbsent {
        dependency: String,
        source: DirectoryError,
    },
    #[error("local_asn change is not allowed (current {current}, requested {requested})")]
    AsnChange { current: u32, requested: u32 },
    #[error("BGP delete failed, BGP not created yet")]
    NotCreated,
}

/// Handles shared by every manager
#[derive(Clone, Debug)]
pub struct ManagerContext {
    pub directory: Directory,
    pub sink: ConfigSink,
}

impl ManagerContext {
    pub fn new(directory: Directory, sink: ConfigSink) -> Self {
        Self { directory, sink }
    }
}

pub trait Manager {
    /// The table this manager consumes events for
    fn table(&self) -> &TableId;

    fn store_name(&self) -> &str {
        &self.table().store
    }

    fn table_name(&self) -> &str {
        &self.table().table
    }

    /// Values from other tables this manager may read while handling events
    fn dependencies(&self) -> &[Dependency] {
        &[]
    }

    fn set_handler(&mut self, key: &str, fields: &Fields) -> Result<(), ManagerError>;

    fn del_handler(&mut self, key: &str) -> Result<(), ManagerError>;

    /// Dispatch one change event; failures are logged and reported as `false`
    fn handler(&mut self, key: &str, op: Operation, fields: &Fields) -> bool {
        let result = match op {
            Operation::Set => self.set_handler(key, fields),
            Operation::Delete => self.del_handler(key),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                error!("{} {} '{}' failed: {}", self.table(), op, key, err);
                false
            }
        }
    }
}

pub(crate) fn check_vrf(vrf: &str) -> Result<(), ManagerError> {
    if vrf == DEFAULT_VRF {
        Ok(())
    } else {
        Err(ManagerError::UnsupportedVrf(vrf.to_string()))
    }
}

/// Parse an optional field into its typed value
pub(crate) fn parse_field<T>(fields: &Fields, name: &'static str) -> Result<Option<T>, ManagerError>
where
    T: FromStr,
{
    match fields.get(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ManagerError::InvalidField {
                field: name,
                value: value.to_string(),
            }),
    }
}
