mod file;

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::managers::{BgpGlobalManager, BgpNeighborManager, Manager, ManagerContext};
use crate::models::TableId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Table {0} is assigned to more than one manager")]
    DuplicateTable(TableId),
    #[error("select_timeout_ms must be greater than zero")]
    ZeroTimeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkBackend {
    /// Load batches with `vtysh -f`
    Vtysh,
    /// Only log the commands
    Log,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerKind {
    BgpGlobal,
    BgpNeighbor,
}

impl ManagerKind {
    fn default_table(&self) -> &'static str {
        match self {
            ManagerKind::BgpGlobal => "BGP_GLOBAL",
            ManagerKind::BgpNeighbor => "BGP_NEIGHBOR",
        }
    }
}

#[derive(Debug)]
pub struct SinkConfig {
    pub backend: SinkBackend,
    pub vtysh_path: PathBuf,
}

#[derive(Debug)]
pub struct ManagerConfig {
    pub kind: ManagerKind,
    pub table: TableId,
}

/// In-memory daemon configuration, with defaults filled in
#[derive(Debug)]
pub struct DaemonConfig {
    pub select_timeout: Duration,
    pub sink: SinkConfig,
    pub managers: Vec<ManagerConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        // Built-in defaults always validate
        Self::from_spec(file::DaemonConfigSpec::default())
            .unwrap_or_else(|err| unreachable!("default config is invalid: {}", err))
    }
}

impl DaemonConfig {
    /// Parse a TOML config file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let spec = file::DaemonConfigSpec::from_file(path)?;
        let config = Self::from_spec(spec)?;
        debug!("Found {} managers in {}", config.managers.len(), path);
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Self::from_spec(file::DaemonConfigSpec::from_toml(contents)?)
    }

    fn from_spec(spec: file::DaemonConfigSpec) -> Result<Self, ConfigError> {
        if spec.select_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        let mut seen = HashSet::new();
        let mut managers = Vec::with_capacity(spec.managers.len());
        for m in spec.managers {
            let kind = m.kind;
            let table = TableId::new(
                m.store,
                m.table.unwrap_or_else(|| kind.default_table().to_string()),
            );
            if !seen.insert(table.clone()) {
                return Err(ConfigError::DuplicateTable(table));
            }
            managers.push(ManagerConfig { kind, table });
        }

        Ok(Self {
            select_timeout: Duration::from_millis(spec.select_timeout_ms),
            sink: SinkConfig {
                backend: spec.sink.backend,
                vtysh_path: PathBuf::from(spec.sink.vtysh_path),
            },
            managers,
        })
    }

    /// Table holding the `router bgp` instance that neighbors depend on
    pub fn global_table(&self) -> TableId {
        self.managers
            .iter()
            .find(|m| m.kind == ManagerKind::BgpGlobal)
            .map(|m| m.table.clone())
            .unwrap_or_else(|| TableId::new("APPL_DB", ManagerKind::BgpGlobal.default_table()))
    }

    /// Construct the configured managers, in config order
    pub fn build_managers(&self, ctx: &ManagerContext) -> Vec<Box<dyn Manager>> {
        let global = self.global_table();
        self.managers
            .iter()
            .map(|m| -> Box<dyn Manager> {
                match m.kind {
                    ManagerKind::BgpGlobal => Box::new(BgpGlobalManager::new(ctx, m.table.clone())),
                    ManagerKind::BgpNeighbor => {
                        Box::new(BgpNeighborManager::new(ctx, m.table.clone(), &global))
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Directory;
    use crate::sink::{ConfigSink, LogBackend};

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.select_timeout, Duration::from_millis(1000));
        assert_eq!(config.sink.backend, SinkBackend::Vtysh);
        let tables: Vec<_> = config.managers.iter().map(|m| m.table.to_string()).collect();
        assert_eq!(tables, vec!["APPL_DB:BGP_GLOBAL", "APPL_DB:BGP_NEIGHBOR"]);
    }

    #[test]
    fn test_neighbor_follows_configured_global_table() {
        let contents = r#"
            [[managers]]
            kind = "bgp_global"
            store = "CONFIG_DB"

            [[managers]]
            kind = "bgp_neighbor"
            store = "CONFIG_DB"
        "#;
        let config = DaemonConfig::from_toml(contents).unwrap();
        assert_eq!(config.global_table(), TableId::new("CONFIG_DB", "BGP_GLOBAL"));

        let ctx = ManagerContext::new(Directory::new(), ConfigSink::new(LogBackend::new()));
        let managers = config.build_managers(&ctx);
        assert_eq!(managers.len(), 2);
        assert_eq!(managers[1].store_name(), "CONFIG_DB");
        assert_eq!(managers[1].table_name(), "BGP_NEIGHBOR");
        assert_eq!(
            managers[1].dependencies()[0].table,
            TableId::new("CONFIG_DB", "BGP_GLOBAL")
        );
        assert!(ctx
            .directory
            .subscriptions()
            .contains(&TableId::new("CONFIG_DB", "BGP_GLOBAL")));
    }

    #[test]
    fn test_table_defaults_per_kind() {
        let contents = r#"
            [[managers]]
            kind = "bgp_global"
            table = "BGP_GLOBAL_V2"

            [[managers]]
            kind = "bgp_neighbor"
        "#;
        let config = DaemonConfig::from_toml(contents).unwrap();
        assert_eq!(config.managers[0].kind, ManagerKind::BgpGlobal);
        assert_eq!(config.managers[0].table, TableId::new("APPL_DB", "BGP_GLOBAL_V2"));
        assert_eq!(config.managers[1].kind, ManagerKind::BgpNeighbor);
        assert_eq!(config.managers[1].table, TableId::new("APPL_DB", "BGP_NEIGHBOR"));
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let contents = r#"
            [[managers]]
            kind = "bgp_global"

            [[managers]]
            kind = "bgp_global"
        "#;
        assert!(matches!(
            DaemonConfig::from_toml(contents),
            Err(ConfigError::DuplicateTable(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(
            DaemonConfig::from_toml("select_timeout_ms = 0"),
            Err(ConfigError::ZeroTimeout)
        ));
    }
}
