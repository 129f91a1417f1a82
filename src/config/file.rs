use std::fs::File;
use std::io::Read;

use serde::Deserialize;

use super::{ConfigError, ManagerKind, SinkBackend};

struct Defaults {}

impl Defaults {
    fn select_timeout_ms() -> u64 {
        1000
    }

    fn backend() -> SinkBackend {
        SinkBackend::Vtysh
    }

    fn vtysh_path() -> String {
        "vtysh".to_string()
    }

    fn store() -> String {
        "APPL_DB".to_string()
    }

    fn managers() -> Vec<ManagerSpec> {
        vec![
            ManagerSpec {
                kind: ManagerKind::BgpGlobal,
                store: Defaults::store(),
                table: None,
            },
            ManagerSpec {
                kind: ManagerKind::BgpNeighbor,
                store: Defaults::store(),
                table: None,
            },
        ]
    }
}

/// Config (toml) representation of the config sink
#[derive(Clone, Debug, Deserialize)]
pub(super) struct SinkSpec {
    #[serde(default = "Defaults::backend")]
    pub(super) backend: SinkBackend,
    // Binary used to load a batch into the routing daemon
    #[serde(default = "Defaults::vtysh_path")]
    pub(super) vtysh_path: String,
}

impl Default for SinkSpec {
    fn default() -> Self {
        Self {
            backend: Defaults::backend(),
            vtysh_path: Defaults::vtysh_path(),
        }
    }
}

/// Config (toml) representation of one table manager
#[derive(Clone, Debug, Deserialize)]
pub(super) struct ManagerSpec {
    pub(super) kind: ManagerKind,
    #[serde(default = "Defaults::store")]
    pub(super) store: String,
    // Will default to the manager kind's usual table name
    pub(super) table: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DaemonConfigSpec {
    // Longest single wait for events, bounds shutdown latency
    #[serde(default = "Defaults::select_timeout_ms")]
    pub(super) select_timeout_ms: u64,
    #[serde(default)]
    pub(super) sink: SinkSpec,
    #[serde(default = "Defaults::managers")]
    pub(super) managers: Vec<ManagerSpec>,
}

impl Default for DaemonConfigSpec {
    fn default() -> Self {
        Self {
            select_timeout_ms: Defaults::select_timeout_ms(),
            sink: SinkSpec::default(),
            managers: Defaults::managers(),
        }
    }
}

impl DaemonConfigSpec {
    pub(super) fn from_file(path: &str) -> Result<Self, ConfigError> {
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|source| ConfigError::Io {
                path: path.to_string(),
                source,
            })?;
        Self::from_toml(&contents)
    }

    pub(super) fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: DaemonConfigSpec = toml::from_str(contents)?;
        Ok(config)
    }
}
