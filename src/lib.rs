pub mod config;
pub mod directory;
pub mod feed;
pub mod managers;
pub mod models;
pub mod runner;
pub mod sink;
pub mod transport;
mod utils;

pub use config::{DaemonConfig, SinkBackend};
pub use directory::Directory;
pub use managers::{Manager, ManagerContext};
pub use runner::{CycleOutcome, Runner, RunnerState};
pub use sink::ConfigSink;
