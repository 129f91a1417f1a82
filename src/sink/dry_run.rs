use log::info;

use super::{ConfigBackend, SinkError};

/// Logs each command instead of applying it
#[derive(Debug, Default)]
pub struct LogBackend;

impl LogBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ConfigBackend for LogBackend {
    fn apply(&mut self, commands: &[String]) -> Result<(), SinkError> {
        for command in commands {
            info!("[dry-run] {}", command);
        }
        Ok(())
    }
}
