use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use log::debug;

use super::{ConfigBackend, SinkError};

/// Applies a batch by writing it to a temporary file and loading it
/// with `vtysh -f <file>`
#[derive(Debug)]
pub struct VtyshBackend {
    program: PathBuf,
}

impl VtyshBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for VtyshBackend {
    fn default() -> Self {
        Self::new("vtysh")
    }
}

impl ConfigBackend for VtyshBackend {
    fn apply(&mut self, commands: &[String]) -> Result<(), SinkError> {
        // Removed when dropped at the end of this call
        let mut file = tempfile::Builder::new()
            .prefix("bgpcfgd-")
            .suffix(".conf")
            .tempfile()?;
        writeln!(file, "{}", commands.join("\n"))?;
        file.flush()?;

        debug!(
            "Running {} -f {}",
            self.program.display(),
            file.path().display()
        );
        let output = Command::new(&self.program)
            .arg("-f")
            .arg(file.path())
            .output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SinkError::Rejected {
                program: self.program.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
