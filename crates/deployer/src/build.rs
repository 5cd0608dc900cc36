//! Build step that runs a shell command.

use crate::error::PortError;
use crate::ports::BuildStep;
use async_trait::async_trait;
use shipfront_core::BuildConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

/// Runs `command` through the platform shell in `working_dir`.
///
/// Output is inherited so the build log lands in the CI log.
#[derive(Debug, Clone)]
pub struct ShellBuild {
    command: String,
    working_dir: PathBuf,
    timeout: Duration,
}

impl ShellBuild {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            timeout,
        }
    }

    /// Build from config; `working_dir` is resolved against `project_dir`
    pub fn from_config(config: &BuildConfig, project_dir: &Path) -> Self {
        Self::new(
            config.command.clone(),
            project_dir.join(&config.working_dir),
            config.timeout,
        )
    }

    fn shell_command(&self) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C");
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c");
            c
        };
        cmd.arg(&self.command)
            .current_dir(&self.working_dir)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl BuildStep for ShellBuild {
    fn describe(&self) -> String {
        format!("{} (in {})", self.command, self.working_dir.display())
    }

    async fn run(&self) -> Result<(), PortError> {
        info!(command = %self.command, dir = %self.working_dir.display(), "running build");

        let mut child = self.shell_command().spawn().map_err(|e| {
            PortError::rejected(format!("could not start '{}': {}", self.command, e))
        })?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.map_err(|e| PortError::rejected(format!("build wait failed: {}", e)))?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(PortError::rejected(format!(
                    "'{}' timed out after {:?}",
                    self.command, self.timeout
                )));
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(PortError::rejected(match status.code() {
                Some(code) => format!("'{}' exited with status {}", self.command, code),
                None => format!("'{}' was terminated by a signal", self.command),
            }))
        }
    }
}
