//! Local command hook, typically a remote shutdown script run on low battery.

use std::process::Command;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{DeliveryError, MonitorResult};
use crate::event::Action;
use crate::sample::Sample;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs an argv vector to completion.
pub trait CommandRunner: Send + Sync {
    /// # Errors
    ///
    /// Returns `DeliveryError::Command` if the process cannot be spawned.
    fn run(&self, argv: &[String]) -> MonitorResult<CommandOutput>;
}

/// Spawns real processes and waits for them, capturing stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, argv: &[String]) -> MonitorResult<CommandOutput> {
        let Some((program, args)) = argv.split_first() else {
            return Err(DeliveryError::Command {
                command: String::new(),
                message: "empty command".to_string(),
            }
            .into());
        };

        let output = Command::new(program).args(args).output().map_err(|e| DeliveryError::Command {
            command: argv.join(" "),
            message: e.to_string(),
        })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs the configured command once per received sample.
///
/// An empty command is a configured no-op: it logs a warning and never
/// spawns anything.
pub struct SystemHaltAction {
    name: String,
    command: String,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for SystemHaltAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemHaltAction")
            .field("name", &self.name)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl SystemHaltAction {
    /// Runs `command` with real processes.
    pub fn new(command: impl Into<String>) -> Self {
        Self::with_runner(command, Arc::new(ProcessRunner))
    }

    pub fn with_runner(command: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            name: "system-halt".to_string(),
            command: command.into(),
            runner,
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The command split on whitespace.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        self.command.split_whitespace().map(str::to_string).collect()
    }
}

impl Action for SystemHaltAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, sample: &Sample) -> MonitorResult<()> {
        let argv = self.argv();
        if argv.is_empty() {
            warn!(handler = %self.name, "no command configured; nothing to run");
            return Ok(());
        }

        let output = self.runner.run(&argv)?;
        info!(
            handler = %self.name,
            command = %self.command,
            sample = %sample.id(),
            status = ?output.status,
            stdout = %output.stdout.trim_end(),
            "command executed"
        );
        if !output.stderr.is_empty() {
            info!(handler = %self.name, stderr = %output.stderr.trim_end(), "command wrote to stderr");
        }

        if output.success() {
            Ok(())
        } else {
            Err(DeliveryError::Command {
                command: self.command.clone(),
                message: format!("exited with status {:?}", output.status),
            }
            .into())
        }
    }
}
