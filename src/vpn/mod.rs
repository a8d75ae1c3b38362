pub mod profiles;
pub mod reconciler;
pub mod rotation;
pub mod tool;

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{Result, RotatorError};

/// Captured result of a successful external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Single entry point for every external command (wg, wg-quick, chmod).
/// Implementations return `Ok` only when the command exited with status 0.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs commands through sudo: `sudo -n` first so nothing ever blocks on a
/// password prompt, then plain `sudo` once if that was refused.
#[derive(Debug, Clone)]
pub struct SudoRunner {
    timeout: Duration,
}

enum Attempt {
    Done(CommandOutput),
    Failed { exit_code: i32, stderr: String },
    TimedOut,
}

impl SudoRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn attempt(&self, interactive: bool, program: &str, args: &[String]) -> Result<Attempt> {
        let mut cmd = Command::new("sudo");
        if !interactive {
            cmd.arg("-n").stdin(Stdio::null());
        }
        cmd.arg(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(output) => output?,
            Err(_) => return Ok(Attempt::TimedOut),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if output.status.success() {
            Ok(Attempt::Done(CommandOutput { stdout, stderr, exit_code }))
        } else {
            Ok(Attempt::Failed { exit_code, stderr })
        }
    }
}

#[async_trait]
impl CommandRunner for SudoRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!("Executing command: {} {}", program, args.join(" "));

        match self.attempt(false, program, args).await? {
            Attempt::Done(output) => return Ok(output),
            Attempt::Failed { exit_code, stderr } => {
                tracing::debug!("sudo -n failed (exit {}): {}", exit_code, stderr.trim());
            }
            Attempt::TimedOut => tracing::debug!("sudo -n timed out"),
        }

        tracing::info!("Retrying command with regular sudo: {}", program);
        match self.attempt(true, program, args).await? {
            Attempt::Done(output) => Ok(output),
            Attempt::Failed { exit_code, stderr } => Err(RotatorError::CommandFailed {
                exit_code,
                stderr: stderr.trim().to_string(),
            }),
            Attempt::TimedOut => Err(RotatorError::CommandTimedOut(self.timeout.as_secs())),
        }
    }
}
