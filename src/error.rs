use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the profile store, the command runner and the reconciler.
#[derive(Debug, Error)]
pub enum RotatorError {
    #[error("WireGuard tools not found at {path}. {hint}")]
    ToolNotInstalled { path: PathBuf, hint: String },

    #[error("Configuration file not found: {}", .0.display())]
    ProfileNotFound(PathBuf),

    #[error("Command failed (exit code {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    #[error("Command timed out after {0}s")]
    CommandTimedOut(u64),

    #[error("Failed to bring up tunnel: {stderr}")]
    ActivationFailed { stderr: String },

    #[error("IP lookup failed: {0}")]
    LookupFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RotatorError>;
