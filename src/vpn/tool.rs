use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{CommandOutput, CommandRunner};
use crate::error::{Result, RotatorError};

const INSTALL_HINT: &str = "Please install wireguard-tools (e.g. `brew install wireguard-tools` or `pacman -S wireguard-tools`) or point wg_binary/wg_quick_binary at them in the config.";

/// Where the `wg` and `wg-quick` binaries are expected to live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub wg: PathBuf,
    pub wg_quick: PathBuf,
}

impl ToolPaths {
    pub fn new(wg: impl Into<PathBuf>, wg_quick: impl Into<PathBuf>) -> Self {
        Self {
            wg: wg.into(),
            wg_quick: wg_quick.into(),
        }
    }

    pub fn ensure_installed(&self) -> Result<()> {
        for path in [&self.wg, &self.wg_quick] {
            if !path.exists() {
                return Err(RotatorError::ToolNotInstalled {
                    path: path.clone(),
                    hint: INSTALL_HINT.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Thin typed wrapper over the WireGuard command-line contract.
#[derive(Clone)]
pub struct WgTool {
    runner: Arc<dyn CommandRunner>,
    paths: ToolPaths,
}

impl WgTool {
    pub fn new(runner: Arc<dyn CommandRunner>, paths: ToolPaths) -> Self {
        Self { runner, paths }
    }

    pub fn ensure_installed(&self) -> Result<()> {
        self.paths.ensure_installed()
    }

    /// `wg show interfaces`, split on whitespace. Empty when nothing is up.
    pub async fn show_interfaces(&self) -> Result<Vec<String>> {
        self.ensure_installed()?;
        let output = self
            .runner
            .run(&program(&self.paths.wg), &["show".to_string(), "interfaces".to_string()])
            .await?;
        Ok(parse_interfaces(&output.stdout))
    }

    pub async fn up(&self, config: &Path) -> Result<CommandOutput> {
        self.ensure_installed()?;
        self.runner
            .run(&program(&self.paths.wg_quick), &["up".to_string(), program(config)])
            .await
    }

    /// `wg-quick down` with either a config path or a bare interface name.
    pub async fn down(&self, target: &str) -> Result<()> {
        self.ensure_installed()?;
        self.runner
            .run(&program(&self.paths.wg_quick), &["down".to_string(), target.to_string()])
            .await?;
        Ok(())
    }

    pub async fn down_config(&self, config: &Path) -> Result<()> {
        self.down(&program(config)).await
    }

    /// Restrict a profile to owner read/write; wg-quick warns about or refuses
    /// world-readable key material.
    pub async fn restrict_permissions(&self, config: &Path) -> Result<()> {
        self.runner
            .run("chmod", &["600".to_string(), program(config)])
            .await?;
        Ok(())
    }
}

fn program(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn parse_interfaces(stdout: &str) -> Vec<String> {
    stdout.split_whitespace().map(str::to_string).collect()
}
