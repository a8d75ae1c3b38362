//! Tearing down whatever tunnels are up and bringing up the requested profile.
//!
//! The tunnel tool assigns interface names itself (`utun3` on macOS, the file
//! stem on Linux), so an active interface cannot always be traced back to the
//! profile that created it. Teardown walks a fixed chain per interface:
//!
//! 1. the config path recorded when we brought the interface up
//! 2. config files guessed from the interface name
//! 3. optionally every known profile
//! 4. the bare interface name
//!
//! and then makes one forced pass over anything still listed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::profiles::{Profile, ProfileStore, PROFILE_EXTENSION};
use super::tool::WgTool;
use crate::config::{AppConfig, PrefixSwap};
use crate::error::{Result, RotatorError};

/// Interface name -> config path that brought it up. Only ever a hint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceMap {
    entries: HashMap<String, PathBuf>,
}

impl InterfaceMap {
    pub fn get(&self, interface: &str) -> Option<&Path> {
        self.entries.get(interface).map(PathBuf::as_path)
    }

    pub fn insert(&mut self, interface: impl Into<String>, config: impl Into<PathBuf>) {
        self.entries.insert(interface.into(), config.into());
    }

    pub fn remove(&mut self, interface: &str) -> Option<PathBuf> {
        self.entries.remove(interface)
    }

    /// Drop entries for interfaces the tool no longer reports.
    pub fn retain_active(&mut self, active: &[String]) {
        self.entries.retain(|name, _| active.iter().any(|a| a == name));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }

    /// Logical profile name for an interface, when we know which file created it.
    pub fn profile_name(&self, interface: &str) -> Option<String> {
        self.get(interface)
            .and_then(Profile::from_path)
            .map(|profile| profile.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    Unknown,
    Active,
    TornDown,
    StuckActive,
}

/// Which step of the teardown chain brought an interface down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownMethod {
    Mapped(PathBuf),
    Candidate(PathBuf),
    Sweep(PathBuf),
    DirectName,
    Forced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceOutcome {
    pub name: String,
    pub state: InterfaceState,
    pub method: Option<TeardownMethod>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub outcomes: Vec<InterfaceOutcome>,
}

impl TeardownReport {
    pub fn stuck(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.state == InterfaceState::StuckActive)
            .map(|o| o.name.as_str())
            .collect()
    }

    #[cfg(test)]
    pub fn torn_down(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.state == InterfaceState::TornDown)
            .map(|o| o.name.as_str())
            .collect()
    }

    fn outcome_mut(&mut self, name: &str) -> &mut InterfaceOutcome {
        if let Some(i) = self.outcomes.iter().position(|o| o.name == name) {
            return &mut self.outcomes[i];
        }
        self.outcomes.push(InterfaceOutcome {
            name: name.to_string(),
            state: InterfaceState::Unknown,
            method: None,
        });
        let last = self.outcomes.len() - 1;
        &mut self.outcomes[last]
    }
}

#[derive(Debug, Clone)]
pub struct SwitchOutcome {
    pub profile: Profile,
    pub interfaces: Vec<String>,
    pub teardown: TeardownReport,
}

/// Where to look for a config file when an interface is not in the map.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerOptions {
    pub alternate_dirs: Vec<PathBuf>,
    pub prefix_swaps: Vec<PrefixSwap>,
    pub suffixes: Vec<String>,
    pub sweep_profiles: bool,
    /// Pause between teardown and activation so the tool can release the old
    /// interface. Best-effort, not a guarantee.
    pub settle_delay: Duration,
}

impl ReconcilerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            alternate_dirs: config.alternate_config_dirs.clone(),
            prefix_swaps: config.device_prefix_swaps.clone(),
            suffixes: config.candidate_suffixes.clone(),
            sweep_profiles: config.sweep_profiles,
            settle_delay: config.settle_delay(),
        }
    }
}

pub struct InterfaceReconciler {
    tool: WgTool,
    store: ProfileStore,
    options: ReconcilerOptions,
    mapping: InterfaceMap,
}

impl InterfaceReconciler {
    pub fn new(tool: WgTool, store: ProfileStore, options: ReconcilerOptions) -> Self {
        Self {
            tool,
            store,
            options,
            mapping: InterfaceMap::default(),
        }
    }

    pub fn mapping(&self) -> &InterfaceMap {
        &self.mapping
    }

    pub fn tool(&self) -> &WgTool {
        &self.tool
    }

    /// Config files that might have created `interface`, in probe order.
    /// Only files that exist are returned.
    pub fn candidate_paths(&self, interface: &str) -> Vec<PathBuf> {
        let dir = self.store.dir();
        let file = format!("{}.{}", interface, PROFILE_EXTENSION);

        let mut paths = vec![dir.join(&file)];
        paths.extend(self.options.alternate_dirs.iter().map(|alt| alt.join(&file)));
        for swap in &self.options.prefix_swaps {
            if let Some(rest) = interface.strip_prefix(swap.device.as_str()) {
                paths.push(dir.join(format!("{}{}.{}", swap.profile, rest, PROFILE_EXTENSION)));
            }
        }
        for suffix in &self.options.suffixes {
            paths.push(dir.join(format!("{}{}.{}", interface, suffix, PROFILE_EXTENSION)));
        }

        let mut seen = Vec::new();
        paths.retain(|p| {
            if seen.contains(p) || !p.is_file() {
                return false;
            }
            seen.push(p.clone());
            true
        });
        paths
    }

    /// Tear down every active interface. Failures on individual interfaces are
    /// logged and reported, never returned; only a failed `show interfaces`
    /// surfaces as an error.
    pub async fn teardown_all(&mut self) -> Result<TeardownReport> {
        let mut report = TeardownReport::default();

        let active = self.tool.show_interfaces().await?;
        if active.is_empty() {
            tracing::info!("No active interfaces found to disconnect");
            self.mapping.retain_active(&active);
            return Ok(report);
        }
        tracing::info!("Found active interfaces: {}", active.join(" "));

        for interface in &active {
            tracing::info!("Disconnecting interface: {}", interface);
            let method = self.teardown_one(interface).await;
            let outcome = report.outcome_mut(interface);
            outcome.state = if method.is_some() {
                InterfaceState::TornDown
            } else {
                InterfaceState::Active
            };
            outcome.method = method;
        }

        let remaining = self.tool.show_interfaces().await?;
        if remaining.is_empty() {
            settle_outcomes(&mut report, &remaining);
            self.mapping.retain_active(&remaining);
            return Ok(report);
        }

        tracing::warn!(
            "Some interfaces are still active after disconnect attempts: {}",
            remaining.join(" ")
        );
        for interface in &remaining {
            tracing::info!("Forcefully disconnecting interface: {}", interface);
            match self.tool.down(interface).await {
                Ok(()) => {
                    let outcome = report.outcome_mut(interface);
                    outcome.state = InterfaceState::TornDown;
                    outcome.method = Some(TeardownMethod::Forced);
                }
                Err(e) => tracing::warn!("Error forcefully disconnecting {}: {}", interface, e),
            }
        }

        let still_active = self.tool.show_interfaces().await?;
        settle_outcomes(&mut report, &still_active);
        for interface in &still_active {
            tracing::error!("Interface {} is stuck active; leaving it alone", interface);
        }

        self.mapping.retain_active(&still_active);
        Ok(report)
    }

    async fn teardown_one(&mut self, interface: &str) -> Option<TeardownMethod> {
        if let Some(mapped) = self.mapping.get(interface).map(Path::to_path_buf) {
            tracing::info!("Using mapped config file: {}", mapped.display());
            match self.tool.down_config(&mapped).await {
                Ok(()) => {
                    self.mapping.remove(interface);
                    return Some(TeardownMethod::Mapped(mapped));
                }
                Err(e) => tracing::warn!("Error disconnecting with mapped config {}: {}", mapped.display(), e),
            }
        }

        let mut tried = Vec::new();
        for candidate in self.candidate_paths(interface) {
            tracing::info!("Disconnecting using config file: {}", candidate.display());
            match self.tool.down_config(&candidate).await {
                Ok(()) => return Some(TeardownMethod::Candidate(candidate)),
                Err(e) => tracing::warn!("Error disconnecting with config file {}: {}", candidate.display(), e),
            }
            tried.push(candidate);
        }

        if self.options.sweep_profiles {
            let profiles = self.store.list().unwrap_or_default();
            for profile in profiles.into_iter().filter(|p| !tried.contains(&p.path)) {
                tracing::debug!("Trying to disconnect with config: {}", profile.path.display());
                if self.tool.down_config(&profile.path).await.is_ok() {
                    return Some(TeardownMethod::Sweep(profile.path));
                }
            }
        }

        tracing::info!("No config file found for {}, using direct interface name as last resort", interface);
        match self.tool.down(interface).await {
            Ok(()) => Some(TeardownMethod::DirectName),
            Err(e) => {
                tracing::warn!("Error disconnecting interface {}: {}", interface, e);
                None
            }
        }
    }

    /// Make `profile` the only active tunnel.
    pub async fn switch_to(&mut self, profile: &str) -> Result<SwitchOutcome> {
        tracing::info!("Switching to config: {}", profile);
        self.tool.ensure_installed()?;

        let path = self.store.resolve(profile);
        if !path.is_file() {
            return Err(RotatorError::ProfileNotFound(path));
        }
        let profile = Profile::from_path(&path).unwrap_or_else(|| Profile {
            name: profile.to_string(),
            path: path.clone(),
        });

        self.ensure_owner_only(&path).await?;

        let teardown = match self.teardown_all().await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Error checking active interfaces: {}", e);
                TeardownReport::default()
            }
        };

        if !self.options.settle_delay.is_zero() {
            tokio::time::sleep(self.options.settle_delay).await;
        }

        let before = match self.tool.show_interfaces().await {
            Ok(before) => before,
            Err(e) => {
                tracing::warn!("Error in final interface check: {}", e);
                Vec::new()
            }
        };
        if !before.is_empty() {
            tracing::warn!(
                "Some interfaces are still active before connecting: {}",
                before.join(" ")
            );
        }

        tracing::info!("Connecting to new configuration: {}", path.display());
        self.tool.up(&path).await.map_err(|e| match e {
            RotatorError::CommandFailed { stderr, .. } => RotatorError::ActivationFailed { stderr },
            other => other,
        })?;

        let after = match self.tool.show_interfaces().await {
            Ok(after) => after,
            Err(e) => {
                // The tunnel is up; we just cannot tell which interface it got.
                tracing::error!("Error storing interface mapping: {}", e);
                tracing::info!("Successfully switched to {}", profile.name);
                return Ok(SwitchOutcome {
                    profile,
                    interfaces: Vec::new(),
                    teardown,
                });
            }
        };
        let mut created: Vec<String> = after.iter().filter(|i| !before.contains(i)).cloned().collect();
        if created.is_empty() {
            created = after.clone();
        }
        for interface in &created {
            tracing::info!("Mapped interface {} to config {}", interface, path.display());
            self.mapping.insert(interface.clone(), path.clone());
        }
        self.mapping.retain_active(&after);

        tracing::info!("Successfully switched to {}", profile.name);
        Ok(SwitchOutcome {
            profile,
            interfaces: created,
            teardown,
        })
    }

    #[cfg(unix)]
    async fn ensure_owner_only(&self, path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
        if mode != 0o600 {
            tracing::info!("Fixing config file permissions ({:o} -> 600): {}", mode, path.display());
            self.tool.restrict_permissions(path).await?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn ensure_owner_only(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Final states once the tool has been asked one last time what is still up.
fn settle_outcomes(report: &mut TeardownReport, still_active: &[String]) {
    for outcome in report.outcomes.iter_mut() {
        if still_active.contains(&outcome.name) {
            outcome.state = InterfaceState::StuckActive;
            outcome.method = None;
        } else if outcome.state == InterfaceState::Active {
            // went away on its own after the failed attempts
            outcome.state = InterfaceState::TornDown;
        }
    }
    for interface in still_active {
        report.outcome_mut(interface).state = InterfaceState::StuckActive;
    }
}
