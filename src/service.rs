//! One entry point shared by the scheduler, the HTTP surface, the UI and the
//! CLI. Every teardown or activation goes through the reconciler lock, so a
//! manual switch never interleaves with a scheduled rotation.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::Result;
use crate::status::geo::HttpGeoLookup;
use crate::status::{ConnectionSnapshot, StatusReporter};
use crate::vpn::profiles::{Profile, ProfileStore};
use crate::vpn::reconciler::{InterfaceReconciler, ReconcilerOptions, SwitchOutcome, TeardownReport};
use crate::vpn::rotation;
use crate::vpn::tool::{ToolPaths, WgTool};
use crate::vpn::SudoRunner;

pub struct VpnService {
    store: ProfileStore,
    reconciler: Mutex<InterfaceReconciler>,
    status: StatusReporter,
}

impl VpnService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let paths = ToolPaths::new(&config.wg_binary, &config.wg_quick_binary);
        let tool = WgTool::new(Arc::new(SudoRunner::new(config.command_timeout())), paths.clone());
        let store = ProfileStore::new(&config.config_dir, paths);
        store.ensure_dir();

        let geo = HttpGeoLookup::new(config.lookup_services.clone(), config.lookup_timeout())?;
        let reconciler = InterfaceReconciler::new(
            tool.clone(),
            store.clone(),
            ReconcilerOptions::from_config(config),
        );
        Ok(Self::new(store, reconciler, StatusReporter::new(tool, Arc::new(geo))))
    }

    pub fn new(store: ProfileStore, reconciler: InterfaceReconciler, status: StatusReporter) -> Self {
        Self {
            store,
            reconciler: Mutex::new(reconciler),
            status,
        }
    }

    pub fn profiles(&self) -> Result<Vec<Profile>> {
        self.store.list()
    }

    /// Switch by profile name. Used by the HTTP surface and the UI, so only
    /// names listed in the profile directory are accepted.
    pub async fn switch_to(&self, name: &str) -> Result<SwitchOutcome> {
        let profile = self.store.find(name)?;
        let target = profile.path.to_string_lossy().into_owned();
        self.reconciler.lock().await.switch_to(&target).await
    }

    /// Switch to a name or an arbitrary config path, as typed on the command line.
    pub async fn switch_to_path(&self, profile: &str) -> Result<SwitchOutcome> {
        self.reconciler.lock().await.switch_to(profile).await
    }

    pub async fn disconnect(&self) -> Result<TeardownReport> {
        let mut reconciler = self.reconciler.lock().await;
        reconciler.tool().ensure_installed()?;
        let report = reconciler.teardown_all().await?;
        for interface in report.stuck() {
            tracing::warn!("{} is still up after disconnect", interface);
        }
        Ok(report)
    }

    /// One scheduler tick: activate the profile after the current one.
    /// `None` when there is nothing to rotate through.
    pub async fn rotate(&self) -> Result<Option<SwitchOutcome>> {
        let mut reconciler = self.reconciler.lock().await;

        let profiles = self.store.list()?;
        if profiles.is_empty() {
            tracing::warn!("No WireGuard configuration files found in {}", self.store.dir().display());
            return Ok(None);
        }

        let active = reconciler.tool().show_interfaces().await?;
        let next = match rotation::select_next(&profiles, &active, reconciler.mapping()) {
            Some(profile) => profile.clone(),
            None => return Ok(None),
        };

        let target = next.path.to_string_lossy().into_owned();
        reconciler.switch_to(&target).await.map(Some)
    }

    /// Status does not wait for a switch in progress; interface names are only
    /// translated to profile names when the reconciler is free.
    pub async fn snapshot(&self) -> ConnectionSnapshot {
        let names = self.reconciler.try_lock().ok().map(|r| r.mapping().clone());
        self.status.snapshot(names.as_ref()).await
    }
}
