//! Round-robin rotation through the profile directory on a fixed timer.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::profiles::{Profile, PROFILE_EXTENSION};
use super::reconciler::InterfaceMap;
use crate::service::VpnService;

/// Index of the profile that is currently up, if it can be told.
///
/// Best-effort: the map is consulted first since it knows which file created
/// each interface. Failing that, an interface whose name equals a profile stem
/// is taken to be that profile. Tool-assigned names like `utun3` match nothing.
pub fn current_index(profiles: &[Profile], active: &[String], mapping: &InterfaceMap) -> Option<usize> {
    for interface in active {
        if let Some(path) = mapping.get(interface) {
            if let Some(i) = profiles.iter().position(|p| p.path == path) {
                return Some(i);
            }
        }
    }

    let suffix = format!(".{}", PROFILE_EXTENSION);
    active.iter().find_map(|interface| {
        let stem = interface.strip_suffix(suffix.as_str()).unwrap_or(interface);
        profiles.iter().position(|p| p.name == stem)
    })
}

/// Profile after the current one, wrapping; the first one when nothing matches.
pub fn select_next<'a>(profiles: &'a [Profile], active: &[String], mapping: &InterfaceMap) -> Option<&'a Profile> {
    if profiles.is_empty() {
        return None;
    }
    let next = match current_index(profiles, active, mapping) {
        Some(i) => (i + 1) % profiles.len(),
        None => 0,
    };
    profiles.get(next)
}

pub struct RotationScheduler {
    service: Arc<VpnService>,
    period: Duration,
    notifications: bool,
}

impl RotationScheduler {
    pub fn new(service: Arc<VpnService>, period: Duration, notifications: bool) -> Self {
        Self {
            service,
            period,
            notifications,
        }
    }

    /// Runs forever. The first rotation happens one period after start, and a
    /// failed rotation never changes the cadence.
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Rotating profiles every {}s", self.period.as_secs());
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    pub async fn tick(&self) {
        tracing::info!("Switching WireGuard configuration...");
        match self.service.rotate().await {
            Ok(Some(outcome)) => {
                if self.notifications {
                    notify(&format!("Switched to {}", outcome.profile.name));
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Error in auto-switch: {}", e),
        }
    }
}

fn notify(body: &str) {
    let result = notify_rust::Notification::new()
        .summary("wg-rotator")
        .body(body)
        .icon("network-vpn")
        .show();
    if let Err(e) = result {
        tracing::debug!("Notification failed: {}", e);
    }
}
