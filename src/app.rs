use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::service::VpnService;
use crate::status::ConnectionSnapshot;
use crate::vpn::profiles::Profile;

/// How often the status panel is refreshed in the background
pub const STATUS_POLL: Duration = Duration::from_secs(5);

/// Status messages clear themselves after this long
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(4);

/// Results coming back from background work
#[derive(Debug)]
pub enum UiEvent {
    Snapshot(ConnectionSnapshot),
    Message(String),
    /// A switch/rotate/disconnect finished; re-read profiles and status
    Done,
}

pub struct App {
    service: Arc<VpnService>,
    events_tx: UnboundedSender<UiEvent>,
    events_rx: UnboundedReceiver<UiEvent>,

    pub profiles: Vec<Profile>,
    pub selected: usize,
    pub snapshot: Option<ConnectionSnapshot>,

    /// Rotation period when the scheduler is running
    pub rotate_every: Option<Duration>,

    // Set while a switch or disconnect is running
    pub busy: Option<String>,

    pub status_message: Option<String>,
    pub status_message_time: Option<Instant>,
}

impl App {
    pub fn new(service: Arc<VpnService>, rotate_every: Option<Duration>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut app = Self {
            service,
            events_tx,
            events_rx,
            profiles: Vec::new(),
            selected: 0,
            snapshot: None,
            rotate_every,
            busy: None,
            status_message: None,
            status_message_time: None,
        };
        app.reload_profiles();
        app.spawn_status_poller();
        app
    }

    fn spawn_status_poller(&self) {
        let service = self.service.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STATUS_POLL);
            loop {
                ticker.tick().await;
                if tx.send(UiEvent::Snapshot(service.snapshot().await)).is_err() {
                    break;
                }
            }
        });
    }

    fn request_snapshot(&self) {
        let service = self.service.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(UiEvent::Snapshot(service.snapshot().await));
        });
    }

    pub fn reload_profiles(&mut self) {
        match self.service.profiles() {
            Ok(profiles) => self.profiles = profiles,
            Err(e) => {
                self.profiles.clear();
                self.set_message(format!("Error: {}", e));
            }
        }
        if self.selected >= self.profiles.len() {
            self.selected = self.profiles.len().saturating_sub(1);
        }
    }

    pub fn selected_profile(&self) -> Option<&Profile> {
        self.profiles.get(self.selected)
    }

    /// Whether `profile` is the one the last snapshot reported as current
    pub fn is_current(&self, profile: &Profile) -> bool {
        self.snapshot
            .as_ref()
            .map(|s| s.is_connected() && s.current_config == profile.name)
            .unwrap_or(false)
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_message_time = Some(Instant::now());
    }

    /// Drain background results and expire old messages
    pub fn tick(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                UiEvent::Snapshot(snapshot) => self.snapshot = Some(snapshot),
                UiEvent::Message(message) => self.set_message(message),
                UiEvent::Done => {
                    self.busy = None;
                    self.reload_profiles();
                    self.request_snapshot();
                }
            }
        }

        if let Some(at) = self.status_message_time {
            if at.elapsed() > MESSAGE_TIMEOUT && self.busy.is_none() {
                self.status_message = None;
                self.status_message_time = None;
            }
        }
    }

    pub async fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.profiles.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Char('r') => {
                self.reload_profiles();
                self.request_snapshot();
                self.set_message("Refreshing...");
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(profile) = self.selected_profile().cloned() {
                    self.run_action(format!("Switching to {}", profile.name), move |service| async move {
                        service
                            .switch_to(&profile.name)
                            .await
                            .map(|o| format!("Connected to {}", o.profile.name))
                    });
                }
            }
            KeyCode::Char('n') => {
                self.run_action("Rotating to next profile".to_string(), |service| async move {
                    service.rotate().await.map(|outcome| match outcome {
                        Some(o) => format!("Rotated to {}", o.profile.name),
                        None => "No profiles to rotate through".to_string(),
                    })
                });
            }
            KeyCode::Char('d') => {
                self.run_action("Disconnecting".to_string(), |service| async move {
                    service.disconnect().await.map(|report| match report.stuck().as_slice() {
                        [] => "VPN disconnected".to_string(),
                        stuck => format!("Still up: {}", stuck.join(", ")),
                    })
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Run a service call off the UI loop; one at a time.
    fn run_action<F, Fut>(&mut self, label: String, action: F)
    where
        F: FnOnce(Arc<VpnService>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = crate::error::Result<String>> + Send + 'static,
    {
        if self.busy.is_some() {
            self.set_message("Busy, please wait...");
            return;
        }
        self.busy = Some(label.clone());
        self.set_message(format!("{}...", label));

        let service = self.service.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let message = match action(service).await {
                Ok(message) => message,
                Err(e) => format!("Error: {}", e),
            };
            let _ = tx.send(UiEvent::Message(message));
            let _ = tx.send(UiEvent::Done);
        });
    }
}
