//! Test doubles: a stateful fake of `wg`/`wg-quick` behind the CommandRunner
//! seam, a canned geolocation lookup, and a temp-dir fixture tying them together.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::config::AppConfig;
use crate::error::{Result, RotatorError};
use crate::service::VpnService;
use crate::status::geo::{GeoLookup, IpLocation};
use crate::status::StatusReporter;
use crate::vpn::profiles::ProfileStore;
use crate::vpn::reconciler::{InterfaceReconciler, ReconcilerOptions};
use crate::vpn::tool::{ToolPaths, WgTool};
use crate::vpn::{CommandOutput, CommandRunner};

/// How the fake tool names the interfaces it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// Linux: the interface takes the config file stem
    Stem,
    /// macOS: `utunN`, unrelated to the file name
    Utun,
}

#[derive(Debug, Clone)]
struct FakeInterface {
    name: String,
    config: Option<PathBuf>,
}

#[derive(Debug)]
struct FakeState {
    naming: Naming,
    next_utun: u32,
    active: Vec<FakeInterface>,
    bare_down_works: bool,
    stuck: HashSet<String>,
    fail_up: Option<String>,
    fail_show_after_up: bool,
    fail_next_show: bool,
    calls: Vec<String>,
}

pub struct FakeWg {
    state: Mutex<FakeState>,
}

fn failed(stderr: impl Into<String>) -> RotatorError {
    RotatorError::CommandFailed {
        exit_code: 1,
        stderr: stderr.into(),
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl FakeWg {
    pub fn new(naming: Naming) -> Self {
        Self {
            state: Mutex::new(FakeState {
                naming,
                next_utun: 3,
                active: Vec::new(),
                bare_down_works: false,
                stuck: HashSet::new(),
                fail_up: None,
                fail_show_after_up: false,
                fail_next_show: false,
                calls: Vec::new(),
            }),
        }
    }

    pub fn bring_up_raw(&self, name: &str, config: Option<PathBuf>) {
        self.state.lock().unwrap().active.push(FakeInterface {
            name: name.to_string(),
            config,
        });
    }

    /// Remove an interface without going through the tool.
    pub fn drop_interface(&self, name: &str) {
        self.state.lock().unwrap().active.retain(|i| i.name != name);
    }

    pub fn set_bare_down(&self, works: bool) {
        self.state.lock().unwrap().bare_down_works = works;
    }

    pub fn set_stuck(&self, name: &str) {
        self.state.lock().unwrap().stuck.insert(name.to_string());
    }

    pub fn fail_up(&self, stderr: &str) {
        self.state.lock().unwrap().fail_up = Some(stderr.to_string());
    }

    /// The first `wg show` after the next successful `up` fails.
    pub fn fail_show_after_up(&self) {
        self.state.lock().unwrap().fail_show_after_up = true;
    }

    pub fn clear_fail_up(&self) {
        self.state.lock().unwrap().fail_up = None;
    }

    pub fn active(&self) -> Vec<String> {
        self.state.lock().unwrap().active.iter().map(|i| i.name.clone()).collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count_calls(&self, line: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| c.as_str() == line).count()
    }
}

impl FakeState {
    fn up(&mut self, config: PathBuf) -> Result<CommandOutput> {
        if let Some(stderr) = &self.fail_up {
            return Err(failed(stderr.clone()));
        }
        let name = match self.naming {
            Naming::Stem => stem(&config),
            Naming::Utun => {
                self.next_utun += 1;
                format!("utun{}", self.next_utun)
            }
        };
        if self.active.iter().any(|i| i.name == name) {
            return Err(failed(format!("wg-quick: `{}' already exists", name)));
        }
        self.active.push(FakeInterface {
            name,
            config: Some(config),
        });
        if self.fail_show_after_up {
            self.fail_show_after_up = false;
            self.fail_next_show = true;
        }
        Ok(CommandOutput::default())
    }

    fn down(&mut self, target: &str) -> Result<CommandOutput> {
        let position = if target.contains('/') {
            let path = Path::new(target);
            let file_stem = stem(path);
            self.active
                .iter()
                .position(|i| i.config.as_deref() == Some(path) || i.name == file_stem)
        } else if self.bare_down_works {
            self.active.iter().position(|i| i.name == target)
        } else {
            None
        };

        match position {
            Some(i) if !self.stuck.contains(&self.active[i].name) => {
                self.active.remove(i);
                Ok(CommandOutput::default())
            }
            _ => Err(failed(format!("wg-quick: `{}' is not a WireGuard interface", target))),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeWg {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let name = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}", name, args.join(" ")));

        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("");
        match (name.as_str(), arg(0)) {
            ("wg", "show") if state.fail_next_show => {
                state.fail_next_show = false;
                Err(failed("Unable to access interface: Operation not permitted"))
            }
            ("wg", "show") => {
                let names: Vec<&str> = state.active.iter().map(|i| i.name.as_str()).collect();
                Ok(CommandOutput {
                    stdout: format!("{}\n", names.join(" ")),
                    ..Default::default()
                })
            }
            ("wg-quick", "up") => state.up(PathBuf::from(arg(1))),
            ("wg-quick", "down") => state.down(arg(1)),
            ("chmod", mode) => {
                let mode = u32::from_str_radix(mode, 8).map_err(|_| failed("bad mode"))?;
                set_mode(Path::new(arg(1)), mode)?;
                Ok(CommandOutput::default())
            }
            _ => Err(RotatorError::CommandFailed {
                exit_code: 127,
                stderr: format!("{}: command not found", name),
            }),
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

pub struct FakeGeo {
    answer: Option<IpLocation>,
    calls: AtomicUsize,
}

impl FakeGeo {
    pub fn answering(ip: &str, city: Option<&str>, country: Option<&str>) -> Self {
        Self {
            answer: Some(IpLocation {
                ip: ip.to_string(),
                city: city.map(str::to_string),
                country: country.map(str::to_string),
                ..Default::default()
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLookup for FakeGeo {
    async fn lookup(&self) -> Result<IpLocation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .clone()
            .ok_or_else(|| RotatorError::LookupFailed("no service answered".to_string()))
    }
}

/// Temp dir holding placeholder `wg`/`wg-quick` binaries and a profile dir.
pub struct Fixture {
    dir: TempDir,
    pub fake: Arc<FakeWg>,
}

impl Fixture {
    pub fn new(profiles: &[&str]) -> Self {
        Self::with_naming(profiles, Naming::Stem)
    }

    pub fn with_naming(profiles: &[&str], naming: Naming) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).expect("bin dir");
        std::fs::write(bin.join("wg"), "").expect("wg");
        std::fs::write(bin.join("wg-quick"), "").expect("wg-quick");

        let fixture = Self {
            dir,
            fake: Arc::new(FakeWg::new(naming)),
        };
        std::fs::create_dir_all(fixture.profile_dir()).expect("profile dir");
        for name in profiles {
            let path = fixture.profile_path(name);
            std::fs::write(&path, "[Interface]\nPrivateKey = x\n\n[Peer]\n").expect("profile");
            set_mode(&path, 0o600).expect("chmod");
        }
        fixture
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.dir.path().join("profiles")
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profile_dir().join(format!("{}.conf", name))
    }

    pub fn alt_dir(&self) -> PathBuf {
        self.dir.path().join("alt")
    }

    pub fn tool_paths(&self) -> ToolPaths {
        let bin = self.dir.path().join("bin");
        ToolPaths::new(bin.join("wg"), bin.join("wg-quick"))
    }

    pub fn tool(&self) -> WgTool {
        WgTool::new(self.fake.clone(), self.tool_paths())
    }

    pub fn store(&self) -> ProfileStore {
        ProfileStore::new(self.profile_dir(), self.tool_paths())
    }

    fn options(&self) -> ReconcilerOptions {
        let defaults = AppConfig::default();
        ReconcilerOptions {
            alternate_dirs: vec![self.alt_dir()],
            prefix_swaps: defaults.device_prefix_swaps,
            suffixes: defaults.candidate_suffixes,
            sweep_profiles: false,
            settle_delay: Duration::ZERO,
        }
    }

    pub fn reconciler(&self) -> InterfaceReconciler {
        self.reconciler_with(|_| {})
    }

    pub fn reconciler_with(&self, tweak: impl FnOnce(&mut ReconcilerOptions)) -> InterfaceReconciler {
        let mut options = self.options();
        tweak(&mut options);
        InterfaceReconciler::new(self.tool(), self.store(), options)
    }

    pub fn service(&self) -> VpnService {
        self.service_with(|_| {})
    }

    pub fn service_with(&self, tweak: impl FnOnce(&mut ReconcilerOptions)) -> VpnService {
        let geo = Arc::new(FakeGeo::answering("10.0.0.1", Some("Amsterdam"), Some("NL")));
        VpnService::new(
            self.store(),
            self.reconciler_with(tweak),
            StatusReporter::new(self.tool(), geo),
        )
    }
}
