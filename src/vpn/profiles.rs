use serde::Serialize;
use std::path::{Path, PathBuf};

use super::tool::ToolPaths;
use crate::error::{Result, RotatorError};

pub const PROFILE_EXTENSION: &str = "conf";

/// A WireGuard config file on disk, named by its file stem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub name: String,
    pub path: PathBuf,
}

impl Profile {
    pub fn from_path(path: &Path) -> Option<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some(PROFILE_EXTENSION) {
            return None;
        }
        let name = path.file_stem()?.to_str()?.to_string();
        Some(Self {
            name,
            path: path.to_path_buf(),
        })
    }
}

/// Reads profiles straight from the config directory on every call.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
    tools: ToolPaths,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>, tools: ToolPaths) -> Self {
        Self {
            dir: dir.into(),
            tools,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) {
        if !self.dir.exists() {
            tracing::info!("Creating wireguard config directory: {}", self.dir.display());
            if let Err(e) = std::fs::create_dir_all(&self.dir) {
                tracing::warn!("Could not create {}: {}", self.dir.display(), e);
            }
        }
    }

    /// All `*.conf` files in the directory, sorted by file name so the rotation
    /// order does not depend on the filesystem. A read error yields an empty list.
    pub fn list(&self) -> Result<Vec<Profile>> {
        self.tools.ensure_installed()?;

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Error reading config directory {}: {}", self.dir.display(), e);
                return Ok(Vec::new());
            }
        };

        let mut profiles: Vec<Profile> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(|path| Profile::from_path(&path))
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(
            "Found config files: {:?}",
            profiles.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
        );
        Ok(profiles)
    }

    /// A listed profile by bare name (`se-1` or `se-1.conf`). Anything that
    /// could point outside the directory is refused before touching it.
    pub fn find(&self, name: &str) -> Result<Profile> {
        let suffix = format!(".{}", PROFILE_EXTENSION);
        let stem = name.strip_suffix(suffix.as_str()).unwrap_or(name);
        if stem.is_empty() || stem.contains(['/', '\\']) || stem.contains("..") {
            return Err(RotatorError::ProfileNotFound(PathBuf::from(name)));
        }

        self.list()?
            .into_iter()
            .find(|profile| profile.name == stem)
            .ok_or_else(|| RotatorError::ProfileNotFound(self.dir.join(format!("{}{}", stem, suffix))))
    }

    /// Accepts an absolute path, a file name, or a bare profile name.
    /// Only for trusted callers; see `find` for names coming from outside.
    pub fn resolve(&self, name: &str) -> PathBuf {
        let candidate = Path::new(name);
        if candidate.is_absolute() {
            return candidate.to_path_buf();
        }
        if candidate.extension().and_then(|e| e.to_str()) == Some(PROFILE_EXTENSION) {
            self.dir.join(candidate)
        } else {
            self.dir.join(format!("{}.{}", name, PROFILE_EXTENSION))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn test_list_filters_and_sorts() {
        let fixture = Fixture::new(&["c", "a", "b"]);
        std::fs::write(fixture.profile_dir().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(fixture.profile_dir().join("old.conf")).unwrap();

        let names: Vec<String> = fixture.store().list().unwrap().into_iter().map(|p| p.name).collect();

        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let fixture = Fixture::new(&[]);
        let store = ProfileStore::new(fixture.profile_dir().join("nope"), fixture.tool_paths());

        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_requires_tools() {
        let fixture = Fixture::new(&["a"]);
        let store = ProfileStore::new(
            fixture.profile_dir(),
            ToolPaths::new("/nonexistent/wg", "/nonexistent/wg-quick"),
        );

        assert!(matches!(store.list(), Err(RotatorError::ToolNotInstalled { .. })));
    }

    #[test]
    fn test_resolve_forms() {
        let store = ProfileStore::new("/home/me/wireguard", ToolPaths::new("wg", "wg-quick"));

        assert_eq!(store.resolve("se-1"), PathBuf::from("/home/me/wireguard/se-1.conf"));
        assert_eq!(store.resolve("se-1.conf"), PathBuf::from("/home/me/wireguard/se-1.conf"));
        assert_eq!(store.resolve("/etc/wireguard/wg0.conf"), PathBuf::from("/etc/wireguard/wg0.conf"));
    }

    #[test]
    fn test_find_by_name() {
        let fixture = Fixture::new(&["se-1", "nl-2"]);
        let store = fixture.store();

        assert_eq!(store.find("se-1").unwrap().path, fixture.profile_path("se-1"));
        assert_eq!(store.find("nl-2.conf").unwrap().name, "nl-2");
        assert!(matches!(store.find("de-3"), Err(RotatorError::ProfileNotFound(p)) if p.ends_with("de-3.conf")));
    }

    #[test]
    fn test_find_refuses_paths() {
        let fixture = Fixture::new(&["se-1"]);
        let store = fixture.store();
        let absolute = fixture.profile_path("se-1");

        for name in [
            absolute.to_str().unwrap(),
            "../profiles/se-1",
            "../../etc/resolv.conf",
            "sub/se-1",
            "sub\\se-1",
            "..",
            "",
        ] {
            assert!(
                matches!(store.find(name), Err(RotatorError::ProfileNotFound(_))),
                "accepted {:?}",
                name
            );
        }
    }

    #[test]
    fn test_ensure_dir_creates() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles"), ToolPaths::new("wg", "wg-quick"));

        store.ensure_dir();

        assert!(dir.path().join("profiles").is_dir());
    }
}
