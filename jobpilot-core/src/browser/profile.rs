use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::warn;

use super::error::{BrowserError, BrowserResult};

/// Per-(platform, user) Chromium user-data directories. Reusing the same
/// directory keeps local storage between runs.
#[derive(Debug, Clone)]
pub struct ProfileManager {
    base_dir: PathBuf,
    ttl: Duration,
}

impl ProfileManager {
    pub fn new<P: AsRef<Path>>(base_dir: P, ttl: Duration) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ttl,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn profile_dir(&self, platform: &str, user_id: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(format!("{platform}:{user_id}").as_bytes()));
        self.base_dir.join(format!("{platform}_{}", &digest[..12]))
    }

    pub fn allocate(&self, platform: &str, user_id: &str) -> BrowserResult<PathBuf> {
        let dir = self.profile_dir(platform, user_id);
        std::fs::create_dir_all(&dir)
            .map_err(|err| BrowserError::Profile(format!("failed to create profile dir: {err}")))?;
        Ok(dir)
    }

    /// Removes profile directories untouched for longer than the ttl.
    pub fn cleanup_expired(&self) -> BrowserResult<usize> {
        if !self.base_dir.exists() {
            return Ok(0);
        }
        let now = SystemTime::now();
        let entries = std::fs::read_dir(&self.base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to list profile directory: {err}"))
        })?;
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let modified = match entry.metadata().and_then(|metadata| metadata.modified()) {
                Ok(modified) => modified,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to read profile metadata");
                    continue;
                }
            };
            if now.duration_since(modified).unwrap_or(Duration::ZERO) > self.ttl {
                match std::fs::remove_dir_all(&path) {
                    Ok(()) => removed += 1,
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "failed to remove expired profile")
                    }
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn same_key_maps_to_same_directory() {
        let dir = tempdir().unwrap();
        let manager = ProfileManager::new(dir.path(), Duration::from_secs(3600));
        let first = manager.allocate("boss", "alice").unwrap();
        let again = manager.allocate("boss", "alice").unwrap();
        let other = manager.allocate("boss", "bob").unwrap();
        assert_eq!(first, again);
        assert_ne!(first, other);
        assert!(first.is_dir());
        assert_eq!(manager.cleanup_expired().unwrap(), 0);
    }
}
