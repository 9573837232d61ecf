use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionSection;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session io error at {path}: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("session file {path} is corrupt: {source}")]
    Corrupt {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("session expired ({age_hours}h old)")]
    Expired { age_hours: i64 },
    #[error("session belongs to another user")]
    OwnerMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl StoredCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            secure: false,
            http_only: false,
        }
    }
}

/// Drivers export cookies either as a list of objects or as a plain
/// name/value map. Both are accepted on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CookieJar {
    List(Vec<StoredCookie>),
    Map(BTreeMap<String, String>),
}

impl CookieJar {
    pub fn into_cookies(self) -> Vec<StoredCookie> {
        match self {
            CookieJar::List(cookies) => cookies,
            CookieJar::Map(map) => map
                .into_iter()
                .map(|(name, value)| StoredCookie::new(name, value))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    user_id: String,
    platform: String,
    cookies: CookieJar,
    #[serde(default)]
    user_agent: String,
    created_at: DateTime<Utc>,
}

/// Authentication state for one (platform, user) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub user_id: String,
    pub platform: String,
    pub cookies: Vec<StoredCookie>,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn new(
        platform: &str,
        user_id: &str,
        cookies: Vec<StoredCookie>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            cookies,
            user_agent: user_agent.into(),
            created_at: Utc::now(),
        }
    }
}

/// Cookie-free summary for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub created_at: DateTime<Utc>,
    pub age_hours: i64,
    pub cookie_count: usize,
    pub user_agent: String,
    pub valid: bool,
}

/// JSON files under one directory, one per (platform, user). Writes for the
/// same key are serialized and land through a temp file rename.
#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    ttl: Duration,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>, ttl_days: i64) -> Self {
        Self {
            dir: dir.into(),
            ttl: Duration::days(ttl_days.max(1)),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SessionSection) -> Self {
        Self::new(&config.dir, config.ttl_days)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(platform: &str, user_id: &str) -> String {
        let digest = hex::encode(Sha256::digest(user_id.as_bytes()));
        format!("{}_{}.json", sanitize(platform), &digest[..16])
    }

    fn path_for(&self, platform: &str, user_id: &str) -> PathBuf {
        self.dir.join(Self::file_name(platform, user_id))
    }

    fn lock_for(&self, platform: &str, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(Self::file_name(platform, user_id))
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    pub async fn save(&self, session: &StoredSession) -> SessionResult<()> {
        let lock = self.lock_for(&session.platform, &session.user_id);
        let _guard = lock.lock().await;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SessionError::Io {
                source,
                path: self.dir.clone(),
            })?;
        let path = self.path_for(&session.platform, &session.user_id);
        let file = SessionFile {
            user_id: session.user_id.clone(),
            platform: session.platform.clone(),
            cookies: CookieJar::List(session.cookies.clone()),
            user_agent: session.user_agent.clone(),
            created_at: session.created_at,
        };
        let body = serde_json::to_vec_pretty(&file).map_err(|source| SessionError::Corrupt {
            source,
            path: path.clone(),
        })?;

        let tmp = path.with_extension("json.tmp");
        let io_err = |source| SessionError::Io {
            source,
            path: tmp.clone(),
        };
        let mut handle = fs::File::create(&tmp).await.map_err(io_err)?;
        handle.write_all(&body).await.map_err(io_err)?;
        handle.sync_all().await.map_err(io_err)?;
        drop(handle);
        fs::rename(&tmp, &path)
            .await
            .map_err(|source| SessionError::Io {
                source,
                path: path.clone(),
            })?;
        info!(
            platform = %session.platform,
            cookies = session.cookies.len(),
            "session saved"
        );
        Ok(())
    }

    /// Returns the stored session when it is young enough and owned by
    /// `user_id`. Expired and foreign sessions read as absent.
    pub async fn load(&self, platform: &str, user_id: &str) -> SessionResult<Option<StoredSession>> {
        self.load_at(platform, user_id, Utc::now()).await
    }

    pub async fn load_at(
        &self,
        platform: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> SessionResult<Option<StoredSession>> {
        let Some(session) = self.read(platform, user_id).await? else {
            return Ok(None);
        };
        match self.check(&session, user_id, now) {
            Ok(()) => Ok(Some(session)),
            Err(err) => {
                debug!(platform, %err, "stored session rejected");
                Ok(None)
            }
        }
    }

    fn check(&self, session: &StoredSession, user_id: &str, now: DateTime<Utc>) -> SessionResult<()> {
        if session.user_id != user_id {
            return Err(SessionError::OwnerMismatch);
        }
        let age = now - session.created_at;
        if age > self.ttl {
            return Err(SessionError::Expired {
                age_hours: age.num_hours(),
            });
        }
        Ok(())
    }

    async fn read(&self, platform: &str, user_id: &str) -> SessionResult<Option<StoredSession>> {
        let path = self.path_for(platform, user_id);
        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SessionError::Io { source, path }),
        };
        let file: SessionFile = match serde_json::from_slice(&body) {
            Ok(file) => file,
            Err(source) => {
                warn!(path = %path.display(), error = %source, "unreadable session file");
                return Err(SessionError::Corrupt { source, path });
            }
        };
        Ok(Some(StoredSession {
            user_id: file.user_id,
            platform: file.platform,
            cookies: file.cookies.into_cookies(),
            user_agent: file.user_agent,
            created_at: file.created_at,
        }))
    }

    /// Removes the stored session; a missing file is not an error.
    pub async fn clear(&self, platform: &str, user_id: &str) -> SessionResult<bool> {
        let lock = self.lock_for(platform, user_id);
        let _guard = lock.lock().await;
        let path = self.path_for(platform, user_id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(platform, "session cleared");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SessionError::Io { source, path }),
        }
    }

    pub async fn info(&self, platform: &str, user_id: &str) -> SessionResult<Option<SessionInfo>> {
        let now = Utc::now();
        let Some(session) = self.read(platform, user_id).await? else {
            return Ok(None);
        };
        Ok(Some(SessionInfo {
            created_at: session.created_at,
            age_hours: (now - session.created_at).num_hours(),
            cookie_count: session.cookies.len(),
            valid: self.check(&session, user_id, now).is_ok(),
            user_agent: session.user_agent,
        }))
    }
}

fn sanitize(platform: &str) -> String {
    platform
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
