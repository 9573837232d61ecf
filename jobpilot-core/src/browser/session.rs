use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tracing::{info, warn};

use super::automation::PageLauncher;
use super::error::{BrowserError, BrowserResult};
use super::page::BrowserPage;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub platform: String,
    pub user_id: String,
}

impl SessionKey {
    pub fn new(platform: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Owns at most one live browser per (platform, user) and hands it out
/// through scoped acquisition only.
pub struct BrowserSessionManager {
    launcher: Box<dyn PageLauncher>,
    launch_timeout: Duration,
    locks: Mutex<HashMap<SessionKey, Arc<AsyncMutex<()>>>>,
    states: Mutex<HashMap<SessionKey, SessionState>>,
}

impl fmt::Debug for BrowserSessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserSessionManager")
            .field("launch_timeout", &self.launch_timeout)
            .finish_non_exhaustive()
    }
}

impl BrowserSessionManager {
    pub fn new(launcher: Box<dyn PageLauncher>, launch_timeout: Duration) -> Self {
        Self {
            launcher,
            launch_timeout,
            locks: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self, key: &SessionKey) -> SessionState {
        self.states
            .lock()
            .map(|states| states.get(key).copied())
            .ok()
            .flatten()
            .unwrap_or(SessionState::Uninitialized)
    }

    /// Launches a page for `key`, runs `work` with it and closes it again.
    ///
    /// `work` receives the page by value and must hand it back together with
    /// its result. Acquisitions for the same key queue behind each other. A
    /// failed launch leaves the key `Uninitialized` and `work` never runs.
    /// If the returned future is dropped or `work` panics, the key still ends
    /// up `Closed` (or `Uninitialized` while launching) and the page is torn
    /// down by its own `Drop`.
    pub async fn with_page<F, Fut, T>(&self, key: &SessionKey, work: F) -> BrowserResult<T>
    where
        F: FnOnce(Box<dyn BrowserPage>) -> Fut,
        Fut: Future<Output = (Box<dyn BrowserPage>, T)>,
    {
        let lock = self.lock_for(key);
        let _guard = lock.lock_owned().await;

        self.set_state(key, SessionState::Initializing);
        let mut teardown = Teardown {
            manager: self,
            key,
            fallback: Some(SessionState::Uninitialized),
        };
        let page = match timeout(self.launch_timeout, self.launcher.launch(key)).await {
            Ok(Ok(page)) => page,
            Ok(Err(err)) => {
                warn!(session = %key, error = %err, "browser session failed to start");
                return Err(err);
            }
            Err(_) => {
                warn!(session = %key, "browser session launch timed out");
                return Err(BrowserError::Timeout(format!("browser launch for {key}")));
            }
        };
        self.set_state(key, SessionState::Ready);
        teardown.fallback = Some(SessionState::Closed);
        info!(session = %key, "browser session ready");

        let (mut page, result) = work(page).await;
        if let Err(err) = page.close().await {
            warn!(session = %key, error = %err, "browser session close failed");
        }
        teardown.finish(SessionState::Closed);
        info!(session = %key, "browser session closed");
        Ok(result)
    }

    fn lock_for(&self, key: &SessionKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    fn set_state(&self, key: &SessionKey, state: SessionState) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.insert(key.clone(), state);
    }
}

/// Leaves the key in `fallback` when `with_page` unwinds or is dropped
/// before reaching its normal exit.
struct Teardown<'a> {
    manager: &'a BrowserSessionManager,
    key: &'a SessionKey,
    fallback: Option<SessionState>,
}

impl Teardown<'_> {
    fn finish(&mut self, state: SessionState) {
        self.fallback = None;
        self.manager.set_state(self.key, state);
    }
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.fallback.take() {
            if state == SessionState::Closed {
                warn!(session = %self.key, "browser session abandoned, releasing");
            }
            self.manager.set_state(self.key, state);
        }
    }
}
