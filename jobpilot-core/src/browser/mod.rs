mod automation;
mod error;
mod fingerprint;
mod human;
mod page;
mod profile;
mod session;

pub use automation::{ChromiumLauncher, PageLauncher};
pub use error::{BrowserError, BrowserResult};
pub use fingerprint::FingerprintMasker;
pub use human::{slider_trajectory, AntiDetectionEngine};
pub use page::{BoundingBox, BrowserPage, ChromiumPage, ViewportSpec};
pub use profile::ProfileManager;
pub use session::{BrowserSessionManager, SessionKey, SessionState};
