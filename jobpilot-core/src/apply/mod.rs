//! Per-platform application flows and the batch runner on top of them.

mod batch;
mod blacklist;
mod boss;
mod flow;
mod history;
mod linkedin;
mod verification;
mod zhilian;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

use crate::browser::{BrowserError, BrowserPage};
use crate::model::{ApplicationResult, JobPosting, UserInfo};
use crate::search::platform::host_of;
use crate::session::SessionError;

pub use batch::{BatchApplyCoordinator, BatchStatus, StopHandle};
pub use blacklist::JobFilter;
pub use boss::BossApplier;
pub use history::{ApplicationHistory, HistoryEntry, HistoryError};
pub use linkedin::LinkedInApplier;
pub use verification::{
    wait_for_code, ChannelCodeSource, NoCodeSource, VerificationCodeSource,
};
pub use zhilian::ZhilianApplier;

pub type ApplyResult<T> = Result<T, ApplyError>;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("login challenge unresolved: {0}")]
    LoginChallengeUnresolved(String),
    #[error("expected control not found: {0}")]
    StepNotFound(String),
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Boss,
    Zhilian,
    LinkedIn,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Boss, Platform::Zhilian, Platform::LinkedIn];

    /// Platform owning the host of `link`, when one is supported.
    pub fn from_link(link: &str) -> Option<Self> {
        let host = host_of(link)?;
        if host.ends_with("zhipin.com") {
            Some(Platform::Boss)
        } else if host.ends_with("zhaopin.com") {
            Some(Platform::Zhilian)
        } else if host.ends_with("linkedin.com") {
            Some(Platform::LinkedIn)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Boss => "boss",
            Platform::Zhilian => "zhilian",
            Platform::LinkedIn => "linkedin",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Boss => "Boss直聘",
            Platform::Zhilian => "智联招聘",
            Platform::LinkedIn => "LinkedIn",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ApplyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "boss" | "zhipin" => Ok(Platform::Boss),
            "zhilian" | "zhaopin" => Ok(Platform::Zhilian),
            "linkedin" => Ok(Platform::LinkedIn),
            other => Err(ApplyError::UnsupportedPlatform(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user_id: String,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn from_user_info(user: &UserInfo) -> Self {
        Self {
            user_id: user.user_id.clone(),
            phone: user.phone.clone(),
            username: user.username.clone().or_else(|| user.email.clone()),
            password: user.password.clone(),
        }
    }
}

/// Optional UI filters applied on the platform's own search page.
#[derive(Debug, Clone)]
pub struct SearchFilters {
    pub salary: Option<String>,
    pub experience: Option<String>,
    pub limit: usize,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            salary: None,
            experience: None,
            limit: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub success: bool,
    pub reused_session: bool,
    pub message: String,
}

impl LoginOutcome {
    pub fn confirmed(reused_session: bool) -> Self {
        Self {
            success: true,
            reused_session,
            message: if reused_session {
                "restored saved session".to_string()
            } else {
                "login confirmed".to_string()
            },
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            reused_session: false,
            message: message.into(),
        }
    }
}

/// The uniform contract every platform flow implements. The page belongs
/// to a session acquired by the caller.
#[async_trait(?Send)]
pub trait PlatformApplier {
    fn platform(&self) -> Platform;

    async fn login(&mut self, page: &mut dyn BrowserPage, credentials: &Credentials) -> LoginOutcome;

    async fn search_jobs(
        &mut self,
        page: &mut dyn BrowserPage,
        keywords: &[String],
        location: Option<&str>,
        filters: &SearchFilters,
    ) -> ApplyResult<Vec<JobPosting>>;

    /// Never fails: a missing control becomes a failed result.
    async fn apply_job(&mut self, page: &mut dyn BrowserPage, job: &JobPosting) -> ApplicationResult;
}

/// Query text for platform search boxes.
pub(crate) fn joined_keywords(keywords: &[String], take: usize) -> String {
    let joined = keywords
        .iter()
        .map(|keyword| keyword.trim())
        .filter(|keyword| !keyword.is_empty())
        .take(take)
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        "Python".to_string()
    } else {
        joined
    }
}
