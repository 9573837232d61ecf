use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a posting links to a concrete job page or to a board's search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingKind {
    RealPosting,
    SearchEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub platform: String,
    pub provider: String,
    pub link: String,
    pub updated_at: Option<String>,
    pub kind: PostingKind,
}

impl JobPosting {
    /// Link (case-insensitive), else native id, else `title|company`.
    pub fn dedupe_key(&self) -> String {
        dedupe_key(&self.link, &self.id, &self.title, &self.company)
    }

    pub fn is_real_posting(&self) -> bool {
        self.kind == PostingKind::RealPosting
    }
}

pub(crate) fn dedupe_key(link: &str, id: &str, title: &str, company: &str) -> String {
    let link = link.trim();
    if !link.is_empty() {
        return link.to_lowercase();
    }
    let id = id.trim();
    if !id.is_empty() {
        return id.to_string();
    }
    format!("{}|{}", title.trim(), company.trim())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationResult {
    pub success: bool,
    pub message: String,
    pub job: JobPosting,
    pub timestamp: DateTime<Utc>,
}

impl ApplicationResult {
    pub fn succeeded(job: &JobPosting, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            job: job.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(job: &JobPosting, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            job: job.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchApplyReport {
    pub total_attempted: usize,
    pub applied: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub skipped: usize,
    pub stopped_early: bool,
    pub results: Vec<ApplicationResult>,
}

impl BatchApplyReport {
    pub fn record(&mut self, result: ApplicationResult) {
        self.total_attempted += 1;
        if result.success {
            self.applied += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
        self.success_rate = self.compute_success_rate();
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// Folds a sub-batch into this report, keeping result order.
    pub fn absorb(&mut self, other: BatchApplyReport) {
        self.skipped += other.skipped;
        self.stopped_early |= other.stopped_early;
        for result in other.results {
            self.record(result);
        }
    }

    fn compute_success_rate(&self) -> f64 {
        if self.total_attempted == 0 {
            0.0
        } else {
            self.applied as f64 / self.total_attempted as f64
        }
    }
}

/// One provider consulted during a search, in the order tried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider: String,
    pub accepted: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a search produced and which source answered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub jobs: Vec<JobPosting>,
    pub provider_mode: String,
    pub has_actionable_jobs: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<ProviderAttempt>,
}

impl SearchOutcome {
    pub const NO_REAL_JOBS: &'static str = "no_real_jobs";

    pub fn answered(provider: &str, jobs: Vec<JobPosting>, attempts: Vec<ProviderAttempt>) -> Self {
        let has_actionable_jobs = jobs.iter().any(JobPosting::is_real_posting);
        Self {
            jobs,
            provider_mode: provider.to_string(),
            has_actionable_jobs,
            attempts,
        }
    }

    pub fn exhausted(attempts: Vec<ProviderAttempt>) -> Self {
        Self {
            jobs: Vec::new(),
            provider_mode: Self::NO_REAL_JOBS.to_string(),
            has_actionable_jobs: false,
            attempts,
        }
    }
}

/// Envelope shared by every service-level response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    /// A failed response that still carries a payload, such as a report
    /// where every attempt failed.
    pub fn failed_with(data: T, error: impl Into<String>, code: &str) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(error.into()),
            code: Some(code.to_string()),
        }
    }

    pub fn failure(error: impl Into<String>, code: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code: Some(code.to_string()),
        }
    }
}

/// User identity and credentials passed through apply endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub greeting: Option<String>,
}
