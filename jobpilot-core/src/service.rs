//! The explicit service instance behind every outer surface: search,
//! single apply, batch apply and platform-driven apply.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::apply::{
    ApplicationHistory, ApplyError, BatchApplyCoordinator, BatchStatus, BossApplier, Credentials,
    LinkedInApplier, Platform, PlatformApplier, SearchFilters, StopHandle,
    VerificationCodeSource, ZhilianApplier,
};
use crate::browser::{
    AntiDetectionEngine, BrowserPage, BrowserSessionManager, ChromiumLauncher, PageLauncher,
    SessionKey,
};
use crate::config::JobPilotConfig;
use crate::model::{
    ApiResponse, ApplicationResult, BatchApplyReport, JobPosting, SearchOutcome, UserInfo,
};
use crate::search::{CacheProvider, RawJob, RecentJobs, SearchOrchestrator, SearchQuery};
use crate::session::SessionStore;

pub const INVALID_REQUEST: &str = "invalid_request";
pub const JOB_NOT_FOUND: &str = "job_not_found";
pub const LOGIN_FAILED: &str = "login_failed";
pub const APPLY_FAILED: &str = "apply_failed";
pub const SEARCH_FAILED: &str = "search_failed";
pub const BROWSER_UNAVAILABLE: &str = "browser_unavailable";

const DEFAULT_SEARCH_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http client setup failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub keywords: Vec<String>,
    pub location: Option<String>,
    pub limit: Option<usize>,
    pub allow_portal_fallback: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplyRequest {
    pub job_id: String,
    pub resume_text: String,
    pub user_info: UserInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchApplyRequest {
    pub job_ids: Vec<String>,
    pub resume_text: String,
    pub user_info: UserInfo,
    pub max_count: Option<usize>,
}

/// Why a browser-backed run ended before applying.
enum RunFailure {
    Login(String),
    Search(ApplyError),
}

pub struct JobService {
    config: JobPilotConfig,
    orchestrator: SearchOrchestrator,
    cache: Arc<CacheProvider>,
    recent: RecentJobs,
    sessions: Arc<SessionStore>,
    browsers: BrowserSessionManager,
    codes: Arc<dyn VerificationCodeSource>,
    coordinator: BatchApplyCoordinator,
    history: Option<ApplicationHistory>,
}

impl JobService {
    /// Wires the production collaborators: a shared HTTP client for every
    /// provider and a Chromium launcher for browser sessions.
    pub fn from_config(
        config: JobPilotConfig,
        codes: Arc<dyn VerificationCodeSource>,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(
                config.search.provider_timeout_seconds.max(1),
            ))
            .build()?;
        let cache = Arc::new(CacheProvider::new(config.search.cache_capacity));
        let orchestrator =
            SearchOrchestrator::from_config(&config.search, client, Arc::clone(&cache));
        let launcher = Box::new(ChromiumLauncher::new(config.browser.clone()));
        Ok(Self::with_parts(config, orchestrator, cache, launcher, codes))
    }

    /// Assembles a service from explicit parts. `cache` should be the one
    /// the orchestrator searches so ingested rows become visible.
    pub fn with_parts(
        config: JobPilotConfig,
        orchestrator: SearchOrchestrator,
        cache: Arc<CacheProvider>,
        launcher: Box<dyn PageLauncher>,
        codes: Arc<dyn VerificationCodeSource>,
    ) -> Self {
        let history = match ApplicationHistory::open(&config.apply.history_db) {
            Ok(history) => Some(history),
            Err(err) => {
                warn!(path = %config.apply.history_db, error = %err, "application history disabled");
                None
            }
        };
        let mut coordinator = BatchApplyCoordinator::new(&config.apply);
        if let Some(history) = &history {
            coordinator = coordinator.with_history(history.clone());
        }
        let browsers = BrowserSessionManager::new(
            launcher,
            Duration::from_secs(config.browser.launch_timeout_seconds.max(1)),
        );
        Self {
            recent: RecentJobs::new(config.search.recent_cache_minutes),
            sessions: Arc::new(SessionStore::from_config(&config.session)),
            orchestrator,
            cache,
            browsers,
            codes,
            coordinator,
            history,
            config,
        }
    }

    pub fn config(&self) -> &JobPilotConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &SearchOrchestrator {
        &self.orchestrator
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn history(&self) -> Option<&ApplicationHistory> {
        self.history.as_ref()
    }

    /// Stops the running batch of `user_id` only.
    pub fn stop_handle(&self, user_id: &str) -> StopHandle {
        self.coordinator.stop_handle(user_id)
    }

    pub fn batch_status(&self, user_id: &str) -> BatchStatus {
        self.coordinator.status(user_id)
    }

    /// Accepts a crawler push into the local cache.
    pub fn ingest(&self, rows: Vec<RawJob>) -> usize {
        let accepted = self.cache.ingest(rows);
        info!(accepted, cached = self.cache.len(), "crawler rows ingested");
        accepted
    }

    pub async fn search(&self, request: &SearchRequest) -> ApiResponse<SearchOutcome> {
        let allow_entries = self.config.search.allow_cn_portal_fallback
            && request.allow_portal_fallback.unwrap_or(true);
        let query = SearchQuery::new(
            request.keywords.clone(),
            request.location.clone(),
            request.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        );
        let outcome = self.orchestrator.search_query(&query, allow_entries).await;
        self.recent.remember(&outcome.jobs);
        if outcome.jobs.is_empty() {
            ApiResponse::failed_with(
                outcome,
                "no real jobs found from any provider",
                SearchOutcome::NO_REAL_JOBS,
            )
        } else {
            ApiResponse::ok(outcome)
        }
    }

    /// Applies to one job from a recent search.
    pub async fn apply(&self, request: &ApplyRequest) -> ApiResponse<ApplicationResult> {
        let user = &request.user_info;
        if user.user_id.trim().is_empty() {
            return ApiResponse::failure("userInfo.userId is required", INVALID_REQUEST);
        }
        let Some(job) = self.recent.get(&request.job_id) else {
            return ApiResponse::failure(
                format!("job {} is unknown or expired", request.job_id),
                JOB_NOT_FOUND,
            );
        };
        let Some(platform) = Platform::from_link(&job.link) else {
            let result = link_handoff(&job);
            self.record_history(&user.user_id, &result);
            return ApiResponse::ok(result);
        };

        let credentials = Credentials::from_user_info(user);
        let mut applier = self.applier_for(platform, user.greeting.as_deref());
        let key = SessionKey::new(platform.as_str(), &credentials.user_id);
        let run = self
            .browsers
            .with_page(&key, |mut page: Box<dyn BrowserPage>| {
                let job = &job;
                let credentials = &credentials;
                async move {
                    let login = applier.login(page.as_mut(), credentials).await;
                    let outcome = if login.success {
                        Ok(applier.apply_job(page.as_mut(), job).await)
                    } else {
                        Err(login.message)
                    };
                    (page, outcome)
                }
            })
            .await;

        match run {
            Err(err) => ApiResponse::failure(
                format!("browser session unavailable: {err}"),
                BROWSER_UNAVAILABLE,
            ),
            Ok(Err(message)) => {
                let result = ApplicationResult::failed(&job, format!("login failed: {message}"));
                self.record_history(&user.user_id, &result);
                ApiResponse::failed_with(result, message, LOGIN_FAILED)
            }
            Ok(Ok(result)) => {
                self.record_history(&user.user_id, &result);
                if result.success {
                    ApiResponse::ok(result)
                } else {
                    let message = result.message.clone();
                    ApiResponse::failed_with(result, message, APPLY_FAILED)
                }
            }
        }
    }

    /// Applies to recent jobs in request order. Consecutive jobs on the same
    /// platform share one browser session; jobs on hosts without a flow get
    /// a link handoff. The report is returned even when every attempt failed.
    pub async fn batch_apply(&self, request: &BatchApplyRequest) -> ApiResponse<BatchApplyReport> {
        let user = &request.user_info;
        if user.user_id.trim().is_empty() {
            return ApiResponse::failure("userInfo.userId is required", INVALID_REQUEST);
        }
        let mut jobs = Vec::with_capacity(request.job_ids.len());
        for id in &request.job_ids {
            match self.recent.get(id) {
                Some(job) => jobs.push(job),
                None => warn!(job = %id, "batch job unknown or expired, ignored"),
            }
        }
        if jobs.is_empty() {
            return ApiResponse::failure("none of the requested jobs are known", JOB_NOT_FOUND);
        }

        let max_count = request.max_count.unwrap_or(jobs.len());
        let credentials = Credentials::from_user_info(user);
        let stop = self.coordinator.begin(&user.user_id);
        let mut report = BatchApplyReport::default();

        for (platform, run) in platform_runs(&jobs) {
            if report.stopped_early || stop.is_stopped() {
                report.stopped_early = true;
                break;
            }
            let remaining = max_count.saturating_sub(report.total_attempted);
            if remaining == 0 {
                break;
            }
            let part = match platform {
                None => self.hand_off_all(run, remaining, &user.user_id),
                Some(platform) => {
                    self.run_platform_batch(platform, &credentials, user.greeting.as_deref(), run, remaining)
                        .await
                }
            };
            report.absorb(part);
        }

        info!(
            user = %user.user_id,
            attempted = report.total_attempted,
            applied = report.applied,
            "batch request finished"
        );
        ApiResponse::ok(report)
    }

    /// Logs in, searches the platform itself and applies to what it found,
    /// all inside one browser session.
    pub async fn platform_apply(
        &self,
        platform: Platform,
        credentials: &Credentials,
        keywords: &[String],
        location: Option<&str>,
        filters: &SearchFilters,
        max_count: usize,
    ) -> ApiResponse<BatchApplyReport> {
        if credentials.user_id.trim().is_empty() {
            return ApiResponse::failure("user id is required", INVALID_REQUEST);
        }
        self.coordinator.begin(&credentials.user_id);
        let mut applier = self.applier_for(platform, None);
        let key = SessionKey::new(platform.as_str(), &credentials.user_id);
        let coordinator = &self.coordinator;
        let run = self
            .browsers
            .with_page(&key, |mut page: Box<dyn BrowserPage>| async move {
                let login = applier.login(page.as_mut(), credentials).await;
                if !login.success {
                    return (page, Err(RunFailure::Login(login.message)));
                }
                let jobs = match applier
                    .search_jobs(page.as_mut(), keywords, location, filters)
                    .await
                {
                    Ok(jobs) => jobs,
                    Err(err) => return (page, Err(RunFailure::Search(err))),
                };
                info!(%platform, found = jobs.len(), "platform search finished");
                let report = coordinator
                    .run(applier.as_mut(), page.as_mut(), &jobs, max_count, &credentials.user_id)
                    .await;
                (page, Ok(report))
            })
            .await;

        match run {
            Err(err) => ApiResponse::failure(
                format!("browser session unavailable: {err}"),
                BROWSER_UNAVAILABLE,
            ),
            Ok(Err(RunFailure::Login(message))) => ApiResponse::failure(message, LOGIN_FAILED),
            Ok(Err(RunFailure::Search(err))) => ApiResponse::failure(err.to_string(), SEARCH_FAILED),
            Ok(Ok(report)) if report.results.is_empty() => ApiResponse::failed_with(
                report,
                "platform search returned no applicable jobs",
                SearchOutcome::NO_REAL_JOBS,
            ),
            Ok(Ok(report)) => ApiResponse::ok(report),
        }
    }

    /// A fresh applier per request; the per-user greeting wins over the
    /// configured one.
    pub fn applier_for(&self, platform: Platform, greeting: Option<&str>) -> Box<dyn PlatformApplier> {
        let engine = AntiDetectionEngine::new(self.config.human.clone());
        let mut apply = self.config.apply.clone();
        if let Some(greeting) = greeting.map(str::trim).filter(|text| !text.is_empty()) {
            apply.greeting = greeting.to_string();
        }
        let store = Arc::clone(&self.sessions);
        match platform {
            Platform::Boss => Box::new(BossApplier::new(engine, store, Arc::clone(&self.codes), &apply)),
            Platform::Zhilian => Box::new(ZhilianApplier::new(engine, store, &apply)),
            Platform::LinkedIn => Box::new(LinkedInApplier::new(engine, store, &apply)),
        }
    }

    async fn run_platform_batch(
        &self,
        platform: Platform,
        credentials: &Credentials,
        greeting: Option<&str>,
        jobs: &[JobPosting],
        max_count: usize,
    ) -> BatchApplyReport {
        let mut applier = self.applier_for(platform, greeting);
        let key = SessionKey::new(platform.as_str(), &credentials.user_id);
        let coordinator = &self.coordinator;
        let run = self
            .browsers
            .with_page(&key, |mut page: Box<dyn BrowserPage>| async move {
                let login = applier.login(page.as_mut(), credentials).await;
                if !login.success {
                    return (page, Err(login.message));
                }
                let report = coordinator
                    .run(applier.as_mut(), page.as_mut(), jobs, max_count, &credentials.user_id)
                    .await;
                (page, Ok(report))
            })
            .await;

        let reason = match run {
            Ok(Ok(report)) => return report,
            Ok(Err(message)) => format!("login failed: {message}"),
            Err(err) => format!("browser session unavailable: {err}"),
        };
        warn!(%platform, reason = %reason, "platform run failed before applying");
        let mut report = BatchApplyReport::default();
        for job in jobs.iter().take(max_count) {
            let result = ApplicationResult::failed(job, reason.clone());
            self.record_history(&credentials.user_id, &result);
            report.record(result);
        }
        report
    }

    fn hand_off_all(&self, jobs: &[JobPosting], max_count: usize, user_id: &str) -> BatchApplyReport {
        let mut report = BatchApplyReport::default();
        for job in jobs.iter().take(max_count) {
            let result = link_handoff(job);
            self.record_history(user_id, &result);
            report.record(result);
        }
        report
    }

    fn record_history(&self, user_id: &str, result: &ApplicationResult) {
        if let Some(history) = &self.history {
            if let Err(err) = history.append(user_id, result) {
                warn!(error = %err, "failed to record application history");
            }
        }
    }
}

/// Result for a host without an automated flow: the user finishes on the
/// site itself.
fn link_handoff(job: &JobPosting) -> ApplicationResult {
    ApplicationResult::succeeded(
        job,
        format!(
            "{} has no automated apply flow; finish the application at {}",
            job.platform, job.link
        ),
    )
}

/// Splits jobs into maximal runs of the same platform, keeping input order.
fn platform_runs(jobs: &[JobPosting]) -> Vec<(Option<Platform>, &[JobPosting])> {
    let mut runs = Vec::new();
    let mut start = 0;
    for index in 1..=jobs.len() {
        let current = Platform::from_link(&jobs[start].link);
        if index == jobs.len() || Platform::from_link(&jobs[index].link) != current {
            runs.push((current, &jobs[start..index]));
            start = index;
        }
    }
    runs
}
