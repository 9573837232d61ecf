use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::BrowserPage;
use crate::config::ApplySection;
use crate::model::{BatchApplyReport, JobPosting};

use super::blacklist::JobFilter;
use super::history::ApplicationHistory;
use super::PlatformApplier;

/// Cooperative stop signal, checked once per job.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStatus {
    pub running: bool,
    pub attempted: usize,
    pub applied: usize,
}

/// Runs batches one job at a time. Stop requests and progress are tracked
/// per user id.
#[derive(Debug)]
pub struct BatchApplyCoordinator {
    filter: JobFilter,
    delay_seconds: [u64; 2],
    max_per_session: usize,
    history: Option<ApplicationHistory>,
    stops: Mutex<HashMap<String, StopHandle>>,
    statuses: Mutex<HashMap<String, BatchStatus>>,
}

impl BatchApplyCoordinator {
    pub fn new(config: &ApplySection) -> Self {
        Self {
            filter: JobFilter::from_config(config),
            delay_seconds: config.delay_seconds,
            max_per_session: config.max_apply_per_session as usize,
            history: None,
            stops: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_filter(mut self, filter: JobFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_history(mut self, history: ApplicationHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn stop_handle(&self, user_id: &str) -> StopHandle {
        let mut stops = self.stops.lock().unwrap_or_else(PoisonError::into_inner);
        stops.entry(user_id.to_string()).or_default().clone()
    }

    /// Clears an earlier stop request for `user_id`. Call once when a request
    /// starts, before login; `run` never clears it.
    pub fn begin(&self, user_id: &str) -> StopHandle {
        let stop = self.stop_handle(user_id);
        stop.reset();
        stop
    }

    pub fn status(&self, user_id: &str) -> BatchStatus {
        let statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        statuses.get(user_id).copied().unwrap_or_default()
    }

    /// Applies to `jobs` in order, one at a time, until `max_count` attempts
    /// (capped by the per-session limit), a stop request, or the end of the
    /// list. Blacklisted jobs are skipped without counting as attempts.
    pub async fn run(
        &self,
        applier: &mut dyn PlatformApplier,
        page: &mut dyn BrowserPage,
        jobs: &[JobPosting],
        max_count: usize,
        user_id: &str,
    ) -> BatchApplyReport {
        let limit = max_count.min(self.max_per_session);
        let platform = applier.platform();
        let mut report = BatchApplyReport::default();
        let stop = self.stop_handle(user_id);
        self.update(user_id, |status| *status = BatchStatus { running: true, ..BatchStatus::default() });
        info!(%platform, candidates = jobs.len(), limit, "batch apply started");

        for (index, job) in jobs.iter().enumerate() {
            if stop.is_stopped() {
                info!(%platform, "batch apply stopped on request");
                report.stopped_early = true;
                break;
            }
            if report.total_attempted >= limit {
                break;
            }
            if self.filter.is_blacklisted(job) {
                debug!(%platform, company = %job.company, title = %job.title, "skipping blacklisted job");
                report.record_skip();
                continue;
            }

            let result = applier.apply_job(page, job).await;
            if !result.success {
                warn!(%platform, job = %job.id, message = %result.message, "apply attempt failed");
            }
            if let Some(history) = &self.history {
                if let Err(err) = history.append(user_id, &result) {
                    warn!(error = %err, "failed to record application history");
                }
            }
            report.record(result);
            self.update(user_id, |status| {
                status.attempted = report.total_attempted;
                status.applied = report.applied;
            });

            let more_pending = index + 1 < jobs.len() && report.total_attempted < limit;
            if more_pending && !stop.is_stopped() {
                let delay = self.next_delay();
                debug!(delay_secs = delay.as_secs(), "pausing between applications");
                sleep(delay).await;
            }
        }

        self.update(user_id, |status| status.running = false);
        info!(
            %platform,
            attempted = report.total_attempted,
            applied = report.applied,
            failed = report.failed,
            skipped = report.skipped,
            "batch apply finished"
        );
        report
    }

    fn next_delay(&self) -> Duration {
        let [a, b] = self.delay_seconds;
        let secs = rand::thread_rng().gen_range(a.min(b)..=a.max(b));
        Duration::from_secs(secs)
    }

    fn update(&self, user_id: &str, change: impl FnOnce(&mut BatchStatus)) {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        change(statuses.entry(user_id.to_string()).or_default());
    }
}
