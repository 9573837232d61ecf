use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::model::JobPosting;

/// Postings returned by recent searches, keyed by id, so apply requests can
/// refer to a job by id alone.
#[derive(Debug)]
pub struct RecentJobs {
    window: Duration,
    entries: Mutex<HashMap<String, (JobPosting, DateTime<Utc>)>>,
}

impl RecentJobs {
    pub fn new(window_minutes: u64) -> Self {
        Self {
            window: Duration::minutes(window_minutes.max(1) as i64),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn remember(&self, jobs: &[JobPosting]) {
        self.remember_at(jobs, Utc::now());
    }

    pub fn remember_at(&self, jobs: &[JobPosting], now: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, (_, stored)| now - *stored <= self.window);
        for job in jobs {
            entries.insert(job.id.clone(), (job.clone(), now));
        }
    }

    pub fn get(&self, id: &str) -> Option<JobPosting> {
        self.get_at(id, Utc::now())
    }

    pub fn get_at(&self, id: &str, now: DateTime<Utc>) -> Option<JobPosting> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(id)
            .filter(|(_, stored)| now - *stored <= self.window)
            .map(|(job, _)| job.clone())
    }
}
