use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::search::normalizer::{stable_hash, RawJob};
use crate::search::retry::RetryPolicy;

use super::{classify_status, JobProvider, ProviderError, ProviderResult, SearchQuery};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JoobleResponse {
    jobs: Vec<JoobleJob>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JoobleJob {
    title: String,
    company: String,
    location: String,
    salary: String,
    source: String,
    link: String,
    updated: String,
}

/// Paid job-search API. Several keys may be configured; a rate-limited key
/// hands over to the next one.
#[derive(Debug)]
pub struct JoobleProvider {
    client: Client,
    keys: Vec<String>,
    next_key: AtomicUsize,
    retry: RetryPolicy,
    base_url: String,
    timeout: Duration,
}

impl JoobleProvider {
    pub fn new(client: Client, keys: Vec<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            keys,
            next_key: AtomicUsize::new(0),
            retry,
            base_url: "https://jooble.org".to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch(&self, key: &str, query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        let response = self
            .client
            .post(format!("{}/api/{key}", self.base_url.trim_end_matches('/')))
            .json(&json!({
                "keywords": query.joined(5, "Python"),
                "location": query.location_or_empty(),
            }))
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        if status.as_u16() == 403 {
            return Err(ProviderError::RateLimited { status: 403 });
        }
        if let Some(err) = classify_status(status) {
            return Err(err);
        }
        let payload: JoobleResponse = response.json().await?;
        Ok(payload
            .jobs
            .into_iter()
            .filter(|job| !job.link.trim().is_empty())
            .take(query.limit.max(1))
            .map(|job| RawJob {
                id: format!("jooble_{}", stable_hash(&job.link)),
                title: job.title,
                company: job.company,
                location: if job.location.is_empty() {
                    query.location_or_empty().to_string()
                } else {
                    job.location
                },
                salary: job.salary,
                platform: job.source,
                provider: "jooble".to_string(),
                link: job.link,
                updated: (!job.updated.is_empty()).then_some(job.updated),
            })
            .collect())
    }
}

#[async_trait]
impl JobProvider for JoobleProvider {
    fn name(&self) -> &'static str {
        "jooble"
    }

    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        if self.keys.is_empty() {
            return Err(ProviderError::MissingCredentials("jooble"));
        }
        let start = self.next_key.load(Ordering::Relaxed);
        let key_count = self.keys.len();
        let outcome = self
            .retry
            .run(self.name(), |attempt| {
                let index = (start + attempt) % key_count;
                if attempt > 0 {
                    info!(key_index = index, "rotating jooble credential");
                }
                self.fetch(&self.keys[index], query)
            })
            .await;
        match outcome {
            Ok(outcome) => {
                self.next_key
                    .store((start + outcome.attempts - 1) % key_count, Ordering::Relaxed);
                debug!(rows = outcome.result.len(), attempts = outcome.attempts, "jooble answered");
                Ok(outcome.result)
            }
            Err(err) => {
                if matches!(err, ProviderError::RateLimited { .. }) {
                    self.next_key
                        .store((start + 1) % key_count, Ordering::Relaxed);
                }
                Err(err)
            }
        }
    }
}
