use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::search::normalizer::{stable_hash, RawJob};

use super::{classify_status, JobProvider, ProviderResult, SearchQuery};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemotiveResponse {
    jobs: Vec<RemotiveJob>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemotiveJob {
    url: String,
    title: String,
    company_name: String,
    candidate_required_location: String,
    salary: String,
    publication_date: String,
}

/// Free remote-jobs feed. Only consulted when the global fallback is on.
#[derive(Debug, Clone)]
pub struct RemotiveProvider {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl RemotiveProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: "https://remotive.com".to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl JobProvider for RemotiveProvider {
    fn name(&self) -> &'static str {
        "remotive"
    }

    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        let search = query.joined(3, "Python");
        let response = self
            .client
            .get(format!("{}/api/remote-jobs", self.base_url.trim_end_matches('/')))
            .query(&[("search", search.as_str())])
            .timeout(self.timeout)
            .send()
            .await?;
        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }
        let payload: RemotiveResponse = response.json().await?;
        let rows: Vec<RawJob> = payload
            .jobs
            .into_iter()
            .filter(|job| !job.url.trim().is_empty())
            .take(query.limit.max(1))
            .map(|job| RawJob {
                id: format!("remotive_{}", stable_hash(&job.url)),
                title: job.title,
                company: job.company_name,
                location: if job.candidate_required_location.is_empty() {
                    "Remote".to_string()
                } else {
                    job.candidate_required_location
                },
                salary: job.salary,
                platform: "Remotive".to_string(),
                provider: "remotive".to_string(),
                link: job.url,
                updated: (!job.publication_date.is_empty()).then_some(job.publication_date),
            })
            .collect();
        debug!(rows = rows.len(), "remotive answered");
        Ok(rows)
    }
}
