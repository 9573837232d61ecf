use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::search::normalizer::RawJob;
use crate::search::platform::{infer_company_from_title, is_board_link, platform_from_link};
use crate::search::retry::RetryPolicy;

use super::{classify_status, JobProvider, ProviderError, ProviderResult, SearchQuery};

const MAX_COUNT: usize = 20;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BraveResponse {
    web: BraveWeb,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BraveWeb {
    results: Vec<BraveResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BraveResult {
    url: String,
    title: String,
}

/// Brave web search restricted to the configured boards.
#[derive(Debug, Clone)]
pub struct BraveSearchProvider {
    client: Client,
    keys: Vec<String>,
    sites: Vec<String>,
    retry: RetryPolicy,
    base_url: String,
    timeout: Duration,
}

impl BraveSearchProvider {
    pub fn new(client: Client, keys: Vec<String>, sites: Vec<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            keys,
            sites,
            retry,
            base_url: "https://api.search.brave.com".to_string(),
            timeout: Duration::from_secs(12),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn search_text(&self, query: &SearchQuery) -> String {
        let mut parts = vec![query.joined(5, "Python")];
        if let Some(location) = &query.location {
            parts.push(location.clone());
        }
        parts.push("招聘".to_string());
        let clause = self
            .sites
            .iter()
            .map(|site| format!("site:{site}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        if !clause.is_empty() {
            parts.push(format!("({clause})"));
        }
        parts.join(" ")
    }

    async fn fetch(&self, key: &str, query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        let count = query.limit.clamp(1, MAX_COUNT).to_string();
        let q = self.search_text(query);
        let response = self
            .client
            .get(format!(
                "{}/res/v1/web/search",
                self.base_url.trim_end_matches('/')
            ))
            .query(&[
                ("q", q.as_str()),
                ("count", count.as_str()),
                ("country", "cn"),
                ("search_lang", "zh-hans"),
            ])
            .header("X-Subscription-Token", key)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await?;
        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }
        let payload: BraveResponse = response.json().await?;
        let rows = payload
            .web
            .results
            .into_iter()
            .filter(|hit| is_board_link(&hit.url, &self.sites))
            .map(|hit| RawJob {
                company: infer_company_from_title(&hit.title),
                platform: platform_from_link(&hit.url),
                location: query.location_or_empty().to_string(),
                salary: String::new(),
                provider: "brave".to_string(),
                title: hit.title,
                link: hit.url,
                ..Default::default()
            })
            .take(query.limit.max(1))
            .collect::<Vec<_>>();
        Ok(rows)
    }
}

#[async_trait]
impl JobProvider for BraveSearchProvider {
    fn name(&self) -> &'static str {
        "brave"
    }

    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        let keys: Vec<&str> = self
            .keys
            .iter()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(ProviderError::MissingCredentials("brave"));
        }
        let outcome = self
            .retry
            .run(self.name(), |attempt| self.fetch(keys[attempt % keys.len()], query))
            .await?;
        debug!(rows = outcome.result.len(), attempts = outcome.attempts, "brave answered");
        Ok(outcome.result)
    }
}
