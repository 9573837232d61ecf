use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::search::normalizer::RawJob;

use super::duckduckgo::{ACCEPT_LANGUAGE, BROWSER_USER_AGENT};
use super::{
    anchors_to_rows, classify_status, looks_blocked, site_restricted_query, JobProvider,
    ProviderError, ProviderResult, SearchQuery,
};

/// Scrapes Bing's organic result list.
#[derive(Debug, Clone)]
pub struct BingHtmlProvider {
    client: Client,
    sites: Vec<String>,
    base_url: String,
    timeout: Duration,
}

impl BingHtmlProvider {
    pub fn new(client: Client, sites: Vec<String>) -> Self {
        Self {
            client,
            sites,
            base_url: "https://www.bing.com".to_string(),
            timeout: Duration::from_secs(12),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn result_count(limit: usize) -> usize {
    limit.saturating_mul(2).min(50).max(10)
}

#[async_trait]
impl JobProvider for BingHtmlProvider {
    fn name(&self) -> &'static str {
        "bing_html"
    }

    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        let q = site_restricted_query(query, &self.sites);
        let count = result_count(query.limit).to_string();
        let response = self
            .client
            .get(format!("{}/search", self.base_url.trim_end_matches('/')))
            .query(&[("q", q.as_str()), ("count", count.as_str())])
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .header(reqwest::header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .timeout(self.timeout)
            .send()
            .await?;
        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }
        let html = response.text().await?;
        if looks_blocked(&html) {
            return Err(ProviderError::Blocked("bing challenge page".to_string()));
        }
        let rows = anchors_to_rows(
            &html,
            "li.b_algo h2 a",
            &self.sites,
            query,
            self.name(),
            |href| Some(href.trim().to_string()),
        )?;
        debug!(rows = rows.len(), "bing results parsed");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_bounded() {
        assert_eq!(result_count(1), 10);
        assert_eq!(result_count(12), 24);
        assert_eq!(result_count(40), 50);
    }
}
