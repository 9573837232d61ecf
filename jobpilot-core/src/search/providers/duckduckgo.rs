use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::search::normalizer::RawJob;

use super::{
    anchors_to_rows, classify_status, looks_blocked, site_restricted_query, JobProvider,
    ProviderError, ProviderResult, SearchQuery,
};

pub(crate) const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
pub(crate) const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Scrapes the JavaScript-free DuckDuckGo results page.
#[derive(Debug, Clone)]
pub struct DuckDuckGoProvider {
    client: Client,
    sites: Vec<String>,
    base_url: String,
    timeout: Duration,
}

impl DuckDuckGoProvider {
    pub fn new(client: Client, sites: Vec<String>) -> Self {
        Self {
            client,
            sites,
            base_url: "https://html.duckduckgo.com".to_string(),
            timeout: Duration::from_secs(12),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Resolves DuckDuckGo's `/l/?uddg=` redirect wrappers to the target URL.
pub(crate) fn unwrap_redirect(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with("/l/?") {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;
    let is_wrapper = parsed
        .host_str()
        .is_some_and(|host| host.ends_with("duckduckgo.com"))
        && parsed.path().starts_with("/l/");
    if is_wrapper {
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, target)| target.into_owned())
            .filter(|target| !target.is_empty());
    }
    Some(absolute)
}

#[async_trait]
impl JobProvider for DuckDuckGoProvider {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        let q = site_restricted_query(query, &self.sites);
        let response = self
            .client
            .get(format!("{}/html/", self.base_url.trim_end_matches('/')))
            .query(&[("q", q.as_str())])
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
            return Err(ProviderError::Blocked("duckduckgo challenge page".to_string()));
        }
        let rows = anchors_to_rows(
            &html,
            "a.result__a",
            &self.sites,
            query,
            self.name(),
            unwrap_redirect,
        )?;
        debug!(rows = rows.len(), "duckduckgo results parsed");
        Ok(rows)
    }
}
