use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::SearchSection;
use crate::model::{ProviderAttempt, SearchOutcome};

use super::normalizer::{EntryPolicy, JobNormalizer, RawJob};
use super::providers::{
    BingHtmlProvider, BraveSearchProvider, BrowserRelayProvider, CacheProvider,
    DuckDuckGoProvider, EnterpriseApiProvider, JobProvider, JoobleProvider, PortalEntryProvider,
    ProviderError, ProviderTier, RemotiveProvider, SearchQuery,
};
use super::retry::RetryPolicy;

/// Tries providers one at a time in priority order and stops at the first
/// one that yields a real posting.
pub struct SearchOrchestrator {
    providers: Vec<Arc<dyn JobProvider>>,
    fallback: Option<Arc<dyn JobProvider>>,
    normalizer: JobNormalizer,
    provider_timeout: Duration,
    max_limit: usize,
    allow_entry_fallback: bool,
}

impl SearchOrchestrator {
    /// Providers of the `SearchEntries` tier are set aside as the fallback;
    /// the rest keep their order.
    pub fn new(providers: Vec<Arc<dyn JobProvider>>, provider_timeout: Duration) -> Self {
        let (fallback, providers): (Vec<_>, Vec<_>) = providers
            .into_iter()
            .partition(|provider| provider.tier() == ProviderTier::SearchEntries);
        Self {
            providers,
            fallback: fallback.into_iter().next(),
            normalizer: JobNormalizer::new(),
            provider_timeout,
            max_limit: 50,
            allow_entry_fallback: true,
        }
    }

    pub fn with_fallback(mut self, provider: Arc<dyn JobProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    pub fn allow_entry_fallback(mut self, allow: bool) -> Self {
        self.allow_entry_fallback = allow;
        self
    }

    /// Builds the provider chain named by the configured mode. The cache
    /// instance is shared so crawler pushes stay visible to searches.
    pub fn from_config(config: &SearchSection, client: Client, cache: Arc<CacheProvider>) -> Self {
        let providers = config
            .effective_providers()
            .iter()
            .filter_map(|name| {
                let provider = build_provider(name, config, &client, &cache);
                if provider.is_none() {
                    warn!(provider = %name, "unknown provider name ignored");
                }
                provider
            })
            .collect();
        Self::new(
            providers,
            Duration::from_secs(config.provider_timeout_seconds.max(1)),
        )
        .with_fallback(Arc::new(PortalEntryProvider::new()))
        .with_max_limit(config.max_limit)
        .allow_entry_fallback(config.allow_cn_portal_fallback)
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|provider| provider.name()).collect()
    }

    pub fn clamp_limit(&self, limit: usize) -> usize {
        limit.clamp(1, self.max_limit)
    }

    pub async fn search(
        &self,
        keywords: &[String],
        location: Option<&str>,
        limit: usize,
    ) -> SearchOutcome {
        let query = SearchQuery::new(
            keywords.to_vec(),
            location.map(str::to_string),
            self.clamp_limit(limit),
        );
        self.search_query(&query, self.allow_entry_fallback).await
    }

    /// Runs the chain for an already-built query. `allow_entries` may only
    /// narrow the configured fallback permission.
    pub async fn search_query(&self, query: &SearchQuery, allow_entries: bool) -> SearchOutcome {
        let query = SearchQuery {
            limit: self.clamp_limit(query.limit),
            ..query.clone()
        };
        let mut attempts = Vec::new();

        for provider in &self.providers {
            let name = provider.name();
            match self.call(provider.as_ref(), &query).await {
                Ok(rows) => {
                    let fetched = rows.len();
                    let jobs = self.normalizer.normalize(rows, query.limit);
                    attempts.push(ProviderAttempt {
                        provider: name.to_string(),
                        accepted: jobs.len(),
                        error: None,
                    });
                    if jobs.is_empty() {
                        debug!(provider = name, fetched, "no real postings, trying next provider");
                        continue;
                    }
                    info!(provider = name, fetched, accepted = jobs.len(), "provider answered");
                    return SearchOutcome::answered(name, jobs, attempts);
                }
                Err(err) => {
                    warn!(provider = name, %err, "provider failed, trying next");
                    attempts.push(ProviderAttempt {
                        provider: name.to_string(),
                        accepted: 0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        if allow_entries && self.allow_entry_fallback {
            if let Some(fallback) = &self.fallback {
                let name = fallback.name();
                match self.call(fallback.as_ref(), &query).await {
                    Ok(rows) => {
                        let jobs = self.normalizer.normalize_with(
                            rows,
                            query.limit,
                            EntryPolicy::AllowSearchEntries,
                        );
                        attempts.push(ProviderAttempt {
                            provider: name.to_string(),
                            accepted: jobs.len(),
                            error: None,
                        });
                        if !jobs.is_empty() {
                            info!(provider = name, entries = jobs.len(), "degraded to search-entry links");
                            return SearchOutcome::answered(name, jobs, attempts);
                        }
                    }
                    Err(err) => {
                        warn!(provider = name, %err, "search-entry fallback failed");
                        attempts.push(ProviderAttempt {
                            provider: name.to_string(),
                            accepted: 0,
                            error: Some(err.to_string()),
                        });
                    }
                }
            }
        }

        warn!(tried = attempts.len(), "no provider produced an actionable job");
        SearchOutcome::exhausted(attempts)
    }

    async fn call(
        &self,
        provider: &dyn JobProvider,
        query: &SearchQuery,
    ) -> Result<Vec<RawJob>, ProviderError> {
        match timeout(self.provider_timeout, provider.search(query)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.provider_timeout)),
        }
    }
}

impl fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("providers", &self.provider_names())
            .field("fallback", &self.fallback.as_ref().map(|provider| provider.name()))
            .field("provider_timeout", &self.provider_timeout)
            .field("max_limit", &self.max_limit)
            .field("allow_entry_fallback", &self.allow_entry_fallback)
            .finish()
    }
}

/// Maps a configured provider name onto its implementation.
pub fn build_provider(
    name: &str,
    config: &SearchSection,
    client: &Client,
    cache: &Arc<CacheProvider>,
) -> Option<Arc<dyn JobProvider>> {
    let sites = config.job_sites.clone();
    let retry = RetryPolicy::new(config.retry.clone());
    let provider: Arc<dyn JobProvider> = match name.trim().to_ascii_lowercase().as_str() {
        "cache" => Arc::clone(cache) as Arc<dyn JobProvider>,
        "enterprise_api" | "enterprise" => Arc::new(EnterpriseApiProvider::new(
            client.clone(),
            config.enterprise.clone(),
        )),
        "bing_html" | "bing" => Arc::new(BingHtmlProvider::new(client.clone(), sites)),
        "duckduckgo" | "ddg" => Arc::new(DuckDuckGoProvider::new(client.clone(), sites)),
        "browser_relay" | "openclaw" => {
            Arc::new(BrowserRelayProvider::new(config.relay.clone(), sites))
        }
        "jooble" => Arc::new(JoobleProvider::new(
            client.clone(),
            config.keys.jooble.clone(),
            retry,
        )),
        "brave" => Arc::new(BraveSearchProvider::new(
            client.clone(),
            config.keys.brave.clone(),
            sites,
            retry,
        )),
        "remotive" => Arc::new(RemotiveProvider::new(client.clone())),
        "cn_portal" => Arc::new(PortalEntryProvider::new()),
        _ => return None,
    };
    Some(provider)
}
