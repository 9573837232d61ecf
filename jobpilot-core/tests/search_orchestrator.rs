use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobpilot_core::search::providers::PortalEntryProvider;
use jobpilot_core::search::{
    JobProvider, ProviderError, ProviderResult, ProviderTier, RawJob, SearchOrchestrator,
    SearchQuery,
};

enum Behavior {
    Rows(Vec<RawJob>),
    Fail,
    Stall,
}

struct ScriptedProvider {
    name: &'static str,
    tier: ProviderTier,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    fn new(name: &'static str, behavior: Behavior) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(Self {
            name,
            tier: ProviderTier::RealPostings,
            behavior,
            calls: Arc::clone(&calls),
        });
        (provider, calls)
    }

    fn entries(name: &'static str, behavior: Behavior) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(Self {
            name,
            tier: ProviderTier::SearchEntries,
            behavior,
            calls: Arc::clone(&calls),
        });
        (provider, calls)
    }
}

#[async_trait]
impl JobProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn tier(&self) -> ProviderTier {
        self.tier
    }

    async fn search(&self, _query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Rows(rows) => Ok(rows.clone()),
            Behavior::Fail => Err(ProviderError::Unavailable("connection refused".into())),
            Behavior::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

fn raw(link: &str, title: &str) -> RawJob {
    RawJob {
        title: title.to_string(),
        company: "星河科技".to_string(),
        location: "北京".to_string(),
        provider: "scraperA".to_string(),
        link: link.to_string(),
        ..Default::default()
    }
}

fn query() -> SearchQuery {
    SearchQuery::new(vec!["Rust".into()], Some("北京".into()), 10)
}

#[tokio::test]
async fn first_provider_with_real_postings_answers() {
    let (cache, cache_calls) = ScriptedProvider::new("cache", Behavior::Rows(Vec::new()));
    let (enterprise, enterprise_calls) = ScriptedProvider::new("enterprise_api", Behavior::Fail);
    let (scraper, scraper_calls) = ScriptedProvider::new(
        "scraperA",
        Behavior::Rows(vec![
            raw("https://www.zhipin.com/job_detail/a1.html", "Rust后端"),
            raw("https://www.liepin.com/job/1960.shtml", "Rust平台工程师"),
        ]),
    );
    let (later, later_calls) = ScriptedProvider::new(
        "jooble",
        Behavior::Rows(vec![raw("https://jooble.org/desc/1", "Rust")]),
    );
    let (entries, entry_calls) = ScriptedProvider::entries(
        "cn_portal",
        Behavior::Rows(vec![raw("https://www.zhipin.com/web/geek/job?query=Rust", "Rust - Boss直聘搜索入口")]),
    );

    let orchestrator = SearchOrchestrator::new(
        vec![cache, enterprise, scraper, later, entries],
        Duration::from_secs(5),
    );
    let outcome = orchestrator.search_query(&query(), true).await;

    assert_eq!(outcome.provider_mode, "scraperA");
    assert_eq!(outcome.jobs.len(), 2);
    assert!(outcome.has_actionable_jobs);
    assert!(outcome.jobs.iter().all(|job| job.link.starts_with("https://")));
    assert_eq!(cache_calls.load(Ordering::SeqCst), 1);
    assert_eq!(enterprise_calls.load(Ordering::SeqCst), 1);
    assert_eq!(scraper_calls.load(Ordering::SeqCst), 1);
    assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    assert_eq!(entry_calls.load(Ordering::SeqCst), 0);

    let failed = outcome
        .attempts
        .iter()
        .find(|attempt| attempt.provider == "enterprise_api")
        .unwrap();
    assert!(failed.error.is_some());
}

#[tokio::test]
async fn search_entry_rows_from_live_providers_do_not_count() {
    let (scraper, _) = ScriptedProvider::new(
        "bing_html",
        Behavior::Rows(vec![raw("https://sou.zhaopin.com/?kw=Rust&jl=530", "Rust招聘")]),
    );
    let orchestrator =
        SearchOrchestrator::new(vec![scraper], Duration::from_secs(5)).allow_entry_fallback(false);
    let outcome = orchestrator.search_query(&query(), true).await;
    assert_eq!(outcome.provider_mode, "no_real_jobs");
    assert!(outcome.jobs.is_empty());
    assert!(!outcome.has_actionable_jobs);
}

#[tokio::test]
async fn degrades_to_portal_entries_only_when_allowed() {
    let (failing, _) = ScriptedProvider::new("enterprise_api", Behavior::Fail);
    let orchestrator = SearchOrchestrator::new(vec![failing], Duration::from_secs(5))
        .with_fallback(Arc::new(PortalEntryProvider::new()));

    let outcome = orchestrator.search_query(&query(), true).await;
    assert_eq!(outcome.provider_mode, "cn_portal");
    assert!(!outcome.jobs.is_empty());
    assert!(outcome.jobs.len() <= 5);
    assert!(!outcome.has_actionable_jobs);

    let outcome = orchestrator.search_query(&query(), false).await;
    assert_eq!(outcome.provider_mode, "no_real_jobs");
    assert!(outcome.jobs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_provider_times_out_and_search_continues() {
    let (stalled, _) = ScriptedProvider::new("browser_relay", Behavior::Stall);
    let (scraper, _) = ScriptedProvider::new(
        "duckduckgo",
        Behavior::Rows(vec![raw("https://www.zhipin.com/job_detail/z9.html", "Rust")]),
    );
    let orchestrator = SearchOrchestrator::new(vec![stalled, scraper], Duration::from_secs(2));
    let outcome = orchestrator.search_query(&query(), false).await;
    assert_eq!(outcome.provider_mode, "duckduckgo");
    assert!(outcome.attempts[0]
        .error
        .as_deref()
        .is_some_and(|error| error.contains("timed out")));
}

#[tokio::test]
async fn duplicate_links_collapse_and_limit_is_clamped() {
    let rows = (0..80)
        .map(|i| raw(&format!("https://www.zhipin.com/job_detail/{}.html", i % 60), "Rust"))
        .collect();
    let (scraper, _) = ScriptedProvider::new("bing_html", Behavior::Rows(rows));
    let orchestrator =
        SearchOrchestrator::new(vec![scraper], Duration::from_secs(5)).with_max_limit(50);
    let outcome = orchestrator.search(&["Rust".to_string()], None, 500).await;
    assert_eq!(outcome.jobs.len(), 50);
    let links: HashSet<_> = outcome.jobs.iter().map(|job| job.link.as_str()).collect();
    assert_eq!(links.len(), 50);
}
