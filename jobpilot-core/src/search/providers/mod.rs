mod bing;
mod brave;
mod cache;
mod duckduckgo;
mod enterprise;
mod jooble;
mod portal;
mod relay;
mod remotive;

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;

use super::normalizer::RawJob;
use super::platform::{infer_company_from_title, is_board_link, platform_from_link};

pub use bing::BingHtmlProvider;
pub use brave::BraveSearchProvider;
pub use cache::CacheProvider;
pub use duckduckgo::DuckDuckGoProvider;
pub use enterprise::EnterpriseApiProvider;
pub use jooble::JoobleProvider;
pub use portal::PortalEntryProvider;
pub use relay::{BrowserRelayProvider, CommandExecutor, CommandOutput, SystemCommandExecutor};
pub use remotive::RemotiveProvider;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("blocked by anti-bot check: {0}")]
    Blocked(String),
    #[error("missing credentials for {0}")]
    MissingCredentials(&'static str),
    #[error("rate limited (status {status})")]
    RateLimited { status: u16 },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected payload: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Unavailable(format!("request timed out: {err}"))
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

/// Maps an HTTP status onto the provider taxonomy. `None` means success.
pub(crate) fn classify_status(status: reqwest::StatusCode) -> Option<ProviderError> {
    if status.as_u16() == 429 {
        Some(ProviderError::RateLimited {
            status: status.as_u16(),
        })
    } else if status.is_client_error() || status.is_server_error() {
        Some(ProviderError::Unavailable(format!("http status {status}")))
    } else {
        None
    }
}

/// One search request as providers see it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub keywords: Vec<String>,
    pub location: Option<String>,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(keywords: Vec<String>, location: Option<String>, limit: usize) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        let location = location
            .map(|location| location.trim().to_string())
            .filter(|location| !location.is_empty());
        Self {
            keywords,
            location,
            limit,
        }
    }

    /// First `n` keywords joined by a space, or `fallback` when there are none.
    pub fn joined(&self, n: usize, fallback: &str) -> String {
        let joined = self
            .keywords
            .iter()
            .take(n)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            fallback.to_string()
        } else {
            joined
        }
    }

    pub fn location_or_empty(&self) -> &str {
        self.location.as_deref().unwrap_or("")
    }
}

/// Where a provider sits in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTier {
    /// Yields job-detail pages; the orchestrator stops at the first hit.
    RealPostings,
    /// Yields board search pages; consulted only when degrading is allowed.
    SearchEntries,
}

#[async_trait]
pub trait JobProvider: Send + Sync {
    /// Stable tag reported as `providerMode` when this provider answers.
    fn name(&self) -> &'static str;

    fn tier(&self) -> ProviderTier {
        ProviderTier::RealPostings
    }

    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<RawJob>>;
}

/// Query string used by the scraping providers: keywords, location, and a
/// `site:` clause per board.
pub(crate) fn site_restricted_query(query: &SearchQuery, sites: &[String]) -> String {
    let mut parts: Vec<String> = query.keywords.clone();
    if let Some(location) = &query.location {
        parts.push(location.clone());
    }
    parts.push("招聘 职位".to_string());
    let clause = sites
        .iter()
        .map(|site| format!("site:{site}"))
        .collect::<Vec<_>>()
        .join(" OR ");
    if !clause.is_empty() {
        parts.push(clause);
    }
    parts.join(" ")
}

/// Pulls `(href, text)` pairs for `selector` out of a result page and keeps
/// the ones that land on a configured board, first-seen order, up to `limit`.
pub(crate) fn anchors_to_rows<F>(
    html: &str,
    selector: &str,
    sites: &[String],
    query: &SearchQuery,
    provider: &str,
    resolve_href: F,
) -> ProviderResult<Vec<RawJob>>
where
    F: Fn(&str) -> Option<String>,
{
    let selector = Selector::parse(selector)
        .map_err(|err| ProviderError::Parse(format!("bad selector {selector}: {err}")))?;
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for anchor in document.select(&selector) {
        let Some(link) = anchor.value().attr("href").and_then(&resolve_href) else {
            continue;
        };
        if !(link.starts_with("http://") || link.starts_with("https://")) {
            continue;
        }
        if !is_board_link(&link, sites) || !seen.insert(link.to_lowercase()) {
            continue;
        }
        let title = anchor
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        rows.push(RawJob {
            company: infer_company_from_title(&title),
            platform: platform_from_link(&link),
            title,
            location: query.location_or_empty().to_string(),
            provider: provider.to_string(),
            link,
            ..Default::default()
        });
        if rows.len() >= query.limit.max(1) {
            break;
        }
    }
    Ok(rows)
}

/// Heuristic for interstitial challenge pages served instead of results.
pub(crate) fn looks_blocked(html: &str) -> bool {
    let lowered = html.to_lowercase();
    ["captcha", "anomaly-modal", "unusual traffic", "安全验证", "请输入验证码"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_trims_and_joins() {
        let query = SearchQuery::new(
            vec![" Rust ".into(), "".into(), "Tokio".into()],
            Some("  ".into()),
            10,
        );
        assert_eq!(query.keywords, vec!["Rust", "Tokio"]);
        assert!(query.location.is_none());
        assert_eq!(query.joined(1, "Python"), "Rust");
        let empty = SearchQuery::new(vec![], None, 5);
        assert_eq!(empty.joined(3, "Python"), "Python");
    }

    #[test]
    fn site_clause_lists_boards() {
        let query = SearchQuery::new(vec!["Rust".into()], Some("上海".into()), 10);
        let text = site_restricted_query(&query, &["zhipin.com".into(), "lagou.com".into()]);
        assert_eq!(text, "Rust 上海 招聘 职位 site:zhipin.com OR site:lagou.com");
    }

    #[test]
    fn anchors_filtered_to_boards() {
        let html = r#"
            <ul>
              <li><a class="hit" href="https://www.zhipin.com/job_detail/1.html">Rust工程师 - 某某科技 - Boss直聘</a></li>
              <li><a class="hit" href="https://example.com/blog">Unrelated</a></li>
              <li><a class="hit" href="https://WWW.ZHIPIN.COM/job_detail/1.html">dup</a></li>
              <li><a class="hit" href="/relative">relative</a></li>
            </ul>"#;
        let query = SearchQuery::new(vec!["Rust".into()], Some("上海".into()), 10);
        let rows = anchors_to_rows(html, "a.hit", &["zhipin.com".into()], &query, "test", |href| {
            Some(href.to_string())
        })
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].company, "某某科技");
        assert_eq!(rows[0].platform, "Boss直聘");
        assert_eq!(rows[0].location, "上海");
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(reqwest::StatusCode::OK).is_none());
        assert!(matches!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            Some(ProviderError::RateLimited { status: 429 })
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::BAD_GATEWAY),
            Some(ProviderError::Unavailable(_))
        ));
    }
}
