use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::form_urlencoded::byte_serialize;

use crate::config::RelaySection;
use crate::search::normalizer::{stable_hash, RawJob};
use crate::search::platform::{is_board_link, is_search_entry_link};

use super::{JobProvider, ProviderError, ProviderResult, SearchQuery};

const ANCHOR_SCRIPT: &str = "() => Array.from(document.querySelectorAll('a[href]')).map(a => ({\
href: a.href, text: (a.innerText || a.textContent || '').trim()\
})).filter(x => x.href && x.text && x.text.length >= 2).slice(0, 800)";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<CommandOutput>;
}

pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Drives the user's own attached browser tab through an external CLI and
/// collects job-detail anchors from each board's search page.
pub struct BrowserRelayProvider {
    binary: PathBuf,
    profile: String,
    timeout: Duration,
    settle_ms: u64,
    sites: Vec<String>,
    executor: Arc<dyn CommandExecutor>,
}

impl BrowserRelayProvider {
    pub fn new(config: RelaySection, sites: Vec<String>) -> Self {
        Self {
            binary: PathBuf::from(config.binary),
            profile: config.profile,
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
            settle_ms: config.settle_ms,
            sites,
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    async fn relay(&self, args: &[&str], json: bool) -> ProviderResult<CommandOutput> {
        let mut full = vec![
            "browser".to_string(),
            "--browser-profile".to_string(),
            self.profile.clone(),
        ];
        if json {
            full.push("--json".to_string());
        }
        full.extend(args.iter().map(|arg| arg.to_string()));
        match timeout(self.timeout, self.executor.run(&self.binary, &full)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(ProviderError::Unavailable(format!(
                "failed to run {}: {err}",
                self.binary.display()
            ))),
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        }
    }

    async fn ensure_attached(&self) -> ProviderResult<()> {
        let output = self.relay(&["evaluate", "--fn", "(() => 1)"], true).await?;
        if output.success {
            return Ok(());
        }
        let message = output.combined();
        if message.to_lowercase().contains("no tab is connected") {
            return Err(ProviderError::Unavailable(
                "relay browser is running but no tab is attached".to_string(),
            ));
        }
        Err(ProviderError::Unavailable(truncate(message.trim(), 300)))
    }

    async fn collect(&self, url: &str, per_site: usize) -> ProviderResult<Vec<(String, String)>> {
        let navigated = self.relay(&["navigate", url], false).await?;
        if !navigated.success {
            return Err(ProviderError::Unavailable(format!(
                "navigate failed: {}",
                truncate(navigated.combined().trim(), 300)
            )));
        }
        let settle = self.settle_ms.to_string();
        if let Err(err) = self
            .relay(&["wait", "--load", "domcontentloaded", "--timeout-ms", "20000"], false)
            .await
        {
            debug!(%err, "relay load wait did not finish");
        }
        if let Err(err) = self.relay(&["wait", "--time", &settle], false).await {
            debug!(%err, "relay settle wait did not finish");
        }
        let evaluated = self.relay(&["evaluate", "--fn", ANCHOR_SCRIPT], true).await?;
        if !evaluated.success {
            return Err(ProviderError::Unavailable(format!(
                "reading anchors failed: {}",
                truncate(evaluated.combined().trim(), 300)
            )));
        }
        let data = extract_json(&evaluated.combined())
            .ok_or_else(|| ProviderError::Parse("no JSON in relay output".to_string()))?;
        Ok(self.anchors(&data, per_site))
    }

    fn anchors(&self, data: &Value, per_site: usize) -> Vec<(String, String)> {
        let items: &[Value] = match data {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) => match map.get("value").or_else(|| map.get("result")) {
                Some(Value::Array(items)) => items.as_slice(),
                _ => &[],
            },
            _ => &[],
        };
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for item in items {
            if out.len() >= per_site {
                break;
            }
            let href = item.get("href").and_then(Value::as_str).unwrap_or("").trim();
            let text = item.get("text").and_then(Value::as_str).unwrap_or("").trim();
            if href.is_empty() || text.is_empty() || !seen.insert(href.to_string()) {
                continue;
            }
            if !is_board_link(href, &self.sites) || is_search_entry_link(href) {
                continue;
            }
            out.push((text.to_string(), href.to_string()));
        }
        out
    }
}

impl fmt::Debug for BrowserRelayProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserRelayProvider")
            .field("binary", &self.binary)
            .field("profile", &self.profile)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Board search pages the relay walks, with the board's display name.
fn board_urls(query: &SearchQuery) -> Vec<(&'static str, String)> {
    let text = format!("{} {}", query.joined(5, "招聘"), query.location_or_empty());
    let q: String = byte_serialize(text.trim().as_bytes()).collect();
    vec![
        ("Boss直聘", format!("https://www.zhipin.com/web/geek/job?query={q}")),
        ("猎聘", format!("https://www.liepin.com/zhaopin/?key={q}")),
        ("智联招聘", format!("https://sou.zhaopin.com/?kw={q}")),
        ("前程无忧", format!("https://we.51job.com/pc/search?keyword={q}")),
    ]
}

/// The relay prints log noise around its JSON; take the first value that
/// parses from any `{` or `[`.
pub(crate) fn extract_json(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .find_map(|(index, _)| {
            serde_json::Deserializer::from_str(&text[index..])
                .into_iter::<Value>()
                .next()
                .and_then(Result::ok)
        })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[async_trait]
impl JobProvider for BrowserRelayProvider {
    fn name(&self) -> &'static str {
        "browser_relay"
    }

    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        self.ensure_attached().await?;
        let limit = query.limit.clamp(1, 50);
        let boards = board_urls(query);
        let per_site = (limit / boards.len()).clamp(3, 15);

        let mut rows = Vec::new();
        for (platform, url) in boards {
            let pairs = match self.collect(&url, per_site).await {
                Ok(pairs) => pairs,
                Err(err @ ProviderError::Timeout(_)) => return Err(err),
                Err(err) => {
                    warn!(platform, %err, "relay board scan failed");
                    continue;
                }
            };
            for (title, link) in pairs {
                rows.push(RawJob {
                    id: format!("browser_relay_{}", stable_hash(&link)),
                    title,
                    location: query.location_or_empty().to_string(),
                    platform: platform.to_string(),
                    provider: "browser_relay".to_string(),
                    link,
                    ..Default::default()
                });
                if rows.len() >= limit {
                    return Ok(rows);
                }
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    type RecordedCalls = Arc<Mutex<Vec<Vec<String>>>>;

    struct ScriptedExecutor {
        calls: RecordedCalls,
        anchors: String,
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn run(&self, _program: &Path, args: &[String]) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            let is_anchor_read = args.iter().any(|arg| arg.contains("querySelectorAll"));
            Ok(CommandOutput {
                success: true,
                stdout: if is_anchor_read {
                    self.anchors.clone()
                } else {
                    "{\"ok\":true}".to_string()
                },
                stderr: String::new(),
            })
        }
    }

    fn provider(anchors: Value) -> (BrowserRelayProvider, RecordedCalls) {
        let calls: RecordedCalls = Arc::default();
        let executor = ScriptedExecutor {
            calls: Arc::clone(&calls),
            anchors: format!("[plugins] loaded 3\n{}\nwarning: slow tab", json!({ "value": anchors })),
        };
        let provider = BrowserRelayProvider::new(
            RelaySection::default(),
            vec!["zhipin.com".into(), "liepin.com".into()],
        )
        .with_executor(Arc::new(executor));
        (provider, calls)
    }

    #[test]
    fn extracts_json_from_noisy_output() {
        let value = extract_json("log line {not json\n{\"value\":[1,2]} trailing").unwrap();
        assert_eq!(value, json!({ "value": [1, 2] }));
        assert!(extract_json("nothing here").is_none());
    }

    #[tokio::test]
    async fn keeps_detail_links_on_configured_boards() {
        let (provider, calls) = provider(json!([
            { "href": "https://www.zhipin.com/job_detail/abc.html", "text": "Rust工程师" },
            { "href": "https://www.zhipin.com/web/geek/job?query=Rust", "text": "更多职位" },
            { "href": "https://example.com/a", "text": "广告" },
            { "href": "https://www.zhipin.com/job_detail/abc.html", "text": "dup" }
        ]));
        let query = SearchQuery::new(vec!["Rust".into()], None, 10);
        let rows = provider.search(&query).await.unwrap();

        assert!(!rows.is_empty());
        assert!(rows
            .iter()
            .all(|row| row.link == "https://www.zhipin.com/job_detail/abc.html"));
        assert_eq!(rows[0].provider, "browser_relay");

        let calls = calls.lock().unwrap();
        assert_eq!(&calls[0][..4], ["browser", "--browser-profile", "chrome", "--json"]);
        assert!(calls.iter().any(|call| call.contains(&"navigate".to_string())));
    }

    #[tokio::test]
    async fn detached_tab_is_unavailable() {
        struct Detached;

        #[async_trait]
        impl CommandExecutor for Detached {
            async fn run(&self, _: &Path, _: &[String]) -> std::io::Result<CommandOutput> {
                Ok(CommandOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: "Error: no tab is connected".to_string(),
                })
            }
        }

        let provider = BrowserRelayProvider::new(RelaySection::default(), vec!["zhipin.com".into()])
            .with_executor(Arc::new(Detached));
        let query = SearchQuery::new(vec!["Rust".into()], None, 10);
        let err = provider.search(&query).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(message) if message.contains("no tab")));
    }
}
