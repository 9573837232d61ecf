use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserError, BrowserPage, BrowserResult};
use crate::model::{JobPosting, PostingKind};
use crate::search::stable_hash;
use crate::session::{SessionError, SessionStore, StoredSession};

use super::{ApplyResult, Platform};

/// CSS selectors for one result card and its fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CardSelectors {
    pub card: &'static str,
    pub title: &'static str,
    pub company: &'static str,
    pub salary: Option<&'static str>,
    pub location: Option<&'static str>,
    pub link: Option<&'static str>,
    pub id_attr: Option<&'static str>,
    pub max: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct CardRow {
    pub title: String,
    pub company: String,
    pub salary: String,
    pub location: String,
    pub href: String,
    pub native_id: String,
}

const CARD_SCRIPT: &str = r#"(() => {
    const cfg = __CONFIG__;
    const cards = Array.from(document.querySelectorAll(cfg.card)).slice(0, cfg.max);
    return cards.map(card => {
        const text = sel => {
            if (!sel) { return ''; }
            const el = card.querySelector(sel);
            return el ? (el.innerText || '').trim() : '';
        };
        const anchor = cfg.link ? card.querySelector(cfg.link) : null;
        return {
            title: text(cfg.title),
            company: text(cfg.company),
            salary: text(cfg.salary),
            location: text(cfg.location),
            href: anchor ? (anchor.getAttribute('href') || '') : '',
            nativeId: cfg.idAttr ? (card.getAttribute(cfg.idAttr) || '') : ''
        };
    });
})()"#;

pub(crate) async fn collect_cards(
    page: &mut dyn BrowserPage,
    selectors: &CardSelectors,
) -> BrowserResult<Vec<CardRow>> {
    let config =
        serde_json::to_string(selectors).map_err(|err| BrowserError::Script(err.to_string()))?;
    let value = page
        .evaluate(&CARD_SCRIPT.replace("__CONFIG__", &config))
        .await?;
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value).map_err(|err| BrowserError::Script(err.to_string()))
}

/// Resolves `href` against `base` and builds a posting. Rows without a
/// title or an http(s) link are dropped.
pub(crate) fn posting_from_card(
    platform: Platform,
    row: CardRow,
    base: &str,
    fallback_location: &str,
) -> Option<JobPosting> {
    let title = row.title.trim();
    let href = row.href.trim();
    if title.is_empty() || href.is_empty() {
        return None;
    }
    let link = match Url::parse(base).and_then(|base| base.join(href)) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.to_string(),
        Ok(url) => {
            debug!(scheme = url.scheme(), "card link is not a web page, dropped");
            return None;
        }
        Err(err) => {
            debug!(href, error = %err, "card link unresolvable, dropped");
            return None;
        }
    };
    let location = if row.location.trim().is_empty() {
        fallback_location.to_string()
    } else {
        row.location.trim().to_string()
    };
    Some(JobPosting {
        id: format!("{}_{}", platform.as_str(), stable_hash(&link)),
        title: title.to_string(),
        company: row.company.trim().to_string(),
        location,
        salary: row.salary.trim().to_string(),
        platform: platform.display_name().to_string(),
        provider: platform.as_str().to_string(),
        link,
        updated_at: None,
        kind: PostingKind::RealPosting,
    })
}

pub(crate) async fn first_existing(
    page: &mut dyn BrowserPage,
    selectors: &[&'static str],
) -> BrowserResult<Option<&'static str>> {
    for selector in selectors {
        if page.exists(selector).await? {
            return Ok(Some(selector));
        }
    }
    Ok(None)
}

/// The first of `texts` present in the visible page text.
pub(crate) async fn visible_text(
    page: &mut dyn BrowserPage,
    texts: &[&'static str],
) -> BrowserResult<Option<&'static str>> {
    let body = page
        .evaluate("document.body ? document.body.innerText : ''")
        .await?;
    let body = body.as_str().unwrap_or_default();
    Ok(texts.iter().copied().find(|text| body.contains(text)))
}

/// Restores a saved session and checks it is still signed in. A session the
/// site no longer honours, or one that no longer parses, is cleared.
pub(crate) async fn restore_session(
    page: &mut dyn BrowserPage,
    store: &SessionStore,
    platform: Platform,
    user_id: &str,
    base_url: &str,
    is_signed_in: fn(&str) -> bool,
    login_hints: &[&'static str],
) -> ApplyResult<bool> {
    let saved = match store.load(platform.as_str(), user_id).await {
        Ok(Some(saved)) => saved,
        Ok(None) => return Ok(false),
        Err(err @ SessionError::Corrupt { .. }) => {
            warn!(%platform, error = %err, "saved session unreadable, clearing");
            store.clear(platform.as_str(), user_id).await?;
            return Ok(false);
        }
        Err(err) => return Err(err.into()),
    };
    page.set_cookies(base_url, &saved.cookies).await?;
    page.goto(base_url).await?;
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let url = page.current_url().await?;
    let hint = if is_signed_in(&url) {
        visible_text(page, login_hints).await?
    } else {
        Some("login redirect")
    };
    match hint {
        None => {
            info!(%platform, "saved session still valid");
            Ok(true)
        }
        Some(reason) => {
            warn!(%platform, reason, "saved session rejected by site, clearing");
            store.clear(platform.as_str(), user_id).await?;
            Ok(false)
        }
    }
}

pub(crate) async fn persist_session(
    page: &mut dyn BrowserPage,
    store: &SessionStore,
    platform: Platform,
    user_id: &str,
) -> ApplyResult<()> {
    let cookies = page.cookies().await?;
    debug!(%platform, cookies = cookies.len(), "saving session");
    let session = StoredSession::new(platform.as_str(), user_id, cookies, page.user_agent());
    store.save(&session).await?;
    Ok(())
}

pub(crate) fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(href: &str) -> CardRow {
        CardRow {
            title: " Rust 工程师 ".into(),
            company: "Acme".into(),
            salary: "20-30K".into(),
            href: href.into(),
            ..CardRow::default()
        }
    }

    #[test]
    fn relative_card_links_resolve_against_base() {
        let posting =
            posting_from_card(Platform::Boss, row("/job_detail/abc.html"), "https://www.zhipin.com", "上海")
                .unwrap();
        assert_eq!(posting.link, "https://www.zhipin.com/job_detail/abc.html");
        assert_eq!(posting.title, "Rust 工程师");
        assert_eq!(posting.location, "上海");
        assert_eq!(posting.platform, "Boss直聘");
        assert!(posting.id.starts_with("boss_"));

        let posting =
            posting_from_card(Platform::Zhilian, row("//jobs.zhaopin.com/1.htm"), "https://www.zhaopin.com", "")
                .unwrap();
        assert_eq!(posting.link, "https://jobs.zhaopin.com/1.htm");
    }

    #[test]
    fn script_and_anchor_links_are_dropped() {
        let base = "https://www.zhipin.com";
        assert!(posting_from_card(Platform::Boss, row("javascript:;"), base, "").is_none());
        assert!(posting_from_card(Platform::Boss, row("mailto:hr@example.com"), base, "").is_none());

        let posting =
            posting_from_card(Platform::Boss, row("job_detail/x.html?ka=search"), base, "").unwrap();
        assert_eq!(posting.link, "https://www.zhipin.com/job_detail/x.html?ka=search");
    }

    #[test]
    fn cards_without_link_or_title_are_dropped() {
        assert!(posting_from_card(Platform::Boss, row(""), "https://www.zhipin.com", "").is_none());
        let mut untitled = row("/job_detail/1.html");
        untitled.title = "  ".into();
        assert!(posting_from_card(Platform::Boss, untitled, "https://www.zhipin.com", "").is_none());
    }

    #[test]
    fn card_config_serializes_camel_case() {
        let selectors = CardSelectors {
            card: ".job-card-wrapper",
            title: ".job-name",
            company: ".company-name",
            salary: Some(".salary"),
            location: None,
            link: Some("a.job-card-left"),
            id_attr: None,
            max: 30,
        };
        let json = serde_json::to_value(&selectors).unwrap();
        assert_eq!(json["idAttr"], serde_json::Value::Null);
        assert_eq!(json["link"], "a.job-card-left");
    }
}
