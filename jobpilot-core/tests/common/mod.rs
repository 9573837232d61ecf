#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::future::pending;
use std::rc::Rc;

use async_trait::async_trait;
use jobpilot_core::browser::{
    BoundingBox, BrowserError, BrowserPage, BrowserResult, PageLauncher, SessionKey, ViewportSpec,
};
use jobpilot_core::model::{JobPosting, PostingKind};
use jobpilot_core::session::StoredCookie;
use serde_json::Value;

/// What a fake page shows: which selectors and texts exist and what scripts
/// evaluate to.
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    pub existing: HashSet<String>,
    pub clickable_texts: HashSet<String>,
    pub labels: HashMap<String, String>,
    pub body_text: String,
    pub cards: Value,
    /// Navigating to a key lands on its value instead.
    pub redirects: HashMap<String, String>,
}

impl PageScript {
    pub fn with_selectors(mut self, selectors: &[&str]) -> Self {
        self.existing.extend(selectors.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_texts(mut self, texts: &[&str]) -> Self {
        self.clickable_texts.extend(texts.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }
}

#[derive(Debug, Default)]
pub struct PageLog {
    pub launches: usize,
    pub closes: usize,
    /// Pages dropped without `close`.
    pub abandoned: usize,
    pub visited: Vec<String>,
    pub clicks: Vec<String>,
    pub typed: HashMap<String, String>,
    pub mouse_moves: usize,
}

pub type SharedLog = Rc<RefCell<PageLog>>;

pub struct FakePage {
    script: PageScript,
    url: String,
    log: SharedLog,
    closed: bool,
}

impl FakePage {
    pub fn new(script: PageScript, log: SharedLog) -> Self {
        Self {
            script,
            url: "about:blank".to_string(),
            log,
            closed: false,
        }
    }
}

impl Drop for FakePage {
    fn drop(&mut self) {
        if !self.closed {
            self.log.borrow_mut().abandoned += 1;
        }
    }
}

#[async_trait(?Send)]
impl BrowserPage for FakePage {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        self.log.borrow_mut().visited.push(url.to_string());
        self.url = self
            .script
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn current_url(&mut self) -> BrowserResult<String> {
        Ok(self.url.clone())
    }

    async fn exists(&mut self, selector: &str) -> BrowserResult<bool> {
        Ok(self.script.existing.contains(selector))
    }

    async fn bounding_box(&mut self, selector: &str) -> BrowserResult<Option<BoundingBox>> {
        Ok(self.script.existing.contains(selector).then_some(BoundingBox {
            x: 100.0,
            y: 200.0,
            width: 80.0,
            height: 30.0,
        }))
    }

    async fn click(&mut self, selector: &str) -> BrowserResult<()> {
        if !self.script.existing.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        self.log.borrow_mut().clicks.push(selector.to_string());
        Ok(())
    }

    async fn click_text(&mut self, text: &str) -> BrowserResult<bool> {
        let found = self.script.clickable_texts.contains(text);
        if found {
            self.log.borrow_mut().clicks.push(text.to_string());
        }
        Ok(found)
    }

    async fn type_char(&mut self, selector: &str, ch: char) -> BrowserResult<()> {
        self.log
            .borrow_mut()
            .typed
            .entry(selector.to_string())
            .or_default()
            .push(ch);
        Ok(())
    }

    async fn press_enter(&mut self, _selector: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn text_of(&mut self, selector: &str) -> BrowserResult<Option<String>> {
        Ok(self.script.labels.get(selector).cloned())
    }

    async fn evaluate(&mut self, script: &str) -> BrowserResult<Value> {
        if script.starts_with("document.body") {
            Ok(Value::String(self.script.body_text.clone()))
        } else {
            Ok(self.script.cards.clone())
        }
    }

    async fn mouse_move(&mut self, _x: f64, _y: f64) -> BrowserResult<()> {
        self.log.borrow_mut().mouse_moves += 1;
        Ok(())
    }

    async fn mouse_down(&mut self, _x: f64, _y: f64) -> BrowserResult<()> {
        Ok(())
    }

    async fn mouse_up(&mut self, _x: f64, _y: f64) -> BrowserResult<()> {
        Ok(())
    }

    async fn scroll_by(&mut self, _delta_y: f64) -> BrowserResult<()> {
        Ok(())
    }

    async fn cookies(&mut self) -> BrowserResult<Vec<StoredCookie>> {
        Ok(vec![StoredCookie::new("sid", "fake-session")])
    }

    async fn set_cookies(&mut self, _url: &str, _cookies: &[StoredCookie]) -> BrowserResult<()> {
        Ok(())
    }

    fn user_agent(&self) -> &str {
        "FakeAgent/1.0"
    }

    fn viewport(&self) -> ViewportSpec {
        ViewportSpec {
            width: 1366,
            height: 768,
        }
    }

    async fn close(&mut self) -> BrowserResult<()> {
        self.closed = true;
        self.log.borrow_mut().closes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchBehavior {
    Succeed,
    Fail,
    Hang,
}

/// Hands out fake pages that all write to one shared log.
pub struct FakeLauncher {
    script: PageScript,
    behavior: LaunchBehavior,
    log: SharedLog,
}

impl FakeLauncher {
    pub fn new(script: PageScript, behavior: LaunchBehavior) -> (Self, SharedLog) {
        let log = SharedLog::default();
        (
            Self {
                script,
                behavior,
                log: Rc::clone(&log),
            },
            log,
        )
    }
}

#[async_trait(?Send)]
impl PageLauncher for FakeLauncher {
    async fn launch(&self, _key: &SessionKey) -> BrowserResult<Box<dyn BrowserPage>> {
        match self.behavior {
            LaunchBehavior::Succeed => {
                self.log.borrow_mut().launches += 1;
                Ok(Box::new(FakePage::new(self.script.clone(), Rc::clone(&self.log))))
            }
            LaunchBehavior::Fail => Err(BrowserError::Launch("no chromium in tests".into())),
            LaunchBehavior::Hang => pending().await,
        }
    }
}

pub fn posting(id: &str, company: &str, link: &str) -> JobPosting {
    JobPosting {
        id: id.to_string(),
        title: format!("Rust工程师 {id}"),
        company: company.to_string(),
        location: "上海".to_string(),
        salary: "20-40K".to_string(),
        platform: "Boss直聘".to_string(),
        provider: "test".to_string(),
        link: link.to_string(),
        updated_at: None,
        kind: PostingKind::RealPosting,
    }
}
