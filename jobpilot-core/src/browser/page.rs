use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::layout::Point;
use chromiumoxide::page::Page;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::session::StoredCookie;

use super::error::{BrowserError, BrowserResult};

const TEXT_TARGET_ATTR: &str = "data-jobpilot-target";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportSpec {
    pub width: u32,
    pub height: u32,
}

/// The page operations the appliers need. Implemented over a CDP page in
/// production and by scripted fakes in tests.
#[async_trait(?Send)]
pub trait BrowserPage {
    async fn goto(&mut self, url: &str) -> BrowserResult<()>;
    async fn current_url(&mut self) -> BrowserResult<String>;
    async fn exists(&mut self, selector: &str) -> BrowserResult<bool>;
    async fn bounding_box(&mut self, selector: &str) -> BrowserResult<Option<BoundingBox>>;
    async fn click(&mut self, selector: &str) -> BrowserResult<()>;
    /// Clicks the first visible button, link or span whose text contains
    /// `text`. Returns false when nothing matched.
    async fn click_text(&mut self, text: &str) -> BrowserResult<bool>;
    async fn type_char(&mut self, selector: &str, ch: char) -> BrowserResult<()>;
    async fn press_enter(&mut self, selector: &str) -> BrowserResult<()>;
    async fn text_of(&mut self, selector: &str) -> BrowserResult<Option<String>>;
    async fn evaluate(&mut self, script: &str) -> BrowserResult<Value>;
    async fn mouse_move(&mut self, x: f64, y: f64) -> BrowserResult<()>;
    async fn mouse_down(&mut self, x: f64, y: f64) -> BrowserResult<()>;
    async fn mouse_up(&mut self, x: f64, y: f64) -> BrowserResult<()>;
    async fn scroll_by(&mut self, delta_y: f64) -> BrowserResult<()>;
    async fn cookies(&mut self) -> BrowserResult<Vec<StoredCookie>>;
    /// Cookies without a domain are bound to `url`.
    async fn set_cookies(&mut self, url: &str, cookies: &[StoredCookie]) -> BrowserResult<()>;
    fn user_agent(&self) -> &str;
    fn viewport(&self) -> ViewportSpec;
    async fn close(&mut self) -> BrowserResult<()>;
}

/// One Chromium process with a single configured tab.
#[derive(Debug)]
pub struct ChromiumPage {
    browser: Browser,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    user_agent: String,
    viewport: ViewportSpec,
    closed: bool,
}

impl ChromiumPage {
    pub(crate) fn new(
        browser: Browser,
        page: Page,
        handler_task: JoinHandle<()>,
        user_agent: String,
        viewport: ViewportSpec,
    ) -> Self {
        Self {
            browser,
            page,
            handler_task: Some(handler_task),
            user_agent,
            viewport,
            closed: false,
        }
    }

    fn ensure_open(&self) -> BrowserResult<()> {
        if self.closed {
            Err(BrowserError::Closed)
        } else {
            Ok(())
        }
    }

    async fn dispatch_mouse(
        &self,
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
    ) -> BrowserResult<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.execute(params).await?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl BrowserPage for ChromiumPage {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn current_url(&mut self) -> BrowserResult<String> {
        self.ensure_open()?;
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn exists(&mut self, selector: &str) -> BrowserResult<bool> {
        self.ensure_open()?;
        Ok(self.page.find_element(selector).await.is_ok())
    }

    async fn bounding_box(&mut self, selector: &str) -> BrowserResult<Option<BoundingBox>> {
        self.ensure_open()?;
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(None);
        };
        let bbox = element.bounding_box().await?;
        Ok(Some(BoundingBox {
            x: bbox.x,
            y: bbox.y,
            width: bbox.width,
            height: bbox.height,
        }))
    }

    async fn click(&mut self, selector: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
        element.click().await?;
        Ok(())
    }

    async fn click_text(&mut self, text: &str) -> BrowserResult<bool> {
        self.ensure_open()?;
        let needle = serde_json::to_string(text)
            .map_err(|err| BrowserError::Script(err.to_string()))?;
        let script = format!(
            r#"(() => {{
                document.querySelectorAll('[{TEXT_TARGET_ATTR}]').forEach(el => el.removeAttribute('{TEXT_TARGET_ATTR}'));
                const needle = {needle};
                const nodes = Array.from(document.querySelectorAll('button, a, span, div[role="button"]'));
                const hit = nodes.find(el => el.offsetParent !== null && (el.innerText || '').trim().includes(needle));
                if (!hit) {{ return false; }}
                hit.setAttribute('{TEXT_TARGET_ATTR}', '1');
                return true;
            }})()"#
        );
        let tagged = self.evaluate(&script).await?.as_bool().unwrap_or(false);
        if !tagged {
            return Ok(false);
        }
        self.click(&format!("[{TEXT_TARGET_ATTR}=\"1\"]")).await?;
        Ok(true)
    }

    async fn type_char(&mut self, selector: &str, ch: char) -> BrowserResult<()> {
        self.ensure_open()?;
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
        element.type_str(ch.to_string()).await?;
        Ok(())
    }

    async fn press_enter(&mut self, selector: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
        element.press_key("Enter").await?;
        Ok(())
    }

    async fn text_of(&mut self, selector: &str) -> BrowserResult<Option<String>> {
        self.ensure_open()?;
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(None);
        };
        Ok(element.inner_text().await?.map(|text| text.trim().to_string()))
    }

    async fn evaluate(&mut self, script: &str) -> BrowserResult<Value> {
        self.ensure_open()?;
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn mouse_move(&mut self, x: f64, y: f64) -> BrowserResult<()> {
        self.ensure_open()?;
        self.page.move_mouse(Point::new(x, y)).await?;
        Ok(())
    }

    async fn mouse_down(&mut self, x: f64, y: f64) -> BrowserResult<()> {
        self.ensure_open()?;
        self.dispatch_mouse(DispatchMouseEventType::MousePressed, x, y)
            .await
    }

    async fn mouse_up(&mut self, x: f64, y: f64) -> BrowserResult<()> {
        self.ensure_open()?;
        self.dispatch_mouse(DispatchMouseEventType::MouseReleased, x, y)
            .await
    }

    async fn scroll_by(&mut self, delta_y: f64) -> BrowserResult<()> {
        self.evaluate(&format!(
            "window.scrollBy({{ top: {delta_y}, behavior: 'smooth' }})"
        ))
        .await?;
        Ok(())
    }

    async fn cookies(&mut self) -> BrowserResult<Vec<StoredCookie>> {
        self.ensure_open()?;
        Ok(self
            .page
            .get_cookies()
            .await?
            .into_iter()
            .map(|cookie| StoredCookie {
                name: cookie.name,
                value: cookie.value,
                domain: Some(cookie.domain),
                path: Some(cookie.path),
                secure: cookie.secure,
                http_only: cookie.http_only,
            })
            .collect())
    }

    async fn set_cookies(&mut self, url: &str, cookies: &[StoredCookie]) -> BrowserResult<()> {
        self.ensure_open()?;
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .secure(cookie.secure)
                .http_only(cookie.http_only);
            builder = match &cookie.domain {
                Some(domain) => builder.domain(domain.clone()),
                None => builder.url(url),
            };
            if let Some(path) = &cookie.path {
                builder = builder.path(path.clone());
            }
            params.push(builder.build().map_err(BrowserError::Configuration)?);
        }
        if !params.is_empty() {
            self.page.set_cookies(params).await?;
        }
        Ok(())
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn viewport(&self) -> ViewportSpec {
        self.viewport
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("closing chromium session");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "browser handler join error");
            }
        }
        Ok(())
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        if !self.closed {
            warn!("chromium page dropped without close");
            if let Some(handle) = self.handler_task.take() {
                handle.abort();
            }
        }
    }
}
