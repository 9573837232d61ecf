use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::browser::{AntiDetectionEngine, BrowserPage};
use crate::config::ApplySection;
use crate::model::{ApplicationResult, JobPosting};
use crate::session::SessionStore;

use super::blacklist::JobFilter;
use super::flow::{
    collect_cards, encode, first_existing, persist_session, posting_from_card, restore_session,
    visible_text, CardSelectors,
};
use super::verification::{wait_for_code, VerificationCodeSource};
use super::{
    joined_keywords, ApplyError, ApplyResult, Credentials, LoginOutcome, Platform,
    PlatformApplier, SearchFilters,
};

const BASE_URL: &str = "https://www.zhipin.com";
const LOGIN_URL: &str = "https://login.zhipin.com/";
const JOBS_URL: &str = "https://www.zhipin.com/web/geek/job";

const PHONE_INPUTS: [&str; 4] = [
    r#"input[placeholder*="手机号"]"#,
    r#"input[placeholder*="手机号码"]"#,
    r#"input[name*="phone"]"#,
    r#"input[type="tel"]"#,
];
const CODE_INPUTS: [&str; 4] = [
    r#"input[placeholder*="验证码"]"#,
    r#"input[placeholder*="校验码"]"#,
    r#"input[name*="code"]"#,
    r#"input[maxlength="6"]"#,
];
const SUBMIT_BUTTONS: [&str; 2] = [".btn-sign-in", r#"button[type="submit"]"#];
const GREETING_INPUTS: [&str; 2] = ["textarea", r#"input[type="text"]"#];
const SLIDER_HANDLE: &str = ".geetest_slider_button";
const SLIDER_DISTANCE: f64 = 260.0;

const SEND_CODE_TEXTS: [&str; 2] = ["获取验证码", "发送验证码"];
const THROTTLE_TEXTS: [&str; 5] = [
    "操作过于频繁",
    "请稍后再试",
    "请求过于频繁",
    "短信发送失败",
    "请先完成验证",
];
const CODE_ERROR_TEXTS: [&str; 4] = ["验证码错误", "验证码无效", "验证失败", "请重新获取验证码"];
const LOGIN_HINTS: [&str; 2] = ["立即登录", "登录/注册"];

const CARDS: CardSelectors = CardSelectors {
    card: ".job-card-wrapper",
    title: ".job-name",
    company: ".company-name",
    salary: Some(".salary"),
    location: Some(".job-area"),
    link: Some("a.job-card-left"),
    id_attr: None,
    max: 60,
};

fn is_signed_in(url: &str) -> bool {
    url.starts_with(BASE_URL) && !url.contains("login.zhipin.com")
}

/// Boss直聘: SMS login, search by query and city, chat-based apply with a
/// typed greeting.
pub struct BossApplier {
    engine: AntiDetectionEngine,
    store: Arc<SessionStore>,
    codes: Arc<dyn VerificationCodeSource>,
    filter: JobFilter,
    greeting: String,
    verification_wait: Duration,
    login_timeout: Duration,
}

impl BossApplier {
    pub fn new(
        engine: AntiDetectionEngine,
        store: Arc<SessionStore>,
        codes: Arc<dyn VerificationCodeSource>,
        config: &ApplySection,
    ) -> Self {
        Self {
            engine,
            store,
            codes,
            filter: JobFilter::from_config(config),
            greeting: config.greeting.clone(),
            verification_wait: Duration::from_secs(config.verification_wait_seconds),
            login_timeout: Duration::from_secs(config.login_timeout_seconds),
        }
    }

    async fn run_login(
        &mut self,
        page: &mut dyn BrowserPage,
        credentials: &Credentials,
    ) -> ApplyResult<LoginOutcome> {
        if restore_session(
            page,
            &self.store,
            Platform::Boss,
            &credentials.user_id,
            BASE_URL,
            is_signed_in,
            &LOGIN_HINTS,
        )
        .await?
        {
            return Ok(LoginOutcome::confirmed(true));
        }

        let phone = credentials
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
            .ok_or(ApplyError::MissingCredentials("phone"))?;

        info!(platform = "boss", "opening login page");
        page.goto(LOGIN_URL).await?;
        self.engine.random_delay().await;
        if page.click_text("手机号登录").await? {
            self.engine.pause([500, 1000]).await;
        }

        let phone_input = first_existing(page, &PHONE_INPUTS)
            .await?
            .ok_or_else(|| ApplyError::StepNotFound("phone number input".into()))?;
        let typing = self.engine.config().typing_delay_ms;
        self.engine.type_text(page, phone_input, phone, typing).await?;
        self.engine.random_delay().await;

        self.solve_slider(page).await?;
        self.request_code(page).await?;
        self.solve_slider(page).await?;
        if let Some(tip) = visible_text(page, &THROTTLE_TEXTS).await? {
            warn!(platform = "boss", tip, "code request may not have been sent");
        }

        let code = wait_for_code(self.codes.as_ref(), "boss", phone, self.verification_wait).await?;
        self.submit_code(page, &code).await?;
        self.wait_until_signed_in(page).await?;

        persist_session(page, &self.store, Platform::Boss, &credentials.user_id).await?;
        info!(platform = "boss", "login confirmed");
        Ok(LoginOutcome::confirmed(false))
    }

    async fn solve_slider(&mut self, page: &mut dyn BrowserPage) -> ApplyResult<()> {
        if !page.exists(SLIDER_HANDLE).await? {
            return Ok(());
        }
        info!(platform = "boss", "slider challenge detected");
        self.engine
            .drag_slider(page, SLIDER_HANDLE, SLIDER_DISTANCE)
            .await?;
        self.engine.pause([1000, 2000]).await;
        Ok(())
    }

    async fn request_code(&mut self, page: &mut dyn BrowserPage) -> ApplyResult<()> {
        for text in SEND_CODE_TEXTS {
            if page.click_text(text).await? {
                self.engine.pause([800, 1500]).await;
                return Ok(());
            }
        }
        Err(ApplyError::StepNotFound("send code button".into()))
    }

    async fn submit_code(&mut self, page: &mut dyn BrowserPage, code: &str) -> ApplyResult<()> {
        let input = first_existing(page, &CODE_INPUTS)
            .await?
            .ok_or_else(|| ApplyError::StepNotFound("verification code input".into()))?;
        self.engine.type_text(page, input, code, [80, 180]).await?;
        self.engine.pause([600, 1200]).await;

        if let Some(button) = first_existing(page, &SUBMIT_BUTTONS).await? {
            page.click(button).await?;
        } else if !page.click_text("登录").await? {
            page.press_enter(input).await?;
        }
        Ok(())
    }

    async fn wait_until_signed_in(&mut self, page: &mut dyn BrowserPage) -> ApplyResult<()> {
        let deadline = Instant::now() + self.login_timeout;
        loop {
            let url = page.current_url().await?;
            if is_signed_in(&url) {
                return Ok(());
            }
            if let Some(tip) = visible_text(page, &CODE_ERROR_TEXTS).await? {
                return Err(ApplyError::LoginChallengeUnresolved(tip.to_string()));
            }
            if Instant::now() >= deadline {
                return Err(ApplyError::LoginChallengeUnresolved(format!(
                    "login not confirmed within {}s",
                    self.login_timeout.as_secs()
                )));
            }
            sleep(Duration::from_millis(1500)).await;
        }
    }

    async fn apply_filters(&mut self, page: &mut dyn BrowserPage, filters: &SearchFilters) {
        for label in [&filters.salary, &filters.experience].into_iter().flatten() {
            match page.click_text(label).await {
                Ok(true) => self.engine.random_delay().await,
                Ok(false) => warn!(platform = "boss", label = %label, "filter option not found"),
                Err(err) => warn!(platform = "boss", error = %err, "filter click failed"),
            }
        }
    }

    async fn send_greeting(&mut self, page: &mut dyn BrowserPage) -> ApplyResult<()> {
        let input = first_existing(page, &GREETING_INPUTS)
            .await?
            .ok_or_else(|| ApplyError::StepNotFound("chat input".into()))?;
        self.engine.pause([500, 1000]).await;
        let bounds = self.engine.config().greeting_typing_delay_ms;
        let greeting = self.greeting.clone();
        self.engine.type_text(page, input, &greeting, bounds).await?;
        self.engine.random_delay().await;
        if !page.click_text("发送").await? {
            page.press_enter(input).await?;
        }
        self.engine.random_delay().await;
        Ok(())
    }
}

#[async_trait(?Send)]
impl PlatformApplier for BossApplier {
    fn platform(&self) -> Platform {
        Platform::Boss
    }

    async fn login(&mut self, page: &mut dyn BrowserPage, credentials: &Credentials) -> LoginOutcome {
        match self.run_login(page, credentials).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(platform = "boss", error = %err, "login failed");
                LoginOutcome::failed(err.to_string())
            }
        }
    }

    async fn search_jobs(
        &mut self,
        page: &mut dyn BrowserPage,
        keywords: &[String],
        location: Option<&str>,
        filters: &SearchFilters,
    ) -> ApplyResult<Vec<JobPosting>> {
        let query = joined_keywords(keywords, 3);
        let city = location.unwrap_or_default();
        let url = format!("{JOBS_URL}?query={}&city={}", encode(&query), encode(city));
        info!(platform = "boss", %query, city, "searching jobs");
        page.goto(&url).await?;
        self.engine.random_delay().await;
        self.apply_filters(page, filters).await;

        let rows = collect_cards(page, &CARDS).await?;
        let found = rows.len();
        let postings = rows
            .into_iter()
            .filter_map(|row| posting_from_card(Platform::Boss, row, BASE_URL, city))
            .collect::<Vec<_>>();
        let mut postings = self.filter.retain(postings);
        postings.truncate(filters.limit);
        info!(platform = "boss", found, kept = postings.len(), "search parsed");
        Ok(postings)
    }

    async fn apply_job(&mut self, page: &mut dyn BrowserPage, job: &JobPosting) -> ApplicationResult {
        if let Err(err) = page.goto(&job.link).await {
            return ApplicationResult::failed(job, format!("could not open job page: {err}"));
        }
        self.engine.random_delay().await;
        if let Err(err) = self.engine.move_pointer_randomly(page).await {
            warn!(error = %err, "pointer wander failed");
        }
        if let Err(err) = self.engine.scroll(page).await {
            warn!(error = %err, "scroll failed");
        }

        match page.click_text("立即沟通").await {
            Ok(true) => {}
            Ok(false) => return ApplicationResult::failed(job, "chat button (立即沟通) not found"),
            Err(err) => return ApplicationResult::failed(job, format!("chat button failed: {err}")),
        }
        self.engine.random_delay().await;

        if let Err(err) = self.send_greeting(page).await {
            warn!(platform = "boss", job = %job.id, error = %err, "greeting not sent");
        }
        info!(platform = "boss", title = %job.title, company = %job.company, "applied");
        ApplicationResult::succeeded(job, "applied")
    }
}
