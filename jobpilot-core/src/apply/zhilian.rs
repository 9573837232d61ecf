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
use super::{
    joined_keywords, ApplyError, ApplyResult, Credentials, LoginOutcome, Platform,
    PlatformApplier, SearchFilters,
};

const BASE_URL: &str = "https://www.zhaopin.com";
const LOGIN_URL: &str = "https://passport.zhaopin.com/login";
const SEARCH_URL: &str = "https://sou.zhaopin.com/";

const USERNAME_INPUTS: [&str; 2] = ["#loginname", r#"input[name="loginname"]"#];
const PASSWORD_INPUTS: [&str; 2] = ["#password", r#"input[type="password"]"#];
const APPLY_BUTTONS: [&str; 2] = [".apply-btn", ".btn-apply"];
const CONFIRM_BUTTONS: [&str; 2] = [".confirm-apply", ".btn-confirm"];
const CAPTCHA_MARKERS: [&str; 2] = [".captcha", ".verify-code"];
const ALREADY_APPLIED: [&str; 2] = ["已投递", "已申请"];
const LOGIN_HINTS: [&str; 1] = ["登录/注册"];

const CARDS: CardSelectors = CardSelectors {
    card: ".joblist-box__item",
    title: ".joblist-box__job-title",
    company: ".joblist-box__company-name",
    salary: Some(".joblist-box__job-salary"),
    location: Some(".joblist-box__job-location"),
    link: Some("a"),
    id_attr: None,
    max: 60,
};

fn is_signed_in(url: &str) -> bool {
    url.starts_with("http") && !url.contains("passport.zhaopin.com")
}

/// 智联招聘: password login, keyword search, one-click apply with an
/// optional confirmation dialog.
pub struct ZhilianApplier {
    engine: AntiDetectionEngine,
    store: Arc<SessionStore>,
    filter: JobFilter,
    login_timeout: Duration,
}

impl ZhilianApplier {
    pub fn new(engine: AntiDetectionEngine, store: Arc<SessionStore>, config: &ApplySection) -> Self {
        Self {
            engine,
            store,
            filter: JobFilter::from_config(config),
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
            Platform::Zhilian,
            &credentials.user_id,
            BASE_URL,
            is_signed_in,
            &LOGIN_HINTS,
        )
        .await?
        {
            return Ok(LoginOutcome::confirmed(true));
        }

        let username = credentials
            .username
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ApplyError::MissingCredentials("username"))?;
        let password = credentials
            .password
            .as_deref()
            .filter(|value| !value.is_empty())
            .ok_or(ApplyError::MissingCredentials("password"))?;

        info!(platform = "zhilian", "opening login page");
        page.goto(LOGIN_URL).await?;
        self.engine.random_delay().await;
        page.click_text("密码登录").await?;

        let typing = self.engine.config().typing_delay_ms;
        let user_input = first_existing(page, &USERNAME_INPUTS)
            .await?
            .ok_or_else(|| ApplyError::StepNotFound("username input".into()))?;
        self.engine.type_text(page, user_input, username, typing).await?;
        self.engine.random_delay().await;

        let password_input = first_existing(page, &PASSWORD_INPUTS)
            .await?
            .ok_or_else(|| ApplyError::StepNotFound("password input".into()))?;
        self.engine
            .type_text(page, password_input, password, typing)
            .await?;
        self.engine.pause([400, 800]).await;

        if page.exists(".submit-btn").await? {
            self.engine.click(page, ".submit-btn").await?;
        } else if !page.click_text("登录").await? {
            return Err(ApplyError::StepNotFound("login button".into()));
        }

        self.wait_until_signed_in(page).await?;
        persist_session(page, &self.store, Platform::Zhilian, &credentials.user_id).await?;
        info!(platform = "zhilian", "login confirmed");
        Ok(LoginOutcome::confirmed(false))
    }

    /// A captcha, when shown, has to be solved by hand inside the login
    /// window.
    async fn wait_until_signed_in(&mut self, page: &mut dyn BrowserPage) -> ApplyResult<()> {
        let deadline = Instant::now() + self.login_timeout;
        let mut captcha_reported = false;
        loop {
            let url = page.current_url().await?;
            if is_signed_in(&url) {
                return Ok(());
            }
            if !captcha_reported && first_existing(page, &CAPTCHA_MARKERS).await?.is_some() {
                warn!(platform = "zhilian", "captcha shown, waiting for manual completion");
                captcha_reported = true;
            }
            if Instant::now() >= deadline {
                return Err(ApplyError::LoginChallengeUnresolved(format!(
                    "still on the passport page after {}s",
                    self.login_timeout.as_secs()
                )));
            }
            sleep(Duration::from_secs(2)).await;
        }
    }

    async fn submit_application(
        &mut self,
        page: &mut dyn BrowserPage,
        job: &JobPosting,
    ) -> ApplyResult<&'static str> {
        let button = first_existing(page, &APPLY_BUTTONS).await?;
        match button {
            Some(button) => self.engine.click(page, button).await?,
            None => {
                let clicked = page.click_text("申请职位").await? || page.click_text("立即申请").await?;
                if !clicked {
                    return Err(ApplyError::StepNotFound(
                        "apply button (job closed or already applied)".into(),
                    ));
                }
            }
        }
        self.engine.random_delay().await;

        if page.exists(".resume-item").await? {
            page.click(".resume-item").await?;
            self.engine.pause([600, 1200]).await;
        }
        if let Some(confirm) = first_existing(page, &CONFIRM_BUTTONS).await? {
            page.click(confirm).await?;
            self.engine.random_delay().await;
        } else if page.click_text("确认投递").await? {
            self.engine.random_delay().await;
        }

        let confirmed = visible_text(page, &["投递成功", "申请成功"]).await?.is_some();
        info!(platform = "zhilian", job = %job.id, confirmed, "application submitted");
        Ok(if confirmed { "applied" } else { "submitted" })
    }
}

#[async_trait(?Send)]
impl PlatformApplier for ZhilianApplier {
    fn platform(&self) -> Platform {
        Platform::Zhilian
    }

    async fn login(&mut self, page: &mut dyn BrowserPage, credentials: &Credentials) -> LoginOutcome {
        match self.run_login(page, credentials).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(platform = "zhilian", error = %err, "login failed");
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
        let mut url = format!("{SEARCH_URL}?jl={}&kw={}", encode(city), encode(&query));
        if let Some(salary) = &filters.salary {
            url.push_str(&format!("&sl={}", encode(salary)));
        }
        if let Some(experience) = &filters.experience {
            url.push_str(&format!("&gj={}", encode(experience)));
        }
        info!(platform = "zhilian", %query, city, "searching jobs");
        page.goto(&url).await?;
        self.engine.random_delay().await;

        let rows = collect_cards(page, &CARDS).await?;
        let postings = rows
            .into_iter()
            .filter_map(|row| posting_from_card(Platform::Zhilian, row, BASE_URL, city))
            .collect::<Vec<_>>();
        let mut postings = self.filter.retain(postings);
        postings.truncate(filters.limit);
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
        if let Ok(Some(button)) = first_existing(page, &APPLY_BUTTONS).await {
            let label = page.text_of(button).await.ok().flatten().unwrap_or_default();
            if ALREADY_APPLIED.iter().any(|text| label.contains(text)) {
                return ApplicationResult::failed(job, "already applied to this job");
            }
        }
        match self.submit_application(page, job).await {
            Ok(message) => ApplicationResult::succeeded(job, message),
            Err(err) => ApplicationResult::failed(job, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passport_pages_are_not_signed_in() {
        assert!(!is_signed_in("https://passport.zhaopin.com/login"));
        assert!(is_signed_in("https://i.zhaopin.com/"));
    }
}
