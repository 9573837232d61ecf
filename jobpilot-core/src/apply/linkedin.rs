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
    collect_cards, encode, persist_session, posting_from_card, restore_session, CardRow,
    CardSelectors,
};
use super::{
    joined_keywords, ApplyError, ApplyResult, Credentials, LoginOutcome, Platform,
    PlatformApplier, SearchFilters,
};

const BASE_URL: &str = "https://www.linkedin.com";
const LOGIN_URL: &str = "https://www.linkedin.com/login";
const EASY_APPLY_BUTTON: &str = "button.jobs-apply-button";
const MODAL: &str = ".jobs-easy-apply-modal";
const MAX_FORM_PAGES: usize = 10;
const LOGIN_HINTS: [&str; 2] = ["Sign in", "Join now"];

const CARDS: CardSelectors = CardSelectors {
    card: "li[data-occludable-job-id]",
    title: ".job-card-list__title",
    company: ".job-card-container__company-name",
    salary: None,
    location: Some(".job-card-container__metadata-item"),
    link: None,
    id_attr: Some("data-occludable-job-id"),
    max: 50,
};

fn is_signed_in(url: &str) -> bool {
    url.contains("/feed")
}

fn is_challenge(url: &str) -> bool {
    url.contains("checkpoint") || url.contains("challenge")
}

/// LinkedIn: email/password login, Easy Apply search filter, multi-page
/// Easy Apply modal. Greetings are not supported here.
pub struct LinkedInApplier {
    engine: AntiDetectionEngine,
    store: Arc<SessionStore>,
    filter: JobFilter,
    login_timeout: Duration,
}

impl LinkedInApplier {
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
            Platform::LinkedIn,
            &credentials.user_id,
            &format!("{BASE_URL}/feed/"),
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

        page.goto(LOGIN_URL).await?;
        self.engine.random_delay().await;
        if !page.exists("#username").await? {
            return Err(ApplyError::StepNotFound("#username".into()));
        }
        let typing = self.engine.config().typing_delay_ms;
        self.engine.type_text(page, "#username", username, typing).await?;
        self.engine.random_delay().await;
        self.engine.type_text(page, "#password", password, typing).await?;
        self.engine.random_delay().await;
        self.engine.click(page, r#"button[type="submit"]"#).await?;

        let deadline = Instant::now() + self.login_timeout;
        let mut challenge_reported = false;
        loop {
            let url = page.current_url().await?;
            if is_signed_in(&url) {
                break;
            }
            if is_challenge(&url) && !challenge_reported {
                warn!(platform = "linkedin", "security checkpoint, waiting for manual resolution");
                challenge_reported = true;
            }
            if Instant::now() >= deadline {
                return Err(ApplyError::LoginChallengeUnresolved(if challenge_reported {
                    "security checkpoint not resolved in time".to_string()
                } else {
                    "feed never reached after sign in".to_string()
                }));
            }
            sleep(Duration::from_secs(5)).await;
        }

        persist_session(page, &self.store, Platform::LinkedIn, &credentials.user_id).await?;
        info!(platform = "linkedin", "login confirmed");
        Ok(LoginOutcome::confirmed(false))
    }

    /// Walks the Easy Apply modal: Next until Review or Submit shows up.
    async fn complete_modal(&mut self, page: &mut dyn BrowserPage) -> ApplyResult<()> {
        if !page.exists(MODAL).await? {
            return Err(ApplyError::StepNotFound("easy apply dialog".into()));
        }
        for step in 1..=MAX_FORM_PAGES {
            self.engine.pause([800, 1500]).await;
            if page.click_text("Submit application").await? {
                info!(platform = "linkedin", step, "application submitted");
                return Ok(());
            }
            if page.click_text("Review").await? {
                self.engine.random_delay().await;
                if page.click_text("Submit application").await? {
                    info!(platform = "linkedin", step, "application submitted after review");
                }
                return Ok(());
            }
            if !page.click_text("Next").await? {
                return Err(ApplyError::StepNotFound("next or submit button in form".into()));
            }
            self.engine.random_delay().await;
        }
        Err(ApplyError::StepNotFound(format!(
            "form longer than {MAX_FORM_PAGES} pages"
        )))
    }
}

fn with_view_link(mut row: CardRow) -> CardRow {
    if row.href.is_empty() && !row.native_id.trim().is_empty() {
        row.href = format!("{BASE_URL}/jobs/view/{}", row.native_id.trim());
    }
    row
}

#[async_trait(?Send)]
impl PlatformApplier for LinkedInApplier {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    async fn login(&mut self, page: &mut dyn BrowserPage, credentials: &Credentials) -> LoginOutcome {
        match self.run_login(page, credentials).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(platform = "linkedin", error = %err, "login failed");
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
        let mut url = format!("{BASE_URL}/jobs/search/?keywords={}", encode(&query));
        if let Some(location) = location.filter(|value| !value.trim().is_empty()) {
            url.push_str(&format!("&location={}", encode(location)));
        }
        url.push_str("&f_AL=true");
        info!(platform = "linkedin", %query, "searching jobs");
        page.goto(&url).await?;
        self.engine.random_delay().await;

        let rows = collect_cards(page, &CARDS).await?;
        let postings = rows
            .into_iter()
            .map(with_view_link)
            .filter_map(|row| {
                posting_from_card(Platform::LinkedIn, row, BASE_URL, location.unwrap_or_default())
            })
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
        if let Err(err) = self.engine.scroll(page).await {
            warn!(error = %err, "scroll failed");
        }
        match page.exists(EASY_APPLY_BUTTON).await {
            Ok(true) => {}
            Ok(false) => return ApplicationResult::failed(job, "Easy Apply button not found"),
            Err(err) => return ApplicationResult::failed(job, err.to_string()),
        }
        if let Err(err) = self.engine.click(page, EASY_APPLY_BUTTON).await {
            return ApplicationResult::failed(job, err.to_string());
        }
        match self.complete_modal(page).await {
            Ok(()) => ApplicationResult::succeeded(job, "applied"),
            Err(err) => ApplicationResult::failed(job, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_link_built_from_native_id() {
        let row = with_view_link(CardRow {
            title: "Rust Engineer".into(),
            native_id: " 3901 ".into(),
            ..CardRow::default()
        });
        assert_eq!(row.href, "https://www.linkedin.com/jobs/view/3901");
        assert!(is_challenge("https://www.linkedin.com/checkpoint/challenge/x"));
        assert!(is_signed_in("https://www.linkedin.com/feed/"));
    }
}
