mod common;

use std::sync::Arc;

use jobpilot_core::apply::{
    BossApplier, ChannelCodeSource, Credentials, LinkedInApplier, NoCodeSource, PlatformApplier,
    ZhilianApplier,
};
use jobpilot_core::browser::AntiDetectionEngine;
use jobpilot_core::config::{ApplySection, HumanSimulationSection};
use jobpilot_core::session::{SessionStore, StoredCookie, StoredSession};
use tempfile::{tempdir, TempDir};

use common::{posting, FakePage, PageScript, SharedLog};

const LOGIN_URL: &str = "https://login.zhipin.com/";
const ZHILIAN_LOGIN_URL: &str = "https://passport.zhaopin.com/login";
const EASY_APPLY: &str = "button.jobs-apply-button";
const EASY_APPLY_MODAL: &str = ".jobs-easy-apply-modal";

fn engine() -> AntiDetectionEngine {
    AntiDetectionEngine::with_seed(HumanSimulationSection::default(), 7)
}

fn store() -> (TempDir, Arc<SessionStore>) {
    let dir = tempdir().unwrap();
    let store = Arc::new(SessionStore::new(dir.path().join("sessions"), 7));
    (dir, store)
}

fn boss_credentials() -> Credentials {
    Credentials {
        user_id: "candidate-1".into(),
        phone: Some("13800138000".into()),
        ..Credentials::default()
    }
}

fn saved_session(platform: &str, user_id: &str) -> StoredSession {
    StoredSession::new(platform, user_id, vec![StoredCookie::new("sid", "kept")], "FakeAgent/1.0")
}

fn session_files(store: &SessionStore) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(store.dir())
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
                .collect()
        })
        .unwrap_or_default()
}

fn boss_login_page() -> PageScript {
    PageScript::default()
        .with_selectors(&[r#"input[type="tel"]"#, r#"input[maxlength="6"]"#, ".btn-sign-in"])
        .with_texts(&["获取验证码"])
}

#[tokio::test(start_paused = true)]
async fn boss_login_without_code_fails_after_waiting() {
    let (_dir, store) = store();
    let config = ApplySection {
        verification_wait_seconds: 20,
        ..ApplySection::default()
    };
    let mut applier = BossApplier::new(engine(), Arc::clone(&store), Arc::new(NoCodeSource), &config);
    let log = SharedLog::default();
    let mut page = FakePage::new(boss_login_page(), log.clone());

    let outcome = applier.login(&mut page, &boss_credentials()).await;

    assert!(!outcome.success);
    assert!(outcome.message.contains("verification code"), "{}", outcome.message);
    assert_eq!(log.borrow().visited, vec![LOGIN_URL.to_string()]);
    assert_eq!(log.borrow().typed[r#"input[type="tel"]"#], "13800138000");
    assert!(store.load("boss", "candidate-1").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn boss_login_with_code_saves_a_reusable_session() {
    let (_dir, store) = store();
    let (codes, sender) = ChannelCodeSource::new(1);
    sender.send("482913".to_string()).await.unwrap();
    let codes = Arc::new(codes);
    let config = ApplySection::default();
    let script = boss_login_page().with_redirect(LOGIN_URL, "https://www.zhipin.com/web/geek/recommend");

    let mut applier = BossApplier::new(engine(), Arc::clone(&store), codes.clone(), &config);
    let log = SharedLog::default();
    let mut page = FakePage::new(script.clone(), log.clone());
    let outcome = applier.login(&mut page, &boss_credentials()).await;

    assert!(outcome.success, "{}", outcome.message);
    assert!(!outcome.reused_session);
    assert_eq!(log.borrow().typed[r#"input[maxlength="6"]"#], "482913");
    assert!(log.borrow().clicks.contains(&".btn-sign-in".to_string()));
    let info = store.info("boss", "candidate-1").await.unwrap().unwrap();
    assert_eq!(info.cookie_count, 1);
    assert_eq!(info.user_agent, "FakeAgent/1.0");

    let mut applier = BossApplier::new(engine(), Arc::clone(&store), codes, &config);
    let mut page = FakePage::new(script, SharedLog::default());
    let outcome = applier.login(&mut page, &boss_credentials()).await;
    assert!(outcome.success);
    assert!(outcome.reused_session);
}

#[tokio::test(start_paused = true)]
async fn boss_login_requires_a_phone_number() {
    let (_dir, store) = store();
    let mut applier = BossApplier::new(engine(), store, Arc::new(NoCodeSource), &ApplySection::default());
    let log = SharedLog::default();
    let mut page = FakePage::new(boss_login_page(), log.clone());
    let credentials = Credentials {
        user_id: "candidate-1".into(),
        phone: Some("   ".into()),
        ..Credentials::default()
    };

    let outcome = applier.login(&mut page, &credentials).await;
    assert!(!outcome.success);
    assert!(outcome.message.contains("phone"));
    assert!(log.borrow().visited.is_empty());
}

#[tokio::test(start_paused = true)]
async fn boss_apply_sends_the_configured_greeting() {
    let (_dir, store) = store();
    let config = ApplySection {
        greeting: "你好".into(),
        ..ApplySection::default()
    };
    let mut applier = BossApplier::new(engine(), store, Arc::new(NoCodeSource), &config);
    let log = SharedLog::default();
    let script = PageScript::default()
        .with_selectors(&["textarea"])
        .with_texts(&["立即沟通", "发送"]);
    let mut page = FakePage::new(script, log.clone());
    let job = posting("b1", "星河科技", "https://www.zhipin.com/job_detail/b1.html");

    let result = applier.apply_job(&mut page, &job).await;

    assert!(result.success);
    assert_eq!(result.job.id, "b1");
    assert_eq!(log.borrow().typed["textarea"], "你好");
    assert!(log.borrow().clicks.contains(&"立即沟通".to_string()));
}

#[tokio::test(start_paused = true)]
async fn boss_apply_without_chat_button_is_a_failed_result() {
    let (_dir, store) = store();
    let mut applier = BossApplier::new(engine(), store, Arc::new(NoCodeSource), &ApplySection::default());
    let mut page = FakePage::new(PageScript::default(), SharedLog::default());
    let job = posting("b2", "星河科技", "https://www.zhipin.com/job_detail/b2.html");

    let result = applier.apply_job(&mut page, &job).await;
    assert!(!result.success);
    assert!(result.message.contains("立即沟通"));
}

#[tokio::test(start_paused = true)]
async fn linkedin_login_requires_username_and_password() {
    let (_dir, store) = store();
    let mut applier = LinkedInApplier::new(engine(), store, &ApplySection::default());
    let log = SharedLog::default();
    let mut page = FakePage::new(PageScript::default(), log.clone());
    let credentials = Credentials {
        user_id: "candidate-2".into(),
        username: Some("dev@example.com".into()),
        ..Credentials::default()
    };

    let outcome = applier.login(&mut page, &credentials).await;
    assert!(!outcome.success);
    assert!(outcome.message.contains("password"));
    assert!(log.borrow().visited.is_empty());
}

#[tokio::test(start_paused = true)]
async fn boss_saved_session_is_reused_without_a_phone_number() {
    let (_dir, store) = store();
    store.save(&saved_session("boss", "u1")).await.unwrap();
    let mut applier = BossApplier::new(engine(), Arc::clone(&store), Arc::new(NoCodeSource), &ApplySection::default());
    let log = SharedLog::default();
    let mut page = FakePage::new(boss_login_page(), log.clone());
    let credentials = Credentials {
        user_id: "u1".into(),
        ..Credentials::default()
    };

    let outcome = applier.login(&mut page, &credentials).await;

    assert!(outcome.success, "{}", outcome.message);
    assert!(outcome.reused_session);
    assert_eq!(log.borrow().visited, vec!["https://www.zhipin.com".to_string()]);
    assert!(log.borrow().typed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unreadable_session_file_is_cleared_and_login_proceeds() {
    let (_dir, store) = store();
    store.save(&saved_session("boss", "candidate-1")).await.unwrap();
    let files = session_files(&store);
    assert_eq!(files.len(), 1);
    std::fs::write(&files[0], "{not json").unwrap();

    let config = ApplySection {
        verification_wait_seconds: 20,
        ..ApplySection::default()
    };
    let mut applier = BossApplier::new(engine(), Arc::clone(&store), Arc::new(NoCodeSource), &config);
    let log = SharedLog::default();
    let mut page = FakePage::new(boss_login_page(), log.clone());

    let outcome = applier.login(&mut page, &boss_credentials()).await;

    assert!(!outcome.success);
    assert!(outcome.message.contains("verification code"), "{}", outcome.message);
    assert_eq!(log.borrow().visited, vec![LOGIN_URL.to_string()]);
    assert!(session_files(&store).is_empty());
}

#[tokio::test(start_paused = true)]
async fn linkedin_saved_session_is_reused_without_a_password() {
    let (_dir, store) = store();
    store.save(&saved_session("linkedin", "candidate-2")).await.unwrap();
    let mut applier = LinkedInApplier::new(engine(), Arc::clone(&store), &ApplySection::default());
    let log = SharedLog::default();
    let mut page = FakePage::new(PageScript::default(), log.clone());
    let credentials = Credentials {
        user_id: "candidate-2".into(),
        ..Credentials::default()
    };

    let outcome = applier.login(&mut page, &credentials).await;

    assert!(outcome.success, "{}", outcome.message);
    assert!(outcome.reused_session);
    assert_eq!(log.borrow().visited, vec!["https://www.linkedin.com/feed/".to_string()]);
}

fn zhilian_credentials() -> Credentials {
    Credentials {
        user_id: "candidate-3".into(),
        username: Some("13900139000".into()),
        password: Some("s3cret".into()),
        ..Credentials::default()
    }
}

fn zhilian_login_page() -> PageScript {
    PageScript::default()
        .with_selectors(&["#loginname", "#password", ".submit-btn"])
        .with_texts(&["密码登录"])
}

#[tokio::test(start_paused = true)]
async fn zhilian_password_login_saves_the_session() {
    let (_dir, store) = store();
    let mut applier = ZhilianApplier::new(engine(), Arc::clone(&store), &ApplySection::default());
    let log = SharedLog::default();
    let script = zhilian_login_page().with_redirect(ZHILIAN_LOGIN_URL, "https://i.zhaopin.com/");
    let mut page = FakePage::new(script, log.clone());

    let outcome = applier.login(&mut page, &zhilian_credentials()).await;

    assert!(outcome.success, "{}", outcome.message);
    assert!(!outcome.reused_session);
    assert_eq!(log.borrow().typed["#loginname"], "13900139000");
    assert_eq!(log.borrow().typed["#password"], "s3cret");
    assert!(log.borrow().clicks.contains(&".submit-btn".to_string()));
    assert!(store.load("zhilian", "candidate-3").await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn zhilian_login_stuck_on_passport_page_times_out() {
    let (_dir, store) = store();
    let config = ApplySection {
        login_timeout_seconds: 10,
        ..ApplySection::default()
    };
    let mut applier = ZhilianApplier::new(engine(), Arc::clone(&store), &config);
    let script = zhilian_login_page().with_selectors(&[".captcha"]);
    let mut page = FakePage::new(script, SharedLog::default());

    let outcome = applier.login(&mut page, &zhilian_credentials()).await;

    assert!(!outcome.success);
    assert!(outcome.message.contains("login challenge unresolved"), "{}", outcome.message);
    assert!(store.load("zhilian", "candidate-3").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn zhilian_already_applied_job_is_a_failed_result() {
    let (_dir, store) = store();
    let mut applier = ZhilianApplier::new(engine(), store, &ApplySection::default());
    let log = SharedLog::default();
    let mut script = PageScript::default().with_selectors(&[".apply-btn"]);
    script.labels.insert(".apply-btn".into(), "已投递".into());
    let mut page = FakePage::new(script, log.clone());
    let job = posting("z1", "星河科技", "https://jobs.zhaopin.com/z1.htm");

    let result = applier.apply_job(&mut page, &job).await;

    assert!(!result.success);
    assert!(result.message.contains("already applied"));
    assert!(log.borrow().clicks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn zhilian_apply_confirms_the_dialog() {
    let (_dir, store) = store();
    let mut applier = ZhilianApplier::new(engine(), store, &ApplySection::default());
    let log = SharedLog::default();
    let mut script = PageScript::default().with_selectors(&[".apply-btn", ".btn-confirm"]);
    script.body_text = "投递成功".into();
    let mut page = FakePage::new(script, log.clone());
    let job = posting("z2", "星河科技", "https://jobs.zhaopin.com/z2.htm");

    let result = applier.apply_job(&mut page, &job).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.message, "applied");
    let clicks = log.borrow().clicks.clone();
    assert_eq!(clicks, vec![".apply-btn".to_string(), ".btn-confirm".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn zhilian_apply_without_confirmation_text_is_only_submitted() {
    let (_dir, store) = store();
    let mut applier = ZhilianApplier::new(engine(), store, &ApplySection::default());
    let script = PageScript::default().with_texts(&["申请职位"]);
    let mut page = FakePage::new(script, SharedLog::default());
    let job = posting("z3", "星河科技", "https://jobs.zhaopin.com/z3.htm");

    let result = applier.apply_job(&mut page, &job).await;

    assert!(result.success);
    assert_eq!(result.message, "submitted");
}

fn easy_apply_page(texts: &[&str]) -> PageScript {
    PageScript::default()
        .with_selectors(&[EASY_APPLY, EASY_APPLY_MODAL])
        .with_texts(texts)
}

#[tokio::test(start_paused = true)]
async fn linkedin_easy_apply_submits_from_the_modal() {
    let (_dir, store) = store();
    let mut applier = LinkedInApplier::new(engine(), store, &ApplySection::default());
    let log = SharedLog::default();
    let mut page = FakePage::new(easy_apply_page(&["Submit application"]), log.clone());
    let job = posting("l1", "Acme", "https://www.linkedin.com/jobs/view/3901");

    let result = applier.apply_job(&mut page, &job).await;

    assert!(result.success, "{}", result.message);
    let clicks = log.borrow().clicks.clone();
    assert_eq!(clicks, vec![EASY_APPLY.to_string(), "Submit application".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn linkedin_easy_apply_goes_through_review() {
    let (_dir, store) = store();
    let mut applier = LinkedInApplier::new(engine(), store, &ApplySection::default());
    let log = SharedLog::default();
    let mut page = FakePage::new(easy_apply_page(&["Next", "Review"]), log.clone());
    let job = posting("l2", "Acme", "https://www.linkedin.com/jobs/view/3902");

    let result = applier.apply_job(&mut page, &job).await;

    assert!(result.success, "{}", result.message);
    assert!(log.borrow().clicks.contains(&"Review".to_string()));
    assert!(!log.borrow().clicks.contains(&"Next".to_string()));
}

#[tokio::test(start_paused = true)]
async fn linkedin_endless_form_gives_up_after_ten_pages() {
    let (_dir, store) = store();
    let mut applier = LinkedInApplier::new(engine(), store, &ApplySection::default());
    let log = SharedLog::default();
    let mut page = FakePage::new(easy_apply_page(&["Next"]), log.clone());
    let job = posting("l3", "Acme", "https://www.linkedin.com/jobs/view/3903");

    let result = applier.apply_job(&mut page, &job).await;

    assert!(!result.success);
    assert!(result.message.contains("longer than 10 pages"), "{}", result.message);
    let nexts = log.borrow().clicks.iter().filter(|click| *click == "Next").count();
    assert_eq!(nexts, 10);
}

#[tokio::test(start_paused = true)]
async fn linkedin_missing_modal_is_a_failed_result() {
    let (_dir, store) = store();
    let mut applier = LinkedInApplier::new(engine(), store, &ApplySection::default());
    let script = PageScript::default().with_selectors(&[EASY_APPLY]);
    let mut page = FakePage::new(script, SharedLog::default());
    let job = posting("l4", "Acme", "https://www.linkedin.com/jobs/view/3904");

    let result = applier.apply_job(&mut page, &job).await;

    assert!(!result.success);
    assert!(result.message.contains("easy apply dialog"));
}
