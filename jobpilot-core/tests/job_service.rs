mod common;

use std::sync::Arc;
use std::time::Duration;

use jobpilot_core::apply::NoCodeSource;
use jobpilot_core::config::JobPilotConfig;
use jobpilot_core::search::{CacheProvider, JobProvider, RawJob, SearchOrchestrator};
use jobpilot_core::session::{StoredCookie, StoredSession};
use jobpilot_core::{
    ApplyRequest, BatchApplyRequest, JobService, SearchRequest, UserInfo,
};
use tempfile::{tempdir, TempDir};

use common::{FakeLauncher, LaunchBehavior, PageScript, SharedLog};

fn config(dir: &TempDir) -> JobPilotConfig {
    let mut config = JobPilotConfig::default();
    config.apply.history_db = dir.path().join("applications.sqlite").display().to_string();
    config.apply.delay_seconds = [1, 1];
    config.session.dir = dir.path().join("sessions").display().to_string();
    config
}

fn service(dir: &TempDir, script: PageScript, behavior: LaunchBehavior) -> (JobService, SharedLog) {
    let cache = Arc::new(CacheProvider::new(100));
    let orchestrator = SearchOrchestrator::new(
        vec![Arc::clone(&cache) as Arc<dyn JobProvider>],
        Duration::from_secs(5),
    );
    let (launcher, log) = FakeLauncher::new(script, behavior);
    let service = JobService::with_parts(
        config(dir),
        orchestrator,
        cache,
        Box::new(launcher),
        Arc::new(NoCodeSource),
    );
    (service, log)
}

fn row(id: &str, link: &str) -> RawJob {
    RawJob {
        id: id.to_string(),
        title: format!("Rust工程师 {id}"),
        company: "星河科技".to_string(),
        location: "上海".to_string(),
        link: link.to_string(),
        ..Default::default()
    }
}

fn seed(service: &JobService) {
    service.ingest(vec![
        row("j1", "https://www.zhipin.com/job_detail/j1.html"),
        row("j2", "https://www.liepin.com/job/1970.shtml"),
        row("j3", "https://www.zhipin.com/job_detail/j3.html"),
    ]);
}

fn user(id: &str) -> UserInfo {
    UserInfo {
        user_id: id.to_string(),
        phone: Some("13800138000".to_string()),
        ..UserInfo::default()
    }
}

fn rust_search() -> SearchRequest {
    SearchRequest {
        keywords: vec!["Rust".into()],
        ..SearchRequest::default()
    }
}

#[tokio::test]
async fn search_answers_from_ingested_rows() {
    let dir = tempdir().unwrap();
    let (service, _) = service(&dir, PageScript::default(), LaunchBehavior::Fail);
    seed(&service);

    let response = service.search(&rust_search()).await;
    assert!(response.success);
    let outcome = response.data.unwrap();
    assert_eq!(outcome.provider_mode, "cache");
    assert_eq!(outcome.jobs.len(), 3);
    assert!(outcome.has_actionable_jobs);

    let miss = service
        .search(&SearchRequest {
            keywords: vec!["Haskell".into()],
            ..SearchRequest::default()
        })
        .await;
    assert!(!miss.success);
    assert_eq!(miss.code.as_deref(), Some("no_real_jobs"));
}

#[tokio::test]
async fn apply_validates_user_and_job() {
    let dir = tempdir().unwrap();
    let (service, log) = service(&dir, PageScript::default(), LaunchBehavior::Succeed);
    seed(&service);
    service.search(&rust_search()).await;

    let missing_user = service
        .apply(&ApplyRequest {
            job_id: "j1".into(),
            ..ApplyRequest::default()
        })
        .await;
    assert_eq!(missing_user.code.as_deref(), Some("invalid_request"));

    let unknown = service
        .apply(&ApplyRequest {
            job_id: "nope".into(),
            user_info: user("u1"),
            ..ApplyRequest::default()
        })
        .await;
    assert!(!unknown.success);
    assert_eq!(unknown.code.as_deref(), Some("job_not_found"));
    assert_eq!(log.borrow().launches, 0);
}

#[tokio::test]
async fn unsupported_host_is_handed_off_and_recorded() {
    let dir = tempdir().unwrap();
    let (service, log) = service(&dir, PageScript::default(), LaunchBehavior::Succeed);
    seed(&service);
    service.search(&rust_search()).await;

    let response = service
        .apply(&ApplyRequest {
            job_id: "j2".into(),
            user_info: user("u1"),
            ..ApplyRequest::default()
        })
        .await;

    assert!(response.success);
    let result = response.data.unwrap();
    assert!(result.message.contains("https://www.liepin.com/job/1970.shtml"));
    assert_eq!(log.borrow().launches, 0);
    let entries = service.history().unwrap().list_for_user("u1", 10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].job_id, "j2");
}

#[tokio::test]
async fn batch_with_broken_browser_still_reports_every_job() {
    let dir = tempdir().unwrap();
    let (service, _) = service(&dir, PageScript::default(), LaunchBehavior::Fail);
    seed(&service);
    service.search(&rust_search()).await;

    let response = service
        .batch_apply(&BatchApplyRequest {
            job_ids: vec!["j1".into(), "j2".into(), "missing".into(), "j3".into()],
            user_info: user("u1"),
            ..BatchApplyRequest::default()
        })
        .await;

    assert!(response.success);
    let report = response.data.unwrap();
    assert_eq!(report.total_attempted, 3);
    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 2);
    let order: Vec<_> = report.results.iter().map(|r| r.job.id.as_str()).collect();
    assert_eq!(order, vec!["j1", "j2", "j3"]);
    assert!(report.results[0].message.contains("browser session unavailable"));
    assert_eq!(service.history().unwrap().list_for_user("u1", 10).unwrap().len(), 3);
}

#[tokio::test]
async fn batch_respects_max_count_across_platforms() {
    let dir = tempdir().unwrap();
    let (service, _) = service(&dir, PageScript::default(), LaunchBehavior::Fail);
    seed(&service);
    service.search(&rust_search()).await;

    let response = service
        .batch_apply(&BatchApplyRequest {
            job_ids: vec!["j2".into(), "j1".into(), "j3".into()],
            user_info: user("u1"),
            max_count: Some(2),
            ..BatchApplyRequest::default()
        })
        .await;
    let report = response.data.unwrap();
    assert_eq!(report.total_attempted, 2);

    let none_known = service
        .batch_apply(&BatchApplyRequest {
            job_ids: vec!["gone".into()],
            user_info: user("u1"),
            ..BatchApplyRequest::default()
        })
        .await;
    assert_eq!(none_known.code.as_deref(), Some("job_not_found"));
}

#[tokio::test(start_paused = true)]
async fn boss_apply_reuses_a_saved_session_and_sends_the_user_greeting() {
    let dir = tempdir().unwrap();
    let script = PageScript::default()
        .with_selectors(&["textarea"])
        .with_texts(&["立即沟通", "发送"]);
    let (service, log) = service(&dir, script, LaunchBehavior::Succeed);
    seed(&service);
    service.search(&rust_search()).await;
    service
        .sessions()
        .save(&StoredSession::new(
            "boss",
            "u1",
            vec![StoredCookie::new("wt2", "saved")],
            "FakeAgent/1.0",
        ))
        .await
        .unwrap();

    let mut info = user("u1");
    info.greeting = Some("您好，我熟悉Rust和Tokio".into());
    let response = service
        .apply(&ApplyRequest {
            job_id: "j1".into(),
            user_info: info,
            ..ApplyRequest::default()
        })
        .await;

    assert!(response.success, "{:?}", response.error);
    let log = log.borrow();
    assert_eq!(log.launches, 1);
    assert_eq!(log.closes, 1);
    assert_eq!(log.typed["textarea"], "您好，我熟悉Rust和Tokio");
    assert!(log
        .visited
        .contains(&"https://www.zhipin.com/job_detail/j1.html".to_string()));
}
