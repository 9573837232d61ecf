use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use jobpilot_core::apply::{HistoryEntry, HistoryError};
use jobpilot_core::session::SessionError;
use jobpilot_core::{
    load_config, ApiResponse, ApplicationHistory, BatchApplyReport, ChannelCodeSource,
    ConfigError, DataProviderMode, JobPilotConfig, JobService, NoCodeSource, Platform,
    SearchOutcome, ServiceError, SessionInfo, SessionStore,
};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod commands;

pub use commands::{
    ApplyArgs, HistoryArgs, PlatformArg, SearchArgs, SessionArgs, SessionCommands,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
    #[error("session store error: {0}")]
    Session(#[from] SessionError),
    #[error("history error: {0}")]
    History(#[from] HistoryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{code}: {message}")]
    Failed { code: String, message: String },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Job search and auto-apply control interface", long_about = None)]
pub struct Cli {
    /// Path to jobpilot.toml
    #[arg(long, default_value = "configs/jobpilot.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Debug logging regardless of RUST_LOG
    #[arg(short, long)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Searches job sources for real postings
    Search(SearchArgs),
    /// Logs in to a platform and applies to matching jobs
    Apply(ApplyArgs),
    /// Stored login sessions
    #[command(subcommand)]
    Session(SessionCommands),
    /// Recorded application attempts
    History(HistoryArgs),
    /// Configuration checks
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Loads and validates the configuration, then prints the provider chain
    Check,
}

/// Synchronous entry point: owns the runtime for the whole command.
pub fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(execute(cli));
    // A pending stdin read would otherwise hold the process open.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    debug!(path = %cli.config.display(), "configuration loaded");

    match &cli.command {
        Commands::Search(args) => {
            let service = JobService::from_config(config, Arc::new(NoCodeSource))?;
            let response = service.search(&args.to_request()).await;
            finish(&response, cli.format)
        }
        Commands::Apply(args) => {
            let (codes, sender) = ChannelCodeSource::new(4);
            let reader = spawn_code_reader(sender);
            let service = JobService::from_config(config, Arc::new(codes))?;
            let response = service
                .platform_apply(
                    args.platform.into(),
                    &args.credentials(),
                    &args.keywords,
                    args.location.as_deref(),
                    &args.filters(),
                    args.max_count,
                )
                .await;
            reader.abort();
            finish(&response, cli.format)
        }
        Commands::Session(SessionCommands::Show(args)) => {
            let store = SessionStore::from_config(&config.session);
            let platform = Platform::from(args.platform);
            let info = store.info(platform.as_str(), &args.user_id).await?;
            render(
                &SessionView {
                    platform: platform.as_str(),
                    user_id: args.user_id.clone(),
                    session: info,
                },
                cli.format,
            )
        }
        Commands::Session(SessionCommands::Clear(args)) => {
            let store = SessionStore::from_config(&config.session);
            let platform = Platform::from(args.platform);
            let cleared = store.clear(platform.as_str(), &args.user_id).await?;
            render(
                &SessionCleared {
                    platform: platform.as_str(),
                    user_id: args.user_id.clone(),
                    cleared,
                },
                cli.format,
            )
        }
        Commands::History(args) => {
            let history = ApplicationHistory::open(&config.apply.history_db)?;
            let rows = history.list_for_user(&args.user_id, args.limit)?;
            render(&HistoryList { rows }, cli.format)
        }
        Commands::Config(ConfigCommands::Check) => {
            render(&ConfigReport::from_config(&config), cli.format)
        }
    }
}

/// Feeds verification codes typed on stdin to the login flow.
fn spawn_code_reader(sender: mpsc::Sender<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let code = line.trim().to_string();
            if code.is_empty() {
                continue;
            }
            info!("verification code read from stdin");
            if sender.send(code).await.is_err() {
                break;
            }
        }
    })
}

fn finish<T>(response: &ApiResponse<T>, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    render(response, format)?;
    if response.success {
        return Ok(());
    }
    Err(AppError::Failed {
        code: response.code.clone().unwrap_or_else(|| "error".to_string()),
        message: response.error.clone().unwrap_or_default(),
    })
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl<T: DisplayFallback> DisplayFallback for ApiResponse<T> {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        if !self.success {
            lines.push(format!(
                "[{}] {}",
                self.code.as_deref().unwrap_or("error"),
                self.error.as_deref().unwrap_or("request failed")
            ));
        }
        if let Some(data) = &self.data {
            lines.push(data.display());
        }
        lines.join("\n")
    }
}

impl DisplayFallback for SearchOutcome {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "source: {} | {} postings | actionable: {}",
            self.provider_mode,
            self.jobs.len(),
            if self.has_actionable_jobs { "yes" } else { "no" }
        )];
        for job in &self.jobs {
            let salary = if job.salary.is_empty() { "-" } else { job.salary.as_str() };
            lines.push(format!(
                "{} | {} | {} | {} | {} | {}",
                job.id, job.title, job.company, job.location, salary, job.link
            ));
        }
        for attempt in &self.attempts {
            if let Some(error) = &attempt.error {
                lines.push(format!("  ! {}: {}", attempt.provider, error));
            }
        }
        lines.join("\n")
    }
}

impl DisplayFallback for BatchApplyReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "attempted {} | applied {} | failed {} | skipped {} | success rate {:.0}%{}",
            self.total_attempted,
            self.applied,
            self.failed,
            self.skipped,
            self.success_rate * 100.0,
            if self.stopped_early { " | stopped early" } else { "" }
        )];
        for result in &self.results {
            lines.push(format!(
                "[{}] {} @ {}: {}",
                if result.success { "OK" } else { "FAIL" },
                result.job.title,
                result.job.company,
                result.message
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub platform: &'static str,
    pub user_id: String,
    pub session: Option<SessionInfo>,
}

impl DisplayFallback for SessionView {
    fn display(&self) -> String {
        match &self.session {
            None => format!("no stored session for {}/{}", self.platform, self.user_id),
            Some(info) => format!(
                "{}/{} | created {} ({}h ago) | {} cookies | valid: {}\nuser agent: {}",
                self.platform,
                self.user_id,
                info.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                info.age_hours,
                info.cookie_count,
                if info.valid { "yes" } else { "no" },
                info.user_agent
            ),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionCleared {
    pub platform: &'static str,
    pub user_id: String,
    pub cleared: bool,
}

impl DisplayFallback for SessionCleared {
    fn display(&self) -> String {
        if self.cleared {
            format!("session {}/{} removed", self.platform, self.user_id)
        } else {
            format!("no stored session for {}/{}", self.platform, self.user_id)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryList {
    pub rows: Vec<HistoryEntry>,
}

impl DisplayFallback for HistoryList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "no recorded applications".to_string();
        }
        self.rows
            .iter()
            .map(|entry| {
                format!(
                    "{} | {} | {} @ {} | {} | {}",
                    entry.applied_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    if entry.success { "OK" } else { "FAIL" },
                    entry.job_title,
                    entry.company,
                    entry.platform,
                    entry.message
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub provider_mode: String,
    pub providers: Vec<String>,
    pub allow_cn_portal_fallback: bool,
    pub enable_global_job_fallback: bool,
    pub enterprise_api: bool,
    pub max_apply_per_session: u32,
    pub history_db: String,
    pub session_dir: String,
}

impl ConfigReport {
    fn from_config(config: &JobPilotConfig) -> Self {
        let provider_mode = match config.search.provider_mode() {
            DataProviderMode::Auto => "auto".to_string(),
            DataProviderMode::Cloud => "cloud".to_string(),
            DataProviderMode::Named(name) => name,
        };
        Self {
            provider_mode,
            providers: config.search.effective_providers(),
            allow_cn_portal_fallback: config.search.allow_cn_portal_fallback,
            enable_global_job_fallback: config.search.enable_global_job_fallback,
            enterprise_api: config.search.enterprise.url.is_some(),
            max_apply_per_session: config.apply.max_apply_per_session,
            history_db: config.apply.history_db.clone(),
            session_dir: config.session.dir.clone(),
        }
    }
}

impl DisplayFallback for ConfigReport {
    fn display(&self) -> String {
        let mut chain = self.providers.join(" -> ");
        if self.allow_cn_portal_fallback {
            chain.push_str(" -> cn_portal");
        }
        [
            "configuration ok".to_string(),
            format!("provider mode: {}", self.provider_mode),
            format!("provider chain: {chain}"),
            format!(
                "enterprise api: {}",
                if self.enterprise_api { "configured" } else { "not configured" }
            ),
            format!("max applications per session: {}", self.max_apply_per_session),
            format!("history db: {}", self.history_db),
            format!("session dir: {}", self.session_dir),
        ]
        .join("\n")
    }
}
