use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const DEFAULT_PROVIDER_ORDER: [&str; 8] = [
    "cache",
    "enterprise_api",
    "bing_html",
    "duckduckgo",
    "browser_relay",
    "jooble",
    "brave",
    "remotive",
];

pub const DEFAULT_JOB_SITES: [&str; 5] = [
    "zhipin.com",
    "liepin.com",
    "zhaopin.com",
    "51job.com",
    "lagou.com",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobPilotConfig {
    pub search: SearchSection,
    pub browser: BrowserConfig,
    pub human: HumanSimulationSection,
    pub apply: ApplySection,
    pub session: SessionSection,
}

/// How the orchestrator picks its sources for one search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataProviderMode {
    /// Walk the configured provider order, cache first.
    Auto,
    /// Only the locally pushed crawler cache.
    Cloud,
    /// Exactly one live provider, by name.
    Named(String),
}

impl DataProviderMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => DataProviderMode::Auto,
            "cloud" | "cache" => DataProviderMode::Cloud,
            other => DataProviderMode::Named(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub job_data_provider: String,
    pub provider_order: Vec<String>,
    pub max_limit: usize,
    pub provider_timeout_seconds: u64,
    pub allow_cn_portal_fallback: bool,
    pub enable_global_job_fallback: bool,
    pub job_sites: Vec<String>,
    pub recent_cache_minutes: u64,
    pub cache_capacity: usize,
    pub enterprise: EnterpriseApiSection,
    pub keys: ProviderKeysSection,
    pub relay: RelaySection,
    pub retry: RetrySection,
}

impl SearchSection {
    pub fn provider_mode(&self) -> DataProviderMode {
        DataProviderMode::parse(&self.job_data_provider)
    }

    /// Provider names consulted for a search, in order, before the
    /// search-entry fallback.
    pub fn effective_providers(&self) -> Vec<String> {
        match self.provider_mode() {
            DataProviderMode::Auto => self
                .provider_order
                .iter()
                .filter(|name| self.enable_global_job_fallback || name.as_str() != "remotive")
                .cloned()
                .collect(),
            DataProviderMode::Cloud => vec!["cache".to_string()],
            DataProviderMode::Named(name) => vec![name],
        }
    }
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            job_data_provider: "auto".to_string(),
            provider_order: DEFAULT_PROVIDER_ORDER.iter().map(|s| s.to_string()).collect(),
            max_limit: 50,
            provider_timeout_seconds: 15,
            allow_cn_portal_fallback: true,
            enable_global_job_fallback: false,
            job_sites: DEFAULT_JOB_SITES.iter().map(|s| s.to_string()).collect(),
            recent_cache_minutes: 30,
            cache_capacity: 5000,
            enterprise: EnterpriseApiSection::default(),
            keys: ProviderKeysSection::default(),
            relay: RelaySection::default(),
            retry: RetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnterpriseApiSection {
    pub url: Option<String>,
    pub method: String,
    pub timeout_seconds: u64,
    pub auth_header: String,
    pub auth_scheme: String,
    pub key: Option<String>,
}

impl Default for EnterpriseApiSection {
    fn default() -> Self {
        Self {
            url: None,
            method: "GET".to_string(),
            timeout_seconds: 15,
            auth_header: "Authorization".to_string(),
            auth_scheme: "Bearer".to_string(),
            key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderKeysSection {
    pub jooble: Vec<String>,
    pub brave: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    pub binary: String,
    pub profile: String,
    pub timeout_seconds: u64,
    pub settle_ms: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            binary: "openclaw".to_string(),
            profile: "chrome".to_string(),
            timeout_seconds: 25,
            settle_ms: 1200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: usize,
    pub schedule_ms: Vec<u64>,
    pub jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            schedule_ms: vec![500, 1500, 4000],
            jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub chromium: ChromiumSection,
    pub flags: FlagsSection,
    pub user_agents: UserAgentSection,
    pub viewport: ViewportSection,
    pub fingerprint: FingerprintSection,
    pub locale: String,
    pub timezone: String,
    pub profiles_dir: String,
    pub launch_timeout_seconds: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chromium: ChromiumSection::default(),
            flags: FlagsSection::default(),
            user_agents: UserAgentSection::default(),
            viewport: ViewportSection::default(),
            fingerprint: FingerprintSection::default(),
            locale: "zh-CN".to_string(),
            timezone: "Asia/Shanghai".to_string(),
            profiles_dir: "data/profiles".to_string(),
            launch_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromiumSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub request_timeout_seconds: Option<u64>,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: true,
            disable_gpu: false,
            request_timeout_seconds: Some(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlagsSection {
    pub no_first_run: bool,
    pub disable_automation_controlled: bool,
    pub disable_blink_features: Vec<String>,
    pub accept_language: Option<String>,
}

impl Default for FlagsSection {
    fn default() -> Self {
        Self {
            no_first_run: true,
            disable_automation_controlled: true,
            disable_blink_features: vec!["AutomationControlled".to_string()],
            accept_language: Some("zh-CN,zh;q=0.9,en;q=0.8".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentSection {
    pub pool: Vec<String>,
}

impl Default for UserAgentSection {
    fn default() -> Self {
        Self {
            pool: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewportSection {
    pub resolutions: Vec<[u32; 2]>,
    pub jitter_pixels: u32,
    pub device_scale_factor: [f32; 2],
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            resolutions: vec![[1920, 1080], [1680, 1050], [1536, 864]],
            jitter_pixels: 0,
            device_scale_factor: [1.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FingerprintSection {
    pub enable_canvas_noise: bool,
    pub enable_webgl_mask: bool,
    pub hide_webdriver: bool,
    pub canvas_noise_range: [i32; 2],
    pub webgl_vendor: Option<String>,
    pub webgl_renderer: Option<String>,
}

impl Default for FingerprintSection {
    fn default() -> Self {
        Self {
            enable_canvas_noise: true,
            enable_webgl_mask: true,
            hide_webdriver: true,
            canvas_noise_range: [-2, 2],
            webgl_vendor: Some("Intel Inc.".to_string()),
            webgl_renderer: Some("Intel Iris OpenGL Engine".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HumanSimulationSection {
    pub action_delay_ms: [u32; 2],
    pub typing_delay_ms: [u32; 2],
    pub greeting_typing_delay_ms: [u32; 2],
    pub click_hesitation_ms: [u32; 2],
    pub mouse_jitter_px: u32,
    pub pointer_steps: [u32; 2],
    pub pointer_x_range: [u32; 2],
    pub pointer_y_range: [u32; 2],
    pub scroll_px: [u32; 2],
    pub slider_step_pause_ms: [u32; 2],
}

impl Default for HumanSimulationSection {
    fn default() -> Self {
        Self {
            action_delay_ms: [800, 2500],
            typing_delay_ms: [100, 300],
            greeting_typing_delay_ms: [50, 150],
            click_hesitation_ms: [80, 220],
            mouse_jitter_px: 3,
            pointer_steps: [12, 30],
            pointer_x_range: [100, 1800],
            pointer_y_range: [100, 900],
            scroll_px: [300, 800],
            slider_step_pause_ms: [10, 20],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApplySection {
    pub max_apply_per_session: u32,
    pub delay_seconds: [u64; 2],
    pub company_blacklist: Vec<String>,
    pub title_blacklist: Vec<String>,
    pub company_whitelist: Vec<String>,
    pub min_salary_k: Option<u32>,
    pub greeting: String,
    pub verification_wait_seconds: u64,
    pub login_timeout_seconds: u64,
    pub history_db: String,
}

impl Default for ApplySection {
    fn default() -> Self {
        Self {
            max_apply_per_session: 80,
            delay_seconds: [3, 8],
            company_blacklist: Vec::new(),
            title_blacklist: Vec::new(),
            company_whitelist: Vec::new(),
            min_salary_k: None,
            greeting: "您好，我对这个职位很感兴趣，期待与您沟通。".to_string(),
            verification_wait_seconds: 180,
            login_timeout_seconds: 120,
            history_db: "data/applications.sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub dir: String,
    pub ttl_days: i64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            dir: "data/sessions".to_string(),
            ttl_days: 7,
        }
    }
}

impl JobPilotConfig {
    /// Applies environment-style overrides. `lookup` stands in for
    /// `std::env::var` so callers decide where the values come from.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(mode) = get("JOB_DATA_PROVIDER") {
            self.search.job_data_provider = mode;
        }
        let enterprise = &mut self.search.enterprise;
        if let Some(url) = get("ENTERPRISE_JOB_API_URL") {
            enterprise.url = Some(url);
        }
        if let Some(method) = get("ENTERPRISE_JOB_API_METHOD") {
            enterprise.method = method.to_ascii_uppercase();
        }
        if let Some(timeout) = get("ENTERPRISE_JOB_API_TIMEOUT_S") {
            enterprise.timeout_seconds = timeout.parse().map_err(|_| ConfigError::Invalid {
                field: "ENTERPRISE_JOB_API_TIMEOUT_S",
                reason: format!("expected whole seconds, got {timeout:?}"),
            })?;
        }
        if let Some(header) = get("ENTERPRISE_JOB_API_AUTH_HEADER") {
            enterprise.auth_header = header;
        }
        if let Some(scheme) = lookup("ENTERPRISE_JOB_API_AUTH_SCHEME") {
            enterprise.auth_scheme = scheme.trim().to_string();
        }
        if let Some(key) = get("ENTERPRISE_JOB_API_KEY") {
            enterprise.key = Some(key);
        }
        if let Some(flag) = get("ALLOW_CN_PORTAL_FALLBACK") {
            self.search.allow_cn_portal_fallback = parse_flag("ALLOW_CN_PORTAL_FALLBACK", &flag)?;
        }
        if let Some(flag) = get("ENABLE_GLOBAL_JOB_FALLBACK") {
            self.search.enable_global_job_fallback =
                parse_flag("ENABLE_GLOBAL_JOB_FALLBACK", &flag)?;
        }
        if let Some(keys) = get("JOOBLE_API_KEY") {
            self.search.keys.jooble = split_keys(&keys);
        }
        if let Some(keys) = get("BRAVE_SEARCH_API_KEY") {
            self.search.keys.brave = split_keys(&keys);
        }
        if let Some(profile) = get("OPENCLAW_BROWSER_PROFILE") {
            self.search.relay.profile = profile;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let search = &self.search;
        if !(1..=200).contains(&search.max_limit) {
            return Err(invalid("search.max_limit", "must be within 1..=200"));
        }
        if search.provider_timeout_seconds == 0 {
            return Err(invalid("search.provider_timeout_seconds", "must be positive"));
        }
        if search.cache_capacity == 0 {
            return Err(invalid("search.cache_capacity", "must be positive"));
        }
        let method = search.enterprise.method.to_ascii_uppercase();
        if method != "GET" && method != "POST" {
            return Err(invalid(
                "search.enterprise.method",
                format!("expected GET or POST, got {}", search.enterprise.method),
            ));
        }
        if search.retry.max_attempts == 0 {
            return Err(invalid("search.retry.max_attempts", "must be at least 1"));
        }

        let apply = &self.apply;
        if !(1..=200).contains(&apply.max_apply_per_session) {
            return Err(invalid(
                "apply.max_apply_per_session",
                format!("{} is outside 1..=200", apply.max_apply_per_session),
            ));
        }
        if apply.delay_seconds[0] < 1 {
            return Err(invalid("apply.delay_seconds", "minimum delay must be at least 1 second"));
        }
        if apply.delay_seconds[0] > apply.delay_seconds[1] {
            return Err(invalid("apply.delay_seconds", "minimum exceeds maximum"));
        }

        let human = &self.human;
        for (field, range) in [
            ("human.action_delay_ms", human.action_delay_ms),
            ("human.typing_delay_ms", human.typing_delay_ms),
            ("human.greeting_typing_delay_ms", human.greeting_typing_delay_ms),
            ("human.click_hesitation_ms", human.click_hesitation_ms),
            ("human.pointer_steps", human.pointer_steps),
            ("human.pointer_x_range", human.pointer_x_range),
            ("human.pointer_y_range", human.pointer_y_range),
            ("human.scroll_px", human.scroll_px),
            ("human.slider_step_pause_ms", human.slider_step_pause_ms),
        ] {
            if range[0] > range[1] {
                return Err(invalid(field, "minimum exceeds maximum"));
            }
        }

        if self.browser.user_agents.pool.is_empty() {
            return Err(invalid("browser.user_agents.pool", "must not be empty"));
        }
        if self.session.ttl_days < 1 {
            return Err(invalid("session.ttl_days", "must be at least 1 day"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn parse_flag(field: &'static str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(field, format!("expected a boolean flag, got {other:?}"))),
    }
}

fn split_keys(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .collect()
}

/// Loads, overrides from the process environment, and validates.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<JobPilotConfig> {
    let mut config: JobPilotConfig = load_toml(path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
