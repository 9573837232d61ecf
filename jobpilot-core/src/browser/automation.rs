use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::{seq::SliceRandom, Rng};
use tracing::{debug, info, warn};

use crate::config::{BrowserConfig, ViewportSection};

use super::error::{BrowserError, BrowserResult};
use super::fingerprint::FingerprintMasker;
use super::page::{BrowserPage, ChromiumPage, ViewportSpec};
use super::profile::ProfileManager;
use super::session::SessionKey;

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Opens a fully configured page for one session key.
#[async_trait(?Send)]
pub trait PageLauncher {
    async fn launch(&self, key: &SessionKey) -> BrowserResult<Box<dyn BrowserPage>>;
}

#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: Arc<BrowserConfig>,
    profiles: ProfileManager,
    fingerprint: Arc<FingerprintMasker>,
}

impl ChromiumLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        let profiles = ProfileManager::new(
            &config.profiles_dir,
            Duration::from_secs(7 * 24 * 60 * 60),
        );
        let fingerprint = Arc::new(FingerprintMasker::new(config.fingerprint.clone()));
        Self {
            config: Arc::new(config),
            profiles,
            fingerprint,
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    fn select_viewport(&self) -> (ViewportSpec, f64) {
        let ViewportSection {
            resolutions,
            jitter_pixels,
            device_scale_factor,
        } = &self.config.viewport;

        let mut rng = rand::thread_rng();
        let base = resolutions.choose(&mut rng).cloned().unwrap_or([1920, 1080]);
        let jitter = *jitter_pixels as i32;
        let width = (base[0] as i32 + rng.gen_range(-jitter..=jitter)).clamp(640, 2560) as u32;
        let height = (base[1] as i32 + rng.gen_range(-jitter..=jitter)).clamp(480, 1600) as u32;
        let (low, high) = (
            device_scale_factor[0].min(device_scale_factor[1]),
            device_scale_factor[0].max(device_scale_factor[1]),
        );
        let scale = rng.gen_range(low..=high) as f64;
        (ViewportSpec { width, height }, scale)
    }

    fn select_user_agent(&self) -> String {
        let mut rng = rand::thread_rng();
        self.config
            .user_agents
            .pool
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| FALLBACK_USER_AGENT.to_string())
    }

    fn build_chromium_config(
        &self,
        profile_dir: &Path,
        viewport: ViewportSpec,
        scale: f64,
        user_agent: &str,
    ) -> BrowserResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder()
            .user_data_dir(profile_dir)
            .viewport(ChromiumViewport {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: Some(scale),
                emulating_mobile: false,
                is_landscape: viewport.width >= viewport.height,
                has_touch: false,
            });

        if let Some(path) = &self.config.chromium.executable_path {
            builder = builder.chrome_executable(path);
        }
        if !self.config.chromium.headless {
            builder = builder.with_head();
        }
        if !self.config.chromium.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.chromium.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            format!("--user-agent={user_agent}"),
            format!("--window-size={},{}", viewport.width, viewport.height),
            format!("--lang={}", self.config.locale),
        ];
        if self.config.chromium.disable_gpu {
            args.push("--disable-gpu".into());
        }
        for feature in &self.config.flags.disable_blink_features {
            args.push(format!("--disable-blink-features={feature}"));
        }
        if self.config.flags.no_first_run {
            args.push("--no-first-run".into());
        }
        if self.config.flags.disable_automation_controlled {
            args.push("--disable-features=AutomationControlled".into());
        }
        if let Some(accept) = &self.config.flags.accept_language {
            args.push(format!("--accept-lang={accept}"));
        }
        args.push("--disable-dev-shm-usage".into());
        args.push("--password-store=basic".into());

        builder = builder.args(args);
        builder.build().map_err(BrowserError::Configuration)
    }

    /// Everything here must be in place before the first navigation.
    async fn configure_page(&self, page: &Page, user_agent: &str) -> BrowserResult<()> {
        page.enable_stealth_mode_with_agent(user_agent).await?;

        let mut params_builder =
            SetUserAgentOverrideParams::builder().user_agent(user_agent.to_string());
        if let Some(accept) = &self.config.flags.accept_language {
            params_builder = params_builder.accept_language(accept.clone());
        }
        let params = params_builder
            .build()
            .map_err(BrowserError::Configuration)?;
        page.set_user_agent(params).await?;

        page.execute(SetTimezoneOverrideParams::new(self.config.timezone.clone()))
            .await?;
        page.execute(SetLocaleOverrideParams {
            locale: Some(self.config.locale.clone()),
        })
        .await?;

        let lang = &self.config.locale;
        let languages_script = format!(
            "Object.defineProperty(navigator, 'language', {{ get: () => '{lang}' }});\nObject.defineProperty(navigator, 'languages', {{ get: () => ['{lang}', 'zh', 'en'] }});"
        );
        page.evaluate_on_new_document(
            AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(languages_script)
                .build()
                .map_err(BrowserError::Configuration)?,
        )
        .await?;
        self.fingerprint.apply(page).await?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl PageLauncher for ChromiumLauncher {
    async fn launch(&self, key: &SessionKey) -> BrowserResult<Box<dyn BrowserPage>> {
        if let Err(err) = self.profiles.cleanup_expired() {
            warn!(error = %err, "profile cleanup failed");
        }
        let profile_dir = self.profiles.allocate(&key.platform, &key.user_id)?;
        let (viewport, scale) = self.select_viewport();
        let user_agent = self.select_user_agent();
        let chromium_config =
            self.build_chromium_config(&profile_dir, viewport, scale, &user_agent)?;
        info!(
            platform = %key.platform,
            ua = %user_agent,
            width = viewport.width,
            height = viewport.height,
            headless = self.config.chromium.headless,
            "launching chromium"
        );

        let (mut browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        let page = match browser.new_page(CreateTargetParams::new("about:blank")).await {
            Ok(page) => page,
            Err(err) => {
                if let Err(close_err) = browser.close().await {
                    warn!(error = %close_err, "failed to close browser after tab error");
                }
                handler_task.abort();
                return Err(err.into());
            }
        };
        let mut chromium_page =
            ChromiumPage::new(browser, page.clone(), handler_task, user_agent.clone(), viewport);
        if let Err(err) = self.configure_page(&page, &user_agent).await {
            let _ = chromium_page.close().await;
            return Err(err);
        }
        Ok(Box::new(chromium_page))
    }
}
