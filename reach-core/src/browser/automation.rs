use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout as with_timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::ReachConfig;

use super::error::{BrowserError, BrowserResult};
use super::human::HumanPacer;
use super::metrics::AutomationMetrics;
use super::page::{PageHandle, WaitPolicy};
use super::profile::{BrowserProfile, SessionProfiles};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub headless: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<ReachConfig>,
    profiles: SessionProfiles,
}

impl BrowserLauncher {
    pub fn new(config: Arc<ReachConfig>, profiles: SessionProfiles) -> Self {
        Self { config, profiles }
    }

    pub fn config(&self) -> &ReachConfig {
        &self.config
    }

    pub fn profiles(&self) -> &SessionProfiles {
        &self.profiles
    }

    pub async fn launch(&self, session: &str) -> BrowserResult<BrowserAutomation> {
        self.launch_with_overrides(session, LaunchOverrides::default())
            .await
    }

    pub async fn launch_with_overrides(
        &self,
        session: &str,
        overrides: LaunchOverrides,
    ) -> BrowserResult<BrowserAutomation> {
        let removed = self.profiles.cleanup_expired()?;
        if removed > 0 {
            debug!(removed, "expired session profiles removed");
        }
        let profile = self.profiles.open(&self.config.platform.name, session)?;
        let headless = overrides.headless.unwrap_or(self.config.chromium.headless);
        let chromium_config = self.build_chromium_config(&profile, headless)?;
        info!(
            profile = %profile.id(),
            headless,
            width = self.config.chromium.window_size[0],
            height = self.config.chromium.window_size[1],
            "Launching Chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        profile.touch().await?;

        Ok(BrowserAutomation {
            browser,
            profile,
            handler_task: Some(handler_task),
            config: Arc::clone(&self.config),
            metrics: Arc::new(Mutex::new(AutomationMetrics::default())),
        })
    }

    fn build_chromium_config(
        &self,
        profile: &BrowserProfile,
        headless: bool,
    ) -> BrowserResult<ChromiumConfig> {
        let chromium = &self.config.chromium;
        let [width, height] = chromium.window_size;
        let mut builder = ChromiumConfig::builder()
            .chrome_executable(&chromium.executable_path)
            .user_data_dir(profile.path())
            .viewport(ChromiumViewport {
                width,
                height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: width >= height,
                has_touch: false,
            });

        if !headless {
            builder = builder.with_head();
        }
        if !chromium.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = chromium.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![format!("--window-size={width},{height}")];
        if chromium.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if let Some(lang) = &chromium.lang {
            args.push(format!("--lang={lang}"));
        }
        if let Some(user_agent) = &chromium.user_agent {
            args.push(format!("--user-agent={user_agent}"));
        }
        args.push("--no-first-run".into());
        args.push("--password-store=basic".into());
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

#[derive(Debug)]
pub struct BrowserAutomation {
    browser: Browser,
    profile: BrowserProfile,
    handler_task: Option<JoinHandle<()>>,
    config: Arc<ReachConfig>,
    metrics: Arc<Mutex<AutomationMetrics>>,
}

impl BrowserAutomation {
    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    pub fn metrics(&self) -> AutomationMetrics {
        self.metrics.lock().unwrap().clone()
    }

    pub async fn new_context(&self) -> BrowserResult<BrowserContext> {
        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.record_page_open();
        }
        let params = CreateTargetParams::new("about:blank");
        let page = self.browser.new_page(params).await?;
        self.configure_page(&page).await?;
        Ok(BrowserContext {
            page,
            metrics: Arc::clone(&self.metrics),
            pacer: Mutex::new(HumanPacer::new(self.config.human.clone())),
        })
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!(profile = %self.profile.id(), "Shutting down Chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        Ok(())
    }

    async fn configure_page(&self, page: &Page) -> BrowserResult<()> {
        if let Some(user_agent) = &self.config.chromium.user_agent {
            let mut params_builder =
                SetUserAgentOverrideParams::builder().user_agent(user_agent.clone());
            if let Some(lang) = &self.config.chromium.lang {
                params_builder = params_builder.accept_language(lang.clone());
            }
            let params = params_builder
                .build()
                .map_err(BrowserError::Configuration)?;
            page.set_user_agent(params).await?;
        }

        if let Some(lang) = &self.config.chromium.lang {
            let languages_script = format!(
                "Object.defineProperty(navigator, 'language', {{ get: () => '{lang}' }});\nObject.defineProperty(navigator, 'languages', {{ get: () => ['{lang}'] }});"
            );
            page.evaluate_on_new_document(
                AddScriptToEvaluateOnNewDocumentParams::builder()
                    .source(languages_script)
                    .build()
                    .map_err(BrowserError::Configuration)?,
            )
            .await?;
        }
        Ok(())
    }
}

impl Drop for BrowserAutomation {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!(
                    profile = %self.profile.id(),
                    "BrowserAutomation dropped without explicit shutdown"
                );
            }
        }
    }
}

/// One browser tab. Implements [`PageHandle`] for the engagement core.
#[derive(Debug)]
pub struct BrowserContext {
    page: Page,
    metrics: Arc<Mutex<AutomationMetrics>>,
    pacer: Mutex<HumanPacer>,
}

impl BrowserContext {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn metrics(&self) -> AutomationMetrics {
        self.metrics.lock().unwrap().clone()
    }

    fn with_metrics<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut AutomationMetrics) -> R,
    {
        let mut guard = self.metrics.lock().unwrap();
        f(&mut guard)
    }

    fn typing_delay(&self) -> Duration {
        self.pacer.lock().unwrap().typing_delay()
    }

    async fn goto(&self, url: &str, wait: WaitPolicy) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        if wait == WaitPolicy::Load {
            self.page.wait_for_navigation().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PageHandle for BrowserContext {
    async fn navigate(&self, url: &str, wait: WaitPolicy, timeout: Duration) -> BrowserResult<()> {
        let result = match with_timeout(timeout, self.goto(url, wait)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(BrowserError::Cdp(err))) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(BrowserError::Timeout(format!("navigation to {url}"))),
        };
        self.with_metrics(|metrics| metrics.record_navigation(result.is_ok()));
        result
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<Value> {
        self.with_metrics(|metrics| metrics.record_evaluation());
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(BrowserError::Configuration)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|err| BrowserError::Script(err.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn read_text(&self, selector: &str) -> BrowserResult<Option<String>> {
        match self.page.find_element(selector).await {
            Ok(element) => Ok(element.inner_text().await?),
            Err(_) => Ok(None),
        }
    }

    async fn click_first(&self, selectors: &[String]) -> BrowserResult<Option<String>> {
        for selector in selectors {
            let Ok(element) = self.page.find_element(selector.as_str()).await else {
                continue;
            };
            if let Err(err) = element.scroll_into_view().await {
                debug!(selector = %selector, error = %err, "scroll into view failed");
            }
            match element.click().await {
                Ok(_) => {
                    self.with_metrics(|metrics| metrics.record_click());
                    return Ok(Some(selector.clone()));
                }
                Err(err) => {
                    debug!(selector = %selector, error = %err, "click failed, trying next candidate");
                }
            }
        }
        Ok(None)
    }

    async fn type_into(&self, selector: &str, text: &str) -> BrowserResult<()> {
        let element = self.page.find_element(selector).await?;
        element.click().await?;
        for ch in text.chars() {
            element.type_str(ch.to_string()).await?;
            let delay = self.typing_delay();
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
        self.with_metrics(|metrics| metrics.record_typed(text.chars().count() as u64));
        Ok(())
    }

    async fn press_key(&self, selector: &str, key: &str) -> BrowserResult<()> {
        let element = self.page.find_element(selector).await?;
        element.press_key(key).await?;
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> BrowserResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                self.with_metrics(|metrics| metrics.record_selector_wait(true));
                return Ok(true);
            }
            if Instant::now() >= deadline {
                self.with_metrics(|metrics| metrics.record_selector_wait(false));
                return Ok(false);
            }
            sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }
}
