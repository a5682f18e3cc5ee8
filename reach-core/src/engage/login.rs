use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{invoke, scripts, HumanPacer, PageHandle, RetryPolicy, WaitPolicy};
use crate::config::ReachConfig;

use super::error::{EngageError, EngageResult};
use super::item::same_site;

pub const USERNAME_ENV: &str = "REACH_USERNAME";
pub const PASSWORD_ENV: &str = "REACH_PASSWORD";

const LOGIN_TITLE_MARKERS: [&str; 3] = ["login", "log in", "sign up"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    Unknown,
    Authenticated,
    Unauthenticated,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads `REACH_USERNAME` / `REACH_PASSWORD`. Both must be set and non-empty.
    pub fn from_env() -> Option<Self> {
        let username = std::env::var(USERNAME_ENV).ok()?;
        let password = std::env::var(PASSWORD_ENV).ok()?;
        if username.trim().is_empty() || password.is_empty() {
            return None;
        }
        Some(Self::new(username.trim(), password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// What the page shows about the session, as read by the login probe script.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginSignals {
    #[serde(default)]
    pub chrome: bool,
    #[serde(default)]
    pub login_form: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub error_text: Option<String>,
}

/// Four independent checks, all of which must hold for an authenticated
/// session.
pub fn classify(url: &str, signals: &LoginSignals, login_path: &str) -> LoginState {
    let on_login_route = Url::parse(url)
        .map(|parsed| parsed.path().starts_with(login_path.trim_end_matches('/')))
        .unwrap_or(false);
    let title = signals.title.to_lowercase();
    let login_title = LOGIN_TITLE_MARKERS
        .iter()
        .any(|marker| title.contains(marker));
    if signals.chrome && !signals.login_form && !on_login_route && !login_title {
        LoginState::Authenticated
    } else {
        LoginState::Unauthenticated
    }
}

#[derive(Debug, Clone)]
pub struct LoginGate {
    config: Arc<ReachConfig>,
    pacer: HumanPacer,
    retry: RetryPolicy,
}

impl LoginGate {
    pub fn new(config: Arc<ReachConfig>) -> Self {
        Self {
            pacer: HumanPacer::new(config.human.clone()),
            retry: RetryPolicy::new(&config.retry),
            config,
        }
    }

    pub fn with_pacer(mut self, pacer: HumanPacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reads the page signals. Never cached: every call probes the page.
    pub async fn probe(&self, page: &dyn PageHandle) -> (LoginState, Option<LoginSignals>) {
        let selectors = &self.config.selectors;
        let args = json!({
            "chrome": selectors.chrome,
            "login_form": selectors.login_form,
            "errors": selectors.login_error,
        });
        let signals = match invoke(page, scripts::LOGIN_SIGNALS, &args).await {
            Ok(value) => match serde_json::from_value::<LoginSignals>(value) {
                Ok(signals) => signals,
                Err(err) => {
                    debug!(error = %err, "unexpected login probe result");
                    return (LoginState::Unknown, None);
                }
            },
            Err(err) => {
                debug!(error = %err, "login probe failed");
                return (LoginState::Unknown, None);
            }
        };
        let url = page.current_url().await.unwrap_or_default();
        let state = classify(&url, &signals, &self.config.platform.login_path);
        (state, Some(signals))
    }

    pub async fn login_state(&self, page: &dyn PageHandle) -> LoginState {
        self.probe(page).await.0
    }

    /// Returns `true` once the session is authenticated, logging in with
    /// `credentials` when needed.
    pub async fn ensure_authenticated(
        &mut self,
        page: &dyn PageHandle,
        credentials: Option<&Credentials>,
    ) -> EngageResult<bool> {
        let home = self.config.platform.base_url.clone();
        let current = page.current_url().await.unwrap_or_default();
        if !self.on_platform(&current) {
            self.open(page, home.as_str()).await?;
        }

        if self.login_state(page).await == LoginState::Authenticated {
            info!("existing session is authenticated");
            return Ok(true);
        }

        let Some(credentials) = credentials else {
            return Err(EngageError::Authentication(
                "session is not authenticated and no credentials were provided".into(),
            ));
        };
        self.submit_credentials(page, credentials).await?;

        let (state, signals) = self.probe(page).await;
        if state == LoginState::Authenticated {
            info!(username = %credentials.username, "logged in");
            return Ok(true);
        }
        let detail = signals
            .and_then(|signals| signals.error_text)
            .unwrap_or_else(|| {
                "login state could not be detected after submitting credentials".into()
            });
        warn!(username = %credentials.username, detail = %detail, "login rejected");
        Err(EngageError::Authentication(detail))
    }

    async fn submit_credentials(
        &mut self,
        page: &dyn PageHandle,
        credentials: &Credentials,
    ) -> EngageResult<()> {
        let login_url = self
            .config
            .platform
            .base_url
            .join(&self.config.platform.login_path)
            .map_err(|err| EngageError::Authentication(format!("bad login route: {err}")))?;
        self.open(page, login_url.as_str()).await?;

        let selectors = &self.config.selectors;
        let timeout = Duration::from_millis(self.config.chromium.selector_timeout_ms);
        let form_ready = page
            .wait_for(&selectors.username_input, timeout)
            .await
            .unwrap_or(false);
        if !form_ready {
            return Err(EngageError::Authentication("login form not found".into()));
        }

        let typed = async {
            page.type_into(&selectors.username_input, &credentials.username)
                .await?;
            page.type_into(&selectors.password_input, &credentials.password)
                .await?;
            if page.click_first(&selectors.login_submit).await?.is_none() {
                page.press_key(&selectors.password_input, "Enter").await?;
            }
            Ok::<_, crate::browser::BrowserError>(())
        };
        typed
            .await
            .map_err(|err| EngageError::Authentication(format!("credential entry failed: {err}")))?;

        self.pacer.settle().await;
        self.pacer.settle().await;
        match invoke(
            page,
            scripts::DISMISS_INTERSTITIALS,
            &json!({ "labels": selectors.interstitial_labels }),
        )
        .await
        {
            Ok(dismissed) => debug!(dismissed = %dismissed, "interstitials handled"),
            Err(err) => debug!(error = %err, "interstitial dismissal failed"),
        }
        self.pacer.settle().await;
        Ok(())
    }

    async fn open(&mut self, page: &dyn PageHandle, url: &str) -> EngageResult<()> {
        let timeout = Duration::from_secs(self.config.chromium.navigation_timeout_seconds);
        self.retry
            .run("open login page", |_| page.navigate(url, WaitPolicy::Load, timeout))
            .await
            .map_err(|err| EngageError::Authentication(format!("failed to open {url}: {err}")))?;
        self.pacer.settle().await;
        Ok(())
    }

    fn on_platform(&self, current: &str) -> bool {
        let Ok(url) = Url::parse(current) else {
            return false;
        };
        let expected = self.config.platform.base_url.host_str().unwrap_or_default();
        url.host_str()
            .map(|host| same_site(&host.to_lowercase(), &expected.to_lowercase()))
            .unwrap_or(false)
    }
}
