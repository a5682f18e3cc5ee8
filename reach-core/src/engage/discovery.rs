use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{
    invoke, scripts, value_as_bool, value_as_f64, HumanPacer, PageHandle, RetryPolicy, WaitPolicy,
};
use crate::config::ReachConfig;

use super::error::{EngageError, EngageResult};
use super::item::{ItemId, PermalinkFilter, SearchCriterion};

/// Source of candidate items for the batch loop.
#[async_trait]
pub trait ItemSource: Send {
    async fn next_batch(
        &mut self,
        page: &dyn PageHandle,
        criterion: &SearchCriterion,
        count: usize,
    ) -> EngageResult<Vec<ItemId>>;

    fn consecutive_failed_scrolls(&self) -> u32 {
        0
    }

    /// Lets long-running sources stop between page operations.
    fn attach_cancellation(&mut self, _cancel: CancellationToken) {}
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionDiscoveryState {
    seen_ids: HashSet<ItemId>,
    on_listing_page: bool,
    current_listing_key: Option<String>,
    consecutive_failed_scrolls: u32,
}

impl SessionDiscoveryState {
    pub fn seen_ids(&self) -> &HashSet<ItemId> {
        &self.seen_ids
    }

    pub fn on_listing_page(&self) -> bool {
        self.on_listing_page
    }

    pub fn current_listing_key(&self) -> Option<&str> {
        self.current_listing_key.as_deref()
    }

    pub fn consecutive_failed_scrolls(&self) -> u32 {
        self.consecutive_failed_scrolls
    }
}

/// Progressive discovery over an infinitely scrolling listing. Every id is
/// returned at most once per instance.
#[derive(Debug)]
pub struct ContentDiscoverer {
    config: Arc<ReachConfig>,
    filter: PermalinkFilter,
    state: SessionDiscoveryState,
    pacer: HumanPacer,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ContentDiscoverer {
    pub fn new(config: Arc<ReachConfig>) -> Self {
        Self {
            filter: PermalinkFilter::from_platform(&config.platform),
            state: SessionDiscoveryState::default(),
            pacer: HumanPacer::new(config.human.clone()),
            retry: RetryPolicy::new(&config.retry),
            cancel: CancellationToken::new(),
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

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> &SessionDiscoveryState {
        &self.state
    }

    pub fn seen_count(&self) -> usize {
        self.state.seen_ids.len()
    }

    pub fn reset(&mut self) {
        self.state = SessionDiscoveryState::default();
    }

    /// Returns up to `target` ids never returned before. A short or exhausted
    /// listing yields fewer, possibly none. The login wall is checked on
    /// entry and after every scroll.
    pub async fn discover(
        &mut self,
        page: &dyn PageHandle,
        criterion: &SearchCriterion,
        target: usize,
    ) -> EngageResult<Vec<ItemId>> {
        if target == 0 {
            return Ok(Vec::new());
        }
        let listing = criterion.listing_url(&self.config.platform)?;
        self.enter_listing(page, &listing).await?;
        self.state.consecutive_failed_scrolls = 0;

        let max_failed = self.config.discovery.max_failed_scrolls;
        let mut found = Vec::with_capacity(target);
        loop {
            if self.cancel.is_cancelled() {
                debug!(found = found.len(), "discovery cancelled");
                return Err(EngageError::Cancelled);
            }
            self.extract(page, target, &mut found).await;
            if found.len() >= target {
                break;
            }
            if self.state.consecutive_failed_scrolls >= max_failed {
                info!(
                    criterion = %criterion,
                    found = found.len(),
                    seen = self.state.seen_ids.len(),
                    "listing exhausted"
                );
                break;
            }
            self.scroll(page).await;
            self.check_login_wall(page).await?;
        }

        debug!(criterion = %criterion, found = found.len(), target, "discovery batch collected");
        Ok(found)
    }

    async fn enter_listing(&mut self, page: &dyn PageHandle, listing: &Url) -> EngageResult<()> {
        let key = listing.as_str().to_string();
        if self.parked_on(page, &key).await {
            return self.check_login_wall(page).await;
        }

        self.state.on_listing_page = false;
        let timeout = Duration::from_secs(self.config.chromium.navigation_timeout_seconds);
        self.retry
            .run("open listing", |_| page.navigate(&key, WaitPolicy::Load, timeout))
            .await
            .map_err(|source| EngageError::ListingUnavailable {
                url: key.clone(),
                source,
            })?;
        self.pacer.settle().await;

        self.check_login_wall(page).await?;
        self.state.current_listing_key = Some(key);
        self.state.on_listing_page = true;

        if self.config.discovery.prefer_recent {
            self.prefer_recent(page).await;
        }
        Ok(())
    }

    async fn parked_on(&self, page: &dyn PageHandle, key: &str) -> bool {
        if !self.state.on_listing_page || self.state.current_listing_key.as_deref() != Some(key) {
            return false;
        }
        match page.current_url().await {
            Ok(current) => same_listing(&current, key),
            Err(_) => false,
        }
    }

    /// A login redirect or overlay anywhere in discovery is fatal. The
    /// listing is treated as left so the next call navigates again.
    async fn check_login_wall(&mut self, page: &dyn PageHandle) -> EngageResult<()> {
        if let Some(reason) = self.login_wall_reason(page).await {
            self.state.on_listing_page = false;
            warn!(reason = %reason, "login wall on listing");
            return Err(EngageError::AuthenticationRequired(reason));
        }
        Ok(())
    }

    async fn login_wall_reason(&self, page: &dyn PageHandle) -> Option<String> {
        let current = page.current_url().await.unwrap_or_default();
        let login_path = self.config.platform.login_path.trim_end_matches('/');
        if Url::parse(&current)
            .map(|url| url.path().starts_with(login_path))
            .unwrap_or(false)
        {
            return Some(format!("listing redirected to {current}"));
        }

        let selectors = &self.config.selectors;
        let args = json!({
            "chrome": selectors.chrome,
            "login_form": selectors.login_form,
            "errors": Vec::<String>::new(),
        });
        match invoke(page, scripts::LOGIN_SIGNALS, &args).await {
            Ok(signals) => {
                let flag = |name: &str| signals.get(name).map(value_as_bool).unwrap_or(false);
                if flag("login_form") && !flag("chrome") {
                    return Some("listing shows a login form".into());
                }
            }
            Err(err) => debug!(error = %err, "login wall probe failed"),
        }
        None
    }

    async fn prefer_recent(&mut self, page: &dyn PageHandle) {
        let args = json!({ "labels": self.config.selectors.recent_tab_labels });
        match invoke(page, scripts::SELECT_RECENT, &args).await {
            Ok(value) if value_as_bool(&value) => {
                debug!("switched listing to most recent");
                self.pacer.settle().await;
            }
            Ok(_) => debug!("no most-recent ordering on this listing"),
            Err(err) => debug!(error = %err, "most-recent refinement failed"),
        }
    }

    async fn extract(&mut self, page: &dyn PageHandle, target: usize, found: &mut Vec<ItemId>) {
        let hrefs = match invoke(page, scripts::COLLECT_LINKS, &Value::Null).await {
            Ok(value) => serde_json::from_value::<Vec<String>>(value).unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "link extraction failed");
                return;
            }
        };
        let base = &self.config.platform.base_url;
        for href in hrefs {
            if found.len() >= target {
                break;
            }
            let Some(item) = ItemId::canonicalize(&href, base) else {
                continue;
            };
            if !self.filter.accepts(&item) {
                continue;
            }
            if self.state.seen_ids.insert(item.clone()) {
                found.push(item);
            }
        }
    }

    async fn scroll(&mut self, page: &dyn PageHandle) {
        let before = self.page_height(page).await;
        if let Err(err) = invoke(page, scripts::SCROLL_TO_BOTTOM, &Value::Null).await {
            debug!(error = %err, "scroll failed");
        }
        self.pacer.scroll_settle().await;
        let after = self.page_height(page).await;

        match (before, after) {
            (Some(before), Some(after)) if after != before => {
                self.state.consecutive_failed_scrolls = 0;
            }
            _ => {
                self.state.consecutive_failed_scrolls += 1;
                debug!(
                    failed_scrolls = self.state.consecutive_failed_scrolls,
                    "listing did not grow"
                );
            }
        }
    }

    async fn page_height(&self, page: &dyn PageHandle) -> Option<f64> {
        invoke(page, scripts::PAGE_HEIGHT, &Value::Null)
            .await
            .ok()
            .as_ref()
            .and_then(value_as_f64)
    }
}

#[async_trait]
impl ItemSource for ContentDiscoverer {
    async fn next_batch(
        &mut self,
        page: &dyn PageHandle,
        criterion: &SearchCriterion,
        count: usize,
    ) -> EngageResult<Vec<ItemId>> {
        self.discover(page, criterion, count).await
    }

    fn consecutive_failed_scrolls(&self) -> u32 {
        self.state.consecutive_failed_scrolls
    }

    fn attach_cancellation(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }
}

fn same_listing(current: &str, key: &str) -> bool {
    let trim = |raw: &str| raw.trim_end_matches('/').to_string();
    trim(current) == trim(key)
}
