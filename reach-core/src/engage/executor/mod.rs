//! Favorite and reply actions with ordered fallback strategies and post-hoc
//! verification.

mod favorite;
mod reply;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::{
    invoke, scripts, value_as_bool, BrowserResult, HumanPacer, PageHandle, RetryPolicy, WaitPolicy,
};
use crate::config::ReachConfig;

use super::cache::PriorActionCache;
use super::error::{EngageError, EngageResult};
use super::item::ItemId;

pub use favorite::{default_favorite_strategies, ControlClickFavorite, EndpointFavorite};
pub use reply::{
    default_submit_strategies, AriaLabeledControl, KeySubmit, ProximityControl, SubmitTarget,
    SubmitTypedControl, TextMatchedButton,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Favorite,
    Reply,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Favorite => "favorite",
            ActionKind::Reply => "reply",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which actions a run applies to each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPlan {
    Favorite,
    Reply,
    Both,
}

impl ActionPlan {
    pub fn includes_favorite(&self) -> bool {
        matches!(self, ActionPlan::Favorite | ActionPlan::Both)
    }

    pub fn includes_reply(&self) -> bool {
        matches!(self, ActionPlan::Reply | ActionPlan::Both)
    }

    /// The action whose success makes an item count toward the target.
    pub fn primary(&self) -> ActionKind {
        if self.includes_reply() {
            ActionKind::Reply
        } else {
            ActionKind::Favorite
        }
    }
}

impl fmt::Display for ActionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionPlan::Favorite => "favorite",
            ActionPlan::Reply => "reply",
            ActionPlan::Both => "both",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub item: ItemId,
    pub action: ActionKind,
    pub status: ActionStatus,
    pub strategy: Option<&'static str>,
}

impl ActionOutcome {
    pub fn succeeded(item: &ItemId, action: ActionKind, strategy: &'static str) -> Self {
        Self {
            item: item.clone(),
            action,
            status: ActionStatus::Succeeded,
            strategy: Some(strategy),
        }
    }

    pub fn skipped(item: &ItemId, action: ActionKind, reason: impl Into<String>) -> Self {
        Self {
            item: item.clone(),
            action,
            status: ActionStatus::Skipped(reason.into()),
            strategy: None,
        }
    }

    pub fn failed(item: &ItemId, action: ActionKind, reason: impl Into<String>) -> Self {
        Self {
            item: item.clone(),
            action,
            status: ActionStatus::Failed(reason.into()),
            strategy: None,
        }
    }

    pub fn success(&self) -> bool {
        self.status == ActionStatus::Succeeded
    }

    pub fn skipped_reason(&self) -> Option<&str> {
        match &self.status {
            ActionStatus::Skipped(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            ActionStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Which item the page currently shows. Shared between the favorite and the
/// reply call for the same item so the second call does not reload.
#[derive(Debug, Clone, Default)]
pub struct NavigationState {
    current: Option<ItemId>,
}

impl NavigationState {
    pub fn is_on(&self, item: &ItemId) -> bool {
        self.current.as_ref() == Some(item)
    }

    pub fn mark(&mut self, item: &ItemId) {
        self.current = Some(item.clone());
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Applied,
    NotApplicable(String),
}

/// One way of performing a step against a UI that changes often. Lists of
/// strategies are tried in order until one applies.
#[async_trait]
pub trait Strategy<T: ?Sized + Sync>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, page: &dyn PageHandle, target: &T) -> BrowserResult<StrategyOutcome>;

    /// Whether the page must be reloaded before the outcome becomes visible.
    fn needs_reload(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutorMetrics {
    pub favorites_verified: u64,
    pub favorites_already_set: u64,
    pub favorite_failures: u64,
    pub replies_posted: u64,
    pub replies_skipped: u64,
    pub reply_failures: u64,
    pub verification_failures: u64,
    pub strategy_wins: BTreeMap<String, u64>,
}

impl ExecutorMetrics {
    fn record_win(&mut self, strategy: &str) {
        *self.strategy_wins.entry(strategy.to_string()).or_default() += 1;
    }
}

pub struct ActionExecutor {
    config: Arc<ReachConfig>,
    account: String,
    cache: Arc<dyn PriorActionCache>,
    favorited: HashSet<ItemId>,
    favorite_strategies: Vec<Box<dyn Strategy<ItemId>>>,
    submit_strategies: Vec<Box<dyn Strategy<SubmitTarget>>>,
    retry: RetryPolicy,
    pacer: HumanPacer,
    cancel: CancellationToken,
    metrics: ExecutorMetrics,
}

impl fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("account", &self.account)
            .field("favorited", &self.favorited.len())
            .field(
                "favorite_strategies",
                &self.favorite_strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field(
                "submit_strategies",
                &self.submit_strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ActionExecutor {
    pub fn new(
        config: Arc<ReachConfig>,
        account: impl Into<String>,
        cache: Arc<dyn PriorActionCache>,
    ) -> Self {
        let favorite_strategies = default_favorite_strategies(&config);
        let submit_strategies = default_submit_strategies(&config);
        Self {
            retry: RetryPolicy::new(&config.retry),
            pacer: HumanPacer::new(config.human.clone()),
            config,
            account: account.into(),
            cache,
            favorited: HashSet::new(),
            favorite_strategies,
            submit_strategies,
            cancel: CancellationToken::new(),
            metrics: ExecutorMetrics::default(),
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

    pub fn with_favorite_strategies(mut self, strategies: Vec<Box<dyn Strategy<ItemId>>>) -> Self {
        self.favorite_strategies = strategies;
        self
    }

    pub fn with_submit_strategies(
        mut self,
        strategies: Vec<Box<dyn Strategy<SubmitTarget>>>,
    ) -> Self {
        self.submit_strategies = strategies;
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn metrics(&self) -> &ExecutorMetrics {
        &self.metrics
    }

    pub fn is_known_favorite(&self, item: &ItemId) -> bool {
        self.favorited.contains(item)
    }

    pub async fn has_replied(&self, item: &ItemId) -> EngageResult<bool> {
        self.cache.has_prior_action(&self.account, item).await
    }

    /// Navigates to `item` unless `nav` says the page already shows it.
    pub async fn open_item(
        &mut self,
        page: &dyn PageHandle,
        item: &ItemId,
        nav: &mut NavigationState,
    ) -> EngageResult<()> {
        if nav.is_on(item) {
            return Ok(());
        }
        nav.clear();
        self.load(page, item).await?;
        nav.mark(item);
        self.pacer.settle().await;
        Ok(())
    }

    async fn load(&self, page: &dyn PageHandle, item: &ItemId) -> EngageResult<()> {
        let timeout = self.navigation_timeout();
        self.retry
            .run("open item", |_| page.navigate(item.as_str(), WaitPolicy::Load, timeout))
            .await
            .map_err(|source| EngageError::Navigation {
                url: item.to_string(),
                source,
            })?;
        Ok(())
    }

    pub async fn favorite(
        &mut self,
        page: &dyn PageHandle,
        item: &ItemId,
        nav: &mut NavigationState,
    ) -> EngageResult<ActionOutcome> {
        if self.favorited.contains(item) {
            debug!(item = %item, "favorite already applied in this run");
            return Ok(ActionOutcome::succeeded(item, ActionKind::Favorite, "known"));
        }

        self.open_item(page, item, nav).await?;
        if self.is_favorited(page).await {
            self.favorited.insert(item.clone());
            self.metrics.favorites_already_set += 1;
            return Ok(ActionOutcome::succeeded(item, ActionKind::Favorite, "already-set"));
        }

        for strategy in &self.favorite_strategies {
            if self.cancel.is_cancelled() {
                return Err(EngageError::Cancelled);
            }
            match strategy.attempt(page, item).await {
                Ok(StrategyOutcome::Applied) => {
                    self.pacer.settle().await;
                    if strategy.needs_reload() {
                        if let Err(err) = self.load(page, item).await {
                            debug!(strategy = strategy.name(), error = %err, "reload after favorite failed");
                            continue;
                        }
                        self.pacer.settle().await;
                    }
                    if self.is_favorited(page).await {
                        self.favorited.insert(item.clone());
                        self.metrics.favorites_verified += 1;
                        self.metrics.record_win(strategy.name());
                        info!(item = %item, strategy = strategy.name(), "favorite verified");
                        return Ok(ActionOutcome::succeeded(
                            item,
                            ActionKind::Favorite,
                            strategy.name(),
                        ));
                    }
                    debug!(strategy = strategy.name(), "favorite applied but not visible");
                }
                Ok(StrategyOutcome::NotApplicable(reason)) => {
                    debug!(strategy = strategy.name(), reason = %reason, "favorite strategy not applicable");
                }
                Err(err) => {
                    debug!(strategy = strategy.name(), error = %err, "favorite strategy failed");
                }
            }
        }

        self.metrics.favorite_failures += 1;
        let reason = "favorite could not be verified";
        self.note_failure(item, ActionKind::Favorite, reason).await;
        Ok(ActionOutcome::failed(item, ActionKind::Favorite, reason))
    }

    pub async fn reply(
        &mut self,
        page: &dyn PageHandle,
        item: &ItemId,
        text: &str,
        nav: &mut NavigationState,
    ) -> EngageResult<ActionOutcome> {
        match self.cache.has_prior_action(&self.account, item).await {
            Ok(true) => {
                self.metrics.replies_skipped += 1;
                return Ok(ActionOutcome::skipped(item, ActionKind::Reply, "already replied"));
            }
            Ok(false) => {}
            Err(err) => {
                warn!(item = %item, error = %err, "prior-action lookup failed, not replying");
                self.metrics.reply_failures += 1;
                return Ok(ActionOutcome::failed(
                    item,
                    ActionKind::Reply,
                    format!("prior-action lookup failed: {err}"),
                ));
            }
        }

        let text = text.trim();
        if text.is_empty() {
            self.metrics.reply_failures += 1;
            return Ok(ActionOutcome::failed(item, ActionKind::Reply, "reply text is empty"));
        }

        self.open_item(page, item, nav).await?;

        let Some(input) = self.locate_input(page).await else {
            return Ok(self.reply_failed(item, "reply input not found").await);
        };
        if let Err(err) = self.enter_text(page, &input, text).await {
            let reason = format!("typing into reply input failed: {err}");
            return Ok(self.reply_failed(item, &reason).await);
        }

        let target = SubmitTarget {
            input_selector: input.clone(),
            text: text.to_string(),
        };
        let mut submitted_by = None;
        for strategy in &self.submit_strategies {
            if self.cancel.is_cancelled() {
                return Err(EngageError::Cancelled);
            }
            match strategy.attempt(page, &target).await {
                Ok(StrategyOutcome::Applied) => {
                    submitted_by = Some(strategy.name());
                    break;
                }
                Ok(StrategyOutcome::NotApplicable(reason)) => {
                    debug!(strategy = strategy.name(), reason = %reason, "submit strategy not applicable");
                }
                Err(err) => {
                    debug!(strategy = strategy.name(), error = %err, "submit strategy failed");
                }
            }
        }
        let Some(strategy) = submitted_by else {
            return Ok(self.reply_failed(item, "submit control not found").await);
        };

        self.pacer.settle().await;
        if !self.reply_visible(page, &input, text).await {
            self.metrics.verification_failures += 1;
            return Ok(self.reply_failed(item, "reply verification failed").await);
        }

        if let Err(err) = self.cache.record_action(&self.account, item, text).await {
            warn!(item = %item, error = %err, "reply posted but could not be recorded");
        }
        self.metrics.replies_posted += 1;
        self.metrics.record_win(strategy);
        info!(item = %item, strategy, "reply posted");
        Ok(ActionOutcome::succeeded(item, ActionKind::Reply, strategy))
    }

    async fn reply_failed(&mut self, item: &ItemId, reason: &str) -> ActionOutcome {
        self.metrics.reply_failures += 1;
        self.note_failure(item, ActionKind::Reply, reason).await;
        ActionOutcome::failed(item, ActionKind::Reply, reason)
    }

    async fn note_failure(&self, item: &ItemId, action: ActionKind, reason: &str) {
        warn!(item = %item, action = %action, reason, "action failed");
        if let Err(err) = self
            .cache
            .record_failure(&self.account, item, action, reason)
            .await
        {
            debug!(error = %err, "failed to record action failure");
        }
    }

    async fn is_favorited(&self, page: &dyn PageHandle) -> bool {
        let args = json!({ "markers": self.config.selectors.favorited_markers });
        match invoke(page, scripts::FAVORITE_STATE, &args).await {
            Ok(value) => value_as_bool(&value),
            Err(err) => {
                debug!(error = %err, "favorite state probe failed");
                false
            }
        }
    }

    async fn locate_input(&mut self, page: &dyn PageHandle) -> Option<String> {
        if let Some(found) = self.find_input(page).await {
            return Some(found);
        }
        debug!("reply input not visible, scrolling once");
        if let Err(err) = invoke(page, scripts::SCROLL_BY, &json!({ "delta": 600 })).await {
            debug!(error = %err, "scroll before input retry failed");
        }
        self.pacer.scroll_settle().await;
        self.find_input(page).await
    }

    async fn find_input(&self, page: &dyn PageHandle) -> Option<String> {
        let timeout = Duration::from_millis(self.config.chromium.selector_timeout_ms);
        for selector in &self.config.selectors.reply_inputs {
            match page.wait_for(selector, timeout).await {
                Ok(true) => return Some(selector.clone()),
                Ok(false) => {}
                Err(err) => debug!(selector = %selector, error = %err, "input probe failed"),
            }
        }
        None
    }

    async fn enter_text(&self, page: &dyn PageHandle, input: &str, text: &str) -> BrowserResult<()> {
        page.type_into(input, text).await?;
        if self.input_matches(page, input, text).await {
            return Ok(());
        }
        debug!(selector = input, "typed text did not stick, retyping");
        invoke(page, scripts::CLEAR_INPUT, &json!({ "selector": input })).await?;
        page.type_into(input, text).await
    }

    async fn input_value(&self, page: &dyn PageHandle, input: &str) -> Option<String> {
        invoke(page, scripts::INPUT_VALUE, &json!({ "selector": input }))
            .await
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
    }

    async fn input_matches(&self, page: &dyn PageHandle, input: &str, text: &str) -> bool {
        self.input_value(page, input)
            .await
            .map(|value| normalize(&value) == normalize(text))
            .unwrap_or(false)
    }

    async fn reply_visible(&self, page: &dyn PageHandle, input: &str, text: &str) -> bool {
        if let Some(value) = self.input_value(page, input).await {
            if value.trim().is_empty() {
                return true;
            }
        }
        invoke(page, scripts::TEXT_RENDERED, &json!({ "text": text }))
            .await
            .map(|value| value_as_bool(&value))
            .unwrap_or(false)
    }

    fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.config.chromium.navigation_timeout_seconds)
    }
}

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
