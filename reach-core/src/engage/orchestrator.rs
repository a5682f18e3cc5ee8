use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::{HumanPacer, PageHandle};
use crate::config::ReachConfig;
use crate::llm::ReplyComposer;

use super::discovery::ItemSource;
use super::error::{EngageError, EngageResult};
use super::executor::{
    ActionExecutor, ActionOutcome, ActionPlan, ActionStatus, ExecutorMetrics, NavigationState,
};
use super::item::{ItemId, SearchCriterion};
use super::login::{Credentials, LoginGate};
use super::progress::{ProgressEvent, ProgressReporter, ProgressStatus};
use super::quality::{ContentGate, GateDecision};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub consecutive_empty_batches: u32,
    pub consecutive_failed_scrolls: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    TargetReached,
    Exhausted,
    Cancelled,
    Failed,
}

impl RunStatus {
    fn progress(&self) -> ProgressStatus {
        match self {
            RunStatus::TargetReached => ProgressStatus::Finished,
            RunStatus::Exhausted => ProgressStatus::Exhausted,
            RunStatus::Cancelled => ProgressStatus::Cancelled,
            RunStatus::Failed => ProgressStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub message: String,
    pub criterion: SearchCriterion,
    pub plan: ActionPlan,
    pub target: usize,
    pub counters: RunCounters,
    pub errors: Vec<String>,
    pub metrics: ExecutorMetrics,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Only a fatal error is a failed run; exhaustion and cancellation are
    /// normal ends.
    pub fn is_success(&self) -> bool {
        self.status != RunStatus::Failed
    }
}

/// Drives discovery into the executor until the target is reached, the
/// listing is exhausted, a fatal error occurs or the run is cancelled.
pub struct Orchestrator {
    config: Arc<ReachConfig>,
    page: Arc<dyn PageHandle>,
    source: Box<dyn ItemSource>,
    executor: ActionExecutor,
    composer: ReplyComposer,
    gate: ContentGate,
    reporter: Arc<dyn ProgressReporter>,
    pacer: HumanPacer,
    cancel: CancellationToken,
}

struct RunContext<'a> {
    criterion: &'a SearchCriterion,
    plan: ActionPlan,
    target: usize,
}

impl Orchestrator {
    pub fn new(
        config: Arc<ReachConfig>,
        page: Arc<dyn PageHandle>,
        source: Box<dyn ItemSource>,
        executor: ActionExecutor,
        composer: ReplyComposer,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            gate: ContentGate::new(&config),
            pacer: HumanPacer::new(config.human.clone()),
            config,
            page,
            source,
            executor,
            composer,
            reporter,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_pacer(mut self, pacer: HumanPacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_gate(mut self, gate: ContentGate) -> Self {
        self.gate = gate;
        self
    }

    /// Shares the token with the executor and the item source so strategy
    /// and scroll loops stop too.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.executor = self.executor.with_cancellation(cancel.clone());
        self.source.attach_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Authenticates once, then runs the batch loop.
    pub async fn run_session(
        &mut self,
        gate: &mut LoginGate,
        credentials: Option<&Credentials>,
        criterion: &SearchCriterion,
        plan: ActionPlan,
        target: usize,
    ) -> RunSummary {
        let started_at = Utc::now();
        let page = Arc::clone(&self.page);
        if let Err(err) = gate.ensure_authenticated(page.as_ref(), credentials).await {
            let ctx = RunContext {
                criterion,
                plan,
                target,
            };
            let message = err.to_string();
            warn!(error = %err, "authentication failed, run not started");
            return self.finish(
                &ctx,
                Uuid::new_v4().to_string(),
                started_at,
                RunStatus::Failed,
                message.clone(),
                RunCounters::default(),
                vec![message],
            );
        }
        self.run_batch_loop(criterion, plan, target).await
    }

    pub async fn run_batch_loop(
        &mut self,
        criterion: &SearchCriterion,
        plan: ActionPlan,
        target: usize,
    ) -> RunSummary {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let ctx = RunContext {
            criterion,
            plan,
            target,
        };
        let mut counters = RunCounters::default();
        let mut errors = Vec::new();

        info!(run_id = %run_id, criterion = %criterion, plan = %plan, target, "run started");
        self.emit(&ctx, &counters, ProgressStatus::Started, format!("searching {criterion}"), None);

        let page = Arc::clone(&self.page);
        let page = page.as_ref();
        let max_batch = self.config.orchestrator.max_batch_size;
        let max_empty = self.config.orchestrator.max_empty_batches;

        let (status, message) = 'run: loop {
            if self.cancel.is_cancelled() {
                break 'run (RunStatus::Cancelled, "run cancelled".to_string());
            }
            if counters.succeeded >= target {
                break 'run (RunStatus::TargetReached, target_message(&counters));
            }

            let remaining = target - counters.succeeded;
            let batch_size = max_batch.min(remaining.saturating_mul(2)).max(1);
            let batch = match self.source.next_batch(page, criterion, batch_size).await {
                Ok(batch) => batch,
                Err(EngageError::Cancelled) => {
                    break 'run (RunStatus::Cancelled, "run cancelled".to_string());
                }
                Err(err) => {
                    errors.push(err.to_string());
                    break 'run (RunStatus::Failed, err.to_string());
                }
            };
            counters.consecutive_failed_scrolls = self.source.consecutive_failed_scrolls();

            if batch.is_empty() {
                counters.consecutive_empty_batches += 1;
                debug!(
                    empty_batches = counters.consecutive_empty_batches,
                    failed_scrolls = counters.consecutive_failed_scrolls,
                    "discovery returned nothing new"
                );
                if counters.consecutive_empty_batches >= max_empty {
                    break 'run (
                        RunStatus::Exhausted,
                        format!(
                            "no new items after {} attempts; {} of {} done",
                            counters.consecutive_empty_batches, counters.succeeded, target
                        ),
                    );
                }
                self.emit(
                    &ctx,
                    &counters,
                    ProgressStatus::Searching,
                    "no new items yet, searching further",
                    None,
                );
                continue;
            }
            counters.consecutive_empty_batches = 0;

            let batch_len = batch.len();
            for (index, item) in batch.into_iter().enumerate() {
                if self.cancel.is_cancelled() {
                    break 'run (RunStatus::Cancelled, "run cancelled".to_string());
                }

                match self.process_item(page, &item, plan).await {
                    Ok(outcome) => self.account(&ctx, &mut counters, &mut errors, &outcome),
                    Err(EngageError::Cancelled) => {
                        break 'run (RunStatus::Cancelled, "run cancelled".to_string());
                    }
                    Err(err) if err.is_fatal() => {
                        errors.push(format!("{item}: {err}"));
                        break 'run (RunStatus::Failed, err.to_string());
                    }
                    Err(err) => {
                        counters.attempted += 1;
                        counters.failed += 1;
                        errors.push(format!("{item}: {err}"));
                        warn!(item = %item, error = %err, "item failed");
                        self.emit(&ctx, &counters, ProgressStatus::Failed, err.to_string(), Some(&item));
                    }
                }

                if counters.succeeded >= target {
                    break 'run (RunStatus::TargetReached, target_message(&counters));
                }
                if index + 1 < batch_len {
                    self.pacer.between_items().await;
                }
            }
            self.pacer.between_items().await;
        };

        self.finish(&ctx, run_id, started_at, status, message, counters, errors)
    }

    async fn process_item(
        &mut self,
        page: &dyn PageHandle,
        item: &ItemId,
        plan: ActionPlan,
    ) -> EngageResult<ActionOutcome> {
        if plan.includes_reply() {
            match self.executor.has_replied(item).await {
                Ok(true) => {
                    return Ok(ActionOutcome::skipped(item, plan.primary(), "already replied"));
                }
                Ok(false) => {}
                Err(err) => {
                    return Ok(ActionOutcome::failed(
                        item,
                        plan.primary(),
                        format!("prior-action lookup failed: {err}"),
                    ));
                }
            }
        }

        let mut nav = NavigationState::default();
        self.executor.open_item(page, item, &mut nav).await?;
        let content = self.gate.inspect(page).await;
        if let Some(content) = &content {
            if let GateDecision::Skip(reason) = self.gate.decide(content) {
                return Ok(ActionOutcome::skipped(item, plan.primary(), reason));
            }
        }

        let mut primary = None;
        if plan.includes_favorite() {
            let outcome = self.executor.favorite(page, item, &mut nav).await?;
            if !outcome.success() {
                debug!(item = %item, "favorite did not stick");
            }
            primary = Some(outcome);
        }
        if plan.includes_reply() {
            let text = content.map(|content| content.text).unwrap_or_default();
            let reply = self.composer.compose(&text).await;
            primary = Some(self.executor.reply(page, item, &reply, &mut nav).await?);
        }
        Ok(primary.unwrap_or_else(|| ActionOutcome::skipped(item, plan.primary(), "nothing planned")))
    }

    fn account(
        &self,
        ctx: &RunContext<'_>,
        counters: &mut RunCounters,
        errors: &mut Vec<String>,
        outcome: &ActionOutcome,
    ) {
        let (status, message) = match &outcome.status {
            ActionStatus::Succeeded => {
                counters.attempted += 1;
                counters.succeeded += 1;
                (
                    ProgressStatus::Succeeded,
                    format!("{} done ({}/{})", outcome.action, counters.succeeded, ctx.target),
                )
            }
            ActionStatus::Skipped(reason) => {
                counters.skipped += 1;
                (ProgressStatus::Skipped, format!("skipped: {reason}"))
            }
            ActionStatus::Failed(reason) => {
                counters.attempted += 1;
                counters.failed += 1;
                errors.push(format!("{}: {reason}", outcome.item));
                (ProgressStatus::Failed, format!("{} failed: {reason}", outcome.action))
            }
        };
        self.emit(ctx, counters, status, message, Some(&outcome.item));
    }

    fn emit(
        &self,
        ctx: &RunContext<'_>,
        counters: &RunCounters,
        status: ProgressStatus,
        message: impl Into<String>,
        item: Option<&ItemId>,
    ) {
        let mut event = ProgressEvent::new(message, ctx.plan, status, ctx.target, counters.succeeded);
        if let Some(item) = item {
            event = event.with_item(item);
        }
        self.reporter.report(event);
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        ctx: &RunContext<'_>,
        run_id: String,
        started_at: DateTime<Utc>,
        status: RunStatus,
        message: String,
        counters: RunCounters,
        errors: Vec<String>,
    ) -> RunSummary {
        self.emit(ctx, &counters, status.progress(), message.clone(), None);
        info!(
            run_id = %run_id,
            status = ?status,
            succeeded = counters.succeeded,
            failed = counters.failed,
            skipped = counters.skipped,
            attempted = counters.attempted,
            "run finished"
        );
        RunSummary {
            run_id,
            status,
            message,
            criterion: ctx.criterion.clone(),
            plan: ctx.plan,
            target: ctx.target,
            counters,
            errors,
            metrics: self.executor.metrics().clone(),
            started_at,
            finished_at: Utc::now(),
        }
    }
}

fn target_message(counters: &RunCounters) -> String {
    format!("target reached: {} succeeded", counters.succeeded)
}
