//! Discovery, deduplication and idempotent engagement on top of a
//! [`PageHandle`](crate::browser::PageHandle).

mod cache;
mod discovery;
mod error;
pub mod executor;
mod item;
mod login;
mod orchestrator;
mod progress;
mod quality;

pub use cache::{
    LedgerCounts, LedgerEntry, LedgerError, LedgerResult, MemoryActionCache, PriorActionCache,
    SqliteActionLedger,
};
pub use discovery::{ContentDiscoverer, ItemSource, SessionDiscoveryState};
pub use error::{EngageError, EngageResult};
pub use executor::{
    ActionExecutor, ActionKind, ActionOutcome, ActionPlan, ActionStatus, ExecutorMetrics,
    NavigationState, Strategy, StrategyOutcome,
};
pub use item::{ItemId, PermalinkFilter, SearchCriterion};
pub use login::{classify, Credentials, LoginGate, LoginSignals, LoginState, PASSWORD_ENV, USERNAME_ENV};
pub use orchestrator::{Orchestrator, RunCounters, RunStatus, RunSummary};
pub use progress::{ChannelReporter, ProgressEvent, ProgressReporter, ProgressStatus, TracingReporter};
pub use quality::{word_count, ContentGate, GateDecision, ItemContent};
