pub mod browser;
pub mod config;
pub mod engage;
pub mod error;
pub mod llm;

pub use browser::{
    BrowserAutomation, BrowserContext, BrowserError, BrowserLauncher, BrowserResult, HumanPacer,
    LaunchOverrides, PageHandle, RetryPolicy, SessionProfiles, WaitPolicy,
};
pub use config::{load_reach_config, ReachConfig};
pub use engage::{
    ActionExecutor, ActionKind, ActionOutcome, ActionPlan, ChannelReporter, ContentDiscoverer,
    Credentials, EngageError, EngageResult, ItemId, LoginGate, LoginState, MemoryActionCache,
    Orchestrator, PriorActionCache, ProgressEvent, ProgressReporter, RunCounters, RunStatus,
    RunSummary, SearchCriterion, SqliteActionLedger, TracingReporter,
};
pub use error::{ConfigError, Result};
pub use llm::{LlmError, OpenAiTextGenerator, ReplyComposer, TextGenerator};
