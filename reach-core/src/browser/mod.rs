mod automation;
mod error;
mod human;
mod metrics;
mod page;
mod profile;
mod retry;
pub mod scripts;

pub use automation::{BrowserAutomation, BrowserContext, BrowserLauncher, LaunchOverrides};
pub use error::{BrowserError, BrowserResult};
pub use human::HumanPacer;
pub use metrics::AutomationMetrics;
pub use page::{invoke, PageHandle, WaitPolicy};
pub(crate) use page::{value_as_bool, value_as_f64};
pub use profile::{BrowserProfile, SessionProfiles};
pub use retry::{RetryOutcome, RetryPolicy};
