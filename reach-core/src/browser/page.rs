use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::error::{BrowserError, BrowserResult};

/// How long `navigate` waits once the request is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Wait for the load event of the new document.
    #[default]
    Load,
    /// Return as soon as the navigation is committed.
    Commit,
}

/// Capability set the engagement core drives a remote page through.
///
/// Implementations are not expected to support concurrent use; a run owns
/// its handle and calls it sequentially.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn navigate(&self, url: &str, wait: WaitPolicy, timeout: Duration) -> BrowserResult<()>;

    /// Evaluates a script expression in the page and returns its JSON value.
    /// Promises are awaited.
    async fn evaluate(&self, script: &str) -> BrowserResult<Value>;

    async fn read_text(&self, selector: &str) -> BrowserResult<Option<String>>;

    /// Clicks the first selector that resolves to an element and returns it.
    async fn click_first(&self, selectors: &[String]) -> BrowserResult<Option<String>>;

    async fn type_into(&self, selector: &str, text: &str) -> BrowserResult<()>;

    async fn press_key(&self, selector: &str, key: &str) -> BrowserResult<()>;

    async fn current_url(&self) -> BrowserResult<String>;

    async fn wait_for(&self, selector: &str, timeout: Duration) -> BrowserResult<bool>;
}

/// Calls the function expression `body` with `args` serialized as its single
/// argument.
pub async fn invoke<A>(page: &dyn PageHandle, body: &str, args: &A) -> BrowserResult<Value>
where
    A: Serialize + ?Sized,
{
    let args = serde_json::to_string(args)
        .map_err(|err| BrowserError::Script(format!("failed to encode script arguments: {err}")))?;
    page.evaluate(&format!("({body})({args})")).await
}

pub(crate) fn value_as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Object(map) => map.get("ok").map(value_as_bool).unwrap_or(false),
        _ => false,
    }
}

pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    value.as_f64().or_else(|| value.as_u64().map(|v| v as f64))
}
