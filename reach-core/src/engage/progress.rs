use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::executor::ActionPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Started,
    Searching,
    Succeeded,
    Skipped,
    Failed,
    Finished,
    Exhausted,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub message: String,
    pub action: ActionPlan,
    pub status: ProgressStatus,
    pub target: usize,
    pub completed: usize,
    pub item: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        message: impl Into<String>,
        action: ActionPlan,
        status: ProgressStatus,
        target: usize,
        completed: usize,
    ) -> Self {
        Self {
            message: message.into(),
            action,
            status,
            target,
            completed,
            item: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_item(mut self, item: impl ToString) -> Self {
        self.item = Some(item.to_string());
        self
    }
}

/// Receives run progress. Delivery is fire-and-forget: implementations must
/// not block and must swallow their own failures.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: ProgressEvent) {
        match event.status {
            ProgressStatus::Failed | ProgressStatus::Error => warn!(
                status = ?event.status,
                action = %event.action,
                completed = event.completed,
                target = event.target,
                item = event.item.as_deref().unwrap_or("-"),
                "{}",
                event.message
            ),
            _ => info!(
                status = ?event.status,
                action = %event.action,
                completed = event.completed,
                target = event.target,
                item = event.item.as_deref().unwrap_or("-"),
                "{}",
                event.message
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: ProgressEvent) {
        // receiver gone: nobody is listening any more
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_reporter_delivers_in_order() {
        let (reporter, mut receiver) = ChannelReporter::new();
        reporter.report(ProgressEvent::new(
            "started",
            ActionPlan::Reply,
            ProgressStatus::Started,
            3,
            0,
        ));
        reporter.report(
            ProgressEvent::new("done", ActionPlan::Reply, ProgressStatus::Succeeded, 3, 1)
                .with_item("https://x/p/a/"),
        );
        assert_eq!(receiver.recv().await.unwrap().status, ProgressStatus::Started);
        let second = receiver.recv().await.unwrap();
        assert_eq!(second.completed, 1);
        assert_eq!(second.item.as_deref(), Some("https://x/p/a/"));
    }

    #[test]
    fn dropped_receiver_does_not_fail_reporting() {
        let (reporter, receiver) = ChannelReporter::new();
        drop(receiver);
        reporter.report(ProgressEvent::new(
            "ignored",
            ActionPlan::Favorite,
            ProgressStatus::Searching,
            1,
            0,
        ));
    }
}
