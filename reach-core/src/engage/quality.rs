use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::browser::{invoke, scripts, PageHandle};
use crate::config::ReachConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ItemContent {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub video: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Skip(String),
}

/// Cheap content checks applied to an opened item before any action.
#[derive(Debug, Clone)]
pub struct ContentGate {
    min_word_count: usize,
    skip_videos: bool,
    text_selectors: Vec<String>,
    video_markers: Vec<String>,
}

impl ContentGate {
    pub fn new(config: &ReachConfig) -> Self {
        Self {
            min_word_count: config.orchestrator.min_word_count,
            skip_videos: config.orchestrator.skip_videos,
            text_selectors: config.selectors.item_text.clone(),
            video_markers: config.selectors.video_markers.clone(),
        }
    }

    /// Reads the opened item. `None` when the page could not be inspected.
    pub async fn inspect(&self, page: &dyn PageHandle) -> Option<ItemContent> {
        let args = json!({ "text": self.text_selectors, "video": self.video_markers });
        match invoke(page, scripts::ITEM_CONTENT, &args).await {
            Ok(value) => serde_json::from_value(value).ok(),
            Err(err) => {
                debug!(error = %err, "item content probe failed");
                None
            }
        }
    }

    pub fn decide(&self, content: &ItemContent) -> GateDecision {
        if self.skip_videos && content.video {
            return GateDecision::Skip("video item".into());
        }
        let words = word_count(&content.text);
        if words < self.min_word_count {
            return GateDecision::Skip(format!(
                "text too short ({words} < {} words)",
                self.min_word_count
            ));
        }
        GateDecision::Pass
    }
}

/// Words that carry text: hashtags, mentions and bare punctuation do not count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|word| !word.starts_with('#') && !word.starts_with('@'))
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .count()
}
