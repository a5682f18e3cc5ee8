use async_trait::async_trait;
use serde_json::json;

use crate::browser::{invoke, scripts, value_as_bool, BrowserResult, PageHandle};
use crate::config::ReachConfig;

use super::{Strategy, StrategyOutcome};

/// The filled-in reply input a submit strategy acts on.
#[derive(Debug, Clone)]
pub struct SubmitTarget {
    pub input_selector: String,
    pub text: String,
}

async fn click_any(page: &dyn PageHandle, selectors: &[String]) -> BrowserResult<StrategyOutcome> {
    Ok(match page.click_first(selectors).await? {
        Some(_) => StrategyOutcome::Applied,
        None => StrategyOutcome::NotApplicable("no matching control".into()),
    })
}

#[derive(Debug, Clone)]
pub struct SubmitTypedControl {
    selectors: Vec<String>,
}

impl SubmitTypedControl {
    pub fn new(selectors: Vec<String>) -> Self {
        Self { selectors }
    }
}

#[async_trait]
impl Strategy<SubmitTarget> for SubmitTypedControl {
    fn name(&self) -> &'static str {
        "submit-control"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        _target: &SubmitTarget,
    ) -> BrowserResult<StrategyOutcome> {
        click_any(page, &self.selectors).await
    }
}

#[derive(Debug, Clone)]
pub struct AriaLabeledControl {
    selectors: Vec<String>,
}

impl AriaLabeledControl {
    pub fn new(selectors: Vec<String>) -> Self {
        Self { selectors }
    }
}

#[async_trait]
impl Strategy<SubmitTarget> for AriaLabeledControl {
    fn name(&self) -> &'static str {
        "aria-control"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        _target: &SubmitTarget,
    ) -> BrowserResult<StrategyOutcome> {
        click_any(page, &self.selectors).await
    }
}

/// Clicks a button whose visible label matches, searching the input's form
/// first.
#[derive(Debug, Clone)]
pub struct TextMatchedButton {
    labels: Vec<String>,
}

impl TextMatchedButton {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }
}

#[async_trait]
impl Strategy<SubmitTarget> for TextMatchedButton {
    fn name(&self) -> &'static str {
        "text-match"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        target: &SubmitTarget,
    ) -> BrowserResult<StrategyOutcome> {
        let args = json!({ "labels": self.labels, "scope": target.input_selector });
        let clicked = invoke(page, scripts::CLICK_LABELED_BUTTON, &args).await?;
        Ok(if value_as_bool(&clicked) {
            StrategyOutcome::Applied
        } else {
            StrategyOutcome::NotApplicable("no labeled button".into())
        })
    }
}

/// Clicks the enabled button closest to the right of the input.
#[derive(Debug, Clone, Default)]
pub struct ProximityControl;

#[async_trait]
impl Strategy<SubmitTarget> for ProximityControl {
    fn name(&self) -> &'static str {
        "proximity"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        target: &SubmitTarget,
    ) -> BrowserResult<StrategyOutcome> {
        let args = json!({ "selector": target.input_selector });
        let clicked = invoke(page, scripts::CLICK_NEAR_INPUT, &args).await?;
        Ok(if value_as_bool(&clicked) {
            StrategyOutcome::Applied
        } else {
            StrategyOutcome::NotApplicable("no control near input".into())
        })
    }
}

/// Last resort: Enter in the input.
#[derive(Debug, Clone, Default)]
pub struct KeySubmit;

#[async_trait]
impl Strategy<SubmitTarget> for KeySubmit {
    fn name(&self) -> &'static str {
        "enter-key"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        target: &SubmitTarget,
    ) -> BrowserResult<StrategyOutcome> {
        page.press_key(&target.input_selector, "Enter").await?;
        Ok(StrategyOutcome::Applied)
    }
}

pub fn default_submit_strategies(config: &ReachConfig) -> Vec<Box<dyn Strategy<SubmitTarget>>> {
    let selectors = &config.selectors;
    vec![
        Box::new(SubmitTypedControl::new(selectors.submit_controls.clone())),
        Box::new(AriaLabeledControl::new(selectors.aria_submit_controls.clone())),
        Box::new(TextMatchedButton::new(selectors.submit_labels.clone())),
        Box::new(ProximityControl),
        Box::new(KeySubmit),
    ]
}
