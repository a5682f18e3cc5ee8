use async_trait::async_trait;
use serde_json::json;
use url::Url;

use crate::browser::{invoke, scripts, BrowserResult, PageHandle};
use crate::config::ReachConfig;
use crate::engage::item::ItemId;

use super::{Strategy, StrategyOutcome};

const ENDPOINT_NAMES: [&str; 2] = ["primary-endpoint", "secondary-endpoint"];

/// Posts to the platform's internal favorite endpoint from inside the page,
/// authenticated with the anti-forgery token the page already carries.
#[derive(Debug, Clone)]
pub struct EndpointFavorite {
    name: &'static str,
    template: String,
    base_url: Url,
    markers: Vec<String>,
    token_cookie: String,
    token_meta: String,
    token_header: String,
}

impl EndpointFavorite {
    pub fn new(name: &'static str, template: impl Into<String>, config: &ReachConfig) -> Self {
        let platform = &config.platform;
        Self {
            name,
            template: template.into(),
            base_url: platform.base_url.clone(),
            markers: platform.permalink_markers.clone(),
            token_cookie: platform.token_cookie.clone(),
            token_meta: platform.token_meta.clone(),
            token_header: platform.token_header.clone(),
        }
    }

    fn endpoint_for(&self, item: &ItemId) -> Option<Url> {
        let key = item.item_key(&self.markers)?;
        self.base_url
            .join(&self.template.replace("{item_key}", key))
            .ok()
    }
}

#[async_trait]
impl Strategy<ItemId> for EndpointFavorite {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn attempt(&self, page: &dyn PageHandle, item: &ItemId) -> BrowserResult<StrategyOutcome> {
        let Some(endpoint) = self.endpoint_for(item) else {
            return Ok(StrategyOutcome::NotApplicable("item has no key".into()));
        };
        let args = json!({
            "endpoint": endpoint.as_str(),
            "cookie": self.token_cookie,
            "meta": self.token_meta,
            "header": self.token_header,
        });
        let response = invoke(page, scripts::FAVORITE_ENDPOINT, &args).await?;
        if response.get("ok").and_then(|ok| ok.as_bool()).unwrap_or(false) {
            return Ok(StrategyOutcome::Applied);
        }
        let status = response.get("status").and_then(|s| s.as_u64()).unwrap_or(0);
        let reason = response
            .get("reason")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("endpoint answered {status}"));
        Ok(StrategyOutcome::NotApplicable(reason))
    }

    fn needs_reload(&self) -> bool {
        true
    }
}

/// Clicks the first visible favorite control.
#[derive(Debug, Clone)]
pub struct ControlClickFavorite {
    controls: Vec<String>,
}

impl ControlClickFavorite {
    pub fn new(controls: Vec<String>) -> Self {
        Self { controls }
    }
}

#[async_trait]
impl Strategy<ItemId> for ControlClickFavorite {
    fn name(&self) -> &'static str {
        "control-click"
    }

    async fn attempt(&self, page: &dyn PageHandle, _item: &ItemId) -> BrowserResult<StrategyOutcome> {
        match page.click_first(&self.controls).await? {
            Some(_) => Ok(StrategyOutcome::Applied),
            None => Ok(StrategyOutcome::NotApplicable("no favorite control found".into())),
        }
    }
}

pub fn default_favorite_strategies(config: &ReachConfig) -> Vec<Box<dyn Strategy<ItemId>>> {
    let mut strategies: Vec<Box<dyn Strategy<ItemId>>> = config
        .platform
        .favorite_endpoints
        .iter()
        .zip(ENDPOINT_NAMES)
        .map(|(template, name)| {
            Box::new(EndpointFavorite::new(name, template.as_str(), config)) as Box<dyn Strategy<ItemId>>
        })
        .collect();
    strategies.push(Box::new(ControlClickFavorite::new(
        config.selectors.favorite_controls.clone(),
    )));
    strategies
}
