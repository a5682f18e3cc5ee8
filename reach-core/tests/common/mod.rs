#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use reach_core::browser::{scripts, BrowserError, BrowserResult, PageHandle, WaitPolicy};
use reach_core::config::{load_reach_config, HumanSection, ReachConfig};

pub const BASE: &str = "https://www.instagram.com";
pub const RUST_LISTING: &str = "https://www.instagram.com/explore/tags/rust/";

/// Fixture config with every delay zeroed and no retry backoff.
pub fn test_config() -> Arc<ReachConfig> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/reach.toml");
    let mut config = load_reach_config(path).expect("fixture config");
    config.human = HumanSection {
        settle_ms: [0, 0],
        scroll_settle_ms: [0, 0],
        item_delay_ms: [0, 0],
        typing_cadence_cpm: [0, 0],
        typing_jitter_ms: [0, 0],
    };
    config.retry.backoff_ms = 0;
    config.chromium.selector_timeout_ms = 10;
    Arc::new(config)
}

pub fn item_url(key: &str) -> String {
    format!("{BASE}/p/{key}/")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    TypedControl,
    AriaControl,
    TextMatch,
    Proximity,
    EnterKey,
    Broken,
}

#[derive(Debug)]
pub struct PageState {
    pub url: String,
    pub title: String,

    pub authenticated: bool,
    pub login_wall: bool,
    pub password: String,
    pub login_error: Option<String>,

    pub listing: Vec<String>,
    pub initial_visible: usize,
    pub visible: usize,
    pub per_scroll: usize,
    pub endless: bool,
    pub generated: usize,
    pub recent_tab: bool,
    pub recent_selected: bool,
    pub scrolls: usize,
    pub wall_after_scrolls: Option<usize>,
    pub cancel_on_scroll: Option<CancellationToken>,

    pub favorited: HashSet<String>,
    pub endpoint_ok: bool,
    pub endpoint_calls: usize,
    pub favorite_control: bool,
    pub favorite_clicks: usize,

    pub item_text: String,
    pub video: bool,

    pub reply_input: bool,
    pub reply_input_after_scroll: bool,
    pub input_value: String,
    pub drop_first_typing: bool,
    pub submit_mode: SubmitMode,
    pub keep_value_after_submit: bool,
    pub render_replies: bool,
    pub replies: Vec<(String, String)>,

    pub fail_navigation: HashSet<String>,
    pub navigations: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub scripts: Vec<&'static str>,
}

impl PageState {
    fn new() -> Self {
        Self {
            url: "about:blank".into(),
            title: String::new(),
            authenticated: true,
            login_wall: false,
            password: "secret".into(),
            login_error: None,
            listing: Vec::new(),
            initial_visible: 0,
            visible: 0,
            per_scroll: 0,
            endless: false,
            generated: 0,
            recent_tab: true,
            recent_selected: false,
            scrolls: 0,
            wall_after_scrolls: None,
            cancel_on_scroll: None,
            favorited: HashSet::new(),
            endpoint_ok: true,
            endpoint_calls: 0,
            favorite_control: true,
            favorite_clicks: 0,
            item_text: "A lovely morning walk along the river today".into(),
            video: false,
            reply_input: true,
            reply_input_after_scroll: false,
            input_value: String::new(),
            drop_first_typing: false,
            submit_mode: SubmitMode::TypedControl,
            keep_value_after_submit: false,
            render_replies: true,
            replies: Vec::new(),
            fail_navigation: HashSet::new(),
            navigations: Vec::new(),
            typed: Vec::new(),
            scripts: Vec::new(),
        }
    }

    fn current_item(&self) -> Option<String> {
        let path = self.url.strip_prefix(BASE)?;
        path.starts_with("/p/").then(|| self.url.clone())
    }

    fn on_listing(&self) -> bool {
        self.url.starts_with(&format!("{BASE}/explore/"))
    }

    fn on_login(&self) -> bool {
        self.url.starts_with(&format!("{BASE}/accounts/login/"))
    }

    fn grow(&mut self) {
        if self.per_scroll == 0 {
            return;
        }
        let wanted = self.visible + self.per_scroll;
        while self.endless && self.listing.len() < wanted {
            self.generated += 1;
            self.listing.push(format!("/p/gen{}/", self.generated));
        }
        self.visible = wanted.min(self.listing.len());
    }

    fn post_reply(&mut self) -> bool {
        let Some(item) = self.current_item() else {
            return false;
        };
        if self.input_value.trim().is_empty() {
            return false;
        }
        self.replies.push((item, self.input_value.clone()));
        if !self.keep_value_after_submit {
            self.input_value.clear();
        }
        true
    }

    /// Favorite endpoint calls plus control clicks.
    pub fn favorite_mutations(&self) -> usize {
        self.endpoint_calls + self.favorite_clicks
    }
}

/// Scripted stand-in for a browser tab. Dispatches evaluated scripts by their
/// body and keeps every observable effect in [`PageState`].
pub struct FakePage {
    state: Mutex<PageState>,
    favorite_controls: Vec<String>,
    login_submit: Vec<String>,
    submit_controls: Vec<String>,
    aria_submit_controls: Vec<String>,
    username_input: String,
    password_input: String,
    reply_input: String,
}

impl FakePage {
    pub fn new(config: &ReachConfig) -> Self {
        Self {
            state: Mutex::new(PageState::new()),
            favorite_controls: config.selectors.favorite_controls.clone(),
            login_submit: config.selectors.login_submit.clone(),
            submit_controls: config.selectors.submit_controls.clone(),
            aria_submit_controls: config.selectors.aria_submit_controls.clone(),
            username_input: config.selectors.username_input.clone(),
            password_input: config.selectors.password_input.clone(),
            reply_input: config.selectors.reply_inputs[0].clone(),
        }
    }

    /// A listing showing `visible` of `hrefs`, revealing `per_scroll` more on
    /// every scroll.
    pub fn with_listing(self, hrefs: &[&str], visible: usize, per_scroll: usize) -> Self {
        {
            let mut state = self.state();
            state.listing = hrefs.iter().map(|href| href.to_string()).collect();
            state.initial_visible = visible.min(state.listing.len());
            state.visible = state.initial_visible;
            state.per_scroll = per_scroll;
        }
        self
    }

    /// A listing that never ends: every scroll appends `per_scroll` new items.
    pub fn with_endless_listing(self, visible: usize, per_scroll: usize) -> Self {
        {
            let mut state = self.state();
            state.endless = true;
            state.per_scroll = per_scroll;
            state.initial_visible = visible;
            state.visible = 0;
            while state.listing.len() < visible {
                state.generated += 1;
                let href = format!("/p/gen{}/", state.generated);
                state.listing.push(href);
            }
            state.visible = visible;
        }
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap()
    }

    fn handle_script(&self, script: &str) -> BrowserResult<Value> {
        let (name, args) = decode(script)?;
        let mut state = self.state();
        state.scripts.push(name);
        let value = match name {
            "LOGIN_SIGNALS" => {
                let error_text = if state.on_login() {
                    state.login_error.clone()
                } else {
                    None
                };
                json!({
                    "chrome": state.authenticated,
                    "login_form": !state.authenticated && (state.on_login() || state.login_wall),
                    "title": state.title,
                    "error_text": error_text,
                })
            }
            "DISMISS_INTERSTITIALS" => json!(0),
            "PAGE_HEIGHT" => json!(100 + state.visible * 100),
            "SCROLL_TO_BOTTOM" => {
                state.scrolls += 1;
                if state.wall_after_scrolls == Some(state.scrolls) {
                    state.authenticated = false;
                    state.login_wall = true;
                }
                if let Some(cancel) = &state.cancel_on_scroll {
                    cancel.cancel();
                }
                if state.on_listing() {
                    state.grow();
                }
                json!(state.visible * 100)
            }
            "SCROLL_BY" => {
                if state.reply_input_after_scroll {
                    state.reply_input = true;
                }
                json!(600)
            }
            "COLLECT_LINKS" => {
                if !state.on_listing() {
                    json!([])
                } else {
                    json!(state.listing[..state.visible].to_vec())
                }
            }
            "SELECT_RECENT" => {
                state.recent_selected = state.recent_tab;
                json!(state.recent_tab)
            }
            "FAVORITE_STATE" => {
                let on = state
                    .current_item()
                    .map(|item| state.favorited.contains(&item))
                    .unwrap_or(false);
                json!(on)
            }
            "FAVORITE_ENDPOINT" => {
                state.endpoint_calls += 1;
                let endpoint = args["endpoint"].as_str().unwrap_or_default().to_string();
                if state.endpoint_ok {
                    if let Some(item) = endpoint_item(&endpoint) {
                        state.favorited.insert(item);
                    }
                    json!({ "ok": true, "status": 200, "reason": null })
                } else {
                    json!({ "ok": false, "status": 403, "reason": null })
                }
            }
            "ITEM_CONTENT" => json!({ "text": state.item_text, "video": state.video }),
            "INPUT_VALUE" => {
                if state.current_item().is_some() && state.reply_input {
                    json!(state.input_value)
                } else {
                    Value::Null
                }
            }
            "CLEAR_INPUT" => {
                state.input_value.clear();
                json!(true)
            }
            "CLICK_LABELED_BUTTON" => json!(state.submit_mode == SubmitMode::TextMatch && state.post_reply()),
            "CLICK_NEAR_INPUT" => json!(state.submit_mode == SubmitMode::Proximity && state.post_reply()),
            "TEXT_RENDERED" => {
                let text = args["text"].as_str().unwrap_or_default();
                let item = state.current_item();
                json!(
                    state.render_replies
                        && state
                            .replies
                            .iter()
                            .any(|(on, posted)| Some(on) == item.as_ref() && posted.contains(text))
                )
            }
            other => {
                return Err(BrowserError::Script(format!("unscripted helper {other}")));
            }
        };
        Ok(value)
    }
}

const HELPERS: [(&str, &str); 15] = [
    ("LOGIN_SIGNALS", scripts::LOGIN_SIGNALS),
    ("DISMISS_INTERSTITIALS", scripts::DISMISS_INTERSTITIALS),
    ("PAGE_HEIGHT", scripts::PAGE_HEIGHT),
    ("SCROLL_TO_BOTTOM", scripts::SCROLL_TO_BOTTOM),
    ("SCROLL_BY", scripts::SCROLL_BY),
    ("COLLECT_LINKS", scripts::COLLECT_LINKS),
    ("SELECT_RECENT", scripts::SELECT_RECENT),
    ("FAVORITE_STATE", scripts::FAVORITE_STATE),
    ("FAVORITE_ENDPOINT", scripts::FAVORITE_ENDPOINT),
    ("ITEM_CONTENT", scripts::ITEM_CONTENT),
    ("INPUT_VALUE", scripts::INPUT_VALUE),
    ("CLEAR_INPUT", scripts::CLEAR_INPUT),
    ("CLICK_LABELED_BUTTON", scripts::CLICK_LABELED_BUTTON),
    ("CLICK_NEAR_INPUT", scripts::CLICK_NEAR_INPUT),
    ("TEXT_RENDERED", scripts::TEXT_RENDERED),
];

fn decode(script: &str) -> BrowserResult<(&'static str, Value)> {
    for (name, body) in HELPERS {
        let prefix = format!("({body})(");
        if let Some(rest) = script.strip_prefix(&prefix) {
            let raw = rest.strip_suffix(')').unwrap_or(rest);
            let args = serde_json::from_str(raw)
                .map_err(|err| BrowserError::Script(format!("bad args for {name}: {err}")))?;
            return Ok((name, args));
        }
    }
    Err(BrowserError::Script("unknown script".into()))
}

fn endpoint_item(endpoint: &str) -> Option<String> {
    let key = endpoint
        .split('/')
        .filter(|segment| !segment.is_empty())
        .rev()
        .nth(1)?;
    Some(item_url(key))
}

#[async_trait]
impl PageHandle for FakePage {
    async fn navigate(&self, url: &str, _wait: WaitPolicy, _timeout: Duration) -> BrowserResult<()> {
        let mut state = self.state();
        state.navigations.push(url.to_string());
        if state.fail_navigation.contains(url) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".into(),
            });
        }
        let is_listing = url.starts_with(&format!("{BASE}/explore/"));
        if is_listing && !state.authenticated && !state.login_wall {
            state.url = format!("{BASE}/accounts/login/?next=/explore/");
            return Ok(());
        }
        state.url = url.to_string();
        state.input_value.clear();
        if is_listing {
            state.visible = state.initial_visible;
            state.recent_selected = false;
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<Value> {
        self.handle_script(script)
    }

    async fn read_text(&self, _selector: &str) -> BrowserResult<Option<String>> {
        Ok(Some(self.state().item_text.clone()))
    }

    async fn click_first(&self, selectors: &[String]) -> BrowserResult<Option<String>> {
        let mut state = self.state();
        if selectors == self.favorite_controls.as_slice() {
            let Some(item) = state.current_item() else {
                return Ok(None);
            };
            if !state.favorite_control {
                return Ok(None);
            }
            state.favorite_clicks += 1;
            if !state.favorited.insert(item.clone()) {
                state.favorited.remove(&item);
            }
            return Ok(selectors.first().cloned());
        }
        if selectors == self.login_submit.as_slice() {
            if state.on_login() {
                let typed_password = state
                    .typed
                    .iter()
                    .rev()
                    .find(|(selector, _)| selector == &self.password_input)
                    .map(|(_, text)| text.clone());
                if typed_password.as_deref() == Some(state.password.as_str()) {
                    state.authenticated = true;
                    state.url = format!("{BASE}/");
                } else {
                    state.login_error = Some("Sorry, your password was incorrect.".into());
                }
                return Ok(selectors.first().cloned());
            }
            return Ok(None);
        }
        let mode = if selectors == self.submit_controls.as_slice() {
            SubmitMode::TypedControl
        } else if selectors == self.aria_submit_controls.as_slice() {
            SubmitMode::AriaControl
        } else {
            return Ok(None);
        };
        if state.submit_mode == mode && state.post_reply() {
            return Ok(selectors.first().cloned());
        }
        Ok(None)
    }

    async fn type_into(&self, selector: &str, text: &str) -> BrowserResult<()> {
        let mut state = self.state();
        state.typed.push((selector.to_string(), text.to_string()));
        if selector == self.reply_input {
            if state.drop_first_typing {
                state.drop_first_typing = false;
                let partial: String = text.chars().skip(3).collect();
                state.input_value.push_str(&partial);
            } else {
                state.input_value.push_str(text);
            }
        }
        Ok(())
    }

    async fn press_key(&self, selector: &str, key: &str) -> BrowserResult<()> {
        let mut state = self.state();
        if selector == self.reply_input && key == "Enter" && state.submit_mode == SubmitMode::EnterKey {
            state.post_reply();
        }
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.state().url.clone())
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> BrowserResult<bool> {
        let state = self.state();
        if selector == self.username_input {
            return Ok(state.on_login());
        }
        if selector == self.reply_input {
            return Ok(state.current_item().is_some() && state.reply_input);
        }
        Ok(false)
    }
}

/// Counts how often each helper script ran.
pub fn script_counts(page: &FakePage) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    for name in &page.state().scripts {
        *counts.entry(*name).or_default() += 1;
    }
    counts
}
