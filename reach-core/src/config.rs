use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReachConfig {
    pub platform: PlatformSection,
    pub chromium: ChromiumSection,
    pub human: HumanSection,
    pub discovery: DiscoverySection,
    pub orchestrator: OrchestratorSection,
    pub selectors: SelectorSection,
    pub reply: ReplySection,
    pub storage: StorageSection,
    pub retry: RetrySection,
}

impl ReachConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.storage.base_dir).join(path)
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve_path(&self.storage.ledger_db)
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.resolve_path(&self.storage.profiles_dir)
    }

    pub fn base_url(&self) -> &Url {
        &self.platform.base_url
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.platform.base_url.host_str().is_none() {
            return Err("platform.base_url must include a host".into());
        }
        if self.platform.permalink_markers.is_empty() {
            return Err("platform.permalink_markers must not be empty".into());
        }
        if self.orchestrator.max_batch_size == 0 {
            return Err("orchestrator.max_batch_size must be positive".into());
        }
        if self.orchestrator.max_empty_batches == 0 {
            return Err("orchestrator.max_empty_batches must be positive".into());
        }
        if self.discovery.max_failed_scrolls == 0 {
            return Err("discovery.max_failed_scrolls must be positive".into());
        }
        for (name, bounds) in [
            ("human.settle_ms", self.human.settle_ms),
            ("human.scroll_settle_ms", self.human.scroll_settle_ms),
            ("human.item_delay_ms", self.human.item_delay_ms),
            ("human.typing_cadence_cpm", self.human.typing_cadence_cpm),
            ("human.typing_jitter_ms", self.human.typing_jitter_ms),
        ] {
            if bounds[0] > bounds[1] {
                return Err(format!("{name} lower bound exceeds upper bound"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSection {
    pub name: String,
    pub base_url: Url,
    pub login_path: String,
    pub tag_listing: String,
    pub search_listing: String,
    pub permalink_markers: Vec<String>,
    pub excluded_markers: Vec<String>,
    pub favorite_endpoints: Vec<String>,
    pub token_cookie: String,
    pub token_meta: String,
    pub token_header: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: String,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub window_size: [u32; 2],
    pub user_agent: Option<String>,
    pub lang: Option<String>,
    pub navigation_timeout_seconds: u64,
    pub selector_timeout_ms: u64,
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HumanSection {
    pub settle_ms: [u32; 2],
    pub scroll_settle_ms: [u32; 2],
    pub item_delay_ms: [u32; 2],
    pub typing_cadence_cpm: [u32; 2],
    pub typing_jitter_ms: [u32; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySection {
    pub max_failed_scrolls: u32,
    pub prefer_recent: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    pub max_batch_size: usize,
    pub max_empty_batches: u32,
    pub min_word_count: usize,
    pub skip_videos: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSection {
    pub chrome: Vec<String>,
    pub login_form: Vec<String>,
    pub username_input: String,
    pub password_input: String,
    pub login_submit: Vec<String>,
    pub login_error: Vec<String>,
    pub interstitial_labels: Vec<String>,
    pub recent_tab_labels: Vec<String>,
    pub favorite_controls: Vec<String>,
    pub favorited_markers: Vec<String>,
    pub favorite_labels: Vec<String>,
    pub item_text: Vec<String>,
    pub video_markers: Vec<String>,
    pub reply_inputs: Vec<String>,
    pub submit_controls: Vec<String>,
    pub aria_submit_controls: Vec<String>,
    pub submit_labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplySection {
    pub fallback_text: String,
    pub prompt_template: String,
    pub max_prompt_chars: usize,
    pub generator: Option<GeneratorSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSection {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    pub base_dir: String,
    pub ledger_db: String,
    pub profiles_dir: String,
    pub profile_ttl_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    pub navigation_attempts: usize,
    pub backoff_ms: u64,
}

pub fn load_reach_config<P: AsRef<Path>>(path: P) -> Result<ReachConfig> {
    let path = path.as_ref();
    let config: ReachConfig = load_toml(path)?;
    config.validate().map_err(|reason| ConfigError::Invalid {
        reason,
        path: path.to_path_buf(),
    })?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
