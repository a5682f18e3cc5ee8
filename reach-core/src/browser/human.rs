use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::sleep;

use crate::config::HumanSection;

/// Randomized pacing for waits, typing and the gap between items, so the
/// automation never runs at a fixed cadence.
#[derive(Debug, Clone)]
pub struct HumanPacer {
    config: HumanSection,
    rng: ChaCha8Rng,
}

impl HumanPacer {
    pub fn new(config: HumanSection) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn seeded(config: HumanSection, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// A pacer that never waits. Used by tests and dry runs.
    pub fn instant() -> Self {
        Self::seeded(
            HumanSection {
                settle_ms: [0, 0],
                scroll_settle_ms: [0, 0],
                item_delay_ms: [0, 0],
                typing_cadence_cpm: [0, 0],
                typing_jitter_ms: [0, 0],
            },
            0,
        )
    }

    pub fn settle_delay(&mut self) -> Duration {
        self.random_duration(self.config.settle_ms)
    }

    pub fn scroll_settle_delay(&mut self) -> Duration {
        self.random_duration(self.config.scroll_settle_ms)
    }

    pub fn item_delay(&mut self) -> Duration {
        self.random_duration(self.config.item_delay_ms)
    }

    /// Delay between two typed characters. Zero when no cadence is configured.
    pub fn typing_delay(&mut self) -> Duration {
        let [low, high] = self.config.typing_cadence_cpm;
        if high == 0 {
            return Duration::ZERO;
        }
        let cadence = self.rng.gen_range(low..=high).max(60) as f64;
        let base_delay = 60.0 / cadence;
        let jitter_ms = self.random_duration(self.config.typing_jitter_ms);
        Duration::from_secs_f64(base_delay) + jitter_ms
    }

    pub async fn settle(&mut self) -> Duration {
        let delay = self.settle_delay();
        pause(delay).await;
        delay
    }

    pub async fn scroll_settle(&mut self) -> Duration {
        let delay = self.scroll_settle_delay();
        pause(delay).await;
        delay
    }

    pub async fn between_items(&mut self) -> Duration {
        let delay = self.item_delay();
        pause(delay).await;
        delay
    }

    fn random_duration(&mut self, bounds: [u32; 2]) -> Duration {
        if bounds[0] == 0 && bounds[1] == 0 {
            return Duration::ZERO;
        }
        let lower = bounds[0].min(bounds[1]);
        let upper = bounds[0].max(bounds[1]);
        Duration::from_millis(self.rng.gen_range(lower..=upper) as u64)
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}
