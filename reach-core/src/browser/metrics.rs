use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationMetrics {
    pub pages_opened: u64,
    pub navigations: u64,
    pub navigation_failures: u64,
    pub evaluations: u64,
    pub clicks: u64,
    pub characters_typed: u64,
    pub selector_waits: u64,
    pub selector_timeouts: u64,
}

impl AutomationMetrics {
    pub fn record_page_open(&mut self) {
        self.pages_opened = self.pages_opened.saturating_add(1);
    }

    pub fn record_navigation(&mut self, success: bool) {
        self.navigations = self.navigations.saturating_add(1);
        if !success {
            self.navigation_failures = self.navigation_failures.saturating_add(1);
        }
    }

    pub fn record_evaluation(&mut self) {
        self.evaluations = self.evaluations.saturating_add(1);
    }

    pub fn record_click(&mut self) {
        self.clicks = self.clicks.saturating_add(1);
    }

    pub fn record_typed(&mut self, count: u64) {
        self.characters_typed = self.characters_typed.saturating_add(count);
    }

    pub fn record_selector_wait(&mut self, found: bool) {
        self.selector_waits = self.selector_waits.saturating_add(1);
        if !found {
            self.selector_timeouts = self.selector_timeouts.saturating_add(1);
        }
    }

    pub fn navigation_success_rate(&self) -> f64 {
        if self.navigations == 0 {
            0.0
        } else {
            let ok = self.navigations - self.navigation_failures;
            (ok as f64 / self.navigations as f64) * 100.0
        }
    }
}
