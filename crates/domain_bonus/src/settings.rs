//! Engine-wide settings

use serde::{Deserialize, Serialize};

use core_kernel::Timezone;

/// Default trailing window for terminal-care eligibility, in days
pub const DEFAULT_TERMINAL_CARE_WINDOW_DAYS: u32 = 14;

/// Default number of terminal-care visits required within the window
pub const DEFAULT_TERMINAL_CARE_MIN_VISITS: u32 = 2;

/// Settings shared by every calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Zone applied when a facility has none configured
    pub default_timezone: Timezone,
    pub terminal_care_window_days: u32,
    pub terminal_care_min_visits: u32,
}

impl EngineSettings {
    pub fn with_timezone(mut self, timezone: Timezone) -> Self {
        self.default_timezone = timezone;
        self
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_timezone: Timezone::default(),
            terminal_care_window_days: DEFAULT_TERMINAL_CARE_WINDOW_DAYS,
            terminal_care_min_visits: DEFAULT_TERMINAL_CARE_MIN_VISITS,
        }
    }
}
