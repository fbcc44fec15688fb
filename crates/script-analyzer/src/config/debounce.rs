use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

pub const MIN_QUIET_WINDOW_MS: u64 = 50;
pub const MAX_QUIET_WINDOW_MS: u64 = 10_000;

/// Controls how long a buffer must stay quiet before an in-line edit burst
/// triggers a reparse. Line-affecting edits that complete a pending text
/// edit bypass the window entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct DebounceSettings {
    pub quiet_window_ms: u64,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            quiet_window_ms: 1000,
        }
    }
}

impl DebounceSettings {
    pub(crate) fn apply_patch(
        &mut self,
        patch: DebounceSettingsPatch,
    ) {
        if let Some(v) = patch.quiet_window_ms {
            self.quiet_window_ms = v;
        }
    }

    pub(crate) fn normalize(&mut self) {
        self.quiet_window_ms = self.quiet_window_ms.clamp(MIN_QUIET_WINDOW_MS, MAX_QUIET_WINDOW_MS);
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct DebounceSettingsPatch {
    pub(crate) quiet_window_ms: Option<u64>,
    #[serde(flatten)]
    pub(crate) _extra: HashMap<String, Value>,
}
