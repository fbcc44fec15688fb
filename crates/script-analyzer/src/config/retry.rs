use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

pub const MAX_IO_RETRY_ATTEMPTS: u32 = 100;
pub const MAX_IO_RETRY_DELAY_MS: u64 = 5_000;

/// Retry policy for background file reads. A file that is mid-copy or
/// briefly locked gets a bounded number of fixed-delay attempts before the
/// parse round is abandoned.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub io_attempts: u32,
    pub io_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            io_attempts: 10,
            io_delay_ms: 100,
        }
    }
}

impl RetrySettings {
    pub(crate) fn apply_patch(
        &mut self,
        patch: RetrySettingsPatch,
    ) {
        if let Some(v) = patch.io_attempts {
            self.io_attempts = v;
        }
        if let Some(v) = patch.io_delay_ms {
            self.io_delay_ms = v;
        }
    }

    pub(crate) fn normalize(&mut self) {
        self.io_attempts = self.io_attempts.clamp(1, MAX_IO_RETRY_ATTEMPTS);
        self.io_delay_ms = self.io_delay_ms.min(MAX_IO_RETRY_DELAY_MS);
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct RetrySettingsPatch {
    pub(crate) io_attempts: Option<u32>,
    pub(crate) io_delay_ms: Option<u64>,
    #[serde(flatten)]
    pub(crate) _extra: HashMap<String, Value>,
}
