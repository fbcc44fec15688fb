//! Declarative settings for the analysis pipeline.
//!
//! Settings are split into one file per category. [`AnalyzerSettings`]
//! aggregates all categories and handles JSON deserialization from host
//! configuration payloads. This core owns no CLI flags, environment
//! variables, or config files; hosts hand it a payload however they load
//! one.

pub(crate) mod debounce;
pub(crate) mod discovery;
pub(crate) mod retry;

pub use debounce::{DebounceSettings, MAX_QUIET_WINDOW_MS, MIN_QUIET_WINDOW_MS};
use debounce::DebounceSettingsPatch;
pub use discovery::DiscoverySettings;
use discovery::DiscoverySettingsPatch;
pub use retry::{MAX_IO_RETRY_ATTEMPTS, MAX_IO_RETRY_DELAY_MS, RetrySettings};
use retry::RetrySettingsPatch;

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// Aggregated runtime settings for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyzerSettings {
    pub debounce: DebounceSettings,
    pub discovery: DiscoverySettings,
    pub retry: RetrySettings,
}

impl AnalyzerSettings {
    /// Build settings from an optional host payload, falling back to
    /// defaults for anything absent.
    pub fn from_json_payload(payload: Option<&Value>) -> Self {
        let mut settings = Self::default();
        if let Some(payload) = payload {
            settings = settings.merged_with(payload);
        }
        settings
    }

    /// Return a copy with the payload's fields applied on top of `self`.
    ///
    /// Unknown keys are ignored; out-of-range values are clamped.
    pub fn merged_with(
        &self,
        payload: &Value,
    ) -> Self {
        let mut merged = self.clone();
        if let Ok(patch) = serde_json::from_value::<AnalyzerSettingsPatch>(payload.clone()) {
            merged.apply_patch(patch);
        }
        merged.normalize();
        merged
    }

    fn apply_patch(
        &mut self,
        patch: AnalyzerSettingsPatch,
    ) {
        if let Some(debounce) = patch.debounce {
            self.debounce.apply_patch(debounce);
        }
        if let Some(discovery) = patch.discovery {
            self.discovery.apply_patch(discovery);
        }
        if let Some(retry) = patch.retry {
            self.retry.apply_patch(retry);
        }
    }

    pub(crate) fn normalize(&mut self) {
        self.debounce.normalize();
        self.discovery.normalize();
        self.retry.normalize();
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct AnalyzerSettingsPatch {
    debounce: Option<DebounceSettingsPatch>,
    discovery: Option<DiscoverySettingsPatch>,
    retry: Option<RetrySettingsPatch>,
    #[serde(flatten)]
    _extra: HashMap<String, Value>,
}

#[cfg(test)]
#[path = "../../tests/src/config/settings_tests.rs"]
mod tests;
