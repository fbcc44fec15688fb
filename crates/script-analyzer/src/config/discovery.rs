use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// Controls implicit sibling discovery: when a buffer is first monitored,
/// other files with the same extension in its directory are scheduled for
/// background analysis. Real cost on large directories, hence the toggle.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySettings {
    pub implicit_project: bool,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            implicit_project: true,
        }
    }
}

impl DiscoverySettings {
    pub(crate) fn apply_patch(
        &mut self,
        patch: DiscoverySettingsPatch,
    ) {
        if let Some(v) = patch.implicit_project {
            self.implicit_project = v;
        }
    }

    pub(crate) fn normalize(&mut self) {}
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct DiscoverySettingsPatch {
    pub(crate) implicit_project: Option<bool>,
    #[serde(flatten)]
    pub(crate) _extra: HashMap<String, Value>,
}
