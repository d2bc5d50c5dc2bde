//! Per-project routing settings file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use super::Phase;
use crate::auth::types::ProviderKind;
use crate::error::Result;

/// Provider the engine assumes when nothing else is configured
pub const BASELINE_PROVIDER: ProviderKind = ProviderKind::Claude;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseDefaults {
    pub planning: ProviderKind,
    pub coding: ProviderKind,
    pub qa: ProviderKind,
}

impl Default for PhaseDefaults {
    fn default() -> Self {
        Self {
            planning: BASELINE_PROVIDER,
            coding: BASELINE_PROVIDER,
            qa: BASELINE_PROVIDER,
        }
    }
}

impl PhaseDefaults {
    pub fn get(&self, phase: Phase) -> ProviderKind {
        match phase {
            Phase::Planning => self.planning,
            Phase::Coding => self.coding,
            Phase::Qa => self.qa,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingSettings {
    pub default_providers: PhaseDefaults,
    pub fallback_chains: BTreeMap<ProviderKind, Vec<ProviderKind>>,
    pub show_confirmation_dialog: bool,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            default_providers: PhaseDefaults::default(),
            fallback_chains: default_fallback_chains(),
            show_confirmation_dialog: true,
        }
    }
}

impl RoutingSettings {
    /// Fallback chain for `kind`; empty when none is configured
    pub fn chain(&self, kind: ProviderKind) -> &[ProviderKind] {
        self.fallback_chains
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Every other kind, in canonical order
pub fn default_fallback_chains() -> BTreeMap<ProviderKind, Vec<ProviderKind>> {
    ProviderKind::ALL
        .into_iter()
        .map(|kind| {
            let chain = ProviderKind::ALL
                .into_iter()
                .filter(|other| *other != kind)
                .collect();
            (kind, chain)
        })
        .collect()
}

/// Read settings, falling back to defaults when absent or malformed.
pub async fn load_routing_settings(path: &Path) -> RoutingSettings {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No routing settings, using defaults");
            return RoutingSettings::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read routing settings, using defaults");
            return RoutingSettings::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed routing settings, using defaults");
            RoutingSettings::default()
        }
    }
}

pub async fn save_routing_settings(path: &Path, settings: &RoutingSettings) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    tokio::fs::write(path, content).await?;
    debug!(path = %path.display(), "Routing settings saved");
    Ok(())
}
