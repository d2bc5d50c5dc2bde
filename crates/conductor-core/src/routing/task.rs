//! Provider and model selection for a single task.
//!
//! Priority: explicit CLI choice, then `task_metadata.json` in the task's
//! spec directory, then the baseline default.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use super::Phase;
use super::settings::BASELINE_PROVIDER;
use crate::auth::types::ProviderKind;

pub const TASK_METADATA_FILE: &str = "task_metadata.json";

/// The parts of `task_metadata.json` that affect provider selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskMetadata {
    pub provider: Option<String>,
    /// Model per phase name
    pub models: BTreeMap<String, String>,
}

/// Read `task_metadata.json`; absent or unreadable files yield `None`.
pub async fn load_task_metadata(spec_dir: &Path) -> Option<TaskMetadata> {
    let path = spec_dir.join(TASK_METADATA_FILE);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failed to read task metadata");
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Malformed task metadata");
            None
        }
    }
}

/// Provider for a task.
///
/// An unknown CLI choice falls back to the default without consulting the
/// metadata file; an unknown metadata value is ignored.
pub async fn get_task_provider(spec_dir: &Path, cli_provider: Option<&str>) -> ProviderKind {
    if let Some(choice) = cli_provider.map(str::trim).filter(|choice| !choice.is_empty()) {
        return choice.parse().unwrap_or_else(|_| {
            warn!(provider = %choice, "Unknown provider, using default");
            BASELINE_PROVIDER
        });
    }

    let from_metadata = load_task_metadata(spec_dir).await.and_then(|metadata| {
        let value = metadata.provider?;
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match value.parse::<ProviderKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                warn!(
                    provider = %value,
                    file = TASK_METADATA_FILE,
                    "Unknown provider in task metadata"
                );
                None
            }
        }
    });

    from_metadata.unwrap_or(BASELINE_PROVIDER)
}

/// Model for one phase of a task: CLI choice, then `models.<phase>` from
/// the metadata file, then the provider's default model.
pub async fn get_task_model(
    spec_dir: &Path,
    phase: Phase,
    provider: ProviderKind,
    cli_model: Option<&str>,
) -> String {
    if let Some(model) = cli_model.filter(|model| !model.trim().is_empty()) {
        return model.to_string();
    }

    load_task_metadata(spec_dir)
        .await
        .and_then(|mut metadata| metadata.models.remove(phase.as_str()))
        .unwrap_or_else(|| provider.default_model().to_string())
}
