//! Cross-provider phase handoff and its lineage file.
//!
//! When consecutive phases run on different providers, the next provider
//! gets a short prompt describing what the previous one produced. Each
//! handoff is appended to `provider-context-lineage.json` in the task's
//! spec directory.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::Phase;
use crate::auth::types::ProviderKind;
use crate::error::Result;

pub const LINEAGE_FILE: &str = "provider-context-lineage.json";

/// Record of one phase handing its outputs to the next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseHandoff {
    pub source_phase: Phase,
    pub source_provider: ProviderKind,
    pub target_phase: Phase,
    pub target_provider: ProviderKind,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub context_files: Vec<PathBuf>,
}

/// Caller input for [`create_phase_handoff`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRequest {
    pub source_phase: Phase,
    pub source_provider: ProviderKind,
    pub target_phase: Phase,
    pub target_provider: ProviderKind,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub context_files: Vec<PathBuf>,
}

fn normalize_artifacts<I, S>(artifacts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    artifacts
        .into_iter()
        .map(|artifact| artifact.as_ref().trim().to_string())
        .filter(|artifact| !artifact.is_empty())
        .collect()
}

/// Build a handoff, dropping blank artifacts and filling in a summary when
/// none was given.
pub fn create_phase_handoff(request: HandoffRequest) -> PhaseHandoff {
    let summary = match request.summary.trim() {
        "" => format!(
            "{} outputs prepared for {}.",
            request.source_phase, request.target_phase
        ),
        summary => summary.to_string(),
    };

    PhaseHandoff {
        source_phase: request.source_phase,
        source_provider: request.source_provider,
        target_phase: request.target_phase,
        target_provider: request.target_provider,
        artifacts: normalize_artifacts(&request.artifacts),
        summary,
        context_files: request.context_files,
    }
}

/// Prompt preamble for the provider taking over
pub fn build_handoff_prompt(handoff: &PhaseHandoff) -> String {
    let artifacts = if handoff.artifacts.is_empty() {
        "none".to_string()
    } else {
        handoff.artifacts.join(", ")
    };
    let files = if handoff.context_files.is_empty() {
        "none".to_string()
    } else {
        handoff
            .context_files
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "Previous phase completed by {} ({}).\n\
         Transitioning to {} for {}.\n\
         Key outputs: {}\n\
         Artifacts: {}\n\
         Context files: {}",
        handoff.source_provider,
        handoff.source_phase,
        handoff.target_provider,
        handoff.target_phase,
        handoff.summary,
        artifacts,
        files
    )
}

/// Existing lineage entries, kept verbatim. Anything but a JSON list
/// starts a fresh lineage.
async fn read_lineage_entries(path: &Path) -> Vec<Value> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read context lineage");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            warn!(path = %path.display(), "Context lineage is not a list, starting over");
            Vec::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed context lineage, starting over");
            Vec::new()
        }
    }
}

/// Append `handoff` to the spec directory's lineage file and return its path.
pub async fn save_context_lineage(spec_dir: &Path, handoff: &PhaseHandoff) -> Result<PathBuf> {
    tokio::fs::create_dir_all(spec_dir).await?;
    let path = spec_dir.join(LINEAGE_FILE);

    let mut entries = read_lineage_entries(&path).await;
    entries.push(serde_json::to_value(handoff)?);
    tokio::fs::write(&path, serde_json::to_string_pretty(&entries)?).await?;

    debug!(
        path = %path.display(),
        entries = entries.len(),
        source = %handoff.source_provider,
        target = %handoff.target_provider,
        "Context lineage updated"
    );
    Ok(path)
}

/// Handoffs recorded for a spec directory, oldest first. Entries that do
/// not parse are skipped.
pub async fn load_context_lineage(spec_dir: &Path) -> Vec<PhaseHandoff> {
    let path = spec_dir.join(LINEAGE_FILE);
    read_lineage_entries(&path)
        .await
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<PhaseHandoff>(entry) {
            Ok(mut handoff) => {
                handoff.artifacts = normalize_artifacts(&handoff.artifacts);
                Some(handoff)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping lineage entry");
                None
            }
        })
        .collect()
}
