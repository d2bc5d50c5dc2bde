//! On-disk persistence for the unified profile document.
//!
//! Loading never fails: unreadable or unparseable files degrade to an empty
//! store, and the outcome says so. Saving reports failure as a degraded
//! outcome instead of an error so callers decide whether to surface it.

use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

use super::migration::{LegacyStore, migrate_legacy_to_current};
use super::types::{CURRENT_FORMAT_VERSION, UnifiedStore};

/// How a store was obtained from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file existed; a fresh empty store was built
    Created,
    /// Current-format file loaded as-is
    Loaded,
    /// Current-format file loaded; missing provider entries were added or
    /// the version number was raised
    Backfilled { added: usize },
    /// Legacy file migrated. `persisted` is the result of the immediate
    /// write-back.
    Migrated {
        profiles: usize,
        persisted: SaveOutcome,
    },
    /// File unreadable or unrecognized; an empty store is used instead
    Degraded(String),
}

impl LoadOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, LoadOutcome::Degraded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Degraded(String),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved)
    }

    /// Failure message, if the save degraded
    pub fn warning(&self) -> Option<&str> {
        match self {
            SaveOutcome::Saved => None,
            SaveOutcome::Degraded(message) => Some(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreLoad {
    pub store: UnifiedStore,
    pub outcome: LoadOutcome,
}

/// Load the unified store from `path`, migrating legacy files in place.
pub async fn load_store(path: &Path) -> StoreLoad {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No profile store yet, starting empty");
            return StoreLoad {
                store: UnifiedStore::empty(),
                outcome: LoadOutcome::Created,
            };
        }
        Err(e) => return degraded(path, format!("Failed to read profile store: {}", e)),
    };

    let document: Value = match serde_json::from_str(&content) {
        Ok(document) => document,
        Err(e) => return degraded(path, format!("Failed to parse profile store: {}", e)),
    };

    if document.get("formatVersion").is_some() {
        return load_current(path, document);
    }

    if document.get("profiles").is_some_and(Value::is_array) {
        return load_legacy(path, document).await;
    }

    degraded(path, "Unrecognized profile store format".to_string())
}

fn load_current(path: &Path, document: Value) -> StoreLoad {
    let mut store: UnifiedStore = match serde_json::from_value(document) {
        Ok(store) => store,
        Err(e) => return degraded(path, format!("Invalid profile store: {}", e)),
    };

    let mut added = store.backfill_providers();
    if store.format_version != CURRENT_FORMAT_VERSION {
        debug!(
            from = store.format_version,
            to = CURRENT_FORMAT_VERSION,
            "Normalizing profile store version"
        );
        store.format_version = CURRENT_FORMAT_VERSION;
        added = added.max(1);
    }

    let outcome = if added > 0 {
        LoadOutcome::Backfilled { added }
    } else {
        LoadOutcome::Loaded
    };
    StoreLoad { store, outcome }
}

async fn load_legacy(path: &Path, document: Value) -> StoreLoad {
    let legacy: LegacyStore = match serde_json::from_value(document) {
        Ok(legacy) => legacy,
        Err(e) => return degraded(path, format!("Invalid legacy profile store: {}", e)),
    };

    let store = migrate_legacy_to_current(&legacy);
    let profiles = legacy.profiles.len();
    let persisted = save_store(path, &store).await;
    info!(
        path = %path.display(),
        profiles,
        legacy_version = ?legacy.version,
        persisted = persisted.is_saved(),
        "Migrated legacy profile store"
    );

    StoreLoad {
        store,
        outcome: LoadOutcome::Migrated {
            profiles,
            persisted,
        },
    }
}

fn degraded(path: &Path, message: String) -> StoreLoad {
    warn!(path = %path.display(), error = %message, "Falling back to empty profile store");
    StoreLoad {
        store: UnifiedStore::empty(),
        outcome: LoadOutcome::Degraded(message),
    }
}

/// Write the full document, pretty-printed, creating parent directories.
pub async fn save_store(path: &Path, store: &UnifiedStore) -> SaveOutcome {
    match write_store(path, store).await {
        Ok(()) => {
            debug!(path = %path.display(), "Profile store saved");
            SaveOutcome::Saved
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to save profile store");
            SaveOutcome::Degraded(e.to_string())
        }
    }
}

async fn write_store(path: &Path, store: &UnifiedStore) -> crate::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(store)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::ProviderKind;
    use crate::profiles::types::Profile;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_creates_empty_store() {
        let dir = tempdir().unwrap();
        let load = load_store(&dir.path().join("unified-profiles.json")).await;

        assert_eq!(load.outcome, LoadOutcome::Created);
        assert_eq!(load.store, UnifiedStore::empty());
    }

    #[tokio::test]
    async fn test_save_then_load_is_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("unified-profiles.json");

        let mut store = UnifiedStore::empty();
        let mut profile = Profile::new("gemini-work-abc123", "Work", ProviderKind::Gemini, 42);
        profile.is_default = true;
        profile.metadata = Some(BTreeMap::from([("model".to_string(), json!("gemini-pro"))]));
        let state = store.provider_mut(ProviderKind::Gemini);
        state.profiles.push(profile);
        state.active_profile_id = Some("gemini-work-abc123".to_string());
        state.account_priority_order = Some(vec!["gemini-work-abc123".to_string()]);
        store.global_settings.cross_provider_fallback = true;
        store.migrated_profile_ids = Some(vec!["old".to_string()]);

        assert_eq!(save_store(&path, &store).await, SaveOutcome::Saved);
        let load = load_store(&path).await;

        assert_eq!(load.outcome, LoadOutcome::Loaded);
        assert_eq!(load.store, store);
    }

    #[tokio::test]
    async fn test_missing_provider_entries_are_backfilled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unified-profiles.json");
        std::fs::write(
            &path,
            json!({
                "formatVersion": 2,
                "providers": {"claude": {"profiles": [], "activeProfileId": null}},
                "globalSettings": {"crossProviderFallback": false}
            })
            .to_string(),
        )
        .unwrap();

        let load = load_store(&path).await;
        assert_eq!(load.outcome, LoadOutcome::Backfilled { added: 3 });
        for kind in ProviderKind::ALL {
            assert!(load.store.provider(kind).is_some());
        }
    }

    #[tokio::test]
    async fn test_legacy_file_is_migrated_and_rewritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unified-profiles.json");
        std::fs::write(
            &path,
            json!({
                "version": 3,
                "profiles": [{"id": "p1", "name": "Work", "oauthToken": "secret", "createdAt": 1}],
                "activeProfileId": "p1"
            })
            .to_string(),
        )
        .unwrap();

        let load = load_store(&path).await;
        assert_eq!(
            load.outcome,
            LoadOutcome::Migrated {
                profiles: 1,
                persisted: SaveOutcome::Saved
            }
        );

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("\"formatVersion\": 2"));
        assert!(!on_disk.contains("secret"));

        let reload = load_store(&path).await;
        assert_eq!(reload.outcome, LoadOutcome::Loaded);
        assert_eq!(reload.store, load.store);
    }

    #[tokio::test]
    async fn test_corrupt_file_degrades_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unified-profiles.json");
        std::fs::write(&path, "{not json").unwrap();

        let load = load_store(&path).await;
        assert!(load.outcome.is_degraded());
        assert_eq!(load.store, UnifiedStore::empty());
    }

    #[tokio::test]
    async fn test_unrecognized_document_degrades() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unified-profiles.json");
        std::fs::write(&path, "{\"hello\": 1}").unwrap();

        assert!(load_store(&path).await.outcome.is_degraded());
    }

    #[tokio::test]
    async fn test_save_failure_is_degraded_not_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();

        let outcome = save_store(&blocker.join("store.json"), &UnifiedStore::empty()).await;
        assert!(!outcome.is_saved());
        assert!(outcome.warning().is_some());
    }
}
