//! One-way migration from the legacy single-provider profile file.
//!
//! The legacy document held a flat `profiles` list for the Claude CLI with
//! secrets inline. Migration is a pure function; the store decides when to
//! run it and persists the result.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use super::types::{AutoSwitchPolicy, Profile, UnifiedStore, slugify};
use crate::auth::types::ProviderKind;

/// Provider kind every legacy profile belonged to
pub const LEGACY_PROVIDER_KIND: ProviderKind = ProviderKind::Claude;

/// Epoch values below this are taken to be seconds rather than milliseconds.
const SECONDS_CUTOFF: f64 = 100_000_000_000.0;

/// Legacy profile file, identified by a `version` field and a flat list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStore {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub profiles: Vec<LegacyProfile>,
    #[serde(default)]
    pub active_profile_id: Option<String>,
    #[serde(default)]
    pub auto_switch: Option<AutoSwitchPolicy>,
    #[serde(default)]
    pub account_priority_order: Option<Vec<String>>,
    #[serde(default)]
    pub migrated_profile_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub config_dir: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<LegacyTimestamp>,
    #[serde(default)]
    pub last_used_at: Option<LegacyTimestamp>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, Value>>,
    /// Everything else, including inline tokens. Never carried over.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Date representations found in legacy files
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LegacyTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
    /// Serialized native date object, e.g. `{"$date": "2024-01-01T00:00:00Z"}`
    Wrapped {
        #[serde(rename = "$date")]
        date: Box<LegacyTimestamp>,
    },
}

impl LegacyTimestamp {
    /// Canonical epoch milliseconds, if the value is parseable.
    pub fn to_millis(&self) -> Option<i64> {
        match self {
            LegacyTimestamp::Millis(value) => Some(normalize_epoch(*value as f64)),
            LegacyTimestamp::Fractional(value) if value.is_finite() => {
                Some(normalize_epoch(*value))
            }
            LegacyTimestamp::Fractional(_) => None,
            LegacyTimestamp::Text(text) => parse_text_timestamp(text),
            LegacyTimestamp::Wrapped { date } => date.to_millis(),
        }
    }
}

fn normalize_epoch(value: f64) -> i64 {
    if value.abs() < SECONDS_CUTOFF {
        (value * 1000.0).round() as i64
    } else {
        value.round() as i64
    }
}

fn parse_text_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = text.parse::<f64>()
        && value.is_finite()
    {
        return Some(normalize_epoch(value));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc).timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Migrate using the current time for unparseable creation dates.
pub fn migrate_legacy_to_current(legacy: &LegacyStore) -> UnifiedStore {
    migrate_legacy_at(legacy, Utc::now().timestamp_millis())
}

/// Migrate a legacy document into the current format.
///
/// Every profile lands under [`LEGACY_PROVIDER_KIND`] with
/// `is_authenticated = false`, since no secret is carried over.
pub fn migrate_legacy_at(legacy: &LegacyStore, now_ms: i64) -> UnifiedStore {
    let mut store = UnifiedStore::empty();
    let mut has_default = false;
    let mut profiles = Vec::with_capacity(legacy.profiles.len());
    let mut seen_ids = HashSet::new();

    for (index, source) in legacy.profiles.iter().enumerate() {
        if !source.extra.is_empty() {
            debug!(
                profile_id = %source.id,
                dropped = source.extra.len(),
                "Dropping unrecognized legacy profile fields"
            );
        }

        let name = if source.name.trim().is_empty() {
            format!("Profile {}", index + 1)
        } else {
            source.name.clone()
        };
        let candidate = if source.id.trim().is_empty() {
            format!("{}-{}-legacy{}", LEGACY_PROVIDER_KIND, slugify(&name), index)
        } else {
            source.id.clone()
        };
        let id = unique_id(&candidate, &seen_ids);
        if id != candidate {
            warn!(
                profile_id = %candidate,
                renamed_to = %id,
                "Duplicate legacy profile id, renaming"
            );
        }
        seen_ids.insert(id.clone());

        let created_at = match source.created_at.as_ref().map(LegacyTimestamp::to_millis) {
            Some(Some(millis)) => millis,
            Some(None) => {
                warn!(profile_id = %id, "Unparseable legacy createdAt, using migration time");
                now_ms
            }
            None => now_ms,
        };

        let is_default = source.is_default && !has_default;
        has_default |= is_default;

        profiles.push(Profile {
            id,
            name,
            provider_kind: LEGACY_PROVIDER_KIND,
            email: source.email.clone(),
            is_default,
            is_authenticated: false,
            config_dir: source.config_dir.clone(),
            description: source.description.clone(),
            created_at,
            last_used_at: source
                .last_used_at
                .as_ref()
                .and_then(LegacyTimestamp::to_millis),
            metadata: source.metadata.clone(),
        });
    }

    if !has_default && let Some(first) = profiles.first_mut() {
        first.is_default = true;
    }

    let state = store.provider_mut(LEGACY_PROVIDER_KIND);
    state.profiles = profiles;
    state.active_profile_id = legacy.active_profile_id.clone();
    state.auto_switch_policy = legacy.auto_switch.clone().unwrap_or_default();
    state.account_priority_order = legacy.account_priority_order.clone();
    store.migrated_profile_ids = legacy.migrated_profile_ids.clone();

    store
}

/// `candidate`, or `candidate-<n>` with the smallest n >= 2 not yet taken
fn unique_id(candidate: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(candidate) {
        return candidate.to_string();
    }
    (2..)
        .map(|n| format!("{candidate}-{n}"))
        .find(|id| !taken.contains(id))
        .unwrap_or_else(|| candidate.to_string())
}
