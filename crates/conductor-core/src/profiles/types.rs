//! Persisted profile data model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::auth::types::{ProviderKind, UsageSnapshot};

/// Schema version written by this build
pub const CURRENT_FORMAT_VERSION: u32 = 2;

/// A named account or configuration for one provider kind.
///
/// Never carries secrets; those live in the vault under a name derived
/// from `provider_kind` and `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub provider_kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Epoch milliseconds
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl Profile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider_kind: ProviderKind,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider_kind,
            email: None,
            is_default: false,
            is_authenticated: false,
            config_dir: None,
            description: None,
            created_at,
            last_used_at: None,
            metadata: None,
        }
    }

    /// String metadata value, if present
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get(key))
            .and_then(Value::as_str)
    }
}

/// Per-provider automatic account switching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoSwitchPolicy {
    pub enabled: bool,
    pub proactive_swap_enabled: bool,
    #[serde(alias = "usageCheckInterval")]
    pub usage_check_interval_ms: u64,
    #[serde(alias = "sessionThreshold")]
    pub session_threshold_percent: u8,
    #[serde(alias = "weeklyThreshold")]
    pub weekly_threshold_percent: u8,
    pub auto_switch_on_rate_limit: bool,
}

impl Default for AutoSwitchPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            proactive_swap_enabled: false,
            usage_check_interval_ms: 30_000,
            session_threshold_percent: 95,
            weekly_threshold_percent: 99,
            auto_switch_on_rate_limit: false,
        }
    }
}

impl AutoSwitchPolicy {
    /// Whether usage has crossed either threshold and a proactive swap applies.
    pub fn should_swap(&self, usage: &UsageSnapshot) -> bool {
        self.enabled
            && self.proactive_swap_enabled
            && (usage.session_percent >= f64::from(self.session_threshold_percent)
                || usage.weekly_percent >= f64::from(self.weekly_threshold_percent))
    }

    pub fn apply(&mut self, update: &AutoSwitchUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(proactive) = update.proactive_swap_enabled {
            self.proactive_swap_enabled = proactive;
        }
        if let Some(interval) = update.usage_check_interval_ms {
            self.usage_check_interval_ms = interval;
        }
        if let Some(threshold) = update.session_threshold_percent {
            self.session_threshold_percent = threshold.min(100);
        }
        if let Some(threshold) = update.weekly_threshold_percent {
            self.weekly_threshold_percent = threshold.min(100);
        }
        if let Some(on_rate_limit) = update.auto_switch_on_rate_limit {
            self.auto_switch_on_rate_limit = on_rate_limit;
        }
    }
}

/// Accounts for one provider kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAccountState {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub active_profile_id: Option<String>,
    #[serde(default)]
    pub auto_switch_policy: AutoSwitchPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_priority_order: Option<Vec<String>>,
}

impl ProviderAccountState {
    pub fn find(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Profile> {
        self.profiles.iter_mut().find(|p| p.id == id)
    }

    /// Active profile, falling back to the first one when the id is unset
    /// or stale. `None` only when there are no profiles.
    pub fn active_profile(&self) -> Option<&Profile> {
        self.active_profile_id
            .as_deref()
            .and_then(|id| self.find(id))
            .or_else(|| self.profiles.first())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettings {
    pub cross_provider_fallback: bool,
}

impl GlobalSettings {
    pub fn apply(&mut self, update: &GlobalSettingsUpdate) {
        if let Some(fallback) = update.cross_provider_fallback {
            self.cross_provider_fallback = fallback;
        }
    }
}

/// The persisted multi-provider document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedStore {
    pub format_version: u32,
    #[serde(default)]
    pub providers: BTreeMap<ProviderKind, ProviderAccountState>,
    #[serde(default)]
    pub global_settings: GlobalSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_profile_ids: Option<Vec<String>>,
}

impl Default for UnifiedStore {
    fn default() -> Self {
        Self::empty()
    }
}

impl UnifiedStore {
    /// Current-version store with an empty entry for every provider kind
    pub fn empty() -> Self {
        let mut store = Self {
            format_version: CURRENT_FORMAT_VERSION,
            providers: BTreeMap::new(),
            global_settings: GlobalSettings::default(),
            migrated_profile_ids: None,
        };
        store.backfill_providers();
        store
    }

    /// Add empty entries for provider kinds missing from the document.
    /// Returns how many were added.
    pub fn backfill_providers(&mut self) -> usize {
        let mut added = 0;
        for kind in ProviderKind::ALL {
            if !self.providers.contains_key(&kind) {
                self.providers.insert(kind, ProviderAccountState::default());
                added += 1;
            }
        }
        added
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderAccountState> {
        self.providers.get(&kind)
    }

    pub fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderAccountState {
        self.providers.entry(kind).or_default()
    }
}

/// Fields accepted when creating a profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub config_dir: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl NewProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Partial profile update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub config_dir: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl ProfileUpdate {
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(name) = &self.name {
            profile.name = name.clone();
        }
        if let Some(email) = &self.email {
            profile.email = Some(email.clone());
        }
        if let Some(config_dir) = &self.config_dir {
            profile.config_dir = Some(config_dir.clone());
        }
        if let Some(description) = &self.description {
            profile.description = Some(description.clone());
        }
        if let Some(metadata) = &self.metadata {
            profile
                .metadata
                .get_or_insert_with(BTreeMap::new)
                .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSwitchUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub proactive_swap_enabled: Option<bool>,
    #[serde(default)]
    pub usage_check_interval_ms: Option<u64>,
    #[serde(default)]
    pub session_threshold_percent: Option<u8>,
    #[serde(default)]
    pub weekly_threshold_percent: Option<u8>,
    #[serde(default)]
    pub auto_switch_on_rate_limit: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettingsUpdate {
    #[serde(default)]
    pub cross_provider_fallback: Option<bool>,
}

/// Lowercase ASCII slug used in generated profile ids
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("profile");
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(id: &str) -> Profile {
        Profile::new(id, id, ProviderKind::Claude, 0)
    }

    #[test]
    fn test_active_profile_fallback() {
        let mut state = ProviderAccountState::default();
        assert!(state.active_profile().is_none());

        state.profiles = vec![profile("a"), profile("b")];
        assert_eq!(state.active_profile().unwrap().id, "a");

        state.active_profile_id = Some("b".to_string());
        assert_eq!(state.active_profile().unwrap().id, "b");

        state.active_profile_id = Some("gone".to_string());
        assert_eq!(state.active_profile().unwrap().id, "a");
    }

    #[test]
    fn test_empty_store_covers_every_kind() {
        let store = UnifiedStore::empty();
        assert_eq!(store.format_version, CURRENT_FORMAT_VERSION);
        for kind in ProviderKind::ALL {
            assert!(store.provider(kind).is_some());
        }
    }

    #[test]
    fn test_store_serializes_camel_case() {
        let mut store = UnifiedStore::empty();
        store.provider_mut(ProviderKind::Claude).profiles.push(profile("claude-a-123456"));
        let value = serde_json::to_value(&store).unwrap();

        assert_eq!(value["formatVersion"], json!(2));
        assert_eq!(value["providers"]["claude"]["activeProfileId"], json!(null));
        assert_eq!(
            value["providers"]["claude"]["profiles"][0]["providerKind"],
            json!("claude")
        );
        assert_eq!(value["globalSettings"]["crossProviderFallback"], json!(false));
        assert!(value["providers"]["claude"]["profiles"][0].get("email").is_none());
    }

    #[test]
    fn test_policy_accepts_legacy_field_names() {
        let policy: AutoSwitchPolicy = serde_json::from_value(json!({
            "enabled": true,
            "sessionThreshold": 80,
            "usageCheckInterval": 60000
        }))
        .unwrap();

        assert!(policy.enabled);
        assert_eq!(policy.session_threshold_percent, 80);
        assert_eq!(policy.usage_check_interval_ms, 60_000);
        assert_eq!(policy.weekly_threshold_percent, 99);
    }

    #[test]
    fn test_should_swap() {
        let mut policy = AutoSwitchPolicy {
            enabled: true,
            proactive_swap_enabled: true,
            ..Default::default()
        };
        let mut usage = UsageSnapshot {
            session_percent: 50.0,
            weekly_percent: 50.0,
            session_resets_at: None,
            weekly_resets_at: None,
            fetched_at: 0,
        };
        assert!(!policy.should_swap(&usage));

        usage.session_percent = 96.0;
        assert!(policy.should_swap(&usage));

        policy.proactive_swap_enabled = false;
        assert!(!policy.should_swap(&usage));
    }

    #[test]
    fn test_policy_update_merges_provided_fields() {
        let mut policy = AutoSwitchPolicy::default();
        policy.apply(&AutoSwitchUpdate {
            enabled: Some(true),
            weekly_threshold_percent: Some(150),
            ..Default::default()
        });

        assert!(policy.enabled);
        assert_eq!(policy.weekly_threshold_percent, 100);
        assert_eq!(policy.session_threshold_percent, 95);
    }

    #[test]
    fn test_profile_update_merges_metadata() {
        let mut p = profile("a");
        p.metadata = Some(BTreeMap::from([("model".to_string(), json!("opus"))]));

        ProfileUpdate {
            description: Some("work".to_string()),
            metadata: Some(BTreeMap::from([("team".to_string(), json!("infra"))])),
            ..Default::default()
        }
        .apply_to(&mut p);

        assert_eq!(p.name, "a");
        assert_eq!(p.description.as_deref(), Some("work"));
        assert_eq!(p.metadata_str("model"), Some("opus"));
        assert_eq!(p.metadata_str("team"), Some("infra"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Work Account"), "work-account");
        assert_eq!(slugify("  --Héllo!! World  "), "h-llo-world");
        assert_eq!(slugify("!!!"), "profile");
    }
}
