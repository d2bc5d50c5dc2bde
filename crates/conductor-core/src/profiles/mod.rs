//! Profiles
//!
//! The multi-provider profile document, its persistence and legacy
//! migration, and the manager that owns it.

pub mod manager;
pub mod migration;
pub mod store;
pub mod types;

pub use manager::{ManagerConfig, UnifiedProfileManager, generate_profile_id};
pub use migration::{LegacyStore, migrate_legacy_to_current};
pub use store::{LoadOutcome, SaveOutcome, StoreLoad, load_store, save_store};
pub use types::{
    AutoSwitchPolicy, AutoSwitchUpdate, CURRENT_FORMAT_VERSION, GlobalSettings,
    GlobalSettingsUpdate, NewProfile, Profile, ProfileUpdate, ProviderAccountState, UnifiedStore,
};
