//! Conductor core
//!
//! Decides which provider, account and model backs each terminal session:
//! - Per-provider adapters for credentials and CLI environment
//! - A versioned multi-provider profile store with legacy migration
//! - Terminal to provider bindings
//! - Rate-limit aware routing recommendations per task phase

pub mod auth;
pub mod commands;
pub mod error;
pub mod paths;
pub mod profiles;
pub mod registry;
pub mod routing;

pub use error::{ConductorError, Result};
