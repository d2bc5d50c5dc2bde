//! Routing recommendations
//!
//! Picks a provider and model per task phase from simple heuristics over
//! the task specification, honoring configured defaults and walking
//! fallback chains around rate-limited providers. Pure and deterministic.

mod handoff;
mod settings;
mod task;

pub use handoff::{
    HandoffRequest, LINEAGE_FILE, PhaseHandoff, build_handoff_prompt, create_phase_handoff,
    load_context_lineage, save_context_lineage,
};
pub use settings::{
    BASELINE_PROVIDER, PhaseDefaults, RoutingSettings, default_fallback_chains,
    load_routing_settings, save_routing_settings,
};
pub use task::{
    TASK_METADATA_FILE, TaskMetadata, get_task_model, get_task_provider, load_task_metadata,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::auth::types::ProviderKind;
use crate::error::ConductorError;

/// Specs longer than this (in chars) favor the long-context provider
pub const LARGE_CONTEXT_THRESHOLD: usize = 10_000;
/// Specs shorter than this (in chars) count as quick tasks
pub const QUICK_TASK_THRESHOLD: usize = 2_000;

pub const LONG_CONTEXT_PROVIDER: ProviderKind = ProviderKind::Gemini;
pub const CODING_PROVIDER: ProviderKind = ProviderKind::Claude;
pub const QUICK_TASK_PROVIDER: ProviderKind = ProviderKind::OpenAI;

pub const CONFIDENCE_LONG_CONTEXT: f64 = 0.86;
pub const CONFIDENCE_TYPED_CODING: f64 = 0.88;
pub const CONFIDENCE_QUICK_TASK: f64 = 0.81;
pub const CONFIDENCE_BALANCED: f64 = 0.74;
pub const CONFIDENCE_PREFERENCE: f64 = 0.95;
pub const CONFIDENCE_FALLBACK: f64 = 0.6;

/// Distinct typed-language or web-framework markers needed for the coding
/// heuristic
const TYPED_MARKER_MIN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Planning,
    Coding,
    Qa,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Planning, Phase::Coding, Phase::Qa];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Coding => "coding",
            Phase::Qa => "qa",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| ConductorError::InvariantViolation(format!("Unknown phase: {}", value)))
    }
}

/// Explicit per-phase choices from the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseOverrides {
    pub planning: Option<ProviderKind>,
    pub coding: Option<ProviderKind>,
    pub qa: Option<ProviderKind>,
}

impl PhaseOverrides {
    pub fn get(&self, phase: Phase) -> Option<ProviderKind> {
        match phase {
            Phase::Planning => self.planning,
            Phase::Coding => self.coding,
            Phase::Qa => self.qa,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecommendation {
    pub provider: ProviderKind,
    pub model: String,
    pub reason: String,
    /// 0.0 to 1.0
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRecommendation {
    pub planning: ProviderRecommendation,
    pub coding: ProviderRecommendation,
    pub qa: ProviderRecommendation,
}

impl RoutingRecommendation {
    pub fn get(&self, phase: Phase) -> &ProviderRecommendation {
        match phase {
            Phase::Planning => &self.planning,
            Phase::Coding => &self.coding,
            Phase::Qa => &self.qa,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TaskSignals {
    is_large_context: bool,
    is_typed_heavy: bool,
    is_quick_task: bool,
}

impl TaskSignals {
    fn collect(spec_content: &str) -> Self {
        static TYPED_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(concat!(
                r"(?i)\b(typescript|tsconfig|react|next\.js|node\.?js|angular|vue|svelte|rust|golang|kotlin)\b",
                r"|\.(tsx?)\b",
            ))
            .expect("invalid typed marker regex")
        });

        let length = spec_content.chars().count();
        let markers: HashSet<String> = TYPED_MARKERS
            .find_iter(spec_content)
            .map(|m| m.as_str().to_ascii_lowercase())
            .collect();

        Self {
            is_large_context: length > LARGE_CONTEXT_THRESHOLD,
            is_typed_heavy: markers.len() >= TYPED_MARKER_MIN,
            is_quick_task: length > 0 && length < QUICK_TASK_THRESHOLD,
        }
    }

    fn base_recommendation(&self, phase: Phase) -> (ProviderKind, &'static str, f64) {
        if phase == Phase::Planning && self.is_large_context {
            (
                LONG_CONTEXT_PROVIDER,
                "Large context task detected, favoring the long-context provider",
                CONFIDENCE_LONG_CONTEXT,
            )
        } else if phase == Phase::Coding && self.is_typed_heavy {
            (
                CODING_PROVIDER,
                "Typed-language or web-framework task detected, favoring agentic coding",
                CONFIDENCE_TYPED_CODING,
            )
        } else if self.is_quick_task {
            (
                QUICK_TASK_PROVIDER,
                "Quick task detected, favoring faster and cheaper execution",
                CONFIDENCE_QUICK_TASK,
            )
        } else {
            (BASELINE_PROVIDER, "Balanced default routing", CONFIDENCE_BALANCED)
        }
    }
}

/// Recommend a provider and model for each phase.
///
/// A caller override, or a configured default that differs from
/// [`BASELINE_PROVIDER`], beats the heuristic. A rate-limited choice is
/// replaced by the first available entry of its fallback chain; when the
/// whole chain is limited the original choice is kept.
pub fn analyze_routing_recommendation(
    spec_content: &str,
    overrides: &PhaseOverrides,
    rate_limited: &BTreeSet<ProviderKind>,
    settings: &RoutingSettings,
) -> RoutingRecommendation {
    let signals = TaskSignals::collect(spec_content);
    let recommend = |phase| recommend_phase(phase, &signals, overrides, rate_limited, settings);

    RoutingRecommendation {
        planning: recommend(Phase::Planning),
        coding: recommend(Phase::Coding),
        qa: recommend(Phase::Qa),
    }
}

fn recommend_phase(
    phase: Phase,
    signals: &TaskSignals,
    overrides: &PhaseOverrides,
    rate_limited: &BTreeSet<ProviderKind>,
    settings: &RoutingSettings,
) -> ProviderRecommendation {
    let (base, base_reason, base_confidence) = signals.base_recommendation(phase);
    let configured = settings.default_providers.get(phase);

    let (preferred, reason, confidence) = match overrides.get(phase) {
        Some(provider) => (
            provider,
            "Using user default provider preference".to_string(),
            CONFIDENCE_PREFERENCE,
        ),
        None if configured != BASELINE_PROVIDER => (
            configured,
            "Using configured default provider for this phase".to_string(),
            CONFIDENCE_PREFERENCE,
        ),
        None => (base, base_reason.to_string(), base_confidence),
    };

    let provider = resolve_fallback(preferred, rate_limited, settings);
    let (reason, confidence) = if provider != preferred {
        (
            format!(
                "{} is rate limited, falling back to {}",
                preferred.display_name(),
                provider.display_name()
            ),
            CONFIDENCE_FALLBACK,
        )
    } else {
        (reason, confidence)
    };

    ProviderRecommendation {
        provider,
        model: provider.default_model().to_string(),
        reason,
        confidence,
    }
}

/// First entry of `preferred`'s chain that is not rate limited, or
/// `preferred` itself.
pub fn resolve_fallback(
    preferred: ProviderKind,
    rate_limited: &BTreeSet<ProviderKind>,
    settings: &RoutingSettings,
) -> ProviderKind {
    if !rate_limited.contains(&preferred) {
        return preferred;
    }
    settings
        .chain(preferred)
        .iter()
        .copied()
        .find(|candidate| !rate_limited.contains(candidate))
        .unwrap_or(preferred)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(spec: &str) -> RoutingRecommendation {
        analyze_routing_recommendation(
            spec,
            &PhaseOverrides::default(),
            &BTreeSet::new(),
            &RoutingSettings::default(),
        )
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!(" QA ".parse::<Phase>().unwrap(), Phase::Qa);
        assert_eq!("Planning".parse::<Phase>().unwrap(), Phase::Planning);
        assert_eq!("review".parse::<Phase>().unwrap_err().code(), "INVARIANT_VIOLATION");
    }

    #[test]
    fn test_large_spec_plans_with_long_context_provider() {
        let spec = "a".repeat(12_000);
        let rec = analyze(&spec);

        assert_eq!(rec.planning.provider, LONG_CONTEXT_PROVIDER);
        assert_eq!(rec.planning.confidence, CONFIDENCE_LONG_CONTEXT);
        assert_eq!(rec.planning.model, "gemini-2.0-flash");
        assert_eq!(rec.coding.provider, BASELINE_PROVIDER);
        assert_eq!(rec.coding.confidence, CONFIDENCE_BALANCED);
    }

    #[test]
    fn test_typed_spec_codes_with_coding_provider() {
        let spec = format!(
            "Build a React dashboard in TypeScript with a tsconfig. {}",
            "x".repeat(3_000)
        );
        let rec = analyze(&spec);

        assert_eq!(rec.coding.provider, CODING_PROVIDER);
        assert_eq!(rec.coding.confidence, CONFIDENCE_TYPED_CODING);
        assert_eq!(rec.qa.confidence, CONFIDENCE_BALANCED);
    }

    #[test]
    fn test_single_marker_is_not_typed_heavy() {
        let spec = format!("Use react. {}", "x".repeat(3_000));
        assert_eq!(analyze(&spec).coding.confidence, CONFIDENCE_BALANCED);
    }

    #[test]
    fn test_quick_task() {
        let rec = analyze("Fix the typo in the README");
        for phase in Phase::ALL {
            assert_eq!(rec.get(phase).provider, QUICK_TASK_PROVIDER);
            assert_eq!(rec.get(phase).confidence, CONFIDENCE_QUICK_TASK);
        }
    }

    #[test]
    fn test_empty_spec_is_balanced() {
        let rec = analyze("");
        assert_eq!(rec.planning.provider, BASELINE_PROVIDER);
        assert_eq!(rec.planning.confidence, CONFIDENCE_BALANCED);
    }

    #[test]
    fn test_user_override_wins() {
        let overrides = PhaseOverrides {
            qa: Some(ProviderKind::Opencode),
            ..Default::default()
        };
        let rec = analyze_routing_recommendation(
            "short",
            &overrides,
            &BTreeSet::new(),
            &RoutingSettings::default(),
        );

        assert_eq!(rec.qa.provider, ProviderKind::Opencode);
        assert_eq!(rec.qa.model, "deepseek-v3");
        assert_eq!(rec.qa.confidence, CONFIDENCE_PREFERENCE);
        assert_eq!(rec.planning.provider, QUICK_TASK_PROVIDER);
    }

    #[test]
    fn test_configured_default_differing_from_baseline_wins() {
        let mut settings = RoutingSettings::default();
        settings.default_providers.planning = ProviderKind::Gemini;

        let rec = analyze_routing_recommendation(
            "short",
            &PhaseOverrides::default(),
            &BTreeSet::new(),
            &settings,
        );
        assert_eq!(rec.planning.provider, ProviderKind::Gemini);
        assert_eq!(rec.planning.confidence, CONFIDENCE_PREFERENCE);
    }

    #[test]
    fn test_rate_limited_provider_falls_back() {
        let spec = "a".repeat(12_000);
        let limited = BTreeSet::from([ProviderKind::Gemini]);
        let rec = analyze_routing_recommendation(
            &spec,
            &PhaseOverrides::default(),
            &limited,
            &RoutingSettings::default(),
        );

        assert_eq!(rec.planning.provider, ProviderKind::Claude);
        assert_eq!(rec.planning.confidence, CONFIDENCE_FALLBACK);
        assert!(rec.planning.reason.contains("rate limited"));
    }

    #[test]
    fn test_exhausted_chain_keeps_preferred() {
        let limited: BTreeSet<_> = ProviderKind::ALL.into_iter().collect();
        let rec = analyze_routing_recommendation(
            "",
            &PhaseOverrides::default(),
            &limited,
            &RoutingSettings::default(),
        );

        assert_eq!(rec.planning.provider, BASELINE_PROVIDER);
        assert_eq!(rec.planning.confidence, CONFIDENCE_BALANCED);
    }

    #[test]
    fn test_fallback_skips_limited_chain_entries() {
        let mut settings = RoutingSettings::default();
        settings.fallback_chains.insert(
            ProviderKind::Claude,
            vec![ProviderKind::Gemini, ProviderKind::Opencode, ProviderKind::OpenAI],
        );
        let limited = BTreeSet::from([ProviderKind::Claude, ProviderKind::Gemini]);

        assert_eq!(
            resolve_fallback(ProviderKind::Claude, &limited, &settings),
            ProviderKind::Opencode
        );
    }

    #[test]
    fn test_recommendation_is_deterministic() {
        let spec = "Port the node service to TypeScript";
        let limited = BTreeSet::from([ProviderKind::OpenAI]);
        let first = analyze_routing_recommendation(
            spec,
            &PhaseOverrides::default(),
            &limited,
            &RoutingSettings::default(),
        );
        let second = analyze_routing_recommendation(
            spec,
            &PhaseOverrides::default(),
            &limited,
            &RoutingSettings::default(),
        );
        assert_eq!(first, second);
    }
}
