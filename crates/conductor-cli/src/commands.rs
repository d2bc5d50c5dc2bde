use anyhow::{Context, Result, anyhow};
use conductor_core::auth::{ProviderKind, SecretVault, VaultHandle, process_env};
use conductor_core::commands::{CommandError, Conductor, RoutingRequest};
use conductor_core::paths;
use conductor_core::profiles::{
    AutoSwitchUpdate, GlobalSettingsUpdate, ManagerConfig, NewProfile, ProfileUpdate,
};
use conductor_core::registry::MODEL_METADATA_KEY;
use conductor_core::routing::{HandoffRequest, Phase, PhaseOverrides, RoutingSettings};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::cli::{
    AutoSwitchCommands, AutoSwitchSetArgs, Commands, GlobalCommands, HandoffArgs, HandoffCommands,
    ProfileCommands, RouteArgs, RoutingCommands,
};
use crate::output::print_json;

/// Terminal id used for one-shot `env` bindings
const CLI_TERMINAL_ID: &str = "conductor-cli";

pub async fn run(command: Commands, base_dir: &Path) -> Result<()> {
    let config = ManagerConfig::new(paths::profiles_path_in(base_dir));
    let vault = VaultHandle::new(default_vault(), config.vault_namespace.clone());
    let conductor = Conductor::open(config, Some(vault), &process_env())
        .await
        .map_err(command_error)?;

    let result = dispatch(&conductor, command).await;
    conductor.shutdown().await;
    result
}

async fn dispatch(conductor: &Conductor, command: Commands) -> Result<()> {
    match command {
        Commands::Providers => print_json(&conductor.list_provider_kinds()),
        Commands::Profiles { command } => profiles(conductor, command).await,
        Commands::AutoSwitch { command } => auto_switch(conductor, command).await,
        Commands::Global { command } => global(conductor, command).await,
        Commands::Route(args) => route(conductor, args).await,
        Commands::Routing { command } => routing(conductor, command).await,
        Commands::Task {
            spec_dir,
            provider,
            model,
        } => {
            let selection = conductor
                .select_task_provider(&spec_dir, provider.as_deref(), model.as_deref())
                .await;
            print_json(&selection)
        }
        Commands::Handoff { command } => handoff(conductor, command).await,
        Commands::Env { kind, profile } => {
            let launch = conductor
                .create_terminal_provider(CLI_TERMINAL_ID, &kind, profile.as_deref())
                .await
                .map_err(command_error)?;
            if let Some(warning) = &launch.warning {
                tracing::warn!(warning = %warning, "Profile store not saved");
            }
            print_json(&launch.data.masked())
        }
    }
}

async fn profiles(conductor: &Conductor, command: ProfileCommands) -> Result<()> {
    match command {
        ProfileCommands::List { kind } => {
            let profiles = conductor.list_profiles(&kind).await.map_err(command_error)?;
            let active = conductor
                .get_active_profile(&kind)
                .await
                .map_err(command_error)?
                .map(|p| p.id);
            print_json(&json!({ "activeProfileId": active, "profiles": profiles }))
        }
        ProfileCommands::Add {
            kind,
            name,
            email,
            config_dir,
            description,
            model,
        } => {
            let input = NewProfile {
                name,
                email,
                config_dir,
                description,
                metadata: model_metadata(model),
            };
            let output = conductor
                .add_profile(&kind, input)
                .await
                .map_err(command_error)?;
            print_json(&output)
        }
        ProfileCommands::Update {
            kind,
            id,
            name,
            email,
            config_dir,
            description,
            model,
        } => {
            let update = ProfileUpdate {
                name,
                email,
                config_dir,
                description,
                metadata: model_metadata(model),
            };
            let output = conductor
                .update_profile(&kind, &id, update)
                .await
                .map_err(command_error)?;
            print_json(&output)
        }
        ProfileCommands::Remove { kind, id } => {
            let output = conductor
                .delete_profile(&kind, &id)
                .await
                .map_err(command_error)?;
            print_json(&json!({ "removed": id, "warning": output.warning }))
        }
        ProfileCommands::Use { kind, id } => {
            let output = conductor
                .set_active_profile(&kind, &id)
                .await
                .map_err(command_error)?;
            print_json(&json!({ "activeProfileId": id, "warning": output.warning }))
        }
    }
}

async fn auto_switch(conductor: &Conductor, command: AutoSwitchCommands) -> Result<()> {
    match command {
        AutoSwitchCommands::Show { kind } => {
            let policy = conductor
                .get_auto_switch_settings(&kind)
                .await
                .map_err(command_error)?;
            print_json(&policy)
        }
        AutoSwitchCommands::Set(AutoSwitchSetArgs {
            kind,
            enabled,
            proactive,
            interval_ms,
            session_threshold,
            weekly_threshold,
            on_rate_limit,
        }) => {
            let update = AutoSwitchUpdate {
                enabled,
                proactive_swap_enabled: proactive,
                usage_check_interval_ms: interval_ms,
                session_threshold_percent: session_threshold,
                weekly_threshold_percent: weekly_threshold,
                auto_switch_on_rate_limit: on_rate_limit,
            };
            let output = conductor
                .update_auto_switch_settings(&kind, update)
                .await
                .map_err(command_error)?;
            print_json(&output)
        }
    }
}

async fn global(conductor: &Conductor, command: GlobalCommands) -> Result<()> {
    match command {
        GlobalCommands::Show => {
            let settings = conductor.get_global_settings().await.map_err(command_error)?;
            print_json(&settings)
        }
        GlobalCommands::Set {
            cross_provider_fallback,
        } => {
            let output = conductor
                .update_global_settings(GlobalSettingsUpdate {
                    cross_provider_fallback,
                })
                .await
                .map_err(command_error)?;
            print_json(&output)
        }
    }
}

async fn route(conductor: &Conductor, args: RouteArgs) -> Result<()> {
    let spec_content = tokio::fs::read_to_string(&args.spec)
        .await
        .with_context(|| format!("Failed to read spec file {}", args.spec.display()))?;

    let parse = |value: Option<String>| -> Result<Option<ProviderKind>> {
        Ok(value.map(|kind| kind.parse::<ProviderKind>()).transpose()?)
    };
    let overrides = PhaseOverrides {
        planning: parse(args.planning)?,
        coding: parse(args.coding)?,
        qa: parse(args.qa)?,
    };

    let request = RoutingRequest {
        spec_content,
        overrides,
        rate_limited: args.rate_limited,
    };
    let recommendation = conductor
        .recommend_routing(request, args.project.as_deref())
        .await
        .map_err(command_error)?;
    print_json(&recommendation)
}

async fn routing(conductor: &Conductor, command: RoutingCommands) -> Result<()> {
    match command {
        RoutingCommands::Show { project } => {
            print_json(&conductor.get_routing_settings(&project).await)
        }
        RoutingCommands::Save { project, file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let settings: RoutingSettings = serde_json::from_str(&content)
                .with_context(|| format!("Invalid routing settings in {}", file.display()))?;
            conductor
                .save_routing_settings(&project, &settings)
                .await
                .map_err(command_error)?;
            print_json(&settings)
        }
    }
}

async fn handoff(conductor: &Conductor, command: HandoffCommands) -> Result<()> {
    match command {
        HandoffCommands::Record(HandoffArgs {
            spec_dir,
            from_phase,
            from_provider,
            to_phase,
            to_provider,
            artifacts,
            summary,
            context_files,
        }) => {
            let request = HandoffRequest {
                source_phase: from_phase.parse::<Phase>()?,
                source_provider: from_provider.parse::<ProviderKind>()?,
                target_phase: to_phase.parse::<Phase>()?,
                target_provider: to_provider.parse::<ProviderKind>()?,
                artifacts,
                summary,
                context_files,
            };
            let record = conductor
                .record_phase_handoff(&spec_dir, request)
                .await
                .map_err(command_error)?;
            print_json(&record)
        }
        HandoffCommands::List { spec_dir } => {
            print_json(&conductor.get_context_lineage(&spec_dir).await)
        }
    }
}

fn model_metadata(model: Option<String>) -> Option<BTreeMap<String, Value>> {
    model.map(|model| BTreeMap::from([(MODEL_METADATA_KEY.to_string(), Value::String(model))]))
}

fn command_error(err: CommandError) -> anyhow::Error {
    anyhow!("[{}] {}", err.code, err.message)
}

#[cfg(feature = "keychain")]
fn default_vault() -> Arc<dyn SecretVault> {
    Arc::new(conductor_core::auth::KeychainVault)
}

#[cfg(not(feature = "keychain"))]
fn default_vault() -> Arc<dyn SecretVault> {
    tracing::debug!("Keychain support not compiled in, secrets are kept in memory");
    Arc::new(conductor_core::auth::MemoryVault::new())
}
