use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about = "Conductor - provider, account and model routing for coding CLIs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration directory (defaults to ~/.conductor)
    #[arg(long, global = true, env = "CONDUCTOR_DIR")]
    pub dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List provider kinds and their capabilities
    Providers,

    /// Profile management
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Per-provider auto-switch policy
    AutoSwitch {
        #[command(subcommand)]
        command: AutoSwitchCommands,
    },

    /// Cross-provider settings
    Global {
        #[command(subcommand)]
        command: GlobalCommands,
    },

    /// Recommend a provider and model per phase for a task spec
    Route(RouteArgs),

    /// Per-project routing settings
    Routing {
        #[command(subcommand)]
        command: RoutingCommands,
    },

    /// Provider and per-phase models for a task directory
    Task {
        /// Task directory holding task_metadata.json
        #[arg(long, default_value = ".")]
        spec_dir: PathBuf,

        /// Provider override
        #[arg(long)]
        provider: Option<String>,

        /// Model override for every phase
        #[arg(long)]
        model: Option<String>,
    },

    /// Cross-provider phase handoffs
    Handoff {
        #[command(subcommand)]
        command: HandoffCommands,
    },

    /// Show the command and masked environment for a provider's profile
    Env {
        /// Provider kind (claude, gemini, openai, opencode)
        kind: String,

        /// Profile id (defaults to the active profile)
        #[arg(long)]
        profile: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// List profiles of a provider
    List { kind: String },

    /// Add a profile
    Add {
        kind: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: Option<String>,

        /// CLI configuration directory for this account
        #[arg(long)]
        config_dir: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Model to launch the CLI with
        #[arg(long)]
        model: Option<String>,
    },

    /// Update fields of a profile
    Update {
        kind: String,
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        config_dir: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        model: Option<String>,
    },

    /// Remove a profile
    Remove { kind: String, id: String },

    /// Make a profile the active one
    Use { kind: String, id: String },
}

#[derive(Subcommand)]
pub enum AutoSwitchCommands {
    /// Show the policy of a provider
    Show { kind: String },

    /// Update the policy of a provider
    Set(AutoSwitchSetArgs),
}

#[derive(Args)]
pub struct AutoSwitchSetArgs {
    pub kind: String,

    #[arg(long)]
    pub enabled: Option<bool>,

    #[arg(long)]
    pub proactive: Option<bool>,

    #[arg(long)]
    pub interval_ms: Option<u64>,

    #[arg(long)]
    pub session_threshold: Option<u8>,

    #[arg(long)]
    pub weekly_threshold: Option<u8>,

    #[arg(long)]
    pub on_rate_limit: Option<bool>,
}

#[derive(Subcommand)]
pub enum GlobalCommands {
    Show,

    Set {
        #[arg(long)]
        cross_provider_fallback: Option<bool>,
    },
}

#[derive(Args)]
pub struct RouteArgs {
    /// Task specification file
    #[arg(long)]
    pub spec: PathBuf,

    /// Provider kinds to treat as rate limited (repeatable)
    #[arg(long = "rate-limited")]
    pub rate_limited: Vec<String>,

    /// Project whose routing settings apply
    #[arg(long)]
    pub project: Option<PathBuf>,

    #[arg(long)]
    pub planning: Option<String>,

    #[arg(long)]
    pub coding: Option<String>,

    #[arg(long)]
    pub qa: Option<String>,
}

#[derive(Subcommand)]
pub enum RoutingCommands {
    /// Show settings for a project (defaults when absent)
    Show {
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },

    /// Save settings for a project from a JSON file
    Save {
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// JSON document with defaultProviders, fallbackChains and
        /// showConfirmationDialog
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum HandoffCommands {
    /// Record a handoff and print the prompt for the next provider
    Record(HandoffArgs),

    /// List recorded handoffs for a task directory
    List {
        #[arg(long, default_value = ".")]
        spec_dir: PathBuf,
    },
}

#[derive(Args)]
pub struct HandoffArgs {
    #[arg(long, default_value = ".")]
    pub spec_dir: PathBuf,

    #[arg(long)]
    pub from_phase: String,

    #[arg(long)]
    pub from_provider: String,

    #[arg(long)]
    pub to_phase: String,

    #[arg(long)]
    pub to_provider: String,

    /// Produced artifact (repeatable)
    #[arg(long = "artifact")]
    pub artifacts: Vec<String>,

    #[arg(long, default_value = "")]
    pub summary: String,

    /// File the next phase should read (repeatable)
    #[arg(long = "context-file")]
    pub context_files: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_route_with_repeated_rate_limits() {
        let cli = Cli::try_parse_from([
            "conductor",
            "route",
            "--spec",
            "task.md",
            "--rate-limited",
            "claude",
            "--rate-limited",
            "gemini",
        ])
        .unwrap();

        let Commands::Route(args) = cli.command else {
            panic!("expected route command");
        };
        assert_eq!(args.rate_limited, vec!["claude", "gemini"]);
        assert!(args.project.is_none());
    }

    #[test]
    fn test_parse_profiles_add() {
        let cli = Cli::try_parse_from([
            "conductor",
            "--dir",
            "/tmp/conductor",
            "profiles",
            "add",
            "claude",
            "--name",
            "Work",
            "--model",
            "claude-opus-4",
        ])
        .unwrap();

        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/conductor")));
        assert!(matches!(
            cli.command,
            Commands::Profiles {
                command: ProfileCommands::Add { ref name, ref model, .. }
            } if name == "Work" && model.as_deref() == Some("claude-opus-4")
        ));
    }

    #[test]
    fn test_parse_handoff_record() {
        let cli = Cli::try_parse_from([
            "conductor",
            "handoff",
            "record",
            "--from-phase",
            "planning",
            "--from-provider",
            "gemini",
            "--to-phase",
            "coding",
            "--to-provider",
            "claude",
            "--artifact",
            "plan.json",
            "--artifact",
            "notes.md",
        ])
        .unwrap();

        let Commands::Handoff {
            command: HandoffCommands::Record(args),
        } = cli.command
        else {
            panic!("expected handoff record");
        };
        assert_eq!(args.artifacts, vec!["plan.json", "notes.md"]);
        assert_eq!(args.spec_dir, PathBuf::from("."));
        assert!(args.summary.is_empty());
    }
}
