//! Engagement host entry point.

use std::collections::BTreeMap;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use engagement_engine::{
    content_for, rule_description, FanoutSink, FrequencyGate, MemoryStore, SystemClock, Clock,
    Variant, VariantAssigner,
};

use engagement_cli::config::{
    load_config, load_config_strict, open_state_store, resolve_config_path, resolve_state_path,
};
use engagement_cli::session::SessionRuntime;
use engagement_cli::transport::StdioTransport;

#[derive(Parser)]
#[command(
    name = "engagement",
    about = "Engagement-triggered lead-capture engine: hosts one visitor session",
    version
)]
struct Cli {
    /// Path to a JSON engine config (weights, cooldown).
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Path to the cross-session state file.
    #[arg(short, long, global = true)]
    state: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Host a session over stdio JSON lines (default).
    Serve {
        /// Do not run the internal one-second clock; expect `tick` messages.
        #[arg(long)]
        no_clock: bool,

        /// Seed the variant draw for reproducible runs.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Launch an interactive session.
    Repl {
        /// Seed the variant draw for reproducible runs.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Simulate many sessions and report the variant split.
    AssignStats {
        /// Number of simulated sessions.
        #[arg(long, default_value_t = 10_000)]
        sessions: usize,

        /// RNG seed.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show the cross-session impression record.
    Status,

    /// Forget the cross-session impression record.
    Reset,

    /// Print variants, rules and weights as JSON.
    Info,

    /// Validate a config file.
    Validate,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   engagement completions bash > ~/.local/share/bash-completion/completions/engagement
    ///   engagement completions zsh > ~/.zfunc/_engagement
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve {
        no_clock: false,
        seed: None,
    }) {
        Commands::Serve { no_clock, seed } => {
            let config = load_config(cli.config.as_deref());
            let state_path = resolve_state_path(cli.state.as_deref());
            let tick = (!no_clock).then(|| Duration::from_secs(1));

            let (handle, outputs) = SessionRuntime::new(config, open_state_store(&state_path))
                .with_tick_interval(tick)
                .spawn(make_rng(seed));
            tracing::info!("Hosting session {}", handle.session_id());

            StdioTransport::new(handle, outputs).run().await?;
        }

        Commands::Repl { seed } => {
            let config = load_config(cli.config.as_deref());
            let state_path = resolve_state_path(cli.state.as_deref());
            engagement_cli::repl::run(config, state_path, seed)?;
        }

        Commands::AssignStats { sessions, seed } => {
            let config = load_config(cli.config.as_deref());
            let mut rng = make_rng(seed);
            let sink = FanoutSink::new();
            let mut counts: BTreeMap<Variant, usize> = BTreeMap::new();

            for _ in 0..sessions {
                let mut store = MemoryStore::new();
                let mut assigner = VariantAssigner::new(config.weights.clone(), &mut rng);
                let variant = assigner.assign(&mut store, &sink, Uuid::new_v4());
                *counts.entry(variant).or_default() += 1;
            }

            println!("{:<16} {:>8} {:>10} {:>10}", "variant", "count", "observed", "expected");
            for variant in Variant::ALL {
                let count = counts.get(&variant).copied().unwrap_or(0);
                let observed = if sessions > 0 {
                    count as f64 / sessions as f64
                } else {
                    0.0
                };
                println!(
                    "{:<16} {:>8} {:>9.2}% {:>9.2}%",
                    variant.as_str(),
                    count,
                    observed * 100.0,
                    config.weights.weight(variant) * 100.0
                );
            }
        }

        Commands::Status => {
            let config = load_config(cli.config.as_deref());
            let state_path = resolve_state_path(cli.state.as_deref());
            let gate = FrequencyGate::new(open_state_store(&state_path), config.cooldown());
            let now = SystemClock.now();

            println!("State file: {}", state_path.display());
            match gate.last_shown_at() {
                Some(at) => println!("  Last shown: {}", at.to_rfc3339()),
                None => println!("  Last shown: never"),
            }
            match gate.eligible_at(now) {
                Some(at) => println!("  Cooling down until {}", at.to_rfc3339()),
                None => println!("  Eligible for a popup"),
            }
        }

        Commands::Reset => {
            let config = load_config(cli.config.as_deref());
            let state_path = resolve_state_path(cli.state.as_deref());
            let mut gate = FrequencyGate::new(open_state_store(&state_path), config.cooldown());
            gate.clear();
            println!("Cleared impression record in {}", state_path.display());
        }

        Commands::Info => {
            let config = load_config(cli.config.as_deref());
            let variants: Vec<_> = Variant::ALL
                .iter()
                .map(|v| {
                    serde_json::json!({
                        "variant": v.as_str(),
                        "weight": config.weights.weight(*v),
                        "rule": rule_description(*v),
                        "headline": content_for(*v).map(|c| c.headline),
                    })
                })
                .collect();
            let info = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config_path": resolve_config_path(cli.config.as_deref()).map(|p| p.display().to_string()),
                "state_path": resolve_state_path(cli.state.as_deref()).display().to_string(),
                "cooldown_hours": config.cooldown_hours,
                "weights_valid": config.weights.validate().is_ok(),
                "variants": variants,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Validate => {
            let Some(path) = resolve_config_path(cli.config.as_deref()) else {
                println!("No config file found; built-in defaults are in effect.");
                return Ok(());
            };
            match load_config_strict(&path) {
                Ok(config) => {
                    println!("Valid config: {}", path.display());
                    println!("  Cooldown: {}h", config.cooldown_hours);
                    for (variant, weight) in config.weights.iter() {
                        println!("  {:<16} {weight:.2}", variant.as_str());
                    }
                }
                Err(e) => {
                    eprintln!("Invalid config {}: {e}", path.display());
                    std::process::exit(1);
                }
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "engagement", &mut std::io::stdout());
        }
    }

    Ok(())
}
