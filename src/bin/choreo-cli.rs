//! Choreo CLI - parse and dry-run animation scripts
//!
//! Runs scripts against recording capabilities and prints what the robot
//! would have been asked to do.

use anyhow::{Context, bail};
use choreo::capability::{Capabilities, HttpPeerTransport, RecordingCapabilities};
use choreo::interpreter::{ScriptRunner, parse_script};
use choreo::runtime::storage::{load_config, write_config};
use choreo::runtime::{AnimationContext, EngineConfig, InteractionContext, Performer};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "choreo")]
#[command(about = "Animation-script engine for conversational robots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the parsed clauses of a script as JSON
    Parse {
        /// Script text
        script: String,
    },

    /// Dry-run a script and print the capability calls it makes
    Run {
        /// Script text
        script: String,

        /// Repeat the main loop until stopped
        #[arg(long)]
        repeat: bool,

        /// Explicitly stop (firing completion clauses) after this many milliseconds
        #[arg(long)]
        stop_after_ms: Option<u64>,

        /// Engine configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Relay fan-out clauses to the configured peers over HTTP
        #[arg(long)]
        live_peers: bool,
    },

    /// Write the default engine configuration
    InitConfig {
        /// Destination file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { script } => {
            let parsed = parse_script(&script);
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }

        Commands::Run {
            script,
            repeat,
            stop_after_ms,
            config,
            live_peers,
        } => {
            if repeat && stop_after_ms.is_none() {
                bail!("--repeat never ends on its own; pass --stop-after-ms");
            }
            let config = match config {
                Some(path) => load_config(&path)
                    .with_context(|| format!("Failed to load config {:?}", path))?,
                None => EngineConfig::default(),
            };

            let recorder = Arc::new(RecordingCapabilities::new());
            let mut capabilities = Capabilities::recording(recorder.clone());
            if live_peers {
                capabilities.transport = Arc::new(HttpPeerTransport::new(config.ack_timeout()));
            }
            let runner = Arc::new(ScriptRunner::new(Arc::new(Performer::new(
                config,
                capabilities,
            ))));

            let stopper = stop_after_ms.map(|ms| {
                let runner = runner.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    runner.stop_running_animation_scripts().await
                })
            });

            let mut animation = AnimationContext {
                name: "cli".to_string(),
                ..AnimationContext::default()
            };
            let mut interaction = InteractionContext::default();
            let completed = runner
                .run_animation_script(&script, repeat, &mut animation, &mut interaction)
                .await;

            let stopped = match stopper {
                Some(handle) => handle.await.context("stop task panicked")?,
                None => false,
            };

            let report = json!({
                "completed": completed,
                "stopped": stopped,
                "spoken_text": animation.spoken_text,
                "calls": recorder.take_calls(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::InitConfig { path } => {
            write_config(&path, &EngineConfig::default())
                .with_context(|| format!("Failed to write config {:?}", path))?;
            println!("Wrote default config to {:?}", path);
        }
    }

    Ok(())
}
