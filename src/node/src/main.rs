//! PBFT Visualizer - Headless Simulation Node
//!
//! Replays the teaching PBFT scenario on a wall-clock frame ticker:
//! - Scripted Request/Pre-Prepare/Prepare/Commit/Reply exchange
//! - Fault injection and view changes from stdin commands
//! - Structured tracing output of every simulation event

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pbftviz_consensus::{JsonFilePreferenceStore, SceneTable, SimulationEngine, SimulationEvent};
use pbftviz_node::{execute, shared, status_line, ControlCommand, NodeConfig, SharedSimulation, SimulationTicker};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// PBFT Visualizer node CLI
#[derive(Parser)]
#[command(name = "pbftviz-node")]
#[command(about = "Headless PBFT teaching simulation")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "pbftviz.toml", env = "PBFTVIZ_CONFIG")]
    config: PathBuf,

    /// Stop after this many committed rounds (overrides config)
    #[arg(long, env = "PBFTVIZ_ROUNDS")]
    rounds: Option<u64>,

    /// RNG seed for reproducible jitter
    #[arg(long, env = "PBFTVIZ_SEED")]
    seed: Option<u64>,

    /// Wait for a `request` command before each round
    #[arg(long)]
    manual: bool,

    /// Maximum simulated network delay in ms
    #[arg(long)]
    jitter: Option<u64>,

    /// Nodes to mark faulty at startup
    #[arg(long, value_delimiter = ',')]
    faulty: Vec<usize>,

    /// Playback speed multiplier
    #[arg(long)]
    speed: Option<f64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the simulation (default)
    Run,

    /// Print the scene table as JSON
    Scenes {
        /// Number of nodes to script for
        #[arg(short, long, default_value_t = 4)]
        nodes: usize,
    },

    /// Show node version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Version) => {
            println!("pbftviz-node v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(Command::Scenes { nodes }) => {
            println!("{}", SceneTable::standard(nodes).to_json()?);
            return Ok(());
        }
        Some(Command::Run) | None => {}
    }

    // Load configuration
    let mut config = NodeConfig::load_or_default(&cli.config)?;

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},pbftviz_node=debug", log_level).into()),
        )
        .with_target(true)
        .with_line_number(true)
        .init();

    info!("Starting pbftviz-node v{}", env!("CARGO_PKG_VERSION"));
    info!("Using configuration from {:?}", cli.config);

    // Apply CLI overrides
    if let Some(seed) = cli.seed {
        config.simulation.seed = Some(seed);
    }
    if cli.manual {
        config.simulation.driver.manual_mode = true;
    }
    if let Some(jitter) = cli.jitter {
        config.simulation.driver.jitter_ms = jitter;
    }
    if let Some(speed) = cli.speed {
        config.simulation.driver.speed = speed;
    }
    if let Some(rounds) = cli.rounds {
        config.ticker.max_rounds = Some(rounds);
    }

    // Validate configuration
    config.validate()?;

    let engine = build_engine(&config, &cli.faulty)?;
    info!(session = %engine.session_id(), "Simulation initialized");

    let simulation = shared(engine);
    let events = tokio::spawn(log_events(simulation.clone(), config.logging.json_events));
    let commands = tokio::spawn(read_commands(simulation.clone()));

    let mut ticker = SimulationTicker::new(simulation.clone(), config.ticker.frame_ms, config.ticker.max_rounds);

    // Graceful shutdown on Ctrl+C
    let shutdown = ticker.shutdown_handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal (Ctrl+C)");
            shutdown.send(()).await.ok();
        }
    });

    let summary = ticker.run().await;

    events.abort();
    commands.abort();

    info!(
        frames = summary.frames,
        rounds = summary.rounds_completed,
        t = summary.t,
        value = summary.value,
        "Simulation stopped"
    );
    println!("{}", status_line(&simulation.lock()));
    Ok(())
}

fn build_engine(config: &NodeConfig, faulty: &[usize]) -> Result<SimulationEngine> {
    let mut engine = SimulationEngine::new(config.simulation.clone())
        .context("Failed to initialize simulation engine")?;

    if let Some(path) = &config.preferences.path {
        info!("Loading preferences from {:?}", path);
        engine = engine.with_preference_store(Arc::new(JsonFilePreferenceStore::new(path)));
    }

    for node in faulty {
        engine
            .toggle_faulty(*node)
            .with_context(|| format!("Cannot mark node {node} faulty"))?;
    }

    engine.set_playing(config.ticker.autoplay);
    Ok(engine)
}

/// Forward simulation events to the log
async fn log_events(simulation: SharedSimulation, json: bool) {
    let mut rx = simulation.lock().subscribe();

    loop {
        match rx.recv().await {
            Ok(SimulationEvent::Stepped { .. }) => {}
            Ok(event) if json => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to encode event: {}", e),
            },
            Ok(SimulationEvent::Narration { t, text }) => info!(t, "{}", text),
            Ok(event) => debug!(?event, "Simulation event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Apply commands typed on stdin, one per line
async fn read_commands(simulation: SharedSimulation) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let outcome = line
            .parse::<ControlCommand>()
            .and_then(|cmd| execute(&mut simulation.lock(), cmd));

        match outcome {
            Ok(reply) => println!("{reply}"),
            Err(e) => error!("{:#}", e),
        }
    }

    Ok(())
}
