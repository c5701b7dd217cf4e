//! Pressure engine command-line tool.
//!
//! - `generate-config`: write a TOML file with every default
//! - `validate-config`: parse and range-check a config file
//! - `replay`: run the decision cycle over newline-delimited JSON events with
//!   retraining and checkpointing in the background

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use pressure_engine::{
    init_logging, BackgroundSchedule, BackgroundServices, CheckpointManager, DecisionEngine,
    EngineConfig, LearningOrchestrator, ReplayEvent,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser)]
#[command(name = "pressure_engine")]
#[command(version, about = "Options pressure-field decision engine", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "pressure_engine.toml", env = "PRESSURE_ENGINE_CONFIG")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a sample config file
    GenerateConfig {
        /// Output file path
        #[arg(short, long, default_value = "pressure_engine.toml")]
        output: PathBuf,
    },
    /// Validate config without running
    ValidateConfig,
    /// Replay newline-delimited JSON events ("-" reads stdin)
    Replay {
        /// Event file
        input: PathBuf,

        /// Do not load or write checkpoints
        #[arg(long)]
        no_checkpoint: bool,

        /// Print every bar report as JSON instead of just the decision
        #[arg(long)]
        full_report: bool,
    },
}

// ============================================================================
// Replay
// ============================================================================

struct ReplayStats {
    lines: u64,
    bars: u64,
    closes: u64,
    rejected: u64,
}

async fn open_input(path: &Path) -> std::io::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufReader::new(tokio::io::stdin())))
    } else {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(BufReader::new(file)))
    }
}

async fn replay(
    config: EngineConfig,
    input: PathBuf,
    no_checkpoint: bool,
    full_report: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let learning = Arc::new(LearningOrchestrator::new(config.learning.clone()));

    let checkpoints = if no_checkpoint {
        None
    } else {
        let manager = CheckpointManager::new(&config.learning.checkpoint.dir)?;
        learning.restore_or_cold_start(&manager);
        Some(manager)
    };

    let mut engine = DecisionEngine::new(&config, Arc::clone(&learning));
    let services = BackgroundServices::spawn(
        Arc::clone(&learning),
        checkpoints,
        BackgroundSchedule::from_config(&config.learning),
    );

    let mut lines = open_input(&input).await?.lines();
    let mut stats = ReplayStats {
        lines: 0,
        bars: 0,
        closes: 0,
        rejected: 0,
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let line = tokio::select! {
            _ = &mut ctrl_c => {
                info!("Shutdown signal received (SIGINT/Ctrl+C)");
                break;
            }
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Input read failed, stopping replay");
                break;
            }
        };
        stats.lines += 1;

        match ReplayEvent::parse_line(&line) {
            Ok(None) => {}
            Ok(Some(ReplayEvent::Bar {
                snapshot,
                views,
                strategy,
            })) => {
                let report = engine.run_bar(&snapshot, &views, strategy.as_ref());
                stats.bars += 1;
                let json = if full_report {
                    serde_json::to_string(&report)
                } else {
                    serde_json::to_string(&report.decision)
                };
                match json {
                    Ok(json) => println!("{json}"),
                    Err(e) => warn!(error = %e, "Could not serialize bar output"),
                }
            }
            Ok(Some(ReplayEvent::TradeClose(close))) => {
                learning.after_trade_closed(&close);
                stats.closes += 1;
            }
            Err(e) => {
                stats.rejected += 1;
                warn!(line = stats.lines, error = %e, "Skipping malformed event");
            }
        }
    }

    services.shutdown().await?;

    let summary = learning.summary();
    info!(
        lines = stats.lines,
        bars = stats.bars,
        closes = stats.closes,
        rejected = stats.rejected,
        trades_processed = summary.trades_processed,
        bandit_arms = summary.bandit.arms,
        calibrator_ready = summary.calibration.ready,
        brier = ?summary.calibration.brier_score,
        lookahead_pairs = summary.lookahead_pairs,
        "Replay finished"
    );
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::GenerateConfig { output } => {
            std::fs::write(&output, EngineConfig::sample_toml()?)?;
            println!("Sample config written to {}", output.display());
            Ok(())
        }
        Commands::ValidateConfig => {
            let config = EngineConfig::load(&cli.config)?;
            println!("Configuration is valid:\n{:#?}", config);
            Ok(())
        }
        Commands::Replay {
            input,
            no_checkpoint,
            full_report,
        } => {
            // Any config error is fatal before the first bar.
            let config = EngineConfig::load(&cli.config)?;
            let _guard = init_logging(&config.logging, cli.log_level.as_deref())?;
            info!(
                config = %cli.config.display(),
                input = %input.display(),
                checkpoints = !no_checkpoint,
                "Starting replay"
            );
            replay(config, input, no_checkpoint, full_report).await
        }
    }
}
