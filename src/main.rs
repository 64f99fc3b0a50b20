//! exo-classifier - transit observation triage
//!
//! Classifies transit signals as confirmed exoplanet, planetary candidate
//! or false positive, and estimates planet properties for planet-like
//! detections.
//!
//! # Usage
//!
//! ```bash
//! # Train a bundle from the synthetic catalogue (or --csv <file>)
//! exo-classifier train
//!
//! # Serve the HTTP API
//! exo-classifier serve --addr 0.0.0.0:5000
//!
//! # Score one observation from the shell
//! exo-classifier predict 289.9 7.4 0.00492 12.0 0.97 5627 11.7
//! ```
//!
//! # Environment Variables
//!
//! - `EXO_CONFIG`: path to the TOML service config
//! - `EXO_SERVER_ADDR`: bind address for `serve`
//! - `EXO_CORS_ORIGINS`: comma-separated allowed CORS origins
//! - `EXO_LOG_FORMAT`: set to `json` for JSON log lines
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use exo_classifier::api::handlers::{cleaned_batch_rows, BatchBody, BatchRow, PredictionBody};
use exo_classifier::api::{create_app, ApiState};
use exo_classifier::config::ServiceConfig;
use exo_classifier::diagnostics::diagnose;
use exo_classifier::pipeline::ScoringContext;
use exo_classifier::preprocessing::{validate_observation, Preprocessor};
use exo_classifier::training::catalogue::csv_records;
use exo_classifier::training::{load_csv_catalogue, synthetic_catalogue, train};
use exo_classifier::types::Observation;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "exo-classifier")]
#[command(about = "Exoplanet transit classification and property estimation")]
#[command(version)]
struct CliArgs {
    /// Service config file (overrides EXO_CONFIG and ./exo_config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Load the model bundle and serve the HTTP API
    Serve {
        /// Bind address (default from config: "0.0.0.0:5000")
        #[arg(short, long, env = "EXO_SERVER_ADDR", value_name = "HOST:PORT")]
        addr: Option<String>,
    },

    /// Fit a model bundle and write it to disk
    Train {
        /// Labelled CSV catalogue; the synthetic catalogue is used when omitted
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,

        /// Bundle output path (default from config)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Override the training seed
        #[arg(long)]
        seed: Option<u64>,

        /// Also run stratified k-fold cross-validation with this many folds
        #[arg(long, value_name = "K")]
        cv_folds: Option<usize>,
    },

    /// Score one observation
    Predict {
        /// Orbital period (days)
        orbital_period: f64,
        /// Transit duration (hours)
        transit_duration: f64,
        /// Transit depth (fractional flux drop)
        transit_depth: f64,
        /// Signal-to-noise ratio
        snr: f64,
        /// Stellar mass (solar masses)
        stellar_mass: f64,
        /// Stellar effective temperature (K)
        stellar_temp: f64,
        /// Stellar apparent magnitude
        stellar_magnitude: f64,

        /// Number of observed transits
        #[arg(long)]
        num_transits: Option<u32>,

        /// Print only the JSON result
        #[arg(long)]
        json: bool,
    },

    /// Score every row of a CSV file and print JSON results
    Batch {
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,

        /// Drop artifact and outlier rows before scoring
        #[arg(long)]
        clean: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Write it to this file instead of stdout
        #[arg(long, value_name = "FILE")]
        write: Option<PathBuf>,
    },
}

// ============================================================================
// Helpers
// ============================================================================

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if std::env::var("EXO_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// An explicit `--config` must load; otherwise fall back through the search order.
fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    match path {
        Some(p) => ServiceConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => Ok(ServiceConfig::load()),
    }
}

fn load_context(config: &ServiceConfig) -> Result<ScoringContext> {
    ScoringContext::load(config).with_context(|| {
        format!(
            "Failed to load model bundle from {}",
            config.models.bundle_path.display()
        )
    })
}

// ============================================================================
// Subcommands
// ============================================================================

async fn run_serve(config: ServiceConfig, addr: Option<String>) -> Result<()> {
    let context = Arc::new(load_context(&config)?);
    let addr = addr.unwrap_or_else(|| config.server.addr.clone());

    let state = ApiState::new(context, config.server.max_batch_rows);
    let app = create_app(state, config.server.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received Ctrl+C, shutting down");
        })
        .await
        .context("HTTP server error")?;

    info!("Shutdown complete");
    Ok(())
}

fn run_train(
    mut config: ServiceConfig,
    csv: Option<&Path>,
    output: Option<PathBuf>,
    seed: Option<u64>,
    cv_folds: Option<usize>,
) -> Result<()> {
    if let Some(seed) = seed {
        config.training.seed = seed;
    }
    if let Some(k) = cv_folds {
        config.training.cv_folds = k;
    }
    let catalogue = match csv {
        Some(path) => load_csv_catalogue(path)?,
        None => synthetic_catalogue(&config.training)?,
    };

    let bundle = train(catalogue, &config)?;
    let path = output.unwrap_or_else(|| config.models.bundle_path.clone());
    let digest = bundle.save(&path)?;

    if let Some(report) = &bundle.metadata.evaluation {
        println!("held-out accuracy: {:.3} on {} rows", report.accuracy, report.n_test);
        for (member, acc) in &report.member_accuracy {
            println!("  {member:<20} {acc:.3}");
        }
        println!("calibration error: {:.3}", report.expected_calibration_error);
        let q = &report.uncertainty_quality;
        println!(
            "uncertainty: {:.3} when right, {:.3} when wrong (r = {:.3})",
            q.mean_uncertainty_correct, q.mean_uncertainty_incorrect, q.uncertainty_error_correlation
        );
        if let Some(cv) = &report.cross_validation {
            println!(
                "{}-fold accuracy: {:.3} ± {:.3}",
                cv.folds, cv.mean_accuracy, cv.std_accuracy
            );
        }
    }
    println!("bundle: {} (md5 {digest})", path.display());
    Ok(())
}

fn run_predict(config: &ServiceConfig, obs: &Observation, json_only: bool) -> Result<()> {
    validate_observation(obs)?;
    let context = load_context(config)?;
    let result = context.score(obs);
    let body = serde_json::to_string_pretty(&PredictionBody::from(&result))?;

    println!("{body}");
    if !json_only {
        println!();
        println!("{}", diagnose(obs, context.score_rules()));
    }
    Ok(())
}

fn run_batch(config: &ServiceConfig, csv: &Path, clean: bool) -> Result<()> {
    let text = std::fs::read_to_string(csv).with_context(|| format!("Failed to read {}", csv.display()))?;
    let records: Vec<Value> = csv_records(&text)?
        .into_iter()
        .map(|(_, record)| Value::Object(record))
        .collect();
    let context = load_context(config)?;

    let results: Vec<BatchRow> = if clean {
        let batch = Preprocessor::new(config.preprocessing.clone()).clean_records(&records);
        for dropped in &batch.dropped {
            warn!(row = dropped.index, reason = %dropped.reason, "Row dropped");
        }
        cleaned_batch_rows(&context, &batch)
    } else {
        context
            .score_records(&records)
            .iter()
            .enumerate()
            .map(|(index, row)| BatchRow::from_result(index, row))
            .collect()
    };

    let body = BatchBody::from_rows(results);
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn run_config(config: &ServiceConfig, write: Option<&Path>) -> Result<()> {
    match write {
        Some(path) => config.save_to_file(path)?,
        None => print!("{}", config.to_toml()?),
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        SubCommand::Serve { addr } => run_serve(config, addr).await,
        SubCommand::Train { csv, output, seed, cv_folds } => {
            tokio::task::spawn_blocking(move || run_train(config, csv.as_deref(), output, seed, cv_folds))
                .await
                .context("Training task panicked")?
        }
        SubCommand::Predict {
            orbital_period,
            transit_duration,
            transit_depth,
            snr,
            stellar_mass,
            stellar_temp,
            stellar_magnitude,
            num_transits,
            json,
        } => {
            let obs = Observation {
                num_transits,
                ..Observation::new(
                    orbital_period,
                    transit_duration,
                    transit_depth,
                    snr,
                    stellar_mass,
                    stellar_temp,
                    stellar_magnitude,
                )
            };
            run_predict(&config, &obs, json)
        }
        SubCommand::Batch { csv, clean } => run_batch(&config, &csv, clean),
        SubCommand::Config { write } => run_config(&config, write.as_deref()),
    }
}
