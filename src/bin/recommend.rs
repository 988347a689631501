//! Batch recommendation runner
//!
//! Loads config, farm and species tables, scores the requested farms and prints
//! the payload list as JSON on stdout.
//!
//! Usage: recommend [FARM_ID ...]
//!
//! Environment:
//!   SUITABILITY_CONFIG        config JSON (default: data/config.json)
//!   SUITABILITY_FARMS         farm table (default: data/farms.csv)
//!   SUITABILITY_SPECIES       species table (default: data/species.csv)
//!   SUITABILITY_OVERRIDES     optional species override table
//!   SUITABILITY_DEPENDENCIES  optional species dependency table
//!   SUITABILITY_PARALLEL      score farms on the rayon pool when set to 1/true

use anyhow::{Context, Result};
use farm_suitability::{EngineInputs, InputPaths, Orchestrator, RecordId, RuleExclusion};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).unwrap_or_else(|_| default.to_string()).into()
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farm_suitability=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let paths = InputPaths {
        config: env_path("SUITABILITY_CONFIG", "data/config.json"),
        farms: env_path("SUITABILITY_FARMS", "data/farms.csv"),
        species: env_path("SUITABILITY_SPECIES", "data/species.csv"),
        overrides: std::env::var("SUITABILITY_OVERRIDES").ok().map(PathBuf::from),
        dependencies: std::env::var("SUITABILITY_DEPENDENCIES").ok().map(PathBuf::from),
    };
    let parallel = env_flag("SUITABILITY_PARALLEL");

    tracing::info!("Configuration:");
    tracing::info!("  CONFIG: {:?}", paths.config);
    tracing::info!("  FARMS: {:?}", paths.farms);
    tracing::info!("  SPECIES: {:?}", paths.species);

    let inputs = EngineInputs::load(&paths)?;

    // No ids on the command line: every farm in the table
    let farm_ids: Vec<RecordId> = {
        let args: Vec<String> = std::env::args().skip(1).collect();
        if args.is_empty() {
            inputs.farms.ids().to_vec()
        } else {
            args.iter()
                .map(|a| {
                    a.parse::<i64>()
                        .map(RecordId::Int)
                        .unwrap_or_else(|_| RecordId::Text(a.clone()))
                })
                .collect()
        }
    };

    let provider = RuleExclusion::new(&inputs.config, &inputs.dependencies);
    let orchestrator = Orchestrator::new(&inputs.config, &inputs.params, &inputs.species, &provider)
        .context("Failed to compile species scoring rules")?;

    let now = chrono::Utc::now();
    let payloads = if parallel {
        orchestrator.run_parallel(&farm_ids, &inputs.farms, now)?
    } else {
        orchestrator.run_at(&farm_ids, &inputs.farms, now)?
    };

    println!("{}", serde_json::to_string_pretty(&payloads)?);
    Ok(())
}
