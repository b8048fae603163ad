//! pacer CLI - Test batching for device farms.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use pacer::analytics::DurationHistory;
use pacer::config::{self, BatchingStrategyConfig};
use pacer::dispatch::{Device, Dispatcher, SimulatedDevice};
use pacer::model::{BundleId, Test};
use pacer::queue::PendingQueue;
use pacer::strategy::Strategy;

#[derive(Parser)]
#[command(name = "pacer")]
#[command(about = "Test batching for device farms", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "pacer.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Batch a JSON test list over simulated devices and print the plan
    Plan {
        /// JSON file containing an array of tests
        #[arg(short, long)]
        tests: PathBuf,

        /// Override the number of devices
        #[arg(short, long)]
        devices: Option<usize>,

        /// Override the duration history file
        #[arg(long)]
        history: Option<PathBuf>,

        /// Shuffle the test list before queueing it
        #[arg(long)]
        shuffle: bool,

        /// Bundle identifier passed to the strategy
        #[arg(long)]
        bundle: Option<String>,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Strategy type (fixed-size, isolate, class-name, mixed)
        #[arg(short, long, default_value = "fixed-size")]
        strategy: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Plan {
            tests,
            devices,
            history,
            shuffle,
            bundle,
        } => plan(&cli.config, &tests, devices, history, shuffle, bundle).await,
        Commands::Validate => validate_config(&cli.config),
        Commands::Init { strategy } => init_config(&strategy),
    }
}

async fn plan(
    config_path: &Path,
    tests_path: &Path,
    devices_override: Option<usize>,
    history_override: Option<PathBuf>,
    shuffle: bool,
    bundle: Option<String>,
) -> Result<()> {
    let config = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    info!("Loaded configuration from {}", config_path.display());

    let strategy = config.batching.build()?;
    let history = match history_override.or(config.analytics.history_file) {
        Some(path) => DurationHistory::load(&path),
        None => DurationHistory::default(),
    };

    let mut tests = load_tests(tests_path)?;
    if shuffle {
        tests.shuffle(&mut rand::thread_rng());
    }
    let queue = PendingQueue::new(tests);
    let total = queue.len();

    let device_count = devices_override.unwrap_or(config.pacer.devices).max(1);
    let devices: Vec<SimulatedDevice> = (0..device_count)
        .map(|i| SimulatedDevice::new(format!("device-{}", i)))
        .collect();

    let mut dispatcher = Dispatcher::new(strategy, history);
    if let Some(bundle) = bundle {
        dispatcher = dispatcher.with_bundle(BundleId::new(bundle));
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let summary = dispatcher.run(&queue, &devices, &cancel).await;

    println!();
    for device in &devices {
        let batches = device.batches();
        println!(
            "{} ({} batches)",
            console::style(device.id()).bold(),
            batches.len()
        );
        for batch in &batches {
            println!(
                "  {} {} tests",
                console::style(batch.id()).dim(),
                batch.len()
            );
            for test in batch.tests() {
                println!("    {}", test);
            }
        }
    }

    println!();
    println!("{}", console::style("Plan Summary").bold());
    println!("  Strategy: {}", dispatcher.strategy());
    println!("  Tests:    {}", total);
    println!("  Batches:  {}", summary.batches);
    println!("  Devices:  {}", device_count);
    if summary.remaining > 0 {
        println!(
            "  Not planned: {}",
            console::style(summary.remaining).red().bold()
        );
    }
    println!(
        "Planned {} tests into {} batches",
        summary.tests, summary.batches
    );

    if !summary.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn load_tests(path: &Path) -> Result<Vec<Test>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read test list: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse test list: {}", path.display()))
}

fn validate_config(config_path: &Path) -> Result<()> {
    match config::load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!("  Devices: {}", config.pacer.devices);
            println!("  Strategy: {}", config.batching.type_name());

            match config.batching.build()? {
                Strategy::FixedSize(s) => {
                    println!("  Size: {}", s.size());
                    if let Some(budget) = s.budget() {
                        println!(
                            "  Duration budget: {}ms at p{}",
                            budget.limit.as_millis(),
                            budget.percentile
                        );
                    }
                    if let Some(limit) = s.time_limit() {
                        println!("  History since: {}", limit.to_rfc3339());
                    }
                    println!("  Last mile length: {}", s.last_mile_length());
                }
                Strategy::Mixed(s) => {
                    let show = |p: Option<&pacer::strategy::AnnotationPattern>| {
                        p.map_or_else(|| "(none)".to_string(), |p| p.to_string())
                    };
                    println!("  Isolate annotation: {}", show(s.isolate_pattern()));
                    println!("  Union annotation: {}", show(s.union_pattern()));
                }
                Strategy::Isolate(_) | Strategy::ClassName(_) => {}
            }

            if let Some(path) = &config.analytics.history_file {
                println!("  History file: {}", path.display());
            }

            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_config(strategy: &str) -> Result<()> {
    let batching_config = match strategy {
        "fixed-size" => {
            r#"[batching]
type = "fixed-size"
size = 10
# Optional: cap each batch by estimated duration
# duration_millis = 120000
# percentile = 90.0
# Merge the tail of the run into one batch
last_mile_length = 0"#
        }
        "isolate" => {
            r#"[batching]
type = "isolate""#
        }
        "class-name" => {
            r#"[batching]
type = "class-name""#
        }
        "mixed" => {
            r#"[batching]
type = "mixed"
# Regular expressions matched against the whole annotation name
isolate_annotation_name = ".*Isolate"
union_annotation_name = ".*Union""#
        }
        _ => {
            eprintln!(
                "Unknown strategy: {}. Use: {}",
                strategy,
                BatchingStrategyConfig::TYPE_NAMES.join(", ")
            );
            std::process::exit(1);
        }
    };

    let config = format!(
        r#"# pacer configuration file

[pacer]
devices = 4

{}

[analytics]
# history_file = ".pacer/durations.json"
"#,
        batching_config
    );

    let path = PathBuf::from("pacer.toml");
    if path.exists() {
        eprintln!("pacer.toml already exists. Remove it first or edit manually.");
        std::process::exit(1);
    }

    std::fs::write(&path, config)?;
    println!("Created pacer.toml");
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  pacer plan --tests tests.json");

    Ok(())
}
