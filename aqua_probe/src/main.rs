//! aqua_probe - command-line driver for the aqua_lens engine.
//!
//! Analyzes water sample photos and queries the local result history.

use anyhow::{Context, Result, bail};
use aqua_lens::core_modules::estimator::ParameterOverrides;
use aqua_lens::{
    Alert, AnalysisRequest, AnalysisService, AquaLensConfig, ImageSource, ResultStore, WaterSource, WaterTestResult,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_DATABASE: &str = "aqua_lens.db";

#[derive(Parser)]
#[command(name = "aqua_probe")]
#[command(about = "Water quality heuristics from sample photos", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = aqua_lens::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Result database (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more sample images and store the results
    Analyze {
        images: Vec<PathBuf>,

        /// Water source, e.g. "Tap Water" or "well_water"
        #[arg(long, default_value = "Unknown")]
        source: String,

        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        #[arg(long)]
        user: Option<String>,

        /// Known bacteria count, replaces the estimate
        #[arg(long)]
        bacteria: Option<u32>,

        /// Fix the estimator seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List stored tests, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        user: Option<String>,
    },

    /// Tests (or alerts) near a location
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long, default_value_t = 50.0)]
        radius_km: f64,

        /// Show active alerts instead of tests
        #[arg(long)]
        alerts: bool,
    },

    /// List contamination alerts
    Alerts {
        /// Include resolved alerts
        #[arg(long)]
        all: bool,
    },

    /// Mark an alert resolved
    Resolve { id: String },

    /// Summary statistics over the stored history
    Stats,

    /// Export every stored record as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Delete every stored record
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Logging & Argument Parsing ---
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("aqua_lens=info,aqua_probe=info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    // --- 2. Configuration ---
    let mut config = AquaLensConfig::load_or_default(&cli.config);
    config.store.database_path = cli
        .db
        .clone()
        .or(config.store.database_path)
        .or_else(|| Some(PathBuf::from(DEFAULT_DATABASE)));
    tracing::debug!(config = %cli.config.display(), ?config.store.database_path, "configuration resolved");

    // --- 3. Command Dispatch ---
    match cli.command {
        Commands::Analyze {
            images,
            source,
            lat,
            lon,
            user,
            bacteria,
            seed,
        } => {
            if images.is_empty() {
                bail!("no images given");
            }
            if seed.is_some() {
                config.pipeline.seed = seed;
            }
            let service = AnalysisService::from_config(&config).context("failed to build analysis service")?;
            let water_source = WaterSource::parse(&source);
            let overrides = ParameterOverrides {
                bacteria,
                ..ParameterOverrides::default()
            };
            let requests: Vec<AnalysisRequest> = images
                .iter()
                .map(|path| {
                    let mut request = AnalysisRequest::new(ImageSource::Path(path.clone()), water_source)
                        .with_overrides(overrides);
                    if let (Some(lat), Some(lon)) = (lat, lon) {
                        request = request.with_location(lat, lon);
                    }
                    if let Some(user) = &user {
                        request = request.with_user(user.clone());
                    }
                    request
                })
                .collect();

            let mut failures = 0;
            for (path, result) in images.iter().zip(service.submit_batch(requests).await) {
                match result {
                    Ok(test) => print_test(&test, cli.json)?,
                    Err(err) => {
                        failures += 1;
                        eprintln!("{}: {err}", path.display());
                    }
                }
            }
            if failures > 0 {
                bail!("{failures} of {} images could not be analyzed", images.len());
            }
        }
        Commands::History { limit, source, user } => {
            let store = open_store(&config);
            let tests = match (source, user) {
                (Some(source), _) => {
                    let mut tests = store.get_by_source(WaterSource::parse(&source));
                    tests.truncate(limit);
                    tests
                }
                (None, Some(user)) => store.get_by_user(&user, limit),
                (None, None) => store.get_all(limit),
            };
            print_tests(&tests, cli.json)?;
        }
        Commands::Nearby {
            lat,
            lon,
            radius_km,
            alerts,
        } => {
            let store = open_store(&config);
            if alerts {
                print_alerts(&store.get_alerts_by_location(lat, lon, radius_km), cli.json)?;
            } else {
                print_tests(&store.get_by_location(lat, lon, radius_km), cli.json)?;
            }
        }
        Commands::Alerts { all } => {
            let store = open_store(&config);
            print_alerts(&store.get_alerts(all), cli.json)?;
        }
        Commands::Resolve { id } => {
            let store = open_store(&config);
            let alert = store
                .resolve_alert(&id)
                .with_context(|| format!("could not resolve alert {id}"))?;
            print_alerts(std::slice::from_ref(&alert), cli.json)?;
        }
        Commands::Stats => {
            let store = open_store(&config);
            let stats = store.get_statistics();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Tests:          {}", stats.total_tests);
                println!(
                    "  safe {} / caution {} / unsafe {} / critical {}",
                    stats.safe_tests, stats.caution_tests, stats.unsafe_tests, stats.critical_tests
                );
                println!("Active alerts:  {}", stats.active_alerts);
                println!("Avg confidence: {:.1}%", stats.average_confidence);
                for (quality, count) in &stats.quality_distribution {
                    println!("  {quality:<24} {count}");
                }
                for (source, count) in &stats.source_distribution {
                    println!("  {source:<24} {count}");
                }
            }
        }
        Commands::Export { output } => {
            let store = open_store(&config);
            let rendered = serde_json::to_string_pretty(&store.export())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered).with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("exported to {}", path.display());
                }
                None => println!("{rendered}"),
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to delete every record without --yes");
            }
            open_store(&config).clear_all().context("failed to clear the result store")?;
            eprintln!("result store cleared");
        }
    }

    Ok(())
}

fn open_store(config: &AquaLensConfig) -> Arc<ResultStore> {
    let store = Arc::new(ResultStore::new(config.store.clone()));
    store.init();
    store
}

fn print_test(test: &WaterTestResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(test)?);
        return Ok(());
    }
    let r = &test.results;
    println!(
        "{}  {}  {} / {}  ({}% confidence, {}, {:.2}s)",
        test.id,
        test.water_source,
        test.overall_quality,
        test.safety_level,
        test.confidence,
        test.processing_method.as_str(),
        test.processing_time_secs
    );
    println!(
        "  pH {:.1}  chlorine {:.1}  nitrates {:.1}  hardness {:.0}  alkalinity {:.0}  bacteria {}",
        r.ph, r.chlorine, r.nitrates, r.hardness, r.alkalinity, r.bacteria
    );
    for alert in &test.alerts {
        println!("  ! {alert}");
    }
    for recommendation in &test.recommendations {
        println!("  - {recommendation}");
    }
    Ok(())
}

fn print_tests(tests: &[WaterTestResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(tests)?);
        return Ok(());
    }
    if tests.is_empty() {
        println!("no tests");
    }
    for test in tests {
        println!(
            "{}  {}  {:<14} {:<22} {}",
            test.timestamp.format("%Y-%m-%d %H:%M"),
            test.id,
            test.water_source,
            test.overall_quality,
            test.safety_level
        );
    }
    Ok(())
}

fn print_alerts(alerts: &[Alert], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(alerts)?);
        return Ok(());
    }
    if alerts.is_empty() {
        println!("no alerts");
    }
    for alert in alerts {
        let state = if alert.resolved { "resolved" } else { "active" };
        println!(
            "{}  {}  [{}] {}  {}",
            alert.timestamp.format("%Y-%m-%d %H:%M"),
            alert.id,
            alert.severity.as_str(),
            state,
            alert.message
        );
    }
    Ok(())
}
