//! table-import CLI - configuration front end for the table load pipeline.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use table_import::{Config, ImportError, LoadSettings};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "table-import")]
#[command(about = "Copy relational tables into a remote tabular store")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print the effective load settings
    Validate {
        /// Override number of workers
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), ImportError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    match cli.command {
        Commands::Validate { workers } => {
            let mut config = Config::load(&cli.config)?;
            info!("Loaded configuration from {:?}", cli.config);

            if let Some(w) = workers {
                config.workers.pool_size = Some(w);
            }
            let config = config.with_auto_tuning();
            config.validate()?;

            let settings = LoadSettings::from_config(&config.target);
            let hash = config.hash();

            if cli.output_json {
                let report = serde_json::json!({
                    "config_hash": hash,
                    "config": &config,
                    "pool_size": config.workers.get_pool_size(),
                    "max_batch_rows": settings.max_batch_rows,
                    "max_blob_rows": settings.max_blob_rows,
                    "max_inflight_batches": settings.max_inflight_batches,
                    "load_data": config.target.load_data,
                    "progress_interval_secs": config.get_progress_interval().as_secs(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Configuration is valid");
                println!("  Config hash: {}", hash);
                println!("  Workers (pool_size): {}", config.workers.get_pool_size());
                println!("  Batch rows: {}", settings.max_batch_rows);
                println!("  Blob batch rows: {}", settings.max_blob_rows);
                println!("  In-flight batches: {}", settings.max_inflight_batches);
                println!(
                    "  Load data: {}",
                    if config.target.load_data { "yes" } else { "no" }
                );
                println!(
                    "  Progress interval: {}s",
                    config.get_progress_interval().as_secs()
                );
                println!("\n{}", serde_yaml::to_string(&config)?);
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
