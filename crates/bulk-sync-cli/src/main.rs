//! bulk-sync CLI - checks a bulk-sync target configuration.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use bulk_sync::{Backend, BackendImpl, BulkError, Config, Session};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};

#[derive(Parser)]
#[command(name = "bulk-sync")]
#[command(about = "Dialect-aware bulk loading for PostgreSQL and SQL Server")]
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
    /// Validate the configuration file without connecting
    Validate,

    /// Test the target database connection
    HealthCheck,
}

/// Outcome of `health-check`.
#[derive(Debug, Serialize)]
struct HealthCheckResult {
    database: String,
    host: String,
    connected: bool,
    latency_ms: u64,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, BulkError> {
    let cli = Cli::parse();
    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    debug!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Validate => {
            let settings = &config.bulk;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(settings)?);
            } else {
                println!("Configuration is valid");
                println!(
                    "  Target: {} {}:{}/{}",
                    config.target.r#type,
                    config.target.host,
                    config.target.effective_port(),
                    config.target.database
                );
                println!(
                    "  Schema: {}",
                    config.target.schema.as_deref().unwrap_or("(dialect default)")
                );
                println!(
                    "  Batch size: {}, keep identity: {}",
                    settings.batch_size, settings.keep_identity
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::HealthCheck => {
            let cancel = setup_signal_handler();
            let result = health_check(&config, cancel).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Target ({}): {} ({}ms)",
                    result.database,
                    if result.connected { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
            }

            if result.connected {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(3))
            }
        }
    }
}

/// Open a session, run `SELECT 1`, close it.
async fn health_check(
    config: &Config,
    cancel: CancellationToken,
) -> Result<HealthCheckResult, BulkError> {
    let backend = BackendImpl::from_config(&config.target)?;
    let options = config.bulk.to_options().cancel_token(cancel);

    let start = Instant::now();
    let outcome = options
        .guard("health check", async {
            let mut session = backend.open().await?;
            let ping = session.execute("SELECT 1").await;
            session.close().await?;
            ping.map(|_| ())
        })
        .await;
    let latency_ms = start.elapsed().as_millis() as u64;

    if let Err(ref e) = outcome {
        if e.is_cancelled() {
            return Err(BulkError::Cancelled);
        }
    }
    info!("Health check finished in {}ms", latency_ms);

    Ok(HealthCheckResult {
        database: config.target.r#type.clone(),
        host: config.target.host.clone(),
        connected: outcome.is_ok(),
        latency_ms,
        error: outcome.err().map(|e| e.to_string()),
    })
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
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel on Ctrl-C.
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Cancelling...");
            token.cancel();
        }
    });

    cancel_token
}
