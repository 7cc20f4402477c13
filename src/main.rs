//! Presale-Crawler main entry point
//!
//! This is the command-line interface for the presale license lookup and
//! property crawler.

use clap::{Parser, Subcommand};
use presale_crawler::config::{load_config_with_hash, Config};
use presale_crawler::crawler::JobStatus;
use presale_crawler::output::{generate_markdown_report, load_snapshot, load_statistics, print_statistics};
use presale_crawler::storage::{lock_sink, CrawlSink, SqliteStorage};
use presale_crawler::{CrawlReport, Runtime, VerificationRequest};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Presale-Crawler: presale license lookup and property crawler
///
/// Resolves a presale license number to the registry's property id through
/// the registry's CAPTCHA-gated lookup, then crawls the property's buildings
/// and units into a local SQLite database.
#[derive(Parser, Debug)]
#[command(name = "presale-crawler")]
#[command(version = "1.0.0")]
#[command(about = "Presale license lookup and property crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and show what it resolves to
    Check,

    /// Resolve a presale license number to a property id
    Resolve {
        /// Presale license number to look up
        #[arg(long)]
        license: String,

        /// Where to write the CAPTCHA image
        #[arg(long, value_name = "PATH", default_value = "captcha.png")]
        captcha_out: PathBuf,

        /// Crawl the property once it is resolved
        #[arg(long)]
        crawl: bool,
    },

    /// Crawl a property by its registry id
    Crawl {
        #[arg(value_name = "PROPERTY_ID")]
        property_id: String,
    },

    /// Show a crawled property from the database
    Lookup {
        #[arg(value_name = "PROPERTY_ID")]
        property_id: String,

        /// Write a markdown report instead of printing JSON
        #[arg(long, value_name = "PATH")]
        markdown: Option<PathBuf>,
    },

    /// Show statistics from the database and exit
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Check => handle_check(&config, &config_hash),
        Command::Stats => handle_stats(&config),
        Command::Lookup {
            property_id,
            markdown,
        } => handle_lookup(&config, &property_id, markdown.as_deref()),
        Command::Resolve {
            license,
            captcha_out,
            crawl,
        } => {
            let runtime = Runtime::init(config, config_hash)?;
            let result = handle_resolve(&runtime, &license, &captcha_out, crawl).await;
            runtime.shutdown().await;
            result
        }
        Command::Crawl { property_id } => {
            let runtime = Runtime::init(config, config_hash)?;
            let result = handle_crawl(&runtime, &property_id).await;
            runtime.shutdown().await;
            result
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("presale_crawler=info,warn"),
            1 => EnvFilter::new("presale_crawler=debug,info"),
            2 => EnvFilter::new("presale_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles `check`: shows the validated configuration
fn handle_check(config: &Config, config_hash: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Presale-Crawler Configuration ===\n");

    println!("Registry:");
    println!("  Base URL: {}", config.registry.base_url);
    println!("  Region code: {}", config.registry.region_code);
    println!("  User agent: {}", config.registry.user_agent);
    println!("  Request timeout: {}s", config.registry.request_timeout_secs);

    println!("\nCrawler:");
    println!("  Request delay: {}ms", config.crawler.request_delay_ms);
    println!("  Max retry passes: {}", config.crawler.max_retry_passes);
    println!(
        "  Retry backoff: {}ms",
        config.crawler.retry_backoff().as_millis()
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid (hash: {})", config_hash);

    Ok(())
}

/// Handles `stats`: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles `lookup`: prints a stored property as JSON or writes a markdown report
fn handle_lookup(
    config: &Config,
    property_id: &str,
    markdown: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

    let Some(snapshot) = load_snapshot(&storage, property_id)? else {
        return Err(format!("Property {} has not been crawled", property_id).into());
    };

    match markdown {
        Some(path) => {
            let job = storage.latest_job(property_id)?;
            let failures = match &job {
                Some(job) => storage.get_building_failures(job.id)?,
                None => Vec::new(),
            };
            generate_markdown_report(
                &snapshot,
                job.as_ref().map(|j| (j, failures.as_slice())),
                path,
            )?;
            println!("✓ Report written to: {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&snapshot)?),
    }

    Ok(())
}

/// Handles `resolve`: runs one verification session interactively
async fn handle_resolve(
    runtime: &Runtime,
    license: &str,
    captcha_out: &Path,
    crawl: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = runtime.new_session()?;

    let image = session.fetch_captcha_image().await?;
    tokio::fs::write(captcha_out, &image).await?;
    eprintln!(
        "CAPTCHA image written to {} ({} bytes). Enter the answer:",
        captcha_out.display(),
        image.len()
    );

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await?;

    let request = VerificationRequest::new(license, answer.trim());
    let result = session.verify_license(&request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if crawl {
        let property_id = result.into_property_id()?;
        handle_crawl(runtime, &property_id).await?;
    }

    Ok(())
}

/// Handles `crawl`: triggers a background job and waits for it, cancelling on Ctrl-C
async fn handle_crawl(runtime: &Runtime, property_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let tracker = runtime.tracker();
    let job = tracker.spawn(property_id)?;

    let report = tokio::select! {
        report = tracker.wait(job) => report,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling crawl job {}", job);
            tracker.cancel(job)?;
            tracker.wait(job).await
        }
    };

    let final_status = tracker.forget(job);

    match report {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            if let Some(JobStatus::Failed(message)) = final_status {
                tracing::error!("Crawl failed: {}", message);
            }
            let sink = runtime.sink();
            if let Ok(sink) = lock_sink(&sink) {
                if let Ok(Some(record)) = sink.latest_job(property_id.trim()) {
                    eprintln!("Job {} recorded as {}", record.id, record.phase);
                }
            }
            Err(e.into())
        }
    }
}

fn print_report(report: &CrawlReport) {
    println!("=== Crawl Report ===\n");
    println!("  Property: {}", report.property_id);
    println!("  Job: {}", report.job_id);
    println!("  Phase: {}", report.phase);
    println!("  Buildings: {}", report.buildings_total);
    println!("  Units saved: {}", report.units_saved);
    println!("  Retry passes: {}", report.retry_passes);

    if !report.first_pass_failures.is_empty() {
        println!(
            "  First-pass failures: {}",
            report.first_pass_failures.join(", ")
        );
    }
    if report.residual_failures.is_empty() {
        println!("\n✓ All buildings fetched");
    } else {
        println!(
            "\n✗ Still failing after retries: {}",
            report.residual_failures.join(", ")
        );
    }
}
