//! facaudit - Federal Audit Clearinghouse program report builder
//!
//! A CLI tool that downloads audit report metadata and major-program award
//! records from the FAC API, joins them per report and ranks the most
//! common federal programs.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (network, API status, parse, filesystem, config)

mod analysis;
mod api;
mod cache;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod report;

use anyhow::{Context, Result};
use api::{FacClient, Fetcher};
use cache::SnapshotStore;
use cli::{Args, SummarySource};
use config::{Config, DEFAULT_CONFIG_FILE};
use pipeline::{DatasetQuery, Pipeline, AWARDS_DATASET, GENERAL_DATASET};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    info!("facaudit v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args).await {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .facaudit.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the API endpoint, page size, directories, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings. `RUST_LOG` wins when set.
fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run the complete workflow: load, merge, export, summarize.
async fn run(args: Args) -> Result<()> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    // Step 1: Load both datasets, from snapshots or the API
    println!("📥 Loading FAC datasets...");
    println!("   API: {}", config.api.base_url);
    println!("   Snapshots: {}", config.cache.dir.display());
    if args.force_refresh {
        println!("   Forcing a fresh download");
    }

    let api_key = config.resolve_api_key(args.api_key.as_deref());
    if api_key.is_none() {
        debug!("No API key available; only snapshots can be used");
    }
    let client = FacClient::new(config.client_config(api_key))?;
    let fetcher = Fetcher::new(client, config.api.page_size)
        .with_retry(config.retry_policy())
        .with_progress(!args.quiet);
    debug!("Page size: {}", fetcher.page_size());
    let pipeline = Pipeline::new(
        fetcher,
        SnapshotStore::new(&config.cache.dir),
        config.endpoints(),
    )
    .refetch_on_corrupt(config.cache.refetch_on_corrupt);

    let query = DatasetQuery {
        auditor_ein: args.auditor_ein_filter(),
        audit_year: args.audit_year.clone(),
        force_refresh: args.force_refresh,
    };
    let datasets = pipeline
        .load(&query)
        .await
        .context("Failed to load FAC data")?;

    println!("   General records: {}", datasets.general.len());
    println!("   Award records: {}", datasets.awards.len());

    let duplicates = analysis::duplicate_report_ids(&datasets.general);
    if !duplicates.is_empty() {
        warn!(
            "{} report ids appear more than once in the general data; their awards are repeated per row",
            duplicates.len()
        );
        debug!("Duplicate report ids: {:?}", duplicates);
    }

    // Step 2: Merge
    println!("\n🔗 Merging on report_id...");
    let merged = analysis::merge(&datasets.general, &datasets.awards);
    if merged.is_empty() {
        warn!("No general records to merge");
    }
    println!(
        "   Merged rows: {} ({} with awards)",
        merged.len(),
        merged.matched()
    );

    // Step 3: Exports
    if args.export_json || args.export_csv {
        println!("\n💾 Exporting merged data...");
        std::fs::create_dir_all(&config.output.dir).with_context(|| {
            format!("Failed to create output directory {}", config.output.dir.display())
        })?;

        let table = merged
            .to_table()
            .context("Failed to flatten merged records")?;
        if table.is_empty() {
            warn!("Merged table is empty; exporting headers only");
        } else {
            info!("Exporting {} rows x {} columns", table.len(), table.columns.len());
        }

        if args.export_json {
            let path = config.output.merged_json_path();
            report::write_json(&table, &path)?;
            println!("   JSON: {}", path.display());
        }
        if args.export_csv {
            let path = config.output.merged_csv_path();
            report::write_csv(&table, &path)?;
            println!("   CSV: {}", path.display());
        }
    }

    if args.export_snapshots_csv {
        println!("\n💾 Converting snapshots to CSV...");
        std::fs::create_dir_all(&config.output.dir).with_context(|| {
            format!("Failed to create output directory {}", config.output.dir.display())
        })?;

        let general = analysis::dataset_table(&datasets.general)
            .context("Failed to flatten general records")?;
        let path = config.output.snapshot_csv_path(GENERAL_DATASET);
        report::write_csv(&general, &path)?;
        println!("   {}: {} rows -> {}", GENERAL_DATASET, general.len(), path.display());

        let awards = analysis::dataset_table(&datasets.awards)
            .context("Failed to flatten award records")?;
        let path = config.output.snapshot_csv_path(AWARDS_DATASET);
        report::write_csv(&awards, &path)?;
        println!("   {}: {} rows -> {}", AWARDS_DATASET, awards.len(), path.display());
    }

    // Step 4: Program summary
    println!("\n📊 Summarizing programs...");
    let summaries = match args.summary_source {
        SummarySource::Merged => analysis::summarize_top(&merged.rows, config.output.top_n),
        SummarySource::Awards => analysis::summarize_top(&datasets.awards, config.output.top_n),
    };

    let summary_path = config.output.summary_csv_path();
    if !summaries.is_empty() {
        std::fs::create_dir_all(&config.output.dir).with_context(|| {
            format!("Failed to create output directory {}", config.output.dir.display())
        })?;
    }
    let written = report::write_summary_csv(&summaries, &summary_path)?;

    // Print summary
    let (entries, findings, amount) = analysis::summary_totals(&summaries);
    let duration = start_time.elapsed().as_secs_f64();

    println!("\n📊 Program Summary:");
    println!("   Programs ranked: {}", summaries.len());
    println!(
        "   Entries: {} | With findings: {} | Expended: ${:.2}",
        entries, findings, amount
    );
    if let Some(top) = summaries.first() {
        println!(
            "   Most common: {} ({} entries, {:.1}% with findings)",
            top.program(),
            top.total_entries,
            top.findings_rate()
        );
        println!("\n{}", analysis::generate_summary_text(&summaries, 10));
    }
    println!("   Duration: {:.1}s", duration);

    if written {
        println!("\n✅ Done! Summary saved to: {}", summary_path.display());
    } else {
        println!("\n✅ Done! No programs to summarize.");
    }

    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
