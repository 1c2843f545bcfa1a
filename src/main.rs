//! VGC Meta Compass CLI
//!
//! Aggregates competitive match records into usage, pair-synergy and
//! counter-effectiveness statistics.

use clap::{Parser, Subcommand};
use vgc_compass::{Config, Result};

#[derive(Parser)]
#[command(name = "compass")]
#[command(about = "Meta analytics aggregation for competitive match data", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Data management commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Aggregation commands
    Aggregate {
        #[command(subcommand)]
        action: AggregateCommands,
    },
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Import a replay dump (JSON array of fetched replays)
    ImportReplays {
        /// Path to the dump file
        file: String,
        /// Format id for entries that carry none
        #[arg(long)]
        format: Option<String>,
    },
    /// Import a provider usage snapshot (chaos JSON) as usage rows
    ImportSnapshot {
        /// Path to the snapshot file
        file: String,
    },
    /// Show database status
    Status,
}

#[derive(Subcommand)]
enum AggregateCommands {
    /// Usage rates and ranks from stored matches
    Usage,
    /// Pair co-occurrence and partner breakdowns
    Pairs,
    /// Counter effectiveness per target
    Counters {
        /// Explicit target slugs (default: drawn from stored usage)
        #[arg(long = "target")]
        targets: Vec<String>,
    },
    /// Full pipeline: usage, pairs and counters over one corpus snapshot
    All,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Run command
    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::ImportReplays { file, format } => {
                commands::import_replays(&config, &file, format)
            }
            DataCommands::ImportSnapshot { file } => commands::import_snapshot(&config, &file),
            DataCommands::Status => commands::data_status(&config),
        },
        Commands::Aggregate { action } => match action {
            AggregateCommands::Usage => commands::aggregate_usage(&config),
            AggregateCommands::Pairs => commands::aggregate_pairs(&config),
            AggregateCommands::Counters { targets } => {
                commands::aggregate_counters(&config, targets)
            }
            AggregateCommands::All => commands::aggregate_all(&config),
        },
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use vgc_compass::data::{ingest, Database};
    use vgc_compass::engine::Engine;
    use vgc_compass::normalize::normalize;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        println!("Created data/ directory");

        println!("\nNext steps:");
        println!("  1. Edit {} to customize format and cutoffs", config_path);
        println!("  2. Run 'compass data import-replays <dump.json>' to load matches");
        println!("  3. Run 'compass aggregate all' to build the derived tables");

        Ok(())
    }

    pub fn import_replays(config: &Config, file: &str, format: Option<String>) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let default_format = format.unwrap_or_else(|| config.engine.format_id.clone());

        println!("Importing replays from {}...", file);
        let json = std::fs::read_to_string(file)?;
        let report = ingest::parse_replay_dump(&json, &default_format)?;

        if report.skipped > 0 {
            println!("Skipped {} malformed entries", report.skipped);
        }

        let count = db.upsert_matches(&report.records)?;
        println!("Stored {} matches in database", count);

        Ok(())
    }

    pub fn import_snapshot(config: &Config, file: &str) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;

        println!("Importing usage snapshot from {}...", file);
        let json = std::fs::read_to_string(file)?;
        let snapshot = ingest::parse_usage_snapshot(&json)?;
        println!(
            "Snapshot covers {} battles, {} entities",
            snapshot.total_samples,
            snapshot.entities.len()
        );

        let engine = Engine::new(&db, config.engine.clone());
        let report = engine.run_usage_snapshot(&snapshot)?;
        println!(
            "Stored {} usage rows under {}/{} (cutoff {})",
            report.usage_rows,
            config.engine.format_id,
            config.engine.time_bucket,
            config.engine.min_rating
        );

        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let matches = db.match_count(&config.engine.format_id)?;
        let bucket = config.bucket();
        let (usage, pairs, counters) =
            db.derived_counts(&config.engine.format_id, &bucket, config.engine.min_rating)?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:     {}", config.data.database_path);
        println!("  Format:   {}", config.engine.format_id);
        println!("  Bucket:   {}", bucket);
        println!("  Matches:  {}", matches);
        println!("  Usage:    {}", usage);
        println!("  Pairs:    {}", pairs);
        println!("  Counters: {}", counters);

        Ok(())
    }

    pub fn aggregate_usage(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let engine = Engine::new(&db, config.engine.clone());

        let report = engine.run_usage()?;
        println!(
            "Usage: {} rows from {} eligible matches",
            report.usage_rows, report.eligible_matches
        );

        Ok(())
    }

    pub fn aggregate_pairs(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let engine = Engine::new(&db, config.engine.clone());

        let report = engine.run_pairs()?;
        println!(
            "Pairs: {} rows from {} eligible matches",
            report.pair_rows, report.eligible_matches
        );

        Ok(())
    }

    pub fn aggregate_counters(config: &Config, targets: Vec<String>) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let engine = Engine::new(&db, config.engine.clone());

        let targets = if targets.is_empty() {
            None
        } else {
            Some(targets.iter().map(|t| normalize(t)).collect())
        };

        let report = engine.run_counters(targets)?;
        println!(
            "Counters: {} rows from {} eligible matches",
            report.counter_rows, report.eligible_matches
        );

        Ok(())
    }

    pub fn aggregate_all(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let engine = Engine::new(&db, config.engine.clone());

        let report = engine.run_all()?;
        println!(
            "Aggregated {} eligible matches under {}/{} (cutoff {})",
            report.eligible_matches,
            config.engine.format_id,
            config.engine.time_bucket,
            config.engine.min_rating
        );
        println!("  Usage:    {} rows", report.usage_rows);
        println!("  Pairs:    {} rows", report.pair_rows);
        println!("  Counters: {} rows", report.counter_rows);

        Ok(())
    }
}
