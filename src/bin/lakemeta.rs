//! lakemeta CLI
//!
//! Inspects lakehouse tables: format detection, snapshot history, schemas
//! and the live (or raw) data files of a snapshot.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lakemeta::io;
use lakemeta::schema::TypeRoot;
use lakemeta::{Config, DataType, Datum, ScanOptions, Table};
use tracing_subscriber::{fmt, EnvFilter};

/// lakemeta CLI
#[derive(Parser, Debug)]
#[command(name = "lakemeta")]
#[command(about = "Inspect Paimon-style lakehouse table metadata")]
#[command(version)]
struct Args {
    /// Table location (path, file:// or memory:// URL)
    #[arg(short, long)]
    table: String,

    /// Worker threads for manifest reads
    #[arg(long, default_value = "4")]
    parallelism: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the detected table format
    Detect,

    /// List snapshots, oldest first
    Snapshots,

    /// Print the current schema as JSON
    Schema,

    /// List the data files of a snapshot
    Scan {
        /// Snapshot id (defaults to the latest)
        #[arg(long, conflicts_with = "timestamp")]
        snapshot: Option<u64>,

        /// Latest snapshot committed at or before this unix-millis timestamp
        #[arg(long)]
        timestamp: Option<i64>,

        /// Only files added after this snapshot
        #[arg(long)]
        since: Option<u64>,

        /// Partition filter, repeatable (`key=value`)
        #[arg(long = "partition", value_name = "KEY=VALUE")]
        partitions: Vec<String>,

        /// Walk the directory tree instead of reading metadata
        #[arg(long)]
        raw: bool,

        /// Skip the existence check of every live file
        #[arg(long)]
        no_verify: bool,
    },
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lakemeta=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("lakemeta v{}", lakemeta::VERSION);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> lakemeta::Result<()> {
    let config = Config::builder().scan_parallelism(args.parallelism).build()?;

    if let Commands::Detect = args.command {
        let (io, root) = io::resolve(&args.table, config.sync_writes)?;
        println!("{}", lakemeta::detect(io.as_ref(), &root)?);
        return Ok(());
    }

    let table = Table::open(&args.table, config)?;

    match args.command {
        Commands::Detect => {}
        Commands::Snapshots => {
            println!("{:>8}  {:>14}  {:>9}  {:>6}  {:>10}  MANIFEST LIST", "ID", "TIME", "KIND", "SCHEMA", "RECORDS");
            for s in table.snapshots()? {
                println!(
                    "{:>8}  {:>14}  {:>9}  {:>6}  {:>10}  {}",
                    s.id, s.time_millis, s.commit_kind, s.schema_id, s.total_record_count, s.manifest_list
                );
            }
        }
        Commands::Schema => {
            let schema = table.schema()?;
            let json = serde_json::to_string_pretty(&schema)
                .map_err(|e| lakemeta::LakeError::Serialization(e.to_string()))?;
            println!("{}", json);
        }
        Commands::Scan {
            raw: true,
            ..
        } => {
            for file in table.raw_scan()? {
                println!("{}\t{}", file.relative, file.len);
            }
        }
        Commands::Scan {
            snapshot,
            timestamp,
            since,
            partitions,
            no_verify,
            ..
        } => {
            let mut options = ScanOptions::new();
            if let Some(id) = snapshot {
                options = options.snapshot_id(id);
            }
            if let Some(ts) = timestamp {
                options = options.snapshot_timestamp_ms(ts);
            }
            if let Some(id) = since {
                options = options.incremental_since(id);
            }
            if no_verify {
                options = options.verify_files(false);
            }
            if !partitions.is_empty() {
                let schema = table.schema()?;
                let mut spec = Vec::with_capacity(partitions.len());
                for raw in &partitions {
                    let (key, value) = raw.split_once('=').ok_or_else(|| {
                        lakemeta::LakeError::InvalidArgument(format!("expected KEY=VALUE, got '{}'", raw))
                    })?;
                    let data_type = schema
                        .fields
                        .iter()
                        .find(|f| f.name == key)
                        .map(|f| f.data_type.clone())
                        .ok_or_else(|| lakemeta::LakeError::InvalidPartition(format!("unknown column '{}'", key)))?;
                    spec.push((key.to_string(), parse_datum(&data_type, value)?));
                }
                options = options.partition(spec);
            }

            let plan = table.scan(&options)?;
            tracing::info!(
                snapshot = ?plan.snapshot_id(),
                files = plan.len(),
                rows = plan.row_count(),
                "Scan planned"
            );
            for f in plan.iter() {
                println!(
                    "{}\tbucket={}\trows={}\tseq={}..{}",
                    f.file.file_name, f.bucket, f.file.row_count, f.file.min_sequence_number, f.file.max_sequence_number
                );
            }
        }
    }
    Ok(())
}

/// Parse a partition value typed by its column
fn parse_datum(data_type: &DataType, raw: &str) -> lakemeta::Result<Datum> {
    let bad = || lakemeta::LakeError::InvalidPartition(format!("'{}' is not a valid {}", raw, data_type));
    Ok(match data_type.root {
        TypeRoot::Boolean => Datum::Boolean(raw.parse().map_err(|_| bad())?),
        TypeRoot::Int => Datum::Int(raw.parse().map_err(|_| bad())?),
        TypeRoot::BigInt => Datum::Long(raw.parse().map_err(|_| bad())?),
        TypeRoot::Double => Datum::Double(raw.parse().map_err(|_| bad())?),
        _ => Datum::String(raw.to_string()),
    })
}
