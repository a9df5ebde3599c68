use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use camtrap::config::Config;
use camtrap::db::{Database, DetectionFilter, DetectionStore};
use camtrap::detector::DetectorResults;
use camtrap::export::{self, ExportFormat};
use camtrap::logging;
use camtrap::scanner::Scanner;

/// Reconcile image-detector results against a catalog of camera trap images.
#[derive(Parser, Debug)]
#[command(name = "camtrap", version, about)]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "CAMTRAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add the images under a folder to the catalog
    Import {
        root: PathBuf,
    },
    /// Replace the detection tables with a detector results file
    Ingest {
        results: PathBuf,
        /// Prefix stripped from detector paths; overrides the config value
        #[arg(long)]
        prefix: Option<String>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List detections by category and confidence
    Query {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        min_conf: Option<f64>,
        #[arg(long)]
        max_conf: Option<f64>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show run info and detections per category
    Summary,
    /// Write detections to a JSON or CSV file
    Export {
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let _ = logging::init(&config.logging);

    let mut db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database {:?}", config.db_path))?;
    db.initialize()?;

    match cli.command {
        Command::Import { root } => {
            let scanner = Scanner::new(config.scanner.clone());
            let result = scanner.scan_directory(&root, &db, None)?;
            println!(
                "{} images found: {} added, {} already cataloged, {} failed",
                result.total_found, result.added, result.existing, result.failed
            );
        }
        Command::Ingest {
            results,
            prefix,
            json,
        } => {
            let prefix = prefix.unwrap_or_else(|| config.ingest.truncation_prefix.clone());
            let detector_results = DetectorResults::from_path(&results)?;
            let summary = camtrap::ingest(&mut db, &detector_results, &prefix)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
            println!(
                "{} of {} images matched: {} detections ({} empty), {} classifications",
                summary.images_matched,
                summary.images_reported,
                summary.detections,
                summary.placeholder_detections,
                summary.classifications
            );
            if summary.images_skipped() > 0 {
                println!(
                    "skipped {} outside prefix {:?}, {} not in catalog",
                    summary.images_out_of_scope, prefix, summary.images_unmatched
                );
            }
        }
        Command::Query {
            category,
            min_conf,
            max_conf,
            limit,
        } => {
            let filter = DetectionFilter {
                category,
                min_conf,
                max_conf,
                limit: Some(limit),
            };
            for record in db.detection_records(&filter)? {
                let path = if record.relative_path.is_empty() {
                    record.file_name.clone()
                } else {
                    format!("{}/{}", record.relative_path, record.file_name)
                };
                println!(
                    "{:>6}  {:<40}  {:<10}  {:.3}",
                    record.detection_id,
                    path,
                    record.label.as_deref().unwrap_or(&record.category),
                    record.conf
                );
            }
        }
        Command::Summary => {
            match db.select_run_info()? {
                Some(info) => {
                    println!("detector:   {} ({})", info.detector, info.detection_completion_time);
                    if !info.classifier.is_empty() {
                        println!(
                            "classifier: {} ({})",
                            info.classifier, info.classification_completion_time
                        );
                    }
                }
                None => {
                    println!("no detector results ingested");
                    return Ok(());
                }
            }
            println!("catalog:    {} files", db.count_files()?);
            for count in db.category_counts()? {
                println!(
                    "  {:>3} {:<12} {:>7} detections in {:>6} images",
                    count.code, count.label, count.detections, count.images
                );
            }
        }
        Command::Export { output, format } => {
            let output = match output.extension() {
                Some(_) => output,
                None => output.with_extension(format.extension()),
            };
            let count = export::export_detections(&db, &output, format)?;
            println!("exported {} detections to {}", count, output.display());
        }
    }

    Ok(())
}
