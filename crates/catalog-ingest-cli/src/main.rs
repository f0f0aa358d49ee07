//! # Catalog Ingest CLI
//!
//! Command-line utilities for running and checking catalog uploads.

use anyhow::{Context, Result};
use catalog_ingest_core::{
    handle_blob, read_records, Blob, IngestOptions, ProductRow, Record, TextEncoding,
};
use catalog_ingest_sqlite::SqliteConnector;
use std::env;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "process" => {
            if args.len() < 3 {
                eprintln!("Usage: catalog-ingest process <file> [encoding]");
                std::process::exit(1);
            }
            let options = IngestOptions {
                encoding: encoding_arg(args.get(3))?,
            };
            process(Path::new(&args[2]), &options)?;
        }
        "check" => {
            if args.len() < 3 {
                eprintln!("Usage: catalog-ingest check <file> [encoding]");
                std::process::exit(1);
            }
            check(Path::new(&args[2]), encoding_arg(args.get(3))?)?;
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn encoding_arg(arg: Option<&String>) -> Result<TextEncoding> {
    match arg {
        Some(name) => name.parse().context("Invalid encoding"),
        None => Ok(TextEncoding::default()),
    }
}

/// Run one file against the store named by `DATABASE_URL`.
fn process(path: &Path, options: &IngestOptions) -> Result<()> {
    let url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let connector = SqliteConnector::from_url(&url).context("Invalid DATABASE_URL")?;

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    tracing::info!(path = %path.display(), encoding = %options.encoding, "Processing file");
    let blob = Blob {
        name: path.display().to_string(),
        length: file.metadata().ok().map(|meta| meta.len()),
        reader: file,
    };

    let summary = handle_blob(&connector, blob, options)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Parse and validate a file without touching any store.
fn check(path: &Path, encoding: TextEncoding) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let records = read_records(file, encoding)?;
    let rejected = count_rejected(&records);

    println!(
        "{} rows, {} valid, {rejected} rejected",
        records.len(),
        records.len() - rejected
    );
    Ok(())
}

/// Validate every record, logging the ones that would be rejected.
fn count_rejected(records: &[Record]) -> usize {
    let mut rejected = 0;
    for record in records {
        if let Err(err) = ProductRow::try_from(record) {
            tracing::warn!(line = record.line(), error = %err, "Row rejected");
            rejected += 1;
        }
    }
    rejected
}

fn print_help() {
    println!(
        r"Catalog Ingest CLI

USAGE:
    catalog-ingest <COMMAND> [OPTIONS]

COMMANDS:
    process <file> [encoding]  Reconcile a CSV file into the DATABASE_URL store
    check <file> [encoding]    Parse and validate a CSV file without writing
    help                       Show this help message

ENCODINGS:
    utf-8 (default), iso-8859-1

EXAMPLES:
    DATABASE_URL=sqlite://catalog.db catalog-ingest process products.csv
    catalog-ingest check products.csv latin1
"
    );
}
