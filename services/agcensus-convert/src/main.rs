use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use agcensus_shared::boundary::{self, DEFAULT_NAME_FIELD};
use agcensus_shared::census::{self, DEFAULT_ID_COLUMN};
use agcensus_shared::{BoundaryOptions, BoundaryRecord, BoundarySet};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Offline preprocessing steps run before the dashboard starts.
#[derive(Debug, Parser)]
#[command(
    name = "agcensus-convert",
    about = "Prepare census tables and boundary files for the dashboard"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
enum Command {
    /// Convert a wide census CSV to Parquet
    CsvToParquet {
        input: PathBuf,
        output: PathBuf,
        /// Column holding the municipality join key
        #[arg(long, default_value = DEFAULT_ID_COLUMN)]
        id_column: String,
    },
    /// Reproject boundaries to WGS84 and simplify them
    Simplify {
        input: PathBuf,
        output: PathBuf,
        /// Simplification tolerance in degrees; 0 disables it
        #[arg(long, default_value_t = DEFAULT_TOLERANCE, value_parser = parse_tolerance)]
        tolerance: f64,
        /// Property carrying the division name
        #[arg(long, default_value = DEFAULT_NAME_FIELD)]
        name_field: String,
    },
}

const DEFAULT_TOLERANCE: f64 = 0.05;

fn parse_tolerance(raw: &str) -> Result<f64, String> {
    let tolerance: f64 = raw
        .parse()
        .map_err(|err| format!("`{raw}` is not a number: {err}"))?;
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(format!("must be a non-negative number, got {raw}"));
    }
    Ok(tolerance)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Cli::parse().command {
        Command::CsvToParquet {
            input,
            output,
            id_column,
        } => csv_to_parquet(&input, &output, &id_column),
        Command::Simplify {
            input,
            output,
            tolerance,
            name_field,
        } => simplify(&input, &output, tolerance, &name_field),
    }
}

fn csv_to_parquet(input: &Path, output: &Path, id_column: &str) -> Result<()> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let table = census::read_csv(file, id_column)
        .with_context(|| format!("reading census CSV {}", input.display()))?;
    if table.unparsable_cells > 0 {
        tracing::warn!(
            cells = table.unparsable_cells,
            "non-numeric cells were written as nulls"
        );
    }

    let writer = BufWriter::new(
        File::create(output).with_context(|| format!("creating {}", output.display()))?,
    );
    census::write_parquet(&table, writer)
        .with_context(|| format!("writing parquet {}", output.display()))?;

    info!(
        rows = table.rows.len(),
        columns = table.columns.len(),
        output = %output.display(),
        "Parquet saved"
    );
    Ok(())
}

fn simplify(input: &Path, output: &Path, tolerance: f64, name_field: &str) -> Result<()> {
    let options = BoundaryOptions {
        name_field: name_field.to_owned(),
        simplify_tolerance: None,
    };
    let boundaries = BoundarySet::load(input, &options)
        .with_context(|| format!("reading boundaries {}", input.display()))?;
    info!(
        features = boundaries.len(),
        source_crs = ?boundaries.source_crs(),
        "Boundaries loaded and projected to WGS84"
    );

    let before: usize = boundaries
        .iter()
        .map(|record| boundary::vertex_count(&record.geometry))
        .sum();
    let simplified = simplify_set(&boundaries, tolerance);
    let after: usize = simplified
        .iter()
        .map(|record| boundary::vertex_count(&record.geometry))
        .sum();

    let collection = simplified.to_feature_collection(name_field);
    let writer = BufWriter::new(
        File::create(output).with_context(|| format!("creating {}", output.display()))?,
    );
    serde_json::to_writer(writer, &collection)
        .with_context(|| format!("writing GeoJSON {}", output.display()))?;

    info!(
        tolerance,
        vertices_before = before,
        vertices_after = after,
        output = %output.display(),
        "Wrote simplified GeoJSON"
    );
    Ok(())
}

fn simplify_set(boundaries: &BoundarySet, tolerance: f64) -> BoundarySet {
    if tolerance <= 0.0 {
        return BoundarySet::from_records(boundaries.records().to_vec());
    }
    let records = boundaries
        .iter()
        .map(|record| BoundaryRecord {
            join_key: record.join_key.clone(),
            display_name: record.display_name.clone(),
            geometry: boundary::simplify(&record.geometry, tolerance),
        })
        .collect();
    BoundarySet::from_records(records)
}
