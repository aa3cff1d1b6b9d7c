use std::path::PathBuf;

use thiserror::Error;

/// Failure while decoding the wide census table.
#[derive(Debug, Error)]
pub enum CensusLoadError {
    #[error("census source {path} is unreadable: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported census source format: {0}")]
    UnsupportedFormat(String),
    #[error("identifier column `{0}` not found in census source")]
    MissingIdColumn(String),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed Parquet: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("columnar decode failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

/// Failure while loading division boundaries.
#[derive(Debug, Error)]
pub enum GeometryLoadError {
    #[error("boundary source {path} is unreadable: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed GeoJSON: {0}")]
    Parse(#[from] geojson::Error),
    #[error("boundary source has no `{field}` property on feature {index}")]
    MissingNameProperty { field: String, index: usize },
    #[error("feature {index} has invalid geometry: {reason}")]
    InvalidGeometry { index: usize, reason: String },
    #[error("unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),
    #[error("boundary source contains no features")]
    NoFeatures,
}
