use std::collections::HashSet;
use std::path::PathBuf;

use agcensus_shared::{
    BoundaryOptions, BoundarySet, CensusLoadError, CensusTable, GeometryLoadError,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::config;
use crate::state::Dataset;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to load census data: {0}")]
    Census(#[from] CensusLoadError),
    #[error("failed to load boundaries: {0}")]
    Geometry(#[from] GeometryLoadError),
    #[error("census data from {0} has no usable year/variable columns")]
    EmptyCensus(PathBuf),
}

/// Where and how to read the two input datasets.
#[derive(Debug, Clone)]
pub struct DatasetSources {
    pub census_path: PathBuf,
    pub census_id_column: String,
    pub boundary_path: PathBuf,
    pub boundary_options: BoundaryOptions,
}

impl DatasetSources {
    pub fn from_env() -> Self {
        Self {
            census_path: config::census_path(),
            census_id_column: config::census_id_column(),
            boundary_path: config::boundary_path(),
            boundary_options: BoundaryOptions {
                name_field: config::boundary_name_field(),
                simplify_tolerance: config::simplify_tolerance(),
            },
        }
    }
}

/// Read census values and boundaries. Blocking; call from a blocking task.
pub fn load(sources: &DatasetSources) -> Result<Dataset, DatasetError> {
    let (census, report) = CensusTable::load(&sources.census_path, &sources.census_id_column)?;
    let dataset_catalog = census.catalog();
    if dataset_catalog.is_empty() {
        return Err(DatasetError::EmptyCensus(sources.census_path.clone()));
    }

    let boundaries = BoundarySet::load(&sources.boundary_path, &sources.boundary_options)?;
    log_key_coverage(&census, &boundaries);

    Ok(Dataset::new(census, report, boundaries))
}

/// Keys present on only one side never join; report how many there are.
fn log_key_coverage(census: &CensusTable, boundaries: &BoundarySet) {
    let census_keys: HashSet<&str> = census
        .records()
        .iter()
        .map(|record| record.join_key.as_str())
        .collect();
    let boundary_keys: HashSet<&str> = boundaries
        .iter()
        .map(|boundary| boundary.join_key.as_str())
        .filter(|key| !key.is_empty())
        .collect();

    let matched = census_keys.intersection(&boundary_keys).count();
    let census_only = census_keys.len() - matched;
    let boundary_only = boundary_keys.len() - matched;

    if census_only > 0 || boundary_only > 0 {
        let mut sample: Vec<&str> = census_keys
            .difference(&boundary_keys)
            .copied()
            .collect();
        sample.sort_unstable();
        sample.truncate(5);
        warn!(
            matched,
            census_only,
            boundary_only,
            sample = ?sample,
            "census and boundary keys do not fully overlap"
        );
    } else {
        info!(matched, "every census key matches a boundary");
    }
}
