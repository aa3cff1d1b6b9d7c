use std::path::PathBuf;

use agcensus_shared::JoinMode;
use agcensus_shared::boundary::DEFAULT_NAME_FIELD;
use agcensus_shared::census::DEFAULT_ID_COLUMN;

pub const DEFAULT_CENSUS_PATH: &str = "data/agcensus_wide.parquet";
pub const DEFAULT_BOUNDARY_PATH: &str = "data/divisions_simp.geojson";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_SERVER_PORT: u16 = 8501;
pub const DEFAULT_CHOROPLETH_CACHE_ENTRIES: usize = 64;
pub const DEFAULT_BASEMAP_TILE_URL: &str =
    "https://stamen-tiles.a.ssl.fastly.net/toner-lite/{z}/{x}/{y}.png";

// Initial map view over Ontario.
pub const VIEW_LATITUDE: f64 = 50.0;
pub const VIEW_LONGITUDE: f64 = -85.0;
pub const VIEW_ZOOM: f64 = 5.0;
pub const BASEMAP_TILE_SIZE: u32 = 256;
pub const BASEMAP_OPACITY: f64 = 0.7;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

pub fn census_path() -> PathBuf {
    env_string("CENSUS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CENSUS_PATH))
}

pub fn census_id_column() -> String {
    env_string("CENSUS_ID_COLUMN").unwrap_or_else(|| DEFAULT_ID_COLUMN.to_owned())
}

pub fn boundary_path() -> PathBuf {
    env_string("BOUNDARY_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BOUNDARY_PATH))
}

pub fn boundary_name_field() -> String {
    env_string("BOUNDARY_NAME_FIELD").unwrap_or_else(|| DEFAULT_NAME_FIELD.to_owned())
}

/// Load-time simplification in degrees. Unset, zero or invalid disables it;
/// the shipped boundary file is already simplified offline.
pub fn simplify_tolerance() -> Option<f64> {
    env_string("SIMPLIFY_TOLERANCE")
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
}

pub fn default_join_mode() -> JoinMode {
    env_string("JOIN_MODE")
        .and_then(|value| value.parse().ok())
        .unwrap_or_default()
}

pub fn choropleth_cache_entries() -> usize {
    std::env::var("CHOROPLETH_CACHE_ENTRIES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(DEFAULT_CHOROPLETH_CACHE_ENTRIES)
}

pub fn static_dir() -> PathBuf {
    env_string("STATIC_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR))
}

pub fn basemap_tile_url() -> String {
    env_string("BASEMAP_TILE_URL").unwrap_or_else(|| DEFAULT_BASEMAP_TILE_URL.to_owned())
}

pub fn server_port() -> u16 {
    std::env::var("SERVER_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_SERVER_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        temp_env::with_vars_unset(
            [
                "CENSUS_PATH",
                "JOIN_MODE",
                "SIMPLIFY_TOLERANCE",
                "CHOROPLETH_CACHE_ENTRIES",
                "SERVER_PORT",
            ],
            || {
                assert_eq!(census_path(), PathBuf::from(DEFAULT_CENSUS_PATH));
                assert_eq!(default_join_mode(), JoinMode::Inner);
                assert_eq!(simplify_tolerance(), None);
                assert_eq!(choropleth_cache_entries(), DEFAULT_CHOROPLETH_CACHE_ENTRIES);
                assert_eq!(server_port(), DEFAULT_SERVER_PORT);
            },
        );
    }

    #[test]
    fn values_are_read_from_environment() {
        temp_env::with_vars(
            [
                ("CENSUS_PATH", Some("/srv/census.csv")),
                ("JOIN_MODE", Some("Left")),
                ("SIMPLIFY_TOLERANCE", Some("0.01")),
                ("CHOROPLETH_CACHE_ENTRIES", Some("0")),
                ("SERVER_PORT", Some("9000")),
            ],
            || {
                assert_eq!(census_path(), PathBuf::from("/srv/census.csv"));
                assert_eq!(default_join_mode(), JoinMode::Left);
                assert_eq!(simplify_tolerance(), Some(0.01));
                assert_eq!(choropleth_cache_entries(), 0);
                assert_eq!(server_port(), 9000);
            },
        );
    }

    #[test]
    fn invalid_values_fall_back() {
        temp_env::with_vars(
            [
                ("JOIN_MODE", Some("outer")),
                ("SIMPLIFY_TOLERANCE", Some("-1")),
                ("SERVER_PORT", Some("0")),
                ("BOUNDARY_NAME_FIELD", Some("   ")),
            ],
            || {
                assert_eq!(default_join_mode(), JoinMode::Inner);
                assert_eq!(simplify_tolerance(), None);
                assert_eq!(server_port(), DEFAULT_SERVER_PORT);
                assert_eq!(boundary_name_field(), DEFAULT_NAME_FIELD);
            },
        );
    }
}
