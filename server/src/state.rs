use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use agcensus_shared::{BoundarySet, CensusTable, JoinMode, ReshapeReport, SelectionCatalog};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::ChoroplethCache;
use crate::config::{
    BASEMAP_OPACITY, BASEMAP_TILE_SIZE, VIEW_LATITUDE, VIEW_LONGITUDE, VIEW_ZOOM,
    basemap_tile_url, choropleth_cache_entries, default_join_mode,
};

/// Census values and division boundaries, loaded once and read-only after.
#[derive(Debug)]
pub struct Dataset {
    pub census: CensusTable,
    pub census_report: ReshapeReport,
    pub boundaries: BoundarySet,
    pub catalog: SelectionCatalog,
    pub loaded_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(census: CensusTable, census_report: ReshapeReport, boundaries: BoundarySet) -> Self {
        let catalog = census.catalog();
        Self {
            census,
            census_report,
            boundaries,
            catalog,
            loaded_at: Utc::now(),
        }
    }
}

/// Map settings handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct MapConfig {
    pub title: &'static str,
    pub basemap_tile_url: String,
    pub basemap_tile_size: u32,
    pub basemap_opacity: f64,
    pub view: MapView,
    pub outline_color: agcensus_shared::Rgba,
    pub no_data_color: agcensus_shared::Rgba,
    pub tooltip_html: &'static str,
    pub default_join_mode: JoinMode,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MapView {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
}

impl MapConfig {
    pub fn from_env() -> Self {
        Self {
            title: "Ontario Agricultural Census Dashboard",
            basemap_tile_url: basemap_tile_url(),
            basemap_tile_size: BASEMAP_TILE_SIZE,
            basemap_opacity: BASEMAP_OPACITY,
            view: MapView {
                latitude: VIEW_LATITUDE,
                longitude: VIEW_LONGITUDE,
                zoom: VIEW_ZOOM,
            },
            outline_color: agcensus_shared::colors::OUTLINE_COLOR,
            no_data_color: agcensus_shared::colors::NO_DATA_COLOR,
            tooltip_html: "<b>Division:</b> {Municipality_Clean}<br/><b>Value:</b> {value_fmt}",
            default_join_mode: default_join_mode(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub dataset: Arc<Dataset>,
    pub choropleth_cache: Arc<ChoroplethCache>,
    pub map_config: Arc<MapConfig>,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    choropleth_requests_total: AtomicU64,
    choropleth_cache_hits_total: AtomicU64,
    choropleth_cache_misses_total: AtomicU64,
    rejected_selections_total: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct ObservabilitySnapshot {
    pub choropleth_requests_total: u64,
    pub choropleth_cache_hits_total: u64,
    pub choropleth_cache_misses_total: u64,
    pub rejected_selections_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            choropleth_requests_total: self.choropleth_requests_total.load(Ordering::Relaxed),
            choropleth_cache_hits_total: self.choropleth_cache_hits_total.load(Ordering::Relaxed),
            choropleth_cache_misses_total: self
                .choropleth_cache_misses_total
                .load(Ordering::Relaxed),
            rejected_selections_total: self.rejected_selections_total.load(Ordering::Relaxed),
        }
    }

    pub fn record_choropleth_request(&self) {
        self.choropleth_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.choropleth_cache_hits_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.choropleth_cache_misses_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_selection(&self) {
        self.rejected_selections_total
            .fetch_add(1, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new(dataset: Dataset) -> Self {
        Self::with_config(dataset, MapConfig::from_env(), choropleth_cache_entries())
    }

    pub fn with_config(dataset: Dataset, map_config: MapConfig, cache_entries: usize) -> Self {
        Self {
            dataset: Arc::new(dataset),
            choropleth_cache: Arc::new(ChoroplethCache::new(cache_entries)),
            map_config: Arc::new(map_config),
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }
}
