pub mod boundary;
pub mod census;
pub mod choropleth;
pub mod colors;
pub mod crs;
pub mod error;
pub mod format;
pub mod normalize;
pub mod selection;

pub use boundary::{BoundaryOptions, BoundaryRecord, BoundarySet};
pub use census::{CensusRecord, CensusTable, ReshapeReport, WideTable};
pub use choropleth::{Choropleth, ChoroplethPayload, JoinMode, Legend, ValueRange};
pub use colors::Rgba;
pub use error::{CensusLoadError, GeometryLoadError};
pub use normalize::normalize_key;
pub use selection::{Selection, SelectionCatalog, SelectionError};
