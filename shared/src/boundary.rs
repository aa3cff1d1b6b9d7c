use std::fs;
use std::path::Path;

use geo::sweep::{Cross, Intersections, LineOrPoint};
use geo::{
    Area, Contains, Coord, Line, LineIntersection, LineString, MultiPolygon, Polygon,
    SimplifyVwPreserve,
};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::crs::Crs;
use crate::error::GeometryLoadError;
use crate::normalize::normalize_key;

pub const DEFAULT_NAME_FIELD: &str = "Municipality_Clean";

/// One census division polygon in longitude/latitude degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRecord {
    pub join_key: String,
    pub display_name: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryOptions {
    /// Feature property holding the division's display name.
    pub name_field: String,
    /// Simplification tolerance in degrees; `None` keeps full precision.
    pub simplify_tolerance: Option<f64>,
}

impl Default for BoundaryOptions {
    fn default() -> Self {
        Self {
            name_field: DEFAULT_NAME_FIELD.to_owned(),
            simplify_tolerance: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoundarySet {
    records: Vec<BoundaryRecord>,
    source_crs: Crs,
}

impl BoundarySet {
    pub fn load(path: &Path, options: &BoundaryOptions) -> Result<Self, GeometryLoadError> {
        let raw = fs::read_to_string(path).map_err(|source| GeometryLoadError::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let set = Self::from_geojson_str(&raw, options)?;
        info!(
            path = %path.display(),
            divisions = set.len(),
            crs = ?set.source_crs,
            tolerance = ?options.simplify_tolerance,
            "loaded boundaries"
        );
        Ok(set)
    }

    pub fn from_geojson_str(raw: &str, options: &BoundaryOptions) -> Result<Self, GeometryLoadError> {
        let geojson: GeoJson = raw.parse()?;
        Self::from_geojson(geojson, options)
    }

    pub fn from_geojson(geojson: GeoJson, options: &BoundaryOptions) -> Result<Self, GeometryLoadError> {
        let (features, crs) = match geojson {
            GeoJson::FeatureCollection(fc) => {
                let crs = Crs::from_foreign_members(fc.foreign_members.as_ref())?;
                (fc.features, crs)
            }
            GeoJson::Feature(feature) => {
                let crs = Crs::from_foreign_members(feature.foreign_members.as_ref())?;
                (vec![feature], crs)
            }
            GeoJson::Geometry(_) => {
                return Err(GeometryLoadError::MissingNameProperty {
                    field: options.name_field.clone(),
                    index: 0,
                });
            }
        };
        if features.is_empty() {
            return Err(GeometryLoadError::NoFeatures);
        }

        let records = features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| boundary_record(index, feature, crs, options))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            records,
            source_crs: crs,
        })
    }

    pub fn from_records(records: Vec<BoundaryRecord>) -> Self {
        Self {
            records,
            source_crs: Crs::Wgs84,
        }
    }

    pub fn records(&self) -> &[BoundaryRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundaryRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// CRS the source declared before reprojection.
    pub fn source_crs(&self) -> Crs {
        self.source_crs
    }

    /// Export as a WGS84 feature collection carrying only the name property.
    pub fn to_feature_collection(&self, name_field: &str) -> FeatureCollection {
        let features = self
            .records
            .iter()
            .map(|record| {
                let mut properties = JsonObject::new();
                properties.insert(
                    name_field.to_owned(),
                    JsonValue::String(record.display_name.clone()),
                );
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::from(&record.geometry))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

fn boundary_record(
    index: usize,
    feature: Feature,
    crs: Crs,
    options: &BoundaryOptions,
) -> Result<BoundaryRecord, GeometryLoadError> {
    let name = feature
        .properties
        .as_ref()
        .and_then(|props| props.get(&options.name_field))
        .ok_or_else(|| GeometryLoadError::MissingNameProperty {
            field: options.name_field.clone(),
            index,
        })?;
    let display_name = match name {
        JsonValue::String(name) => name.trim().to_owned(),
        JsonValue::Null => {
            warn!(index, "boundary feature has a null name; it cannot join");
            String::new()
        }
        other => other.to_string(),
    };

    let geometry = feature.geometry.ok_or_else(|| GeometryLoadError::InvalidGeometry {
        index,
        reason: "feature has no geometry".into(),
    })?;
    let mut geometry = multi_polygon(geometry.value, crs)
        .map_err(|reason| GeometryLoadError::InvalidGeometry { index, reason })?;

    if let Some(tolerance) = options.simplify_tolerance.filter(|t| *t > 0.0) {
        let before = vertex_count(&geometry);
        geometry = simplify(&geometry, tolerance);
        debug!(index, before, after = vertex_count(&geometry), "simplified boundary");
    }

    Ok(BoundaryRecord {
        join_key: normalize_key(&display_name),
        display_name,
        geometry,
    })
}

/// Topology-preserving simplification.
///
/// `tolerance` is a distance in degrees; Visvalingam-Whyatt removes vertices
/// whose triangle area falls below `tolerance²`. Rings never drop below four
/// positions and no self-intersections are introduced.
pub fn simplify(geometry: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    geometry.simplify_vw_preserve(&(tolerance * tolerance))
}

pub fn vertex_count(geometry: &MultiPolygon<f64>) -> usize {
    geometry
        .iter()
        .map(|poly| {
            poly.exterior().0.len() + poly.interiors().iter().map(|r| r.0.len()).sum::<usize>()
        })
        .sum()
}

type RingPositions = Vec<Vec<f64>>;

fn multi_polygon(value: Value, crs: Crs) -> Result<MultiPolygon<f64>, String> {
    let polygons: Vec<Vec<RingPositions>> = match value {
        Value::Polygon(rings) => vec![rings],
        Value::MultiPolygon(polygons) => polygons,
        Value::GeometryCollection(_) => return Err("geometry collections are not supported".into()),
        _ => return Err("geometry is not a polygon or multipolygon".into()),
    };
    if polygons.is_empty() {
        return Err("multipolygon has no polygons".into());
    }

    polygons
        .into_iter()
        .map(|rings| polygon(rings, crs))
        .collect::<Result<Vec<_>, _>>()
        .map(MultiPolygon::new)
}

fn polygon(rings: Vec<RingPositions>, crs: Crs) -> Result<Polygon<f64>, String> {
    let mut rings = rings.into_iter();
    let exterior = rings
        .next()
        .ok_or_else(|| "polygon has no exterior ring".to_owned())
        .and_then(|ring| line_string(ring, crs))?;
    let interiors = rings
        .map(|ring| line_string(ring, crs))
        .collect::<Result<Vec<_>, _>>()?;

    if Polygon::new(exterior.clone(), Vec::new()).unsigned_area() == 0.0 {
        return Err("exterior ring encloses no area".into());
    }
    for interior in &interiors {
        if Polygon::new(interior.clone(), Vec::new()).unsigned_area() == 0.0 {
            return Err("interior ring encloses no area".into());
        }
    }

    let polygon = Polygon::new(exterior, interiors);
    check_topology(&polygon)?;
    Ok(polygon)
}

/// One edge of a polygon ring, tagged so crossings can be attributed.
#[derive(Debug, Clone, Copy)]
struct RingEdge {
    ring: usize,
    index: usize,
    ring_len: usize,
    line: Line<f64>,
}

impl RingEdge {
    fn is_adjacent(&self, other: &Self) -> bool {
        self.ring == other.ring
            && ((self.index + 1) % self.ring_len == other.index
                || (other.index + 1) % other.ring_len == self.index)
    }
}

impl Cross for RingEdge {
    type Scalar = f64;

    fn line(&self) -> LineOrPoint<f64> {
        self.line.into()
    }
}

/// Reject rings that cross themselves or each other, holes outside the
/// shell, and holes nested in other holes.
///
/// Rings may touch at isolated points; consecutive edges of one ring may only
/// meet at their shared vertex.
fn check_topology(polygon: &Polygon<f64>) -> Result<(), String> {
    let rings: Vec<&LineString<f64>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .collect();
    let edges = rings.iter().enumerate().flat_map(|(ring, line_string)| {
        let ring_len = line_string.0.len() - 1;
        line_string
            .lines()
            .enumerate()
            .map(move |(index, line)| RingEdge {
                ring,
                index,
                ring_len,
                line,
            })
    });

    for (a, b, intersection) in Intersections::from_iter(edges) {
        let touches = matches!(
            intersection,
            LineIntersection::SinglePoint {
                is_proper: false,
                ..
            }
        );
        if touches && (a.is_adjacent(&b) || a.ring != b.ring) {
            continue;
        }
        return Err(match (a.ring, b.ring) {
            (0, 0) => "exterior ring intersects itself".to_owned(),
            (r, s) if r == s => format!("interior ring {r} intersects itself"),
            (r, s) => format!("rings {r} and {s} cross"),
        });
    }

    let shell = Polygon::new(polygon.exterior().clone(), Vec::new());
    for (i, interior) in polygon.interiors().iter().enumerate() {
        if !shell.contains(interior) {
            return Err(format!("interior ring {} lies outside the exterior", i + 1));
        }
    }
    for (i, outer) in polygon.interiors().iter().enumerate() {
        let hole = Polygon::new(outer.clone(), Vec::new());
        for (j, inner) in polygon.interiors().iter().enumerate() {
            if i != j && hole.contains(inner) {
                return Err(format!("interior ring {} is nested in ring {}", j + 1, i + 1));
            }
        }
    }
    Ok(())
}

/// Build a ring, closing it and dropping repeated vertices where needed.
fn line_string(positions: RingPositions, crs: Crs) -> Result<LineString<f64>, String> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(positions.len() + 1);
    for position in positions {
        // Extra ordinates (elevation) are ignored.
        let (x, y) = match position[..] {
            [x, y, ..] => (x, y),
            _ => return Err(format!("position has {} ordinates", position.len())),
        };
        push_coord(&mut coords, x, y, crs)?;
    }

    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied())
        && first != last
    {
        coords.push(first);
    }
    if coords.len() < 4 {
        return Err(format!("ring has {} distinct positions", coords.len().saturating_sub(1)));
    }

    Ok(LineString::new(coords))
}

fn push_coord(coords: &mut Vec<Coord<f64>>, x: f64, y: f64, crs: Crs) -> Result<(), String> {
    if !x.is_finite() || !y.is_finite() {
        return Err("non-finite coordinate".into());
    }
    let (x, y) = crs.to_wgs84(x, y);
    if crs.is_geographic() && (!(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y)) {
        return Err(format!("coordinate ({x}, {y}) is outside longitude/latitude bounds"));
    }
    let coord = Coord { x, y };
    if coords.last() != Some(&coord) {
        coords.push(coord);
    }
    Ok(())
}
