use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use geo::MultiPolygon;
use geojson::{FeatureCollection, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::boundary::{BoundarySet, DEFAULT_NAME_FIELD};
use crate::census::CensusTable;
use crate::colors::{HIGH_COLOR, LOW_COLOR, NO_DATA_COLOR, Rgba, legend_gradient_css, scale_color};
use crate::format::{format_thousands, variable_label};
use crate::selection::Selection;

/// Tooltip text for divisions without a value.
pub const NO_DATA_LABEL: &str = "no data";

/// How boundaries without a census value are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// Emit only divisions with a present value for the selection.
    #[default]
    Inner,
    /// Emit every division; unmatched ones are drawn as no data.
    Left,
}

impl JoinMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
        }
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            other => Err(format!("unknown join mode `{other}` (expected inner or left)")),
        }
    }
}

/// Min and max of the present values for a selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    /// `None` when no finite value is present.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |range, v| match range {
                None => Some(Self { min: v, max: v }),
                Some(Self { min, max }) => Some(Self {
                    min: min.min(v),
                    max: max.max(v),
                }),
            })
    }

    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }

    pub fn color(&self, value: Option<f64>) -> Rgba {
        scale_color(value, self.min, self.max)
    }
}

/// Legend bar contents for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub min_label: String,
    pub max_label: String,
    pub low_color: Rgba,
    pub high_color: Rgba,
    pub gradient_css: String,
}

impl Legend {
    pub fn for_range(range: &ValueRange) -> Self {
        let high_color = if range.is_degenerate() {
            LOW_COLOR
        } else {
            HIGH_COLOR
        };
        Self {
            min_label: format_thousands(range.min),
            max_label: format_thousands(range.max),
            low_color: LOW_COLOR,
            high_color,
            gradient_css: legend_gradient_css(LOW_COLOR, high_color),
        }
    }
}

/// One colored division, borrowing its geometry from the boundary set.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature<'a> {
    pub geometry: &'a MultiPolygon<f64>,
    pub display_name: &'a str,
    pub join_key: &'a str,
    pub value: Option<f64>,
    pub formatted_value: String,
    pub fill_color: Rgba,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choropleth<'a> {
    pub selection: Selection,
    pub join_mode: JoinMode,
    pub features: Vec<Feature<'a>>,
    pub value_range: Option<ValueRange>,
}

/// Join census values for `selection` onto the boundaries and color them.
///
/// The value range covers every present census value for the selection,
/// matched or not. Output order follows the boundary set.
pub fn build<'a>(
    census: &CensusTable,
    boundaries: &'a BoundarySet,
    selection: &Selection,
    join_mode: JoinMode,
) -> Choropleth<'a> {
    let values: HashMap<&str, Option<f64>> = census
        .records_for(selection)
        .map(|record| (record.join_key.as_str(), record.value.filter(|v| v.is_finite())))
        .collect();
    let value_range = ValueRange::from_values(values.values().flatten().copied());

    let features = boundaries
        .iter()
        .filter_map(|boundary| {
            let value = values.get(boundary.join_key.as_str()).copied().flatten();
            let fill_color = match (value, value_range) {
                (Some(v), Some(range)) => range.color(Some(v)),
                (None, _) if join_mode == JoinMode::Left => NO_DATA_COLOR,
                _ => return None,
            };
            Some(Feature {
                geometry: &boundary.geometry,
                display_name: &boundary.display_name,
                join_key: &boundary.join_key,
                value,
                formatted_value: value
                    .map(format_thousands)
                    .unwrap_or_else(|| NO_DATA_LABEL.to_owned()),
                fill_color,
            })
        })
        .collect();

    Choropleth {
        selection: selection.clone(),
        join_mode,
        features,
        value_range,
    }
}

impl Choropleth<'_> {
    pub fn legend(&self) -> Option<Legend> {
        self.value_range.as_ref().map(Legend::for_range)
    }

    /// GeoJSON for the map layer. Property names match the tooltip template.
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .features
            .iter()
            .map(|feature| {
                let mut properties = JsonObject::new();
                properties.insert(
                    DEFAULT_NAME_FIELD.to_owned(),
                    JsonValue::from(feature.display_name),
                );
                properties.insert("join_key".to_owned(), JsonValue::from(feature.join_key));
                properties.insert("value".to_owned(), JsonValue::from(feature.value));
                properties.insert(
                    "value_fmt".to_owned(),
                    JsonValue::from(feature.formatted_value.as_str()),
                );
                properties.insert(
                    "fill_color".to_owned(),
                    JsonValue::from(feature.fill_color.0.to_vec()),
                );
                geojson::Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::from(feature.geometry))),
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

    pub fn to_payload(&self) -> ChoroplethPayload {
        ChoroplethPayload {
            year: self.selection.year.clone(),
            variable: self.selection.variable.clone(),
            label: variable_label(&self.selection.variable),
            join_mode: self.join_mode,
            value_range: self.value_range,
            legend: self.legend(),
            feature_count: self.features.len(),
            geojson: self.to_feature_collection(),
        }
    }
}

/// Response body consumed by the map page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoroplethPayload {
    pub year: String,
    pub variable: String,
    pub label: String,
    pub join_mode: JoinMode,
    pub value_range: Option<ValueRange>,
    pub legend: Option<Legend>,
    pub feature_count: usize,
    pub geojson: FeatureCollection,
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use geo::{LineString, Polygon};

    use super::*;
    use crate::boundary::BoundaryRecord;
    use crate::census::{DEFAULT_ID_COLUMN, read_csv};

    fn census(csv: &str) -> CensusTable {
        let wide = read_csv(Cursor::new(csv), DEFAULT_ID_COLUMN).unwrap();
        CensusTable::reshape(&wide).0
    }

    fn boundary(name: &str, x: f64) -> BoundaryRecord {
        let ring = LineString::from(vec![(x, 0.0), (x + 1.0, 0.0), (x + 1.0, 1.0), (x, 1.0), (x, 0.0)]);
        BoundaryRecord {
            join_key: crate::normalize::normalize_key(name),
            display_name: name.to_owned(),
            geometry: MultiPolygon::new(vec![Polygon::new(ring, Vec::new())]),
        }
    }

    fn boundaries(names: &[&str]) -> BoundarySet {
        BoundarySet::from_records(
            names
                .iter()
                .enumerate()
                .map(|(i, name)| boundary(name, i as f64))
                .collect(),
        )
    }

    fn feature<'a>(choropleth: &'a Choropleth<'_>, key: &str) -> &'a Feature<'a> {
        choropleth
            .features
            .iter()
            .find(|f| f.join_key == key)
            .unwrap_or_else(|| panic!("no feature {key}"))
    }

    #[test]
    fn two_division_scenario() {
        let census = census("join_key,POPULATION_2011\nA,50\nB,150\n");
        let boundaries = boundaries(&["a", "B."]);
        let selection = Selection::new("2011", "POPULATION");

        let choropleth = build(&census, &boundaries, &selection, JoinMode::Inner);
        assert_eq!(choropleth.value_range, Some(ValueRange { min: 50.0, max: 150.0 }));
        assert_eq!(choropleth.features.len(), 2);

        let a = feature(&choropleth, "A");
        assert_eq!(a.fill_color, LOW_COLOR);
        assert_eq!(a.formatted_value, "50");
        let b = feature(&choropleth, "B");
        assert_eq!(b.fill_color, HIGH_COLOR);
        assert_eq!(b.formatted_value, "150");
    }

    #[test]
    fn inner_join_keeps_only_present_values() {
        let census = census("join_key,FARMS_2016\nA,10\nB,\nC,30\nZ,99\n");
        let boundaries = boundaries(&["A", "B", "C", "D"]);
        let choropleth = build(
            &census,
            &boundaries,
            &Selection::new("2016", "FARMS"),
            JoinMode::Inner,
        );

        let mut keys: Vec<_> = choropleth.features.iter().map(|f| f.join_key).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["A", "C"]);
        // Z has no boundary but still widens the range.
        assert_eq!(choropleth.value_range, Some(ValueRange { min: 10.0, max: 99.0 }));
    }

    #[test]
    fn left_join_emits_every_boundary_once() {
        let census = census("join_key,FARMS_2016\nA,10\nB,\nC,30\n");
        let boundaries = boundaries(&["A", "B", "C", "D"]);
        let choropleth = build(
            &census,
            &boundaries,
            &Selection::new("2016", "FARMS"),
            JoinMode::Left,
        );

        assert_eq!(choropleth.features.len(), boundaries.len());
        for record in boundaries.iter() {
            let matches = choropleth
                .features
                .iter()
                .filter(|f| f.join_key == record.join_key)
                .count();
            assert_eq!(matches, 1);
        }
        for key in ["B", "D"] {
            let f = feature(&choropleth, key);
            assert_eq!(f.fill_color, NO_DATA_COLOR);
            assert_eq!(f.formatted_value, NO_DATA_LABEL);
            assert_eq!(f.value, None);
        }
        assert_eq!(feature(&choropleth, "A").fill_color, LOW_COLOR);
        assert_eq!(feature(&choropleth, "C").fill_color, HIGH_COLOR);
    }

    #[test]
    fn single_distinct_value_uses_low_end_color() {
        let census = census("join_key,FARMS_2021\nA,42\nB,42\n");
        let boundaries = boundaries(&["A", "B"]);
        let choropleth = build(
            &census,
            &boundaries,
            &Selection::new("2021", "FARMS"),
            JoinMode::Inner,
        );

        let range = choropleth.value_range.unwrap();
        assert!(range.is_degenerate());
        assert!(choropleth.features.iter().all(|f| f.fill_color == LOW_COLOR));
        let legend = choropleth.legend().unwrap();
        assert_eq!(legend.min_label, "42");
        assert_eq!(legend.high_color, LOW_COLOR);
        assert_eq!(
            legend.gradient_css,
            "linear-gradient(to right, rgb(76,204,0), rgb(76,204,0))"
        );
    }

    #[test]
    fn legend_gradient_spans_ramp_for_wide_range() {
        let legend = Legend::for_range(&ValueRange { min: 0.0, max: 1_500.0 });
        assert_eq!(legend.max_label, "1,500");
        assert_eq!(
            legend.gradient_css,
            "linear-gradient(to right, rgb(76,204,0), rgb(255,0,0))"
        );
    }

    #[test]
    fn no_present_values_leaves_range_undefined() {
        let census = census("join_key,FARMS_2021\nA,\nB,x\n");
        let boundaries = boundaries(&["A", "B"]);
        let selection = Selection::new("2021", "FARMS");

        let inner = build(&census, &boundaries, &selection, JoinMode::Inner);
        assert_eq!(inner.value_range, None);
        assert!(inner.features.is_empty());
        assert!(inner.legend().is_none());

        let left = build(&census, &boundaries, &selection, JoinMode::Left);
        assert_eq!(left.features.len(), 2);
        assert!(left.features.iter().all(|f| f.fill_color == NO_DATA_COLOR));
    }

    #[test]
    fn unknown_selection_yields_empty_inner_result() {
        let census = census("join_key,FARMS_2021\nA,1\n");
        let boundaries = boundaries(&["A"]);
        let choropleth = build(
            &census,
            &boundaries,
            &Selection::new("1999", "FARMS"),
            JoinMode::Inner,
        );
        assert!(choropleth.features.is_empty());
        assert!(choropleth.value_range.is_none());
    }

    #[test]
    fn formats_large_values_with_grouping() {
        let census = census("join_key,ACRES_2016\nA,1234567.9\nB,5\n");
        let boundaries = boundaries(&["A", "B"]);
        let choropleth = build(
            &census,
            &boundaries,
            &Selection::new("2016", "ACRES"),
            JoinMode::Inner,
        );
        assert_eq!(feature(&choropleth, "A").formatted_value, "1,234,567");
    }

    #[test]
    fn feature_collection_carries_tooltip_properties() {
        let census = census("join_key,POPULATION_2011\nA,50\nB,150\n");
        let boundaries = boundaries(&["A", "B"]);
        let choropleth = build(
            &census,
            &boundaries,
            &Selection::new("2011", "POPULATION"),
            JoinMode::Inner,
        );

        let payload = choropleth.to_payload();
        assert_eq!(payload.feature_count, 2);
        assert_eq!(payload.label, "Population");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["join_mode"], "inner");
        assert_eq!(json["value_range"]["min"], 50.0);
        let props = &json["geojson"]["features"][0]["properties"];
        assert_eq!(props["Municipality_Clean"], "A");
        assert_eq!(props["value_fmt"], "50");
        assert_eq!(props["fill_color"], serde_json::json!([76, 204, 0, 180]));
        assert_eq!(json["geojson"]["type"], "FeatureCollection");
    }

    #[test]
    fn join_mode_parses_case_insensitively() {
        assert_eq!("LEFT".parse::<JoinMode>(), Ok(JoinMode::Left));
        assert_eq!(" inner ".parse::<JoinMode>(), Ok(JoinMode::Inner));
        assert!("outer".parse::<JoinMode>().is_err());
        assert_eq!(JoinMode::default(), JoinMode::Inner);
    }
}
