use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::sync::{Arc, LazyLock};

use arrow::array::{Array, ArrayRef, AsArray, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::ChunkReader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CensusLoadError;
use crate::normalize::normalize_optional_key;
use crate::selection::{Selection, SelectionCatalog};

pub const DEFAULT_ID_COLUMN: &str = "join_key";

static YEAR_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)_([0-9]{4})$").expect("valid year suffix pattern")
});

/// Cell tokens that mean "no value" rather than a malformed number.
const MISSING_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "NULL", "null", "x", "X", "..", "..."];

/// One census value in long format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensusRecord {
    pub join_key: String,
    pub year: String,
    pub variable: String,
    pub value: Option<f64>,
}

/// One division row of the wide table, values aligned with [`WideTable::columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub id: Option<String>,
    pub values: Vec<Option<f64>>,
}

/// The census table as stored on disk: an identifier column plus one column
/// per `<variable>_<year>` combination.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub id_column: String,
    pub columns: Vec<String>,
    pub rows: Vec<WideRow>,
    /// Cells that held text which could not be read as a number.
    pub unparsable_cells: usize,
}

impl WideTable {
    pub fn new(id_column: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            id_column: id_column.into(),
            columns,
            rows: Vec::new(),
            unparsable_cells: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CensusFormat {
    Csv,
    Parquet,
}

impl CensusFormat {
    pub fn from_path(path: &Path) -> Result<Self, CensusLoadError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(Self::Csv),
            "parquet" | "pq" => Ok(Self::Parquet),
            _ => Err(CensusLoadError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Split `<variable>_<year>` on its trailing four-digit year.
///
/// Returns `None` for names without the suffix or with an empty variable stem.
pub fn split_column_name(name: &str) -> Option<(&str, &str)> {
    let caps = YEAR_SUFFIX.captures(name)?;
    let variable = caps.get(1)?.as_str();
    let year = caps.get(2)?.as_str();
    Some((variable, year))
}

/// Decode a wide table from a file, picking the decoder from the extension.
pub fn read_wide_table(path: &Path, id_column: &str) -> Result<WideTable, CensusLoadError> {
    let format = CensusFormat::from_path(path)?;
    let file = File::open(path).map_err(|source| CensusLoadError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    match format {
        CensusFormat::Csv => read_csv(BufReader::new(file), id_column),
        CensusFormat::Parquet => read_parquet(file, id_column),
    }
}

pub fn read_csv<R: Read>(reader: R, id_column: &str) -> Result<WideTable, CensusLoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_owned())
        .collect();
    let id_index = headers
        .iter()
        .position(|h| h == id_column)
        .ok_or_else(|| CensusLoadError::MissingIdColumn(id_column.to_owned()))?;

    let columns = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != id_index)
        .map(|(_, h)| h.clone())
        .collect();
    let mut table = WideTable::new(id_column, columns);

    for record in rdr.records() {
        let record = record?;
        let id = record
            .get(id_index)
            .filter(|id| !id.is_empty())
            .map(str::to_owned);
        let mut values = Vec::with_capacity(table.columns.len());
        for (i, cell) in record.iter().enumerate() {
            if i == id_index {
                continue;
            }
            match parse_cell(cell) {
                Ok(value) => values.push(value),
                Err(()) => {
                    table.unparsable_cells += 1;
                    values.push(None);
                }
            }
        }
        values.resize(table.columns.len(), None);
        table.rows.push(WideRow { id, values });
    }

    Ok(table)
}

fn parse_cell(cell: &str) -> Result<Option<f64>, ()> {
    let cell = cell.trim();
    if MISSING_TOKENS.contains(&cell) {
        return Ok(None);
    }
    let value: f64 = cell.parse().map_err(|_| ())?;
    Ok(value.is_finite().then_some(value))
}

pub fn read_parquet<R: ChunkReader + 'static>(
    reader: R,
    id_column: &str,
) -> Result<WideTable, CensusLoadError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(reader)?;
    let schema = builder.schema().clone();
    let id_index = schema
        .index_of(id_column)
        .map_err(|_| CensusLoadError::MissingIdColumn(id_column.to_owned()))?;

    let columns = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != id_index)
        .map(|(_, field)| field.name().clone())
        .collect();
    let mut table = WideTable::new(id_column, columns);

    let batches = builder.with_batch_size(1024).build()?;
    for batch in batches {
        let batch = batch?;
        let ids = cast(batch.column(id_index), &DataType::Utf8)?;
        let ids = ids.as_string::<i32>();
        let data = (0..batch.num_columns())
            .filter(|i| *i != id_index)
            .map(|i| cast(batch.column(i), &DataType::Float64))
            .collect::<Result<Vec<ArrayRef>, _>>()?;

        for row in 0..batch.num_rows() {
            let id = ids
                .is_valid(row)
                .then(|| ids.value(row))
                .filter(|id| !id.trim().is_empty())
                .map(|id| id.trim().to_owned());
            let values = data
                .iter()
                .map(|array| {
                    let array = array.as_primitive::<Float64Type>();
                    array
                        .is_valid(row)
                        .then(|| array.value(row))
                        .filter(|value| value.is_finite())
                })
                .collect();
            table.rows.push(WideRow { id, values });
        }
    }

    Ok(table)
}

/// Write a wide table as Parquet: UTF-8 identifier, nullable Float64 data
/// columns, Snappy compression.
pub fn write_parquet<W: Write + Send>(table: &WideTable, writer: W) -> Result<(), CensusLoadError> {
    let mut fields = Vec::with_capacity(table.columns.len() + 1);
    fields.push(Field::new(&table.id_column, DataType::Utf8, true));
    fields.extend(
        table
            .columns
            .iter()
            .map(|name| Field::new(name, DataType::Float64, true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns.len() + 1);
    arrays.push(Arc::new(StringArray::from(
        table.rows.iter().map(|row| row.id.as_deref()).collect::<Vec<_>>(),
    )));
    for col in 0..table.columns.len() {
        arrays.push(Arc::new(Float64Array::from(
            table
                .rows
                .iter()
                .map(|row| row.values.get(col).copied().flatten())
                .collect::<Vec<_>>(),
        )));
    }
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(writer, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Data-quality findings from reshaping. None of these abort a load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReshapeReport {
    /// Data columns without a `_<year>` suffix; excluded from the records.
    pub malformed_columns: Vec<String>,
    /// Rows whose identifier normalized to the empty key.
    pub rows_without_key: usize,
    /// Later occurrences of an already seen (key, year, variable).
    pub duplicate_records: usize,
    pub unparsable_cells: usize,
}

impl ReshapeReport {
    pub fn is_clean(&self) -> bool {
        self.malformed_columns.is_empty()
            && self.rows_without_key == 0
            && self.duplicate_records == 0
            && self.unparsable_cells == 0
    }
}

/// Long-format census records indexed by selection.
#[derive(Debug, Clone, Default)]
pub struct CensusTable {
    records: Vec<CensusRecord>,
    by_selection: HashMap<Selection, Vec<usize>>,
}

impl CensusTable {
    /// Load and reshape a census file.
    pub fn load(path: &Path, id_column: &str) -> Result<(Self, ReshapeReport), CensusLoadError> {
        let wide = read_wide_table(path, id_column)?;
        let (table, report) = Self::reshape(&wide);

        for column in &report.malformed_columns {
            warn!(%column, "census column lacks a _<year> suffix; skipped");
        }
        if report.rows_without_key > 0 {
            warn!(rows = report.rows_without_key, "census rows without a usable key skipped");
        }
        if report.duplicate_records > 0 {
            warn!(
                duplicates = report.duplicate_records,
                "duplicate census records after key normalization; first occurrence kept"
            );
        }
        if report.unparsable_cells > 0 {
            warn!(cells = report.unparsable_cells, "non-numeric census cells treated as absent");
        }
        info!(
            path = %path.display(),
            rows = wide.rows.len(),
            records = table.len(),
            "loaded census table"
        );

        Ok((table, report))
    }

    /// Unpivot a wide table into one record per (division, variable, year).
    pub fn reshape(wide: &WideTable) -> (Self, ReshapeReport) {
        let mut report = ReshapeReport {
            unparsable_cells: wide.unparsable_cells,
            ..ReshapeReport::default()
        };

        let splits: Vec<Option<(&str, &str)>> = wide
            .columns
            .iter()
            .map(|name| split_column_name(name))
            .collect();
        report.malformed_columns = wide
            .columns
            .iter()
            .zip(&splits)
            .filter(|(_, split)| split.is_none())
            .map(|(name, _)| name.clone())
            .collect();

        let mut table = Self::default();
        let mut seen: HashMap<Selection, HashSet<String>> = HashMap::new();

        for row in &wide.rows {
            let join_key = normalize_optional_key(row.id.as_deref());
            if join_key.is_empty() {
                report.rows_without_key += 1;
                continue;
            }

            for (split, value) in splits.iter().zip(&row.values) {
                let Some((variable, year)) = split else {
                    continue;
                };
                let selection = Selection::new(*year, *variable);
                let keys = seen.entry(selection.clone()).or_default();
                if !keys.insert(join_key.clone()) {
                    report.duplicate_records += 1;
                    continue;
                }

                table
                    .by_selection
                    .entry(selection)
                    .or_default()
                    .push(table.records.len());
                table.records.push(CensusRecord {
                    join_key: join_key.clone(),
                    year: (*year).to_owned(),
                    variable: (*variable).to_owned(),
                    value: *value,
                });
            }
        }

        (table, report)
    }

    pub fn records(&self) -> &[CensusRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records for one (year, variable), absent values included.
    pub fn records_for<'a>(
        &'a self,
        selection: &Selection,
    ) -> impl Iterator<Item = &'a CensusRecord> + use<'a> {
        self.by_selection
            .get(selection)
            .into_iter()
            .flatten()
            .map(|&i| &self.records[i])
    }

    pub fn catalog(&self) -> SelectionCatalog {
        SelectionCatalog::from_selections(self.by_selection.keys())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const WIDE_CSV: &str = "\
join_key,POPULATION_2011,POPULATION_2016,FARM_AREA_2016,Notes
Bruce,100,120,\"1,500\",a
\"Thunder Bay, District\",7,,x,b
,5,6,7,c
";

    #[test]
    fn split_column_name_uses_trailing_year() {
        assert_eq!(split_column_name("POPULATION_2011"), Some(("POPULATION", "2011")));
        assert_eq!(
            split_column_name("HAY_2016_ACRES_2021"),
            Some(("HAY_2016_ACRES", "2021"))
        );
        assert_eq!(split_column_name("POPULATION"), None);
        assert_eq!(split_column_name("POPULATION_11"), None);
        assert_eq!(split_column_name("POPULATION_20111"), None);
        assert_eq!(split_column_name("_2011"), None);
        assert_eq!(split_column_name("AREA_٢٠١١"), None);
    }

    #[test]
    fn reshapes_single_row_into_one_record_per_year() {
        let mut wide = WideTable::new(
            "join_key",
            vec!["POPULATION_2011".into(), "POPULATION_2016".into()],
        );
        wide.rows.push(WideRow {
            id: Some("X".into()),
            values: vec![Some(100.0), Some(120.0)],
        });

        let (table, report) = CensusTable::reshape(&wide);
        assert!(report.is_clean());
        assert_eq!(
            table.records(),
            &[
                CensusRecord {
                    join_key: "X".into(),
                    year: "2011".into(),
                    variable: "POPULATION".into(),
                    value: Some(100.0),
                },
                CensusRecord {
                    join_key: "X".into(),
                    year: "2016".into(),
                    variable: "POPULATION".into(),
                    value: Some(120.0),
                },
            ]
        );
    }

    #[test]
    fn csv_decoding_reports_quality_problems() {
        let wide = read_csv(Cursor::new(WIDE_CSV), DEFAULT_ID_COLUMN).unwrap();
        assert_eq!(
            wide.columns,
            ["POPULATION_2011", "POPULATION_2016", "FARM_AREA_2016", "Notes"]
        );
        assert_eq!(wide.rows.len(), 3);
        assert_eq!(wide.rows[0].values, [Some(100.0), Some(120.0), None, None]);
        assert_eq!(wide.rows[1].values, [Some(7.0), None, None, None]);
        assert_eq!(wide.rows[2].id, None);
        // "1,500" and every Notes cell are text; "x" and "" are plain missing markers.
        assert_eq!(wide.unparsable_cells, 4);

        let (table, report) = CensusTable::reshape(&wide);
        assert_eq!(report.malformed_columns, ["Notes"]);
        assert_eq!(report.rows_without_key, 1);
        assert_eq!(report.duplicate_records, 0);
        assert_eq!(table.len(), 6);

        let thunder_bay: Vec<_> = table
            .records_for(&Selection::new("2016", "POPULATION"))
            .filter(|r| r.join_key == "THUNDERBAYDISTRICT")
            .collect();
        assert_eq!(thunder_bay.len(), 1);
        assert_eq!(thunder_bay[0].value, None);
    }

    #[test]
    fn missing_id_column_is_an_error() {
        let err = read_csv(Cursor::new("name,A_2011\nx,1\n"), DEFAULT_ID_COLUMN).unwrap_err();
        assert!(matches!(err, CensusLoadError::MissingIdColumn(col) if col == "join_key"));
    }

    #[test]
    fn duplicate_keys_keep_first_occurrence() {
        let csv = "join_key,FARMS_2011\nBruce,10\nBRUCE,99\n";
        let wide = read_csv(Cursor::new(csv), DEFAULT_ID_COLUMN).unwrap();
        let (table, report) = CensusTable::reshape(&wide);
        assert_eq!(report.duplicate_records, 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].value, Some(10.0));
    }

    #[test]
    fn catalog_lists_years_and_variables() {
        let wide = read_csv(Cursor::new(WIDE_CSV), DEFAULT_ID_COLUMN).unwrap();
        let (table, _) = CensusTable::reshape(&wide);
        let catalog = table.catalog();
        assert_eq!(catalog.years().collect::<Vec<_>>(), ["2011", "2016"]);
        assert_eq!(
            catalog.variables("2016").collect::<Vec<_>>(),
            ["FARM_AREA", "POPULATION"]
        );
    }

    #[test]
    fn parquet_and_csv_decode_to_identical_records() {
        let csv = "join_key,POPULATION_2011,POPULATION_2016\nA,50,\nB,150,160\n";
        let from_csv = read_csv(Cursor::new(csv), DEFAULT_ID_COLUMN).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.parquet");
        write_parquet(&from_csv, File::create(&path).unwrap()).unwrap();

        let from_parquet = read_wide_table(&path, DEFAULT_ID_COLUMN).unwrap();
        assert_eq!(from_parquet.columns, from_csv.columns);
        assert_eq!(from_parquet.rows, from_csv.rows);

        let (csv_table, _) = CensusTable::reshape(&from_csv);
        let (parquet_table, _) = CensusTable::reshape(&from_parquet);
        assert_eq!(csv_table.records(), parquet_table.records());
    }

    #[test]
    fn unknown_extension_and_missing_file_fail_fast() {
        assert!(matches!(
            read_wide_table(Path::new("census.xlsx"), DEFAULT_ID_COLUMN),
            Err(CensusLoadError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            read_wide_table(Path::new("/nonexistent/census.csv"), DEFAULT_ID_COLUMN),
            Err(CensusLoadError::SourceUnreadable { .. })
        ));
    }
}
