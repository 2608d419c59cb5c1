use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    StringArray,
};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::model::{Track, TrackDataset, REQUIRED_COLUMNS};

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Failure while turning a source file into a [`TrackDataset`].
///
/// Any of these is fatal to the session: no partial dataset is ever
/// returned alongside an error.
#[derive(Debug, Error)]
pub enum DataLoadError {
    /// The source file could not be opened or read.
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file extension maps to no supported format.
    #[error("unsupported file extension: .{0}")]
    UnsupportedExtension(String),

    /// A column from the catalog contract is absent.
    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    /// A cell could not be parsed as its contracted type.  Parse failures
    /// are surfaced, never coerced to zero.
    #[error("row {row}, column '{column}': '{value}' is not a valid {expected}")]
    Parse {
        /// 1-based data row (header excluded).
        row: usize,
        column: String,
        value: String,
        expected: &'static str,
    },

    /// The JSON source is not a records-oriented array of objects.
    #[error("JSON catalog must be a records-oriented array of objects")]
    NotRecordArray,

    /// A JSON record is structurally wrong (not an object, field absent).
    #[error("row {row}: {message}")]
    Malformed { row: usize, message: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a track catalog from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row + one track per row (the canonical source)
/// * `.json`    – records-oriented array, `df.to_json(orient='records')`
/// * `.parquet` – one track per row with scalar columns
///
/// Every format enforces the same contract: the fifteen
/// [`REQUIRED_COLUMNS`] must be present and typed; anything beyond them is
/// carried verbatim in [`Track::extras`].  The loader keeps no cache; the
/// host loads once at startup and shares the dataset behind an `Arc`.
pub fn load_file(path: &Path) -> Result<TrackDataset, DataLoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let dataset = match ext.as_str() {
        "csv" => load_csv(path)?,
        "json" => load_json(path)?,
        "parquet" | "pq" => load_parquet(path)?,
        other => return Err(DataLoadError::UnsupportedExtension(other.to_string())),
    };

    log::info!(
        "Loaded {} tracks, {} columns from {}",
        dataset.len(),
        dataset.columns.len(),
        path.display()
    );
    Ok(dataset)
}

fn open(path: &Path) -> Result<File, DataLoadError> {
    File::open(path).map_err(|source| DataLoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Positions of the required columns within a source header.
struct ColumnMap {
    indices: BTreeMap<&'static str, usize>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Result<Self, DataLoadError> {
        let mut indices = BTreeMap::new();
        for name in REQUIRED_COLUMNS {
            let idx = headers
                .iter()
                .position(|h| h == name)
                .ok_or(DataLoadError::MissingColumn(name))?;
            indices.insert(name, idx);
        }
        Ok(ColumnMap { indices })
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, name: &'static str) -> &'r str {
        record.get(self.indices[name]).unwrap_or("")
    }

    fn covers(&self, idx: usize) -> bool {
        self.indices.values().any(|&i| i == idx)
    }
}

/// CSV layout: header row with column names, one track per data row.
/// `explicit` uses the source's `True`/`False` convention (any casing of
/// `true`/`false` is accepted).
fn load_csv(path: &Path) -> Result<TrackDataset, DataLoadError> {
    let mut reader = csv::Reader::from_reader(open(path)?);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let cols = ColumnMap::from_headers(&headers)?;

    let mut tracks = Vec::new();

    for (i, result) in reader.records().enumerate() {
        let row = i + 1;
        let record = result?;

        let mut extras = BTreeMap::new();
        for (idx, value) in record.iter().enumerate() {
            if cols.covers(idx) {
                continue;
            }
            if let Some(name) = headers.get(idx) {
                extras.insert(name.clone(), value.to_string());
            }
        }

        tracks.push(Track {
            song: cols.get(&record, "song").to_string(),
            artist: cols.get(&record, "artist").to_string(),
            year: parse_i32(cols.get(&record, "year"), row, "year")?,
            popularity: parse_f64(cols.get(&record, "popularity"), row, "popularity")?,
            explicit: parse_flag(cols.get(&record, "explicit"), row, "explicit")?,
            genre: cols.get(&record, "genre").to_string(),
            danceability: parse_f64(cols.get(&record, "danceability"), row, "danceability")?,
            energy: parse_f64(cols.get(&record, "energy"), row, "energy")?,
            loudness: parse_f64(cols.get(&record, "loudness"), row, "loudness")?,
            speechiness: parse_f64(cols.get(&record, "speechiness"), row, "speechiness")?,
            acousticness: parse_f64(cols.get(&record, "acousticness"), row, "acousticness")?,
            instrumentalness: parse_f64(
                cols.get(&record, "instrumentalness"),
                row,
                "instrumentalness",
            )?,
            liveness: parse_f64(cols.get(&record, "liveness"), row, "liveness")?,
            valence: parse_f64(cols.get(&record, "valence"), row, "valence")?,
            tempo: parse_f64(cols.get(&record, "tempo"), row, "tempo")?,
            extras,
        });
    }

    Ok(TrackDataset::from_tracks(tracks, headers))
}

fn parse_i32(raw: &str, row: usize, column: &str) -> Result<i32, DataLoadError> {
    raw.trim().parse().map_err(|_| DataLoadError::Parse {
        row,
        column: column.to_string(),
        value: raw.to_string(),
        expected: "integer",
    })
}

fn parse_f64(raw: &str, row: usize, column: &str) -> Result<f64, DataLoadError> {
    raw.trim().parse().map_err(|_| DataLoadError::Parse {
        row,
        column: column.to_string(),
        value: raw.to_string(),
        expected: "number",
    })
}

fn parse_flag(raw: &str, row: usize, column: &str) -> Result<bool, DataLoadError> {
    match raw.trim() {
        "True" | "true" | "TRUE" => Ok(true),
        "False" | "false" | "FALSE" => Ok(false),
        _ => Err(DataLoadError::Parse {
            row,
            column: column.to_string(),
            value: raw.to_string(),
            expected: "boolean",
        }),
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default
/// `df.to_json(orient='records')`):
///
/// ```json
/// [
///   {
///     "song": "...", "artist": "...", "year": 2004, "popularity": 77,
///     "genre": "pop, rock", "explicit": false,
///     "danceability": 0.75, "duration_ms": 211160
///   }
/// ]
/// ```
///
/// JSON objects carry no column order, so the recorded order is the
/// canonical contract order followed by extra keys sorted by name.
fn load_json(path: &Path) -> Result<TrackDataset, DataLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| DataLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let root: JsonValue = serde_json::from_str(&text)?;
    let records = root.as_array().ok_or(DataLoadError::NotRecordArray)?;

    let required: BTreeSet<&str> = REQUIRED_COLUMNS.iter().copied().collect();
    let mut extra_columns: BTreeSet<String> = BTreeSet::new();
    let mut tracks = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let row = i + 1;
        let obj = rec.as_object().ok_or_else(|| DataLoadError::Malformed {
            row,
            message: "record is not a JSON object".to_string(),
        })?;

        let mut extras = BTreeMap::new();
        for (key, val) in obj {
            if required.contains(key.as_str()) {
                continue;
            }
            extra_columns.insert(key.clone());
            extras.insert(key.clone(), json_scalar_string(val));
        }

        tracks.push(Track {
            song: json_str(obj, "song", row)?,
            artist: json_str(obj, "artist", row)?,
            year: json_i32(obj, "year", row)?,
            popularity: json_f64(obj, "popularity", row)?,
            explicit: json_bool(obj, "explicit", row)?,
            genre: json_str(obj, "genre", row)?,
            danceability: json_f64(obj, "danceability", row)?,
            energy: json_f64(obj, "energy", row)?,
            loudness: json_f64(obj, "loudness", row)?,
            speechiness: json_f64(obj, "speechiness", row)?,
            acousticness: json_f64(obj, "acousticness", row)?,
            instrumentalness: json_f64(obj, "instrumentalness", row)?,
            liveness: json_f64(obj, "liveness", row)?,
            valence: json_f64(obj, "valence", row)?,
            tempo: json_f64(obj, "tempo", row)?,
            extras,
        });
    }

    let mut columns: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend(extra_columns);

    Ok(TrackDataset::from_tracks(tracks, columns))
}

fn json_field<'v>(
    obj: &'v serde_json::Map<String, JsonValue>,
    key: &'static str,
    row: usize,
) -> Result<&'v JsonValue, DataLoadError> {
    obj.get(key).ok_or_else(|| DataLoadError::Malformed {
        row,
        message: format!("missing required field '{key}'"),
    })
}

fn json_parse_error(
    val: &JsonValue,
    row: usize,
    key: &str,
    expected: &'static str,
) -> DataLoadError {
    DataLoadError::Parse {
        row,
        column: key.to_string(),
        value: json_scalar_string(val),
        expected,
    }
}

fn json_str(
    obj: &serde_json::Map<String, JsonValue>,
    key: &'static str,
    row: usize,
) -> Result<String, DataLoadError> {
    let val = json_field(obj, key, row)?;
    val.as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| json_parse_error(val, row, key, "string"))
}

fn json_i32(
    obj: &serde_json::Map<String, JsonValue>,
    key: &'static str,
    row: usize,
) -> Result<i32, DataLoadError> {
    let val = json_field(obj, key, row)?;
    val.as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| json_parse_error(val, row, key, "integer"))
}

fn json_f64(
    obj: &serde_json::Map<String, JsonValue>,
    key: &'static str,
    row: usize,
) -> Result<f64, DataLoadError> {
    let val = json_field(obj, key, row)?;
    val.as_f64()
        .ok_or_else(|| json_parse_error(val, row, key, "number"))
}

fn json_bool(
    obj: &serde_json::Map<String, JsonValue>,
    key: &'static str,
    row: usize,
) -> Result<bool, DataLoadError> {
    let val = json_field(obj, key, row)?;
    val.as_bool()
        .ok_or_else(|| json_parse_error(val, row, key, "boolean"))
}

/// Render a JSON scalar the way the catalog's CSV form carries it.
fn json_scalar_string(val: &JsonValue) -> String {
    match val {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(true) => "True".to_string(),
        JsonValue::Bool(false) => "False".to_string(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet catalog: scalar columns, one track per row.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`); integer-typed numeric columns are
/// widened to f64, `Utf8` and `LargeUtf8` strings are both accepted.
fn load_parquet(path: &Path) -> Result<TrackDataset, DataLoadError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(open(path)?)?;
    let schema = builder.schema().clone();

    let mut indices = BTreeMap::new();
    for name in REQUIRED_COLUMNS {
        let idx = schema
            .index_of(name)
            .map_err(|_| DataLoadError::MissingColumn(name))?;
        indices.insert(name, idx);
    }
    let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let extra_cols: Vec<(usize, String)> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(i, _)| !indices.values().any(|&idx| idx == *i))
        .map(|(i, f)| (i, f.name().clone()))
        .collect();

    let reader = builder.build()?;
    let mut tracks = Vec::new();
    let mut row_base = 0usize;

    for batch_result in reader {
        let batch = batch_result?;

        for r in 0..batch.num_rows() {
            let row = row_base + r + 1;
            let cell = |name: &'static str| batch.column(indices[name]);

            let mut extras = BTreeMap::new();
            for (idx, name) in &extra_cols {
                extras.insert(name.clone(), scalar_cell_string(batch.column(*idx), r));
            }

            tracks.push(Track {
                song: str_cell(cell("song"), r, row, "song")?,
                artist: str_cell(cell("artist"), r, row, "artist")?,
                year: year_cell(cell("year"), r, row)?,
                popularity: float_cell(cell("popularity"), r, row, "popularity")?,
                explicit: bool_cell(cell("explicit"), r, row, "explicit")?,
                genre: str_cell(cell("genre"), r, row, "genre")?,
                danceability: float_cell(cell("danceability"), r, row, "danceability")?,
                energy: float_cell(cell("energy"), r, row, "energy")?,
                loudness: float_cell(cell("loudness"), r, row, "loudness")?,
                speechiness: float_cell(cell("speechiness"), r, row, "speechiness")?,
                acousticness: float_cell(cell("acousticness"), r, row, "acousticness")?,
                instrumentalness: float_cell(
                    cell("instrumentalness"),
                    r,
                    row,
                    "instrumentalness",
                )?,
                liveness: float_cell(cell("liveness"), r, row, "liveness")?,
                valence: float_cell(cell("valence"), r, row, "valence")?,
                tempo: float_cell(cell("tempo"), r, row, "tempo")?,
                extras,
            });
        }
        row_base += batch.num_rows();
    }

    Ok(TrackDataset::from_tracks(tracks, columns))
}

// -- Arrow cell helpers --

fn cell_error(
    col: &ArrayRef,
    i: usize,
    row: usize,
    column: &str,
    expected: &'static str,
) -> DataLoadError {
    DataLoadError::Parse {
        row,
        column: column.to_string(),
        value: scalar_cell_string(col, i),
        expected,
    }
}

fn str_cell(col: &ArrayRef, i: usize, row: usize, column: &str) -> Result<String, DataLoadError> {
    if col.is_null(i) {
        return Err(cell_error(col, i, row, column, "string"));
    }
    match col.data_type() {
        DataType::Utf8 => col
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| a.value(i).to_string())
            .ok_or_else(|| cell_error(col, i, row, column, "string")),
        DataType::LargeUtf8 => Ok(col.as_string::<i64>().value(i).to_string()),
        _ => Err(cell_error(col, i, row, column, "string")),
    }
}

fn int_cell(col: &ArrayRef, i: usize) -> Option<i64> {
    if col.is_null(i) {
        return None;
    }
    match col.data_type() {
        DataType::Int64 => col
            .as_any()
            .downcast_ref::<Int64Array>()
            .map(|a| a.value(i)),
        DataType::Int32 => col
            .as_any()
            .downcast_ref::<Int32Array>()
            .map(|a| i64::from(a.value(i))),
        _ => None,
    }
}

fn year_cell(col: &ArrayRef, i: usize, row: usize) -> Result<i32, DataLoadError> {
    int_cell(col, i)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| cell_error(col, i, row, "year", "integer"))
}

fn float_cell(col: &ArrayRef, i: usize, row: usize, column: &str) -> Result<f64, DataLoadError> {
    if col.is_null(i) {
        return Err(cell_error(col, i, row, column, "number"));
    }
    let value = match col.data_type() {
        DataType::Float64 => col
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| a.value(i)),
        DataType::Float32 => col
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| f64::from(a.value(i))),
        DataType::Int64 | DataType::Int32 => int_cell(col, i).map(|v| v as f64),
        _ => None,
    };
    value.ok_or_else(|| cell_error(col, i, row, column, "number"))
}

fn bool_cell(col: &ArrayRef, i: usize, row: usize, column: &str) -> Result<bool, DataLoadError> {
    if col.is_null(i) {
        return Err(cell_error(col, i, row, column, "boolean"));
    }
    col.as_any()
        .downcast_ref::<BooleanArray>()
        .map(|a| a.value(i))
        .ok_or_else(|| cell_error(col, i, row, column, "boolean"))
}

/// Render any scalar cell as the string the catalog's CSV form carries.
fn scalar_cell_string(col: &ArrayRef, i: usize) -> String {
    if col.is_null(i) {
        return String::new();
    }
    match col.data_type() {
        DataType::Utf8 => col
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| a.value(i).to_string())
            .unwrap_or_default(),
        DataType::LargeUtf8 => col.as_string::<i64>().value(i).to_string(),
        DataType::Int64 | DataType::Int32 => int_cell(col, i)
            .map(|v| v.to_string())
            .unwrap_or_default(),
        DataType::Float64 => col
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| a.value(i).to_string())
            .unwrap_or_default(),
        DataType::Float32 => col
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| a.value(i).to_string())
            .unwrap_or_default(),
        DataType::Boolean => col
            .as_any()
            .downcast_ref::<BooleanArray>()
            .map(|a| {
                if a.value(i) {
                    "True".to_string()
                } else {
                    "False".to_string()
                }
            })
            .unwrap_or_default(),
        other => format!("{other:?}"),
    }
}
