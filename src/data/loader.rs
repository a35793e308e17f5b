use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array, LargeListArray,
    ListArray,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use super::model::{PsfProfile, Segment, SpectralTable};

/// Per-pixel list columns every spectral table must carry, in [`Segment`] order.
pub const LIST_COLUMNS: [&str; 6] = [
    "WAVELENGTH",
    "FLUX",
    "ERROR",
    "ERROR_LOWER",
    "GROSS",
    "GCOUNTS",
];

/// Scalar exposure-time column.
pub const EXPTIME_COLUMN: &str = "EXPTIME";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a spectral table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one row per segment, list columns plus scalar `EXPTIME`
/// * `.json`    – `[{ "EXPTIME": 1.0, "WAVELENGTH": [...], ... }, ...]`
/// * `.csv`     – list columns as semicolon-separated floats
///
/// Column names are matched case-insensitively.
pub fn load_spectral_table(path: &Path) -> Result<SpectralTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path)?,
        "json" => load_json(path)?,
        "csv" => load_csv(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };
    log::info!(
        "loaded {} segment(s) from {}",
        table.len(),
        path.display()
    );
    Ok(table)
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    separation: f64,
    intensity: f64,
}

/// Load a reference PSF radial profile from a CSV with header
/// `separation,intensity`.
pub fn load_psf_profile(path: &Path) -> Result<PsfProfile> {
    let mut reader = csv::Reader::from_path(path).context("opening PSF profile CSV")?;
    let mut separation = Vec::new();
    let mut intensity = Vec::new();
    for (row_no, result) in reader.deserialize::<ProfileRow>().enumerate() {
        let row = result.with_context(|| format!("PSF profile row {row_no}"))?;
        separation.push(row.separation);
        intensity.push(row.intensity);
    }
    let profile = PsfProfile::new(separation, intensity)
        .with_context(|| format!("invalid PSF profile in {}", path.display()))?;
    log::debug!("loaded PSF profile with {} samples", profile.len());
    Ok(profile)
}

fn build_segment(row: usize, exptime: f64, mut columns: Vec<Vec<f64>>) -> Result<Segment> {
    // Pop in reverse so each column moves out without cloning.
    let gcounts = columns.pop().context("missing GCOUNTS")?;
    let gross = columns.pop().context("missing GROSS")?;
    let error_lower = columns.pop().context("missing ERROR_LOWER")?;
    let error = columns.pop().context("missing ERROR")?;
    let flux = columns.pop().context("missing FLUX")?;
    let wavelength = columns.pop().context("missing WAVELENGTH")?;
    Segment::new(exptime, wavelength, flux, error, error_lower, gross, gcounts)
        .with_context(|| format!("Row {row}: inconsistent column lengths"))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   {
///     "EXPTIME": 1200.0,
///     "WAVELENGTH": [1100.0, 1100.01, ...],
///     "FLUX": [...], "ERROR": [...], "ERROR_LOWER": [...],
///     "GROSS": [...], "GCOUNTS": [...]
///   },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<SpectralTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut segments = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let exptime = json_field(obj, EXPTIME_COLUMN)
            .and_then(|v| v.as_f64())
            .with_context(|| format!("Row {i}: missing or invalid '{EXPTIME_COLUMN}'"))?;

        let columns = LIST_COLUMNS
            .iter()
            .map(|col| json_array_to_f64(json_field(obj, col), i, col))
            .collect::<Result<Vec<_>>>()?;

        segments.push(build_segment(i, exptime, columns)?);
    }

    Ok(SpectralTable::from_segments(segments))
}

fn json_field<'a>(obj: &'a Map<String, JsonValue>, name: &str) -> Option<&'a JsonValue> {
    obj.iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| match v {
            // NaN is written as null by most JSON encoders.
            JsonValue::Null => Ok(f64::NAN),
            other => other
                .as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number")),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// List columns contain semicolon-separated floats:
///   `"1100.0;1100.01;1100.02"`.
/// `EXPTIME` is a plain float; any other column is ignored.
fn load_csv(path: &Path) -> Result<SpectralTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let column_index = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .with_context(|| format!("CSV missing '{name}' column"))
    };
    let exptime_idx = column_index(EXPTIME_COLUMN)?;
    let list_idx = LIST_COLUMNS
        .iter()
        .map(|col| column_index(*col))
        .collect::<Result<Vec<_>>>()?;

    let mut segments = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let exptime_text = record.get(exptime_idx).unwrap_or("").trim();
        let exptime = exptime_text.parse::<f64>().with_context(|| {
            format!("Row {row_no}, {EXPTIME_COLUMN}: '{exptime_text}' is not a number")
        })?;

        let columns = list_idx
            .iter()
            .zip(LIST_COLUMNS)
            .map(|(&idx, col)| parse_semicolon_floats(record.get(idx).unwrap_or(""), row_no, col))
            .collect::<Result<Vec<_>>>()?;

        segments.push(build_segment(row_no, exptime, columns)?);
    }

    Ok(SpectralTable::from_segments(segments))
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing a spectral table.
///
/// Expected schema:
/// - `WAVELENGTH`, `FLUX`, `ERROR`, `ERROR_LOWER`, `GROSS`, `GCOUNTS`:
///   List<Float64|Float32> or LargeList of the same
/// - `EXPTIME`: Float64, Float32, Int32 or Int64
/// - Any other columns are ignored
fn load_parquet(path: &Path) -> Result<SpectralTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut segments = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let exptime_col = column_by_name(&batch, EXPTIME_COLUMN)?;
        let list_cols = LIST_COLUMNS
            .iter()
            .map(|col| column_by_name(&batch, col))
            .collect::<Result<Vec<_>>>()?;

        for row in 0..batch.num_rows() {
            let global_row = segments.len();
            let exptime = extract_f64_scalar(exptime_col, row)
                .with_context(|| format!("Row {global_row}: failed to read '{EXPTIME_COLUMN}'"))?;
            let columns = list_cols
                .iter()
                .zip(LIST_COLUMNS)
                .map(|(col, name)| {
                    extract_f64_list(col, row)
                        .with_context(|| format!("Row {global_row}: failed to read '{name}'"))
                })
                .collect::<Result<Vec<_>>>()?;

            segments.push(build_segment(global_row, exptime, columns)?);
        }
    }

    Ok(SpectralTable::from_segments(segments))
}

// -- Parquet / Arrow helpers --

fn column_by_name<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    let idx = batch
        .schema()
        .fields()
        .iter()
        .position(|f| f.name().eq_ignore_ascii_case(name))
        .with_context(|| format!("Parquet file missing '{name}' column"))?;
    Ok(batch.column(idx))
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &ArrayRef, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Extract a numeric scalar from an Arrow column at a given row.
fn extract_f64_scalar(col: &ArrayRef, row: usize) -> Result<f64> {
    if col.is_null(row) {
        bail!("null scalar value");
    }
    let any = col.as_any();
    let value = match col.data_type() {
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| a.value(row)),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map(|a| a.value(row) as f64),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| a.value(row) as f64),
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map(|a| a.value(row) as f64),
        other => bail!("Expected a numeric scalar column, got {other:?}"),
    };
    value.context("column type does not match its declared data type")
}
