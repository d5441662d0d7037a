use crate::config::{ColumnConfig, InputConfig};
use crate::error::LoadError;
use crate::types::{ColumnKind, Dataset, FieldValue, Record};
use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use geo::Point;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};
use zip::ZipArchive;

// Same set that pandas' `read_csv` treats as missing by default.
const MISSING_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Process-lifetime holder for the dataset.
///
/// The file is read on the first successful `get_or_load` and never again;
/// a changed file is only picked up after a restart.
pub struct DatasetCache {
    input: InputConfig,
    dataset: OnceLock<Arc<Dataset>>,
}

impl DatasetCache {
    pub fn new(input: InputConfig) -> Self {
        Self { input, dataset: OnceLock::new() }
    }

    pub fn get_or_load(&self) -> Result<Arc<Dataset>, LoadError> {
        if let Some(dataset) = self.dataset.get() {
            return Ok(Arc::clone(dataset));
        }
        let loaded = Arc::new(load_dataset(&self.input)?);
        Ok(Arc::clone(self.dataset.get_or_init(|| loaded)))
    }

    pub fn is_loaded(&self) -> bool {
        self.dataset.get().is_some()
    }
}

pub fn load_dataset(input: &InputConfig) -> Result<Dataset, LoadError> {
    info!(path = ?input.data_file, "Loading data...");

    let reader = open_data_reader(&input.data_file)?;
    let dataset = read_dataset(reader, &input.columns, &input.drop_columns)?;

    info!(
        records = dataset.records.len(),
        indicators = dataset.columns.len(),
        "Loaded dataset"
    );
    Ok(dataset)
}

fn open_data_reader(path: &Path) -> Result<Box<dyn Read>, LoadError> {
    let file = File::open(path)
        .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;

    let extension = path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase());

    match extension.as_deref() {
        Some("zip") => {
            let bytes = read_zip_entry(path, file)?;
            Ok(Box::new(Cursor::new(bytes)))
        }
        Some("gz") => Ok(Box::new(GzDecoder::new(BufReader::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

/// Reads the first `.csv` entry of the archive, or its first file entry.
fn read_zip_entry(path: &Path, file: File) -> Result<Vec<u8>, LoadError> {
    let archive_err = |source: zip::result::ZipError| LoadError::Archive {
        path: path.to_path_buf(),
        source,
    };

    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(archive_err)?;
    let names: Vec<String> = archive.file_names().map(String::from).collect();

    let entry = names.iter()
        .find(|n| n.to_lowercase().ends_with(".csv"))
        .or_else(|| names.iter().find(|n| !n.ends_with('/')))
        .ok_or_else(|| LoadError::EmptyArchive(path.to_path_buf()))?;
    debug!(entry = %entry, "Reading archive entry");

    let mut zipped = archive.by_name(entry).map_err(archive_err)?;
    let mut bytes = Vec::new();
    zipped.read_to_end(&mut bytes)
        .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
    Ok(bytes)
}

/// Parses CSV content into a dataset, dropping the administrative columns.
pub fn read_dataset<R: Read>(
    reader: R,
    columns: &ColumnConfig,
    drop_columns: &[String],
) -> Result<Dataset, LoadError> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    let position = |name: &str| {
        headers.iter().position(|h| h == name)
            .ok_or_else(|| LoadError::MissingColumn(name.to_string()))
    };

    let dropped = drop_columns.iter()
        .map(|c| position(c.as_str()))
        .collect::<Result<Vec<_>, _>>()?;

    let code_idx = position(columns.code.as_str())?;
    let desc_idx = position(columns.description.as_str())?;
    let muni_idx = position(columns.municipality.as_str())?;
    let lat_idx = position(columns.latitude.as_str())?;
    let lon_idx = position(columns.longitude.as_str())?;
    let required = [code_idx, desc_idx, muni_idx, lat_idx, lon_idx];

    let indicator_idx: Vec<usize> = (0..headers.len())
        .filter(|i| !required.contains(i) && !dropped.contains(i))
        .collect();

    let rows = rdr.records().collect::<Result<Vec<StringRecord>, _>>()?;

    let indicators: Vec<(usize, String, ColumnKind)> = indicator_idx.iter()
        .map(|&i| (i, headers[i].to_string(), infer_kind(&rows, i)))
        .collect();

    let records = rows.iter().map(|row| {
        let text = |i: usize| row.get(i).unwrap_or("").to_string();

        let mut fields = HashMap::new();
        for (idx, name, kind) in &indicators {
            let raw = row.get(*idx).unwrap_or("");
            if is_missing(raw) {
                continue;
            }
            let value = match kind {
                ColumnKind::Numeric => parse_number(raw).map(FieldValue::Number),
                ColumnKind::Text => Some(FieldValue::Text(raw.to_string())),
            };
            if let Some(value) = value {
                fields.insert(name.clone(), value);
            }
        }

        Record {
            code: text(code_idx),
            description: text(desc_idx),
            municipality: text(muni_idx),
            location: parse_location(row.get(lat_idx), row.get(lon_idx)),
            fields,
        }
    }).collect();

    Ok(Dataset {
        records,
        columns: indicators.into_iter().map(|(_, name, kind)| (name, kind)).collect(),
    })
}

fn is_missing(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw.trim())
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// A column is numeric when every present cell parses, including a column with no present cells.
fn infer_kind(rows: &[StringRecord], idx: usize) -> ColumnKind {
    let all_numeric = rows.iter()
        .filter_map(|row| row.get(idx))
        .filter(|raw| !is_missing(raw))
        .all(|raw| parse_number(raw).is_some());

    if all_numeric { ColumnKind::Numeric } else { ColumnKind::Text }
}

fn parse_location(lat: Option<&str>, lon: Option<&str>) -> Option<Point<f64>> {
    let lat = lat.filter(|s| !is_missing(s)).and_then(parse_number)?;
    let lon = lon.filter(|s| !is_missing(s)).and_then(parse_number)?;
    Some(Point::new(lon, lat))
}
