//! Observation catalog: an index CSV plus one JSON file per observation.
//!
//! Layout of a catalog directory:
//!
//! ```text
//! obs-index.csv        obs_id,ra_pnt,dec_pnt,tstart,tstop,livetime,zen_pnt,file
//! obs_023523.json      ObservationRecord (metadata, IRF, events)
//! ```
//!
//! Design goals:
//! - **Strict schema** for the index (missing columns are a hard error)
//! - **Row-level validation** (bad rows are skipped and reported with line numbers)
//! - **Lazy event loading** (selection runs on the index alone)

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use csv::StringRecord;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{ObservationRecord, SkyCoord, TimeRange};
use crate::error::AppError;
use crate::select::PointedObservation;

pub const INDEX_FILE: &str = "obs-index.csv";

const REQUIRED_COLUMNS: [&str; 8] = [
    "obs_id", "ra_pnt", "dec_pnt", "tstart", "tstop", "livetime", "zen_pnt", "file",
];

/// One row of the observation index.
#[derive(Debug, Clone, PartialEq)]
pub struct ObsIndexEntry {
    pub obs_id: u32,
    pub pointing: SkyCoord,
    pub time: TimeRange,
    pub livetime_s: f64,
    pub zenith_deg: f64,
    /// Observation file, relative to the catalog directory.
    pub file: PathBuf,
}

impl PointedObservation for ObsIndexEntry {
    fn obs_id(&self) -> u32 {
        self.obs_id
    }

    fn pointing(&self) -> SkyCoord {
        self.pointing
    }

    fn time_range(&self) -> TimeRange {
        self.time
    }

    fn zenith_deg(&self) -> f64 {
        self.zenith_deg
    }

    fn livetime_s(&self) -> f64 {
        self.livetime_s
    }
}

/// A row-level error encountered while reading the index.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub obs_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub dir: PathBuf,
    pub entries: Vec<ObsIndexEntry>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Read `obs-index.csv` from `dir`. Observation files are not opened.
pub fn load_catalog(dir: &Path) -> Result<Catalog, AppError> {
    let path = dir.join(INDEX_FILE);
    let file = File::open(&path)
        .map_err(|e| AppError::io(format!("Failed to open observation index '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::io(format!("Failed to read index headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for column in REQUIRED_COLUMNS {
        if !header_map.contains_key(column) {
            return Err(AppError::invalid(format!(
                "Missing required column in {INDEX_FILE}: `{column}`"
            )));
        }
    }

    let mut entries = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    obs_id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &header_map) {
            Ok(entry) => entries.push(entry),
            Err(message) => row_errors.push(RowError {
                line,
                obs_id: get_optional(&record, &header_map, "obs_id").map(str::to_string),
                message,
            }),
        }
    }

    for err in &row_errors {
        warn!(line = err.line, obs_id = ?err.obs_id, "{}", err.message);
    }
    debug!(dir = %dir.display(), rows_read, entries = entries.len(), "loaded observation index");

    Ok(Catalog {
        dir: dir.to_path_buf(),
        entries,
        row_errors,
        rows_read,
    })
}

impl Catalog {
    /// Read the full observation (events and IRF) behind an index entry.
    pub fn load_observation(&self, entry: &ObsIndexEntry) -> Result<ObservationRecord, AppError> {
        let path = self.dir.join(&entry.file);
        let file = File::open(&path)
            .map_err(|e| AppError::io(format!("Failed to open observation file '{}': {e}", path.display())))?;
        let obs: ObservationRecord = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| AppError::invalid(format!("Failed to parse '{}': {e}", path.display())))?;
        if obs.obs_id != entry.obs_id {
            return Err(AppError::invalid(format!(
                "'{}' holds observation {} but the index says {}",
                path.display(),
                obs.obs_id,
                entry.obs_id
            )));
        }
        obs.validate()?;
        Ok(obs)
    }
}

#[derive(Serialize)]
struct IndexRow<'a> {
    obs_id: u32,
    ra_pnt: f64,
    dec_pnt: f64,
    tstart: String,
    tstop: String,
    livetime: f64,
    zen_pnt: f64,
    file: &'a str,
}

pub fn observation_file_name(obs_id: u32) -> String {
    format!("obs_{obs_id:06}.json")
}

/// Write `observations` as a catalog directory (index + one JSON per observation).
pub fn write_catalog(dir: &Path, observations: &[ObservationRecord]) -> Result<(), AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", dir.display())))?;

    let index_path = dir.join(INDEX_FILE);
    let mut writer = csv::Writer::from_path(&index_path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", index_path.display())))?;

    for obs in observations {
        let name = observation_file_name(obs.obs_id);
        writer
            .serialize(IndexRow {
                obs_id: obs.obs_id,
                ra_pnt: obs.pointing.ra_deg,
                dec_pnt: obs.pointing.dec_deg,
                tstart: obs.time.start.to_rfc3339(),
                tstop: obs.time.stop.to_rfc3339(),
                livetime: obs.livetime_s,
                zen_pnt: obs.zenith_deg,
                file: &name,
            })
            .map_err(|e| AppError::io(format!("Failed to write index row: {e}")))?;

        let path = dir.join(&name);
        let file = File::create(&path)
            .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;
        serde_json::to_writer(BufWriter::new(file), obs)
            .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", path.display())))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush '{}': {e}", index_path.display())))?;
    Ok(())
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, key: &str) -> Option<&'a str> {
    let idx = *header_map.get(key)?;
    let value = record.get(idx)?.trim();
    if value.is_empty() { None } else { Some(value) }
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    key: &str,
) -> Result<&'a str, String> {
    get_optional(record, header_map, key).ok_or_else(|| format!("Missing `{key}` value."))
}

fn parse_f64(record: &StringRecord, header_map: &HashMap<String, usize>, key: &str) -> Result<f64, String> {
    let raw = get_required(record, header_map, key)?;
    let v: f64 = raw
        .parse()
        .map_err(|_| format!("Invalid `{key}` value: '{raw}'."))?;
    if !v.is_finite() {
        return Err(format!("Non-finite `{key}` value."));
    }
    Ok(v)
}

fn parse_time(record: &StringRecord, header_map: &HashMap<String, usize>, key: &str) -> Result<DateTime<Utc>, String> {
    let raw = get_required(record, header_map, key)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("Invalid `{key}` timestamp '{raw}': {e}"))
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<ObsIndexEntry, String> {
    let raw_id = get_required(record, header_map, "obs_id")?;
    let obs_id: u32 = raw_id
        .parse()
        .map_err(|_| format!("Invalid `obs_id` value: '{raw_id}'."))?;

    let ra = parse_f64(record, header_map, "ra_pnt")?;
    let dec = parse_f64(record, header_map, "dec_pnt")?;
    if !(-90.0..=90.0).contains(&dec) {
        return Err(format!("`dec_pnt` out of range: {dec}."));
    }

    let tstart = parse_time(record, header_map, "tstart")?;
    let tstop = parse_time(record, header_map, "tstop")?;
    let time = TimeRange::new(tstart, tstop).map_err(|e| e.to_string())?;

    let livetime_s = parse_f64(record, header_map, "livetime")?;
    if livetime_s < 0.0 {
        return Err(format!("Negative `livetime`: {livetime_s}."));
    }
    let zenith_deg = parse_f64(record, header_map, "zen_pnt")?;
    let file = PathBuf::from(get_required(record, header_map, "file")?);

    Ok(ObsIndexEntry {
        obs_id,
        pointing: SkyCoord::new(ra.rem_euclid(360.0), dec),
        time,
        livetime_s,
        zenith_deg,
        file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_index(dir: &Path, body: &str) {
        let mut f = File::create(dir.join(INDEX_FILE)).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn bad_rows_are_reported_with_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        write_index(
            dir.path(),
            "\u{feff}OBS_ID,RA_PNT,DEC_PNT,TSTART,TSTOP,LIVETIME,ZEN_PNT,FILE\n\
             23523,83.63,22.51,2004-12-04T22:04:48Z,2004-12-04T22:32:48Z,1581.7,46.2,obs_023523.json\n\
             23524,83.63,95.0,2004-12-04T22:44:00Z,2004-12-04T23:12:00Z,1572.1,39.9,obs_023524.json\n\
             23525,83.63,21.51,2004-12-05T22:00:00Z,2004-12-05T21:00:00Z,1600.0,30.0,obs_023525.json\n",
        );
        let catalog = load_catalog(dir.path()).unwrap();
        assert_eq!(catalog.rows_read, 3);
        assert_eq!(catalog.entries.len(), 1);
        assert_eq!(catalog.entries[0].obs_id, 23523);
        let lines: Vec<usize> = catalog.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 4]);
        assert_eq!(catalog.row_errors[0].obs_id.as_deref(), Some("23524"));
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        write_index(dir.path(), "obs_id,ra_pnt,dec_pnt\n1,2,3\n");
        assert!(matches!(load_catalog(dir.path()), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_catalog(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
