//! CSV ingest for luminosity functions and star-formation histories.
//!
//! Both readers follow the same rules:
//! - headers are case-insensitive, BOM-tolerant, and extra columns are ignored
//! - required columns are checked up front (exit code 2 on a missing column)
//! - a malformed row is skipped and reported, not fatal
//! - the surviving rows are validated as a whole by the model constructor

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use log::warn;

use crate::error::AppError;
use crate::lf::{LfBin, ObservedLuminosityFunction};
use crate::sfh::{SfhBin, SfhModel};

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Parsed value plus row bookkeeping.
#[derive(Debug, Clone)]
pub struct Ingested<T> {
    pub value: T,
    pub rows_read: usize,
    pub row_errors: Vec<RowError>,
}

const LF_CENTRE: &[&str] = &["centre", "center", "mag", "magnitude"];
const LF_UNCERTAINTY: &[&str] = &["uncertainty", "sigma", "density_uncertainty", "error"];
const SFH_CENTRE: &[&str] = &["centre", "center", "time", "t", "age"];
const SFH_UNCERTAINTY: &[&str] = &["uncertainty", "sigma", "rate_uncertainty", "error"];

/// Load an observed luminosity function from CSV.
pub fn load_luminosity_function(path: &Path) -> Result<Ingested<ObservedLuminosityFunction>, AppError> {
    let file = open(path, "luminosity function CSV")?;
    read_luminosity_function(file, &path.display().to_string())
}

/// Load a star-formation history from CSV.
pub fn load_sfh(path: &Path) -> Result<Ingested<SfhModel>, AppError> {
    let file = open(path, "SFH CSV")?;
    read_sfh(file, &path.display().to_string())
}

pub fn read_luminosity_function<R: Read>(
    reader: R,
    source: &str,
) -> Result<Ingested<ObservedLuminosityFunction>, AppError> {
    let table = read_table(reader, source)?;
    let centre = table.require(LF_CENTRE)?;
    let width = table.require(&["width"])?;
    let density = table.require(&["density"])?;
    let uncertainty = table.require(LF_UNCERTAINTY)?;

    let mut row_errors = Vec::new();
    let mut bins = Vec::new();
    for (line, record) in &table.records {
        let parsed = (|| -> Result<LfBin, String> {
            Ok(LfBin {
                centre: parse_required(record, centre, "centre")?,
                width: parse_required(record, width, "width")?,
                density: parse_required(record, density, "density")?,
                // A blank uncertainty marks the bin as unusable rather than invalid.
                density_uncertainty: parse_optional(record, uncertainty, "uncertainty")?.unwrap_or(f64::NAN),
            })
        })();
        match parsed {
            Ok(bin) => bins.push(bin),
            Err(message) => row_errors.push(RowError { line: *line, message }),
        }
    }
    report_row_errors(source, &row_errors);

    if bins.is_empty() {
        return Err(AppError::new(3, format!("No valid luminosity function rows in '{source}'.")));
    }
    let lf = ObservedLuminosityFunction::new(bins).map_err(|e| AppError::new(2, format!("{source}: {e}")))?;
    Ok(Ingested {
        value: lf,
        rows_read: table.records.len() + table.unparsable,
        row_errors,
    })
}

pub fn read_sfh<R: Read>(reader: R, source: &str) -> Result<Ingested<SfhModel>, AppError> {
    let table = read_table(reader, source)?;
    let centre = table.require(SFH_CENTRE)?;
    let width = table.require(&["width"])?;
    let rate = table.require(&["rate", "sfr"])?;
    let uncertainty = table.find(SFH_UNCERTAINTY);

    let mut row_errors = Vec::new();
    let mut bins = Vec::new();
    for (line, record) in &table.records {
        let parsed = (|| -> Result<SfhBin, String> {
            let rate_uncertainty = match uncertainty {
                Some(idx) => parse_optional(record, idx, "uncertainty")?.unwrap_or(0.0),
                None => 0.0,
            };
            Ok(SfhBin {
                centre: parse_required(record, centre, "centre")?,
                width: parse_required(record, width, "width")?,
                rate: parse_required(record, rate, "rate")?,
                rate_uncertainty,
            })
        })();
        match parsed {
            Ok(bin) => bins.push(bin),
            Err(message) => row_errors.push(RowError { line: *line, message }),
        }
    }
    report_row_errors(source, &row_errors);

    if bins.is_empty() {
        return Err(AppError::new(3, format!("No valid SFH rows in '{source}'.")));
    }
    // Skipping a row would open a gap in the tiling; the constructor reports it.
    let sfh = SfhModel::new(bins).map_err(|e| AppError::new(2, format!("{source}: {e}")))?;
    Ok(Ingested {
        value: sfh,
        rows_read: table.records.len() + table.unparsable,
        row_errors,
    })
}

struct Table {
    source: String,
    header_map: HashMap<String, usize>,
    /// `(line, record)` pairs; lines are 1-based and count the header.
    records: Vec<(usize, StringRecord)>,
    unparsable: usize,
}

impl Table {
    fn find(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|n| self.header_map.get(*n).copied())
    }

    fn require(&self, names: &[&str]) -> Result<usize, AppError> {
        self.find(names).ok_or_else(|| {
            AppError::new(
                2,
                format!(
                    "Missing required column in '{}': `{}` (accepted: {})",
                    self.source,
                    names[0],
                    names.join(", ")
                ),
            )
        })
    }
}

fn open(path: &Path, what: &str) -> Result<File, AppError> {
    File::open(path).map_err(|e| AppError::new(2, format!("Failed to open {what} '{}': {e}", path.display())))
}

fn read_table<R: Read>(reader: R, source: &str) -> Result<Table, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers of '{source}': {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let mut records = Vec::new();
    let mut unparsable = 0;
    for (idx, result) in reader.records().enumerate() {
        let line = result
            .as_ref()
            .ok()
            .and_then(|r| r.position())
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);
        match result {
            Ok(record) => records.push((line, record)),
            Err(e) => {
                warn!("{source}: skipping unreadable CSV record {}: {e}", idx + 1);
                unparsable += 1;
            }
        }
    }

    Ok(Table {
        source: source.to_string(),
        header_map,
        records,
        unparsable,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_required(record: &StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    parse_optional(record, idx, name)?.ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn parse_optional(record: &StringRecord, idx: usize, name: &str) -> Result<Option<f64>, String> {
    let Some(raw) = record.get(idx).map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(format!("Invalid `{name}` value '{raw}'")),
    }
}

fn report_row_errors(source: &str, row_errors: &[RowError]) {
    for e in row_errors.iter().take(10) {
        warn!("{source} line {}: {}", e.line, e.message);
    }
    if row_errors.len() > 10 {
        warn!("{source}: {} more row errors", row_errors.len() - 10);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_lf_with_aliases_bom_and_blank_uncertainty() {
        let csv = "\u{feff}Mag, Width ,density,sigma,comment\n\
                   12.5,1.0,1e-4,1e-5,bright\n\
                   13.5,1.0,2e-4,,no error bar\n\
                   14.5,1.0,3e-4,3e-5,\n";
        let ingested = read_luminosity_function(csv.as_bytes(), "test").unwrap();
        let lf = ingested.value;
        assert_eq!(lf.len(), 3);
        assert_eq!(lf.bins()[0].centre, 12.5);
        assert!(lf.bins()[1].density_uncertainty.is_nan());
        assert_eq!(lf.usable_bins(), vec![0, 2]);
        assert!(ingested.row_errors.is_empty());
    }

    #[test]
    fn bad_lf_rows_are_skipped_and_reported() {
        let csv = "centre,width,density,uncertainty\n\
                   12.5,1.0,1e-4,1e-5\n\
                   13.5,1.0,oops,1e-5\n\
                   14.5,1.0,3e-4,3e-5\n";
        let ingested = read_luminosity_function(csv.as_bytes(), "test").unwrap();
        assert_eq!(ingested.value.len(), 2);
        assert_eq!(ingested.rows_read, 3);
        assert_eq!(ingested.row_errors.len(), 1);
        assert_eq!(ingested.row_errors[0].line, 3);
    }

    #[test]
    fn missing_column_is_a_config_error() {
        let csv = "centre,width,uncertainty\n12.5,1.0,1e-5\n";
        let err = read_luminosity_function(csv.as_bytes(), "test").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("density"));
    }

    #[test]
    fn reads_sfh_with_optional_uncertainty() {
        let csv = "time,width,rate\n1e9,2e9,1e-12\n5e9,6e9,3e-12\n";
        let sfh = read_sfh(csv.as_bytes(), "test").unwrap().value;
        assert_eq!(sfh.len(), 2);
        assert_eq!(sfh.rate_uncertainties(), vec![0.0, 0.0]);

        let csv = "centre,width,rate,uncertainty\n1e9,2e9,1e-12,1e-13\n";
        let sfh = read_sfh(csv.as_bytes(), "test").unwrap().value;
        assert_eq!(sfh.bins()[0].rate_uncertainty, 1e-13);
    }

    #[test]
    fn sfh_with_gap_is_rejected() {
        let csv = "centre,width,rate\n1e9,2e9,1e-12\n6e9,2e9,1e-12\n";
        let err = read_sfh(csv.as_bytes(), "test").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("gap"));
    }

    #[test]
    fn negative_sfh_rate_is_rejected() {
        let csv = "centre,width,rate\n1e9,2e9,-1e-12\n";
        let err = read_sfh(csv.as_bytes(), "test").unwrap_err();
        assert!(err.to_string().contains("negative rate"));
    }
}
