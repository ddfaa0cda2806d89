use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::{FileNameError, ParseError};
use super::text_file::{is_valid_key, read_latin1};
use super::wafer::ScanIndex;

/// Structural markers of the RAS format which carry no value
const PARSE_IGNORE: [&str; 8] = [
    "*RAS_DATA_START",
    "*RAS_HEADER_START",
    "*RAS_HEADER_END",
    "*RAS_INT_START",
    "*RAS_INT_END",
    "*RAS_TEMPERATURE_START",
    "*RAS_TEMPERATURE_END",
    "*RAS_DATA_END",
];

const DISP_PREFIX: &str = "*DISP_";
const FILE_PREFIX: &str = "*FILE_";
const HW_PREFIX: &str = "*HW_";
const MEAS_PREFIX: &str = "*MEAS_";

pub const X_POSITION_KEY: &str = "COND_AXIS_POSITION-6";
pub const Y_POSITION_KEY: &str = "COND_AXIS_POSITION-7";

/// Number of digits per axis in the scan number at the end of a `.ras` file name
const INDEX_DIGITS: usize = 3;

/// A Rigaku `.ras` diffractogram.
///
/// The header is split by keyword family; the data is reduced to angle and counts (any
/// further columns, such as the attenuator factor, are not kept).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RasFile {
    pub path: PathBuf,
    pub disp: BTreeMap<String, String>,
    pub file: BTreeMap<String, String>,
    pub hardware: BTreeMap<String, String>,
    pub meas: BTreeMap<String, String>,
    pub angle: Vec<f64>,
    pub counts: Vec<f64>,
}

impl RasFile {
    pub fn read(path: &Path) -> Result<Self, ParseError> {
        let contents = read_latin1(path)?;
        let mut ras = Self {
            path: path.to_path_buf(),
            ..Default::default()
        };

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('*') {
                ras.parse_header_line(line);
            } else {
                ras.parse_data_line(index, line)?;
            }
        }
        Ok(ras)
    }

    fn parse_header_line(&mut self, line: &str) {
        let (keyword, value) = match line.split_once(' ') {
            Some((keyword, value)) => (keyword, value),
            None => (line, ""),
        };
        if PARSE_IGNORE.contains(&keyword) {
            return;
        }
        let value = value.to_string();
        let family_key = [DISP_PREFIX, FILE_PREFIX, HW_PREFIX, MEAS_PREFIX]
            .iter()
            .find_map(|prefix| keyword.strip_prefix(prefix));
        if family_key.is_some_and(|key| !is_valid_key(key)) {
            spdlog::warn!(
                "{}: skipping header {keyword:?}, it cannot be used as a field name",
                self.path.to_string_lossy()
            );
            return;
        }
        if let Some(key) = keyword.strip_prefix(DISP_PREFIX) {
            self.disp.insert(key.to_string(), value);
        } else if let Some(key) = keyword.strip_prefix(FILE_PREFIX) {
            self.file.insert(key.to_string(), value);
        } else if let Some(key) = keyword.strip_prefix(HW_PREFIX) {
            self.hardware.insert(key.to_string(), value);
        } else if let Some(key) = keyword.strip_prefix(MEAS_PREFIX) {
            // Internal keys are instrument bookkeeping
            if !key.contains("INTERNAL") {
                self.meas.insert(key.to_string(), value);
            }
        }
    }

    fn parse_data_line(&mut self, index: usize, line: &str) -> Result<(), ParseError> {
        let mut tokens = line.split_whitespace();
        let (Some(angle), Some(counts)) = (tokens.next(), tokens.next()) else {
            return Err(ParseError::bad_line(
                &self.path,
                index,
                format!("expected angle and counts, found {line:?}"),
            ));
        };
        let parse = |token: &str| {
            token
                .parse::<f64>()
                .map_err(|e| ParseError::bad_line(&self.path, index, format!("{token:?}: {e}")))
        };
        let angle = parse(angle)?;
        let counts = parse(counts)?;
        self.angle.push(angle);
        self.counts.push(counts);
        Ok(())
    }

    /// Measurement header value with the quoting removed
    pub fn meas_value(&self, key: &str) -> Option<String> {
        self.meas.get(key).map(|v| v.replace('"', ""))
    }
}

/// Scan number encoded at the end of the file name, e.g. `SAMPLE_010020.ras` is (10, 20)
pub fn scan_numbers(path: &Path) -> Result<ScanIndex, FileNameError> {
    let bad_name = || FileNameError::BadXrdName(path.to_path_buf());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(bad_name)?;
    let stem = name.split(".ras").next().unwrap_or_default();
    let token = stem.rsplit('_').next().unwrap_or_default();
    let digits: Vec<char> = token.chars().rev().take(2 * INDEX_DIGITS).collect();
    if digits.len() < 2 * INDEX_DIGITS || !digits.iter().all(|c| c.is_ascii_digit()) {
        return Err(bad_name());
    }
    let digits: String = digits.into_iter().rev().collect();
    let (x_idx, y_idx) = digits.split_at(INDEX_DIGITS);
    Ok(ScanIndex::new(
        x_idx.parse().map_err(|_| bad_name())?,
        y_idx.parse().map_err(|_| bad_name())?,
    ))
}
