use std::path::Path;

use super::error::ParseError;

/// Read an instrument text file. Instrument software writes ISO-8859-1, so every byte
/// maps directly onto the matching code point.
pub fn read_latin1(path: &Path) -> Result<String, ParseError> {
    if !path.exists() {
        return Err(ParseError::MissingFile(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    Ok(bytes.iter().map(|&b| b as char).collect())
}

/// Split `key=value` at the first `=`. Keys become HDF5 link names, so they can be
/// neither empty nor contain `/`.
pub fn split_key_value<'a>(
    path: &Path,
    index: usize,
    text: &'a str,
) -> Result<(&'a str, &'a str), ParseError> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| ParseError::bad_line(path, index, format!("expected key=value, found {text:?}")))?;
    if !is_valid_key(key) {
        return Err(ParseError::bad_line(
            path,
            index,
            format!("{key:?} cannot be used as a field name"),
        ));
    }
    Ok((key, value))
}

/// A header key which can name a dataset
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty() && !key.contains('/')
}

/// Parse one whitespace separated row of floats
pub fn parse_float_row(path: &Path, index: usize, line: &str) -> Result<Vec<f64>, ParseError> {
    line.split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|e| ParseError::bad_line(path, index, format!("{token:?}: {e}")))
        })
        .collect()
}

/// Round to two decimals, as results files are reported
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
