use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum FileNameError {
    #[error("MOKE file name {0:?} does not match p<N>_x<x>_y<y>_magnetization.txt")]
    BadMokeName(PathBuf),
    #[error("XRD file name {0:?} does not end with a 6 digit scan number before .ras")]
    BadXrdName(PathBuf),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Could not open {0:?} because the file does not exist")]
    MissingFile(PathBuf),
    #[error("Failed to parse {path:?} at line {line}: {reason}")]
    BadLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("Data files do not agree on shape -- {0:?} has {1} rows x {2} columns, expected {3} rows x {4} columns")]
    ShapeMismatch(PathBuf, usize, usize, usize, usize),
    #[error("File {0:?} contains no data rows")]
    Empty(PathBuf),
    #[error("Parsing failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

impl ParseError {
    /// Shorthand for a line level failure. Lines are reported 1-based.
    pub fn bad_line(path: &std::path::Path, index: usize, reason: impl Into<String>) -> Self {
        Self::BadLine {
            path: path.to_path_buf(),
            line: index + 1,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Detector image {0:?} does not start with an SMV header")]
    MissingHeader(PathBuf),
    #[error("Detector image {0:?} is missing header key {1}")]
    MissingKey(PathBuf, String),
    #[error("Detector image {0:?} has an invalid value for header key {1}: {2}")]
    BadValue(PathBuf, String, String),
    #[error("Detector image failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum HDF5WriterError {
    #[error("HDF5Writer failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("HDF5Writer refused to overwrite the existing scan group {0}")]
    ScanExists(String),
    #[error("HDF5Writer could not store string {0:?}: {1}")]
    BadString(String, String),
}

#[derive(Debug, Error)]
pub enum MokeError {
    #[error("MOKE compile failed due to file name error: {0}")]
    FileNameError(#[from] FileNameError),
    #[error("MOKE compile failed due to parse error: {0}")]
    ParseError(#[from] ParseError),
    #[error("MOKE compile failed due to HDF5Writer error: {0}")]
    HDFError(#[from] HDF5WriterError),
    #[error("MOKE compile failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
}

#[derive(Debug, Error)]
pub enum XrdError {
    #[error("XRD compile failed due to file name error: {0}")]
    FileNameError(#[from] FileNameError),
    #[error("XRD compile failed due to parse error: {0}")]
    ParseError(#[from] ParseError),
    #[error("XRD compile failed because {0:?} has no *MEAS_{1} header")]
    MissingPosition(PathBuf, String),
    #[error("XRD compile failed because {0:?} has an invalid wafer position {1:?}")]
    BadPosition(PathBuf, String),
    #[error("XRD compile failed due to detector image error: {0}")]
    ImageError(#[from] ImageError),
    #[error("XRD compile failed due to HDF5Writer error: {0}")]
    HDFError(#[from] HDF5WriterError),
    #[error("XRD compile failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("HDF5Reader failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Unknown XRD result type {0}; expected Phases, Global_Parameters or R_coefficients")]
    UnknownResultType(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
