use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::{DEFAULT_EDGE_MARGIN_MM, DEFAULT_WAFER_DIAMETER_MM};
use super::error::ConfigError;
use super::wafer::{WaferEdgeRule, WriteOptions};

const MOKE_FILE_SUFFIX: &str = "_magnetization.txt";
const XRD_EXTENSION: &str = "ras";

/// Structure representing the application configuration. Contains the container path and
/// the instrument directories to compile.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub hdf_path: PathBuf,
    pub moke_path: Option<PathBuf>,
    pub xrd_path: Option<PathBuf>,
    pub exclude_wafer_edges: bool,
    pub wafer_diameter_mm: f64,
    pub edge_margin_mm: f64,
}

impl Default for Config {
    /// Generate a new Config object. No instrument directories are set
    fn default() -> Self {
        Self {
            hdf_path: PathBuf::from("wafer.h5"),
            moke_path: None,
            xrd_path: None,
            exclude_wafer_edges: true,
            wafer_diameter_mm: DEFAULT_WAFER_DIAMETER_MM,
            edge_margin_mm: DEFAULT_EDGE_MARGIN_MM,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Options handed to every compile call
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            exclude_wafer_edges: self.exclude_wafer_edges,
            edge_rule: WaferEdgeRule::new(self.wafer_diameter_mm, self.edge_margin_mm),
        }
    }

    /// All magnetization traces in the MOKE directory, sorted by name
    pub fn moke_files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        match &self.moke_path {
            Some(dir) => list_files(dir, |name| name.ends_with(MOKE_FILE_SUFFIX)),
            None => Ok(Vec::new()),
        }
    }

    /// All `.ras` scans in the XRD directory, sorted by name
    pub fn xrd_files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        match &self.xrd_path {
            Some(dir) => list_files(dir, |name| {
                Path::new(name)
                    .extension()
                    .is_some_and(|ext| ext == XRD_EXTENSION)
            }),
            None => Ok(Vec::new()),
        }
    }
}

fn list_files(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>, ConfigError> {
    if !dir.exists() {
        return Err(ConfigError::BadFilePath(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for item in dir.read_dir()? {
        let item_path = item?.path();
        if !item_path.is_file() {
            continue;
        }
        let keep_it = item_path
            .file_name()
            .is_some_and(|name| keep(&name.to_string_lossy()));
        if keep_it {
            files.push(item_path);
        }
    }
    files.sort();
    Ok(files)
}
