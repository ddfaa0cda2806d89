use hdf5::types::{TypeDescriptor, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use super::constants::{MEASUREMENT_NAME, UNITS_ATTR};
use super::error::ReaderError;

/// A dataset read back from the container, widened to f64 where numeric
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Text(String),
    Floats(Vec<f64>),
    Texts(Vec<String>),
    Matrix(Array2<f64>),
}

/// Values keyed by their path relative to the group that was read, e.g. `meas/SCAN_SPEED`
pub type ResultValues = BTreeMap<String, FieldValue>;
/// Units keyed like [`ResultValues`]; fields without a units attribute are absent
pub type ResultUnits = BTreeMap<String, String>;
/// One result section, keyed by element (a phase name, or a dataset's own name)
pub type ElementValues = BTreeMap<String, ResultValues>;
/// Units of one result section, keyed like [`ElementValues`]
pub type ElementUnits = BTreeMap<String, ResultUnits>;

/// The result sections written from a refinement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Phases,
    GlobalParameters,
    RCoefficients,
}

impl ResultType {
    /// Name fragment of the result group holding this section
    pub fn group_name(&self) -> &'static str {
        match self {
            Self::Phases => "phases",
            Self::GlobalParameters => "global_parameters",
            Self::RCoefficients => "r_coefficients",
        }
    }
}

impl Display for ResultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Phases => write!(f, "Phases"),
            Self::GlobalParameters => write!(f, "Global_Parameters"),
            Self::RCoefficients => write!(f, "R_coefficients"),
        }
    }
}

impl FromStr for ResultType {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "phases" => Ok(Self::Phases),
            "global_parameters" => Ok(Self::GlobalParameters),
            "r_coefficients" => Ok(Self::RCoefficients),
            _ => Err(ReaderError::UnknownResultType(s.to_string())),
        }
    }
}

/// 2-theta scan read back from a measurement group
#[derive(Debug, Clone, PartialEq)]
pub struct XrdPattern {
    pub angle: Vec<f64>,
    pub counts: Vec<f64>,
    pub angle_units: String,
    pub counts_units: String,
}

/// Open the container and resolve a path, or report that it is not there
fn open_path(container: &Path, path: &str) -> Result<Option<File>, ReaderError> {
    if !container.exists() {
        spdlog::warn!(
            "Container {} does not exist, nothing to read",
            container.to_string_lossy()
        );
        return Ok(None);
    }
    let file = File::open(container)?;
    let trimmed = path.trim_matches('/');
    if !trimmed.is_empty() && !link_exists(&file, trimmed) {
        spdlog::warn!(
            "{} not found in {}",
            path,
            container.to_string_lossy()
        );
        return Ok(None);
    }
    Ok(Some(file))
}

/// Checks each segment so that a missing parent is a miss rather than an HDF5 error
fn link_exists(root: &Group, path: &str) -> bool {
    let mut current = String::new();
    for segment in path.split('/') {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        if !root.link_exists(&current) {
            return false;
        }
    }
    true
}

fn last_segment(name: &str) -> String {
    name.rsplit('/').next().unwrap_or_default().to_string()
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn read_units(dataset: &Dataset) -> Result<Option<String>, ReaderError> {
    if !dataset.attr_names()?.iter().any(|n| n == UNITS_ATTR) {
        return Ok(None);
    }
    let units = dataset.attr(UNITS_ATTR)?.read_scalar::<VarLenUnicode>()?;
    Ok(Some(units.as_str().to_string()))
}

fn read_dataset(dataset: &Dataset) -> Result<Option<FieldValue>, ReaderError> {
    let descriptor = dataset.dtype()?.to_descriptor()?;
    let value = match descriptor {
        TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => {
            if dataset.ndim() == 0 {
                let text = dataset.read_scalar::<VarLenUnicode>()?;
                FieldValue::Text(text.as_str().to_string())
            } else {
                let texts = dataset.read_raw::<VarLenUnicode>()?;
                FieldValue::Texts(texts.iter().map(|t| t.as_str().to_string()).collect())
            }
        }
        TypeDescriptor::Float(_) | TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            match dataset.ndim() {
                0 => FieldValue::Float(dataset.read_scalar::<f64>()?),
                1 => FieldValue::Floats(dataset.read_raw::<f64>()?),
                _ => FieldValue::Matrix(dataset.read_2d::<f64>()?),
            }
        }
        other => {
            spdlog::warn!(
                "Skipping {} with unsupported type {:?}",
                dataset.name(),
                other
            );
            return Ok(None);
        }
    };
    Ok(Some(value))
}

fn record_dataset(
    dataset: &Dataset,
    key: String,
    values: &mut ResultValues,
    units: &mut ResultUnits,
) -> Result<(), ReaderError> {
    if let Some(value) = read_dataset(dataset)? {
        if let Some(unit) = read_units(dataset)? {
            units.insert(key.clone(), unit);
        }
        values.insert(key, value);
    }
    Ok(())
}

/// Walk a group recursively, keying every dataset by its path below `group`
fn walk(
    group: &Group,
    prefix: &str,
    values: &mut ResultValues,
    units: &mut ResultUnits,
) -> Result<(), ReaderError> {
    for dataset in group.datasets()? {
        let key = join(prefix, &last_segment(&dataset.name()));
        record_dataset(&dataset, key, values, units)?;
    }
    for child in group.groups()? {
        let key = join(prefix, &last_segment(&child.name()));
        walk(&child, &key, values, units)?;
    }
    Ok(())
}

/// Read everything below `group_path`. A path naming a dataset yields that dataset under
/// its own name.
pub fn read_group(
    container: &Path,
    group_path: &str,
) -> Result<Option<(ResultValues, ResultUnits)>, ReaderError> {
    let Some(file) = open_path(container, group_path)? else {
        return Ok(None);
    };
    let mut values = ResultValues::new();
    let mut units = ResultUnits::new();
    match file.group(group_path) {
        Ok(group) => walk(&group, "", &mut values, &mut units)?,
        Err(_) => {
            let dataset = file.dataset(group_path)?;
            record_dataset(&dataset, last_segment(group_path), &mut values, &mut units)?;
        }
    }
    Ok(Some((values, units)))
}

/// Collect one result section from the results group at `group_path`, e.g.
/// `/entry/xrd/scan_10,20/results`.
///
/// Every child whose name contains the section name contributes its elements. A group
/// element (a phase) maps to its fields, keyed relative to that element; a dataset
/// element maps to itself under its own name.
pub fn get_xrd_results(
    container: &Path,
    group_path: &str,
    result_type: ResultType,
) -> Result<Option<(ElementValues, ElementUnits)>, ReaderError> {
    let Some(file) = open_path(container, group_path)? else {
        return Ok(None);
    };
    let results = file.group(group_path)?;
    let wanted = result_type.group_name();

    let mut values = ElementValues::new();
    let mut units = ElementUnits::new();
    for child in results.groups()? {
        if !last_segment(&child.name()).to_lowercase().contains(wanted) {
            continue;
        }
        for dataset in child.datasets()? {
            let name = last_segment(&dataset.name());
            let mut element_values = ResultValues::new();
            let mut element_units = ResultUnits::new();
            record_dataset(&dataset, name.clone(), &mut element_values, &mut element_units)?;
            values.insert(name.clone(), element_values);
            units.insert(name, element_units);
        }
        for element in child.groups()? {
            let name = last_segment(&element.name());
            let mut element_values = ResultValues::new();
            let mut element_units = ResultUnits::new();
            walk(&element, "", &mut element_values, &mut element_units)?;
            values.insert(name.clone(), element_values);
            units.insert(name, element_units);
        }
    }
    spdlog::debug!(
        "Read {} {} elements from {}",
        values.len(),
        result_type,
        group_path
    );
    Ok(Some((values, units)))
}

/// Read the diffractogram stored under a scan group, e.g. `/entry/xrd/scan_10,20`
pub fn get_xrd_pattern(
    container: &Path,
    scan_path: &str,
) -> Result<Option<XrdPattern>, ReaderError> {
    let measurement_path = format!("{}/{MEASUREMENT_NAME}", scan_path.trim_end_matches('/'));
    let Some(file) = open_path(container, &measurement_path)? else {
        return Ok(None);
    };
    let measurement = file.group(&measurement_path)?;
    let angle = measurement.dataset("angle")?;
    let counts = measurement.dataset("counts")?;
    Ok(Some(XrdPattern {
        angle: angle.read_raw::<f64>()?,
        counts: counts.read_raw::<f64>()?,
        angle_units: read_units(&angle)?.unwrap_or_default(),
        counts_units: read_units(&counts)?.unwrap_or_default(),
    }))
}
