use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, File, Group, Location};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::constants::{ENTRY_NAME, NX_CLASS, UNITS_ATTR};
use super::error::HDF5WriterError;
use super::node::{Node, Tree};
use super::wafer::ScanIndex;

// Structure
// entry
// |---- moke
// |    |---- scan_#,# - instrument, measurement, results
// |---- xrd
// |    |---- scan_#,# - instrument, measurement, results, image

/// Key level transforms applied while a [`Tree`] is mirrored into a group.
///
/// All three only look at text leaves: refined values such as `A=0.4049+-0.0001` stay
/// text and carry the unit, plain numbers are written without one.
#[derive(Debug, Clone, Copy)]
pub struct FlattenRules {
    pub drop_key: fn(&str) -> bool,
    pub strip_quotes: fn(&str) -> bool,
    pub units: &'static [(&'static str, &'static str)],
}

const XRD_UNITS: &[(&str, &str)] = &[("A", "nm"), ("B", "nm"), ("C", "nm")];

impl FlattenRules {
    /// Write everything as is
    pub fn plain() -> Self {
        Self {
            drop_key: |_| false,
            strip_quotes: |_| false,
            units: &[],
        }
    }

    /// Rigaku headers and BGMN results: quoted strings, a redundant UNIT key, and cell
    /// lengths in nanometers
    pub fn xrd() -> Self {
        Self {
            drop_key: |key| key == "UNIT",
            strip_quotes: |_| true,
            units: XRD_UNITS,
        }
    }

    fn unit_for(&self, key: &str) -> Option<&'static str> {
        self.units
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, unit)| *unit)
    }
}

/// Recursively mirror a tree into an HDF5 group. Nested trees become child groups with
/// the same key, leaves become datasets.
pub fn write_tree(group: &Group, tree: &Tree, rules: &FlattenRules) -> Result<(), HDF5WriterError> {
    for (key, value) in tree.iter() {
        match value {
            Node::Group(child) => write_tree(&group.create_group(key)?, child, rules)?,
            Node::Text(text) => {
                if (rules.drop_key)(key) {
                    continue;
                }
                let dataset = if (rules.strip_quotes)(key) {
                    write_text(group, key, &text.replace('"', ""))?
                } else {
                    write_text(group, key, text)?
                };
                if let Some(unit) = rules.unit_for(key) {
                    write_str_attr(&dataset, UNITS_ATTR, unit)?;
                }
            }
            Node::Float(v) => {
                write_f64(group, key, *v)?;
            }
            Node::Floats(values) => {
                write_f64_array(group, key, values)?;
            }
            Node::Texts(values) => {
                write_text_array(group, key, values)?;
            }
        }
    }
    Ok(())
}

/// Thin wrapper around an HDF5 file opened in append-or-create mode.
///
/// The file stays open only for the lifetime of the writer; every compile call opens its
/// own writer once parsing is complete.
#[derive(Debug)]
pub struct HDFWriter {
    file_handle: File,
    path: PathBuf,
}

impl HDFWriter {
    /// Open (or create) the container at path
    pub fn open(path: &Path) -> Result<Self, HDF5WriterError> {
        let file_handle = File::append(path)?;
        Ok(Self {
            file_handle,
            path: path.to_path_buf(),
        })
    }

    /// Create `/entry/<technique>/scan_<x>,<y>`. An existing scan is never overwritten.
    pub fn create_scan_group(
        &self,
        technique: &str,
        index: &ScanIndex,
    ) -> Result<Group, HDF5WriterError> {
        let entry = require_group(&self.file_handle, ENTRY_NAME)?;
        let technique_group = require_group(&entry, technique)?;
        let scan_name = index.group_name();
        if technique_group.link_exists(&scan_name) {
            return Err(HDF5WriterError::ScanExists(format!(
                "/{ENTRY_NAME}/{technique}/{scan_name}"
            )));
        }
        Ok(technique_group.create_group(&scan_name)?)
    }

    /// Remove a scan group again, used when writing its contents failed part way
    pub fn discard_scan_group(
        &self,
        technique: &str,
        index: &ScanIndex,
    ) -> Result<(), HDF5WriterError> {
        let technique_group = self
            .file_handle
            .group(&format!("{ENTRY_NAME}/{technique}"))?;
        technique_group.unlink(&index.group_name())?;
        spdlog::warn!(
            "Discarded partially written /{ENTRY_NAME}/{technique}/{} in {}",
            index.group_name(),
            self.path.to_string_lossy()
        );
        Ok(())
    }

    /// Flush and release the file handle
    pub fn close(self) -> Result<(), HDF5WriterError> {
        self.file_handle.flush()?;
        spdlog::debug!("Closed {}", self.path.to_string_lossy());
        Ok(())
    }
}

fn require_group(parent: &Group, name: &str) -> Result<Group, HDF5WriterError> {
    match parent.group(name) {
        Ok(group) => Ok(group),
        Err(_) => Ok(parent.create_group(name)?),
    }
}

/// Create a child group tagged with its NeXus-like class
pub fn create_nx_group(
    parent: &Group,
    name: &str,
    nx_class: &str,
) -> Result<Group, HDF5WriterError> {
    let group = parent.create_group(name)?;
    write_str_attr(&group, NX_CLASS, nx_class)?;
    Ok(group)
}

pub fn write_f64(group: &Group, name: &str, value: f64) -> Result<Dataset, HDF5WriterError> {
    let dataset = group.new_dataset::<f64>().shape(()).create(name)?;
    dataset.write_scalar(&value)?;
    Ok(dataset)
}

pub fn write_f64_array(
    group: &Group,
    name: &str,
    values: &[f64],
) -> Result<Dataset, HDF5WriterError> {
    Ok(group
        .new_dataset_builder()
        .with_data(values)
        .create(name)?)
}

pub fn write_matrix(
    group: &Group,
    name: &str,
    values: &Array2<u32>,
) -> Result<Dataset, HDF5WriterError> {
    Ok(group
        .new_dataset_builder()
        .with_data(values)
        .create(name)?)
}

pub fn write_text(group: &Group, name: &str, value: &str) -> Result<Dataset, HDF5WriterError> {
    let dataset = group
        .new_dataset::<VarLenUnicode>()
        .shape(())
        .create(name)?;
    dataset.write_scalar(&to_var_len_unicode(value)?)?;
    Ok(dataset)
}

pub fn write_text_array(
    group: &Group,
    name: &str,
    values: &[String],
) -> Result<Dataset, HDF5WriterError> {
    let values = values
        .iter()
        .map(|v| to_var_len_unicode(v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(group
        .new_dataset_builder()
        .with_data(values.as_slice())
        .create(name)?)
}

/// Attach a string attribute (units, NX_class, ...) to a group or dataset
pub fn write_str_attr(location: &Location, name: &str, value: &str) -> Result<(), HDF5WriterError> {
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&to_var_len_unicode(value)?)?;
    Ok(())
}

/// Write a float dataset and tag it with units in one go
pub fn write_with_units(
    group: &Group,
    name: &str,
    values: &[f64],
    units: &str,
) -> Result<Dataset, HDF5WriterError> {
    let dataset = write_f64_array(group, name, values)?;
    write_str_attr(&dataset, UNITS_ATTR, units)?;
    Ok(dataset)
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode, HDF5WriterError> {
    VarLenUnicode::from_str(value)
        .map_err(|e| HDF5WriterError::BadString(value.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_text(group: &Group, name: &str) -> String {
        group
            .dataset(name)
            .unwrap()
            .read_scalar::<VarLenUnicode>()
            .unwrap()
            .to_string()
    }

    fn units_of(dataset: &Dataset) -> String {
        dataset
            .attr(UNITS_ATTR)
            .unwrap()
            .read_scalar::<VarLenUnicode>()
            .unwrap()
            .to_string()
    }

    fn sample_tree() -> Tree {
        let mut phase = Tree::new();
        phase.insert(String::from("A"), Node::from("0.4052+-0.0001"));
        phase.insert(String::from("SpacegroupNo"), Node::Float(225.0));
        phase.insert(String::from("B"), Node::Float(0.3615));
        phase.insert(String::from("UNIT"), Node::from("nm"));
        phase.insert(
            String::from("Atomic positions"),
            Node::from(vec![String::from("E=AL+3 Wyckoff=a")]),
        );
        let mut tree = Tree::new();
        tree.insert(String::from("Label"), Node::from("\"Cu Ka\""));
        tree.insert(String::from("Counts"), Node::from(vec![1.0, 2.0, 3.0]));
        tree.insert(String::from("Al"), Node::Group(phase));
        tree
    }

    #[test]
    fn test_plain_rules() {
        let dir = TempDir::new().unwrap();
        let file = File::create(dir.path().join("plain.h5")).unwrap();
        let group = file.create_group("root").unwrap();
        write_tree(&group, &sample_tree(), &FlattenRules::plain()).unwrap();

        assert_eq!(read_text(&group, "Label"), "\"Cu Ka\"");
        let al = group.group("Al").unwrap();
        assert_eq!(read_text(&al, "UNIT"), "nm");
        assert!(al.dataset("A").unwrap().attr(UNITS_ATTR).is_err());
        assert_eq!(
            group.dataset("Counts").unwrap().read_raw::<f64>().unwrap(),
            vec![1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_xrd_rules() {
        let dir = TempDir::new().unwrap();
        let file = File::create(dir.path().join("xrd.h5")).unwrap();
        let group = file.create_group("root").unwrap();
        write_tree(&group, &sample_tree(), &FlattenRules::xrd()).unwrap();

        assert_eq!(read_text(&group, "Label"), "Cu Ka");
        let al = group.group("Al").unwrap();
        assert!(!al.link_exists("UNIT"));
        assert_eq!(units_of(&al.dataset("A").unwrap()), "nm");
        assert!(al.dataset("B").unwrap().attr(UNITS_ATTR).is_err());
        assert_eq!(
            al.dataset("SpacegroupNo")
                .unwrap()
                .read_scalar::<f64>()
                .unwrap(),
            225.0
        );
        let positions = al
            .dataset("Atomic positions")
            .unwrap()
            .read_raw::<VarLenUnicode>()
            .unwrap();
        assert_eq!(positions[0].as_str(), "E=AL+3 Wyckoff=a");
    }

    #[test]
    fn test_scan_conflict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conflict.h5");
        let index = ScanIndex::new(2, 5);

        let writer = HDFWriter::open(&path).unwrap();
        let scan = writer.create_scan_group("moke", &index).unwrap();
        create_nx_group(&scan, "instrument", "HTinstrument").unwrap();
        writer.close().unwrap();

        let writer = HDFWriter::open(&path).unwrap();
        writer
            .create_scan_group("moke", &ScanIndex::new(2, 6))
            .unwrap();
        match writer.create_scan_group("moke", &index) {
            Err(HDF5WriterError::ScanExists(name)) => assert_eq!(name, "/entry/moke/scan_2,5"),
            _ => panic!(),
        }
        writer.create_scan_group("xrd", &index).unwrap();
    }

    #[test]
    fn test_failed_scan_is_discarded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("discard.h5");
        let index = ScanIndex::new(4, 4);

        let writer = HDFWriter::open(&path).unwrap();
        let scan = writer.create_scan_group("moke", &index).unwrap();
        write_f64(&scan, "x_pos", 1.0).unwrap();
        drop(scan);
        writer.discard_scan_group("moke", &index).unwrap();
        writer.close().unwrap();

        let writer = HDFWriter::open(&path).unwrap();
        let scan = writer.create_scan_group("moke", &index).unwrap();
        assert!(!scan.link_exists("x_pos"));
    }
}
