use ndarray::{Array2, Axis};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::constants::*;
use super::error::{FileNameError, MokeError, ParseError};
use super::hdf_writer::{
    create_nx_group, write_f64, write_str_attr, write_tree, write_with_units, FlattenRules,
    HDFWriter,
};
use super::node::text_tree;
use super::text_file::{parse_float_row, read_latin1, round2, split_key_value};
use super::wafer::{WaferPosition, WriteOptions, WriteOutcome};

const INFO_FILE_NAME: &str = "info.txt";
const RESULTS_FILE_SUFFIX: &str = "MOKE.dat";
const MAGNETIZATION_TAG: &str = "magnetization";

/// Coercivity and reflectivity for one position, taken from the shared results file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MokeResults {
    pub coercivity: f64,
    pub reflectivity: f64,
}

/// Raw oscilloscope traces for one scan.
///
/// Each matrix is time steps x acquisitions. The loop is the processed hysteresis as
/// (applied field, magnetization) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct MokeData {
    pub magnetization: Array2<f64>,
    pub pulse: Array2<f64>,
    pub sum: Array2<f64>,
    pub loop_field: Vec<f64>,
    pub loop_magnetization: Vec<f64>,
}

impl MokeData {
    pub fn n_acquisitions(&self) -> usize {
        self.magnetization.ncols()
    }

    pub fn n_samples(&self) -> usize {
        self.magnetization.nrows()
    }
}

/// Averages over acquisitions, one value per time step
#[derive(Debug, Clone, PartialEq)]
pub struct MokeAverages {
    pub magnetization: Vec<f64>,
    pub pulse: Vec<f64>,
    pub sum: Vec<f64>,
}

/// Everything needed to write one MOKE scan
#[derive(Debug, Clone, PartialEq)]
pub struct MokeScan {
    pub position: WaferPosition,
    pub header: BTreeMap<String, String>,
    pub data: MokeData,
    pub time: Vec<f64>,
    pub results: Option<MokeResults>,
}

impl MokeScan {
    /// Read the magnetization file, its siblings and the per directory files
    pub fn read(mag_path: &Path) -> Result<Self, MokeError> {
        let position = wafer_position(mag_path)?;
        Self::read_at(mag_path, position)
    }

    fn read_at(mag_path: &Path, position: WaferPosition) -> Result<Self, MokeError> {
        let parent = parent_dir(mag_path);
        let header = read_header(&parent)?;
        let data = read_data(mag_path)?;
        let time = time_axis(data.n_samples());
        let results = read_results(&parent, position.x_mm, position.y_mm)?;
        Ok(Self {
            position,
            header,
            data,
            time,
            results,
        })
    }
}

/// Directory holding a scan file; a bare file name lives in the working directory
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Stage position encoded in a name like `p12_x-35_y10_magnetization.txt`
pub fn wafer_position(path: &Path) -> Result<WaferPosition, FileNameError> {
    let bad_name = || FileNameError::BadMokeName(path.to_path_buf());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(bad_name)?;
    let tokens: Vec<&str> = name.split('_').collect();
    if tokens.len() < 3 {
        return Err(bad_name());
    }
    let x_mm = tokens[1]
        .trim_matches(|c| c == 'x' || c == 'X')
        .parse::<f64>()
        .map_err(|_| bad_name())?;
    let y_mm = tokens[2]
        .trim_matches(|c| c == 'y' || c == 'Y')
        .parse::<f64>()
        .map_err(|_| bad_name())?;
    Ok(WaferPosition::new(x_mm, y_mm))
}

/// Parse `info.txt` from a scan directory.
///
/// The first two lines hold the sample name and date behind a `#`, everything after is
/// `key=value`.
pub fn read_header(dir: &Path) -> Result<BTreeMap<String, String>, ParseError> {
    let path = dir.join(INFO_FILE_NAME);
    let contents = read_latin1(&path)?;
    let mut header = BTreeMap::new();
    let mut lines = contents.lines().enumerate();

    let mut comment_line = |key: &str| {
        let value = match lines.next() {
            Some((_, line)) => line.trim().replace('#', ""),
            None => String::new(),
        };
        header.insert(key.to_string(), value);
    };
    comment_line("Sample name");
    comment_line("Date");

    for (index, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = split_key_value(&path, index, line)?;
        header.insert(key.to_string(), value.to_string());
    }
    Ok(header)
}

/// Sibling file of the magnetization trace, e.g. `..._pulse.txt`
pub fn sibling_path(mag_path: &Path, kind: &str) -> PathBuf {
    let name = mag_path
        .file_name()
        .map(|n| n.to_string_lossy().replace(MAGNETIZATION_TAG, kind))
        .unwrap_or_default();
    mag_path.with_file_name(name)
}

/// Rows after the preamble, each parsed into floats. Every row must be as wide as the
/// first one.
fn read_table(path: &Path) -> Result<Array2<f64>, ParseError> {
    let contents = read_latin1(path)?;
    let mut n_columns = 0;
    let mut flat = Vec::new();
    let mut n_rows = 0;
    for (index, line) in contents.lines().enumerate().skip(MOKE_PREAMBLE_LINES) {
        if line.trim().is_empty() {
            continue;
        }
        let row = parse_float_row(path, index, line)?;
        if n_rows == 0 {
            n_columns = row.len();
        } else if row.len() != n_columns {
            return Err(ParseError::bad_line(
                path,
                index,
                format!("expected {n_columns} columns, found {}", row.len()),
            ));
        }
        flat.extend(row);
        n_rows += 1;
    }
    if n_rows == 0 {
        return Err(ParseError::Empty(path.to_path_buf()));
    }
    Array2::from_shape_vec((n_rows, n_columns), flat)
        .map_err(|e| ParseError::bad_line(path, MOKE_PREAMBLE_LINES, e.to_string()))
}

fn check_shape(path: &Path, table: &Array2<f64>, expected: &Array2<f64>) -> Result<(), ParseError> {
    if table.dim() != expected.dim() {
        return Err(ParseError::ShapeMismatch(
            path.to_path_buf(),
            table.nrows(),
            table.ncols(),
            expected.nrows(),
            expected.ncols(),
        ));
    }
    Ok(())
}

/// Read the magnetization, pulse, sum and loop files of one scan
pub fn read_data(mag_path: &Path) -> Result<MokeData, ParseError> {
    let pulse_path = sibling_path(mag_path, "pulse");
    let sum_path = sibling_path(mag_path, "sum");
    let loop_path = sibling_path(mag_path, "loop");

    let magnetization = read_table(mag_path)?;
    let pulse = read_table(&pulse_path)?;
    check_shape(&pulse_path, &pulse, &magnetization)?;
    let sum = read_table(&sum_path)?;
    check_shape(&sum_path, &sum, &magnetization)?;

    let loop_table = read_table(&loop_path)?;
    if loop_table.ncols() != 2 {
        return Err(ParseError::bad_line(
            &loop_path,
            MOKE_PREAMBLE_LINES,
            format!("expected field and magnetization columns, found {}", loop_table.ncols()),
        ));
    }

    Ok(MokeData {
        magnetization,
        pulse,
        sum,
        loop_field: loop_table.column(0).to_vec(),
        loop_magnetization: loop_table.column(1).to_vec(),
    })
}

/// Sample times in microseconds
pub fn time_axis(n_samples: usize) -> Vec<f64> {
    (0..n_samples).map(|j| j as f64 * MOKE_TIME_STEP_US).collect()
}

/// Look up the results for a position in the directory's `*MOKE.dat`, if there is one
pub fn read_results(dir: &Path, x_mm: f64, y_mm: f64) -> Result<Option<MokeResults>, ParseError> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    for item in dir.read_dir()? {
        let item_path = item?.path();
        if item_path.to_string_lossy().ends_with(RESULTS_FILE_SUFFIX) {
            candidates.push(item_path);
        }
    }
    candidates.sort();
    let Some(path) = candidates.into_iter().next() else {
        spdlog::debug!("No results file in {}", dir.to_string_lossy());
        return Ok(None);
    };

    let contents = read_latin1(&path)?;
    for (index, line) in contents.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let row = parse_float_row(&path, index, line)?;
        if row.len() != 4 {
            return Err(ParseError::bad_line(
                &path,
                index,
                format!("expected x y coercivity reflectivity, found {} values", row.len()),
            ));
        }
        if row[0] == x_mm && row[1] == y_mm {
            return Ok(Some(MokeResults {
                coercivity: round2(row[2]),
                reflectivity: round2(row[3]),
            }));
        }
    }
    spdlog::debug!(
        "No results for ({x_mm}, {y_mm}) in {}",
        path.to_string_lossy()
    );
    Ok(None)
}

/// Mean over acquisitions for each time step
pub fn averages(data: &MokeData) -> MokeAverages {
    let mean = |table: &Array2<f64>| match table.mean_axis(Axis(1)) {
        Some(avg) => avg.to_vec(),
        None => Vec::new(),
    };
    MokeAverages {
        magnetization: mean(&data.magnetization),
        pulse: mean(&data.pulse),
        sum: mean(&data.sum),
    }
}

/// Parse one MOKE scan and append it to the container at `hdf_path`.
///
/// Positions outside the usable wafer area are skipped before anything is read or
/// opened when `options.exclude_wafer_edges` is set.
pub fn write_moke_to_hdf5(
    hdf_path: &Path,
    mag_path: &Path,
    options: &WriteOptions,
) -> Result<WriteOutcome, MokeError> {
    let position = wafer_position(mag_path)?;
    if options.skips(position.x_mm, position.y_mm) {
        spdlog::debug!(
            "Skipping {} at ({}, {}) mm: outside the wafer",
            mag_path.to_string_lossy(),
            position.x_mm,
            position.y_mm
        );
        return Ok(WriteOutcome::SkippedEdge);
    }

    let scan = MokeScan::read_at(mag_path, position)?;
    let index = position.scan_index();

    let writer = HDFWriter::open(hdf_path)?;
    let scan_group = writer.create_scan_group(MOKE_NAME, &index)?;
    if let Err(e) = write_scan(&scan_group, &scan) {
        drop(scan_group);
        writer.discard_scan_group(MOKE_NAME, &index)?;
        writer.close()?;
        return Err(e);
    }
    writer.close()?;

    spdlog::info!("Wrote MOKE scan {index} from {}", mag_path.to_string_lossy());
    Ok(WriteOutcome::Written(index))
}

fn write_scan(scan_group: &hdf5::Group, scan: &MokeScan) -> Result<(), MokeError> {
    // Instrument group for metadata
    let instrument = create_nx_group(scan_group, INSTRUMENT_NAME, NX_INSTRUMENT)?;
    let x_pos = write_f64(&instrument, "x_pos", scan.position.x_mm)?;
    write_str_attr(&x_pos, UNITS_ATTR, "mm")?;
    let y_pos = write_f64(&instrument, "y_pos", scan.position.y_mm)?;
    write_str_attr(&y_pos, UNITS_ATTR, "mm")?;
    write_tree(&instrument, &text_tree(&scan.header), &FlattenRules::plain())?;

    let measurement = create_nx_group(scan_group, MEASUREMENT_NAME, NX_MEASUREMENT)?;
    let data = &scan.data;
    // Usually 4 acquisitions per scan
    if data.n_acquisitions() > 1 {
        for i in 0..data.n_acquisitions() {
            let scan_number = format!("{}", i + 1);
            let group = measurement.create_group(&format!("measurement_{scan_number}"))?;
            let traces = [
                ("magnetization", &data.magnetization),
                ("pulse", &data.pulse),
                ("reflectivity", &data.sum),
            ];
            for (name, table) in traces {
                let dset = write_with_units(&group, name, &table.column(i).to_vec(), "V")?;
                write_str_attr(&dset, "scan_number", &scan_number)?;
            }
            write_with_units(&group, "time", &scan.time, "μs")?;
        }
    }

    let avg = averages(data);
    let group = measurement.create_group("measurement_avg")?;
    write_with_units(&group, "magnetization", &avg.magnetization, "V")?;
    write_with_units(&group, "pulse", &avg.pulse, "V")?;
    write_with_units(&group, "sum", &avg.sum, "V")?;
    write_with_units(&group, "time", &scan.time, "μs")?;

    let results = create_nx_group(scan_group, RESULTS_NAME, NX_RESULTS)?;
    if let Some(found) = scan.results {
        let coercivity = write_f64(&results, "coercivity", found.coercivity)?;
        write_str_attr(&coercivity, UNITS_ATTR, "T")?;
        let reflectivity = write_f64(&results, "reflectivity", found.reflectivity)?;
        write_str_attr(&reflectivity, UNITS_ATTR, "V")?;
    }
    write_with_units(&results, "applied field", &data.loop_field, "T")?;
    write_with_units(&results, "magnetization", &data.loop_magnetization, "V")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HDF5WriterError;
    use crate::hdf_reader::{read_group, FieldValue};
    use crate::wafer::ScanIndex;
    use std::fs;
    use tempfile::TempDir;

    const MAG_NAME: &str = "p1_x-5_y10_magnetization.txt";

    fn write_scan_files(dir: &Path, name: &str, mag_rows: &str) -> PathBuf {
        let mag_path = dir.join(name);
        let preamble = "Oscilloscope trace\nCH1 CH2\n";
        fs::write(&mag_path, format!("{preamble}{mag_rows}")).unwrap();
        fs::write(
            sibling_path(&mag_path, "pulse"),
            format!("{preamble}0.5 1.5\n1.0 3.0\n"),
        )
        .unwrap();
        fs::write(
            sibling_path(&mag_path, "sum"),
            format!("{preamble}2.0 2.0\n4.0 6.0\n"),
        )
        .unwrap();
        fs::write(
            sibling_path(&mag_path, "loop"),
            format!("{preamble}-0.1 -1.0\n0.0 0.0\n0.1 1.0\n"),
        )
        .unwrap();
        mag_path
    }

    fn write_info(dir: &Path) {
        fs::write(
            dir.join(INFO_FILE_NAME),
            "#CrNi_017\n#2024-03-01\nLaser=633nm\nField max=1.2\n",
        )
        .unwrap();
    }

    fn write_results(dir: &Path) {
        fs::write(
            dir.join("CrNi_017_MOKE.dat"),
            "x y coercivity reflectivity\n-10 10 0.1 1.0\n-5 10 0.12345 2.3456\n",
        )
        .unwrap();
    }

    #[test]
    fn test_wafer_position() {
        let position = wafer_position(Path::new("/data/p12_x-35_y10_magnetization.txt")).unwrap();
        assert_eq!(position, WaferPosition::new(-35.0, 10.0));
        let position = wafer_position(Path::new("p3_X2.5x_Y-7.5y_magnetization.txt")).unwrap();
        assert_eq!(position, WaferPosition::new(2.5, -7.5));
        assert!(wafer_position(Path::new("magnetization.txt")).is_err());
        assert!(wafer_position(Path::new("p1_xa_y3_magnetization.txt")).is_err());
    }

    #[test]
    fn test_header() {
        let dir = TempDir::new().unwrap();
        write_info(dir.path());
        let header = read_header(dir.path()).unwrap();
        assert_eq!(header["Sample name"], "CrNi_017");
        assert_eq!(header["Date"], "2024-03-01");
        assert_eq!(header["Laser"], "633nm");
        assert_eq!(header["Field max"], "1.2");

        fs::write(dir.path().join(INFO_FILE_NAME), "#a\n#b\nbroken line\n").unwrap();
        match read_header(dir.path()) {
            Err(ParseError::BadLine { line, .. }) => assert_eq!(line, 3),
            _ => panic!(),
        }

        // An empty key could never become a dataset
        fs::write(dir.path().join(INFO_FILE_NAME), "#a\n#b\nLaser=633nm\n=foo\n").unwrap();
        match read_header(dir.path()) {
            Err(ParseError::BadLine { line, .. }) => assert_eq!(line, 4),
            _ => panic!(),
        }
    }

    #[test]
    fn test_data_and_averages() {
        let dir = TempDir::new().unwrap();
        let mag_path = write_scan_files(dir.path(), MAG_NAME, "1.0 2.0\n3.0 4.0\n");
        let data = read_data(&mag_path).unwrap();
        assert_eq!(data.n_acquisitions(), 2);
        assert_eq!(data.n_samples(), 2);
        assert_eq!(data.loop_field, vec![-0.1, 0.0, 0.1]);

        let avg = averages(&data);
        assert_eq!(avg.magnetization, vec![1.5, 3.5]);
        assert_eq!(avg.pulse, vec![1.0, 2.0]);
        assert_eq!(avg.sum, vec![2.0, 5.0]);
        assert_eq!(time_axis(3), vec![0.0, 0.05, 0.1]);
    }

    #[test]
    fn test_shape_mismatch() {
        let dir = TempDir::new().unwrap();
        let mag_path = write_scan_files(dir.path(), MAG_NAME, "1.0 2.0\n3.0 4.0\n5.0 6.0\n");
        match read_data(&mag_path) {
            Err(ParseError::ShapeMismatch(path, rows, _, expected, _)) => {
                assert!(path.to_string_lossy().contains("pulse"));
                assert_eq!(rows, 2);
                assert_eq!(expected, 3);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_missing_sibling() {
        let dir = TempDir::new().unwrap();
        let mag_path = write_scan_files(dir.path(), MAG_NAME, "1.0 2.0\n3.0 4.0\n");
        fs::remove_file(sibling_path(&mag_path, "loop")).unwrap();
        match read_data(&mag_path) {
            Err(ParseError::MissingFile(path)) => {
                assert!(path.to_string_lossy().ends_with("_loop.txt"))
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_bare_file_name_uses_working_directory() {
        let mag_path = Path::new(MAG_NAME);
        assert_eq!(parent_dir(mag_path), PathBuf::from("."));
        assert_eq!(
            parent_dir(Path::new("/data/wafer/p1_x0_y0_magnetization.txt")),
            PathBuf::from("/data/wafer")
        );
        // The working directory has no results table, which is a miss rather than an error
        assert!(read_results(&parent_dir(mag_path), -5.0, 10.0).is_ok());
    }

    #[test]
    fn test_results_lookup() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_results(dir.path(), -5.0, 10.0).unwrap(), None);
        write_results(dir.path());
        let found = read_results(dir.path(), -5.0, 10.0).unwrap().unwrap();
        assert_eq!(found.coercivity, 0.12);
        assert_eq!(found.reflectivity, 2.35);
        assert_eq!(read_results(dir.path(), 0.0, 0.0).unwrap(), None);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        write_info(dir.path());
        write_results(dir.path());
        let mag_path = write_scan_files(dir.path(), MAG_NAME, "1.0 2.0\n3.0 4.0\n");
        let hdf_path = dir.path().join("wafer.h5");

        let outcome = write_moke_to_hdf5(&hdf_path, &mag_path, &WriteOptions::default()).unwrap();
        assert_eq!(outcome, WriteOutcome::Written(ScanIndex::new(8, 11)));

        let (values, units) = read_group(&hdf_path, "/entry/moke/scan_8,11/results")
            .unwrap()
            .unwrap();
        assert_eq!(values["coercivity"], FieldValue::Float(0.12));
        assert_eq!(units["coercivity"], "T");
        assert_eq!(values["applied field"], FieldValue::Floats(vec![-0.1, 0.0, 0.1]));

        let (values, units) = read_group(&hdf_path, "/entry/moke/scan_8,11/measurement")
            .unwrap()
            .unwrap();
        assert_eq!(
            values["measurement_avg/magnetization"],
            FieldValue::Floats(vec![1.5, 3.5])
        );
        assert_eq!(
            values["measurement_2/magnetization"],
            FieldValue::Floats(vec![2.0, 4.0])
        );
        assert_eq!(units["measurement_1/time"], "μs");

        let (values, units) = read_group(&hdf_path, "/entry/moke/scan_8,11/instrument")
            .unwrap()
            .unwrap();
        assert_eq!(values["x_pos"], FieldValue::Float(-5.0));
        assert_eq!(units["y_pos"], "mm");
        assert_eq!(values["Sample name"], FieldValue::Text(String::from("CrNi_017")));
    }

    #[test]
    fn test_single_acquisition_has_only_average() {
        let dir = TempDir::new().unwrap();
        write_info(dir.path());
        let mag_path = dir.path().join(MAG_NAME);
        let preamble = "a\nb\n";
        fs::write(&mag_path, format!("{preamble}1.0\n2.0\n")).unwrap();
        fs::write(sibling_path(&mag_path, "pulse"), format!("{preamble}1.0\n2.0\n")).unwrap();
        fs::write(sibling_path(&mag_path, "sum"), format!("{preamble}1.0\n2.0\n")).unwrap();
        fs::write(sibling_path(&mag_path, "loop"), format!("{preamble}0.0 1.0\n")).unwrap();
        let hdf_path = dir.path().join("wafer.h5");

        write_moke_to_hdf5(&hdf_path, &mag_path, &WriteOptions::default()).unwrap();
        let (values, _) = read_group(&hdf_path, "/entry/moke/scan_8,11/measurement")
            .unwrap()
            .unwrap();
        assert!(values.keys().all(|k| k.starts_with("measurement_avg/")));
        let (values, _) = read_group(&hdf_path, "/entry/moke/scan_8,11/results")
            .unwrap()
            .unwrap();
        assert!(!values.contains_key("coercivity"));
    }

    #[test]
    fn test_duplicate_scan_conflicts() {
        let dir = TempDir::new().unwrap();
        write_info(dir.path());
        let mag_path = write_scan_files(dir.path(), MAG_NAME, "1.0 2.0\n3.0 4.0\n");
        let hdf_path = dir.path().join("wafer.h5");
        let options = WriteOptions::default();

        write_moke_to_hdf5(&hdf_path, &mag_path, &options).unwrap();
        match write_moke_to_hdf5(&hdf_path, &mag_path, &options) {
            Err(MokeError::HDFError(HDF5WriterError::ScanExists(_))) => (),
            _ => panic!(),
        }
    }

    #[test]
    fn test_edge_positions_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mag_path = dir.path().join("p9_x-40_y-40_magnetization.txt");
        let hdf_path = dir.path().join("wafer.h5");

        // No files exist, so the skip has to happen before anything is read
        let outcome = write_moke_to_hdf5(&hdf_path, &mag_path, &WriteOptions::default()).unwrap();
        assert_eq!(outcome, WriteOutcome::SkippedEdge);
        assert!(!hdf_path.exists());

        let options = WriteOptions {
            exclude_wafer_edges: false,
            ..Default::default()
        };
        match write_moke_to_hdf5(&hdf_path, &mag_path, &options) {
            Err(MokeError::ParseError(ParseError::MissingFile(_))) => (),
            _ => panic!(),
        }
        assert!(!hdf_path.exists());
    }
}
