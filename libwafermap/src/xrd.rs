use hdf5::Group;
use std::path::Path;

use super::constants::*;
use super::error::XrdError;
use super::hdf_writer::{
    create_nx_group, write_f64, write_matrix, write_str_attr, write_tree, write_with_units,
    FlattenRules, HDFWriter,
};
use super::img_file::{find_image, DetectorImage, ImageDecoder, SmvDecoder};
use super::lst_file::{refinement_path, Refinement};
use super::node::text_tree;
use super::ras_file::{scan_numbers, RasFile, X_POSITION_KEY, Y_POSITION_KEY};
use super::wafer::{ScanIndex, WaferPosition, WriteOptions, WriteOutcome};

const IMAGE_DATA_NAME: &str = "2D_Camera_Image";

/// Everything needed to write one XRD scan
#[derive(Debug, Clone, PartialEq)]
pub struct XrdScan {
    pub index: ScanIndex,
    pub position: WaferPosition,
    pub ras: RasFile,
    pub refinement: Option<Refinement>,
    pub image: Option<DetectorImage>,
}

impl XrdScan {
    /// Read a `.ras` scan along with its refinement and detector frame, when present
    pub fn read(ras_path: &Path, decoder: &dyn ImageDecoder) -> Result<Self, XrdError> {
        let index = scan_numbers(ras_path)?;
        let ras = RasFile::read(ras_path)?;
        let position = wafer_position(&ras)?;
        Self::read_rest(index, position, ras, decoder)
    }

    fn read_rest(
        index: ScanIndex,
        position: WaferPosition,
        ras: RasFile,
        decoder: &dyn ImageDecoder,
    ) -> Result<Self, XrdError> {
        let lst_path = refinement_path(&ras.path);
        let refinement = if lst_path.exists() {
            Some(Refinement::read(&lst_path)?)
        } else {
            spdlog::info!(
                "No refinement found for {}, results will be omitted",
                ras.path.to_string_lossy()
            );
            None
        };

        let image = match find_image(&ras.path).map_err(super::error::ParseError::from)? {
            Some(img_path) => Some(decoder.decode(&img_path)?),
            None => {
                spdlog::info!(
                    "No detector image found for {}",
                    ras.path.to_string_lossy()
                );
                None
            }
        };

        Ok(Self {
            index,
            position,
            ras,
            refinement,
            image,
        })
    }
}

/// Stage position recorded in the measurement header
pub fn wafer_position(ras: &RasFile) -> Result<WaferPosition, XrdError> {
    let coordinate = |key: &str| -> Result<f64, XrdError> {
        let value = ras
            .meas_value(key)
            .ok_or_else(|| XrdError::MissingPosition(ras.path.clone(), key.to_string()))?;
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| XrdError::BadPosition(ras.path.clone(), value))
    };
    Ok(WaferPosition::new(
        coordinate(X_POSITION_KEY)?,
        coordinate(Y_POSITION_KEY)?,
    ))
}

/// Parse one XRD scan and append it to the container at `hdf_path`, decoding detector
/// frames as SMV
pub fn write_xrd_to_hdf5(
    hdf_path: &Path,
    ras_path: &Path,
    options: &WriteOptions,
) -> Result<WriteOutcome, XrdError> {
    write_xrd_to_hdf5_with(hdf_path, ras_path, options, &SmvDecoder)
}

/// Same as [`write_xrd_to_hdf5`] with a caller supplied detector decoder
pub fn write_xrd_to_hdf5_with(
    hdf_path: &Path,
    ras_path: &Path,
    options: &WriteOptions,
    decoder: &dyn ImageDecoder,
) -> Result<WriteOutcome, XrdError> {
    let index = scan_numbers(ras_path)?;
    let ras = RasFile::read(ras_path)?;
    let position = wafer_position(&ras)?;
    if options.skips(position.x_mm, position.y_mm) {
        spdlog::debug!(
            "Skipping {} at ({}, {}) mm: outside the wafer",
            ras_path.to_string_lossy(),
            position.x_mm,
            position.y_mm
        );
        return Ok(WriteOutcome::SkippedEdge);
    }

    let scan = XrdScan::read_rest(index, position, ras, decoder)?;

    let writer = HDFWriter::open(hdf_path)?;
    let scan_group = writer.create_scan_group(XRD_NAME, &scan.index)?;
    if let Err(e) = write_scan(&scan_group, &scan) {
        drop(scan_group);
        writer.discard_scan_group(XRD_NAME, &scan.index)?;
        writer.close()?;
        return Err(e);
    }
    writer.close()?;

    spdlog::info!(
        "Wrote XRD scan {} from {}",
        scan.index,
        ras_path.to_string_lossy()
    );
    Ok(WriteOutcome::Written(scan.index))
}

fn write_scan(scan_group: &Group, scan: &XrdScan) -> Result<(), XrdError> {
    let rules = FlattenRules::xrd();

    // Instrument group for metadata, the header split in 4 for clarity
    let instrument = create_nx_group(scan_group, INSTRUMENT_NAME, NX_INSTRUMENT)?;
    let x_pos = write_f64(&instrument, "x_pos", scan.position.x_mm)?;
    write_str_attr(&x_pos, UNITS_ATTR, "mm")?;
    let y_pos = write_f64(&instrument, "y_pos", scan.position.y_mm)?;
    write_str_attr(&y_pos, UNITS_ATTR, "mm")?;
    let headers = [
        ("disp", &scan.ras.disp),
        ("file", &scan.ras.file),
        ("hardware", &scan.ras.hardware),
        ("meas", &scan.ras.meas),
    ];
    for (name, header) in headers {
        write_tree(&instrument.create_group(name)?, &text_tree(header), &rules)?;
    }

    if let Some(refinement) = &scan.refinement {
        let results = create_nx_group(scan_group, RESULTS_NAME, NX_RESULTS)?;
        let sections = [
            ("r_coefficients", refinement.r_coefficients_tree()),
            ("global_parameters", refinement.global_parameters_tree()),
            ("phases", refinement.phases_tree()),
        ];
        for (name, tree) in sections {
            write_tree(&results.create_group(name)?, &tree, &rules)?;
        }
    }

    let measurement = create_nx_group(scan_group, MEASUREMENT_NAME, NX_MEASUREMENT)?;
    write_with_units(&measurement, "angle", &scan.ras.angle, "degrees")?;
    write_with_units(&measurement, "counts", &scan.ras.counts, "counts")?;

    if let Some(image) = &scan.image {
        let image_group = create_nx_group(scan_group, IMAGE_NAME, NX_IMAGE)?;
        write_tree(&image_group, &text_tree(&image.header), &rules)?;
        write_matrix(&image_group, IMAGE_DATA_NAME, &image.pixels)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HDF5WriterError, ImageError, ParseError};
    use crate::hdf_reader::{get_xrd_pattern, read_group, FieldValue};
    use ndarray::Array2;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const RAS_NAME: &str = "CrNi_017_010020.ras";

    fn ras_text(x: &str, y: &str) -> String {
        format!(
            "*RAS_DATA_START
*RAS_HEADER_START
*DISP_COMMENT \"Wafer 17\"
*FILE_SAMPLE \"CrNi\"
*HW_XG_TARGET_NAME \"Cu\"
*MEAS_COND_AXIS_POSITION-6 \"{x}\"
*MEAS_COND_AXIS_POSITION-7 \"{y}\"
*MEAS_INTERNAL_FLAG \"1\"
*RAS_HEADER_END
*RAS_INT_START
20.00 125 1.0000
20.02 131 1.0000
*RAS_INT_END
*RAS_DATA_END
"
        )
    }

    const LST_TEXT: &str = "Rp=3.37% Rwp=4.66%
QAl=0.7391
Local parameters and GOALs for phase Al
SpacegroupNo=225
UNIT=NM
A=0.404954+-0.000012
GEWICHT=0.7391, MEANGEWICHT=0.7402
Atomic positions for phase Al
------
  4     0.0000  0.0000  0.0000     E=AL+3

";

    /// Stands in for a real detector library
    struct FixedDecoder;

    impl ImageDecoder for FixedDecoder {
        fn decode(&self, _path: &Path) -> Result<DetectorImage, ImageError> {
            let mut header = BTreeMap::new();
            header.insert(String::from("Detector"), String::from("\"HyPix\""));
            Ok(DetectorImage {
                header,
                pixels: Array2::from_shape_vec((2, 2), vec![1, 2, 3, 4]).unwrap(),
            })
        }
    }

    fn setup(dir: &TempDir, x: &str, y: &str) -> PathBuf {
        let ras_path = dir.path().join(RAS_NAME);
        fs::write(&ras_path, ras_text(x, y)).unwrap();
        ras_path
    }

    #[test]
    fn test_position_from_header() {
        let dir = TempDir::new().unwrap();
        let ras = RasFile::read(&setup(&dir, "12.5", "-20")).unwrap();
        assert_eq!(wafer_position(&ras).unwrap(), WaferPosition::new(12.5, -20.0));

        let mut ras = ras;
        ras.meas.remove(Y_POSITION_KEY);
        assert!(matches!(
            wafer_position(&ras),
            Err(XrdError::MissingPosition(_, _))
        ));
    }

    #[test]
    fn test_full_scan() {
        let dir = TempDir::new().unwrap();
        let ras_path = setup(&dir, "12.5", "-20");
        fs::write(refinement_path(&ras_path), LST_TEXT).unwrap();
        fs::write(dir.path().join("CrNi_017_010020_2D.img"), b"").unwrap();
        let hdf_path = dir.path().join("wafer.h5");

        let outcome =
            write_xrd_to_hdf5_with(&hdf_path, &ras_path, &WriteOptions::default(), &FixedDecoder)
                .unwrap();
        assert_eq!(outcome, WriteOutcome::Written(ScanIndex::new(10, 20)));

        let (values, units) = read_group(&hdf_path, "/entry/xrd/scan_10,20/instrument")
            .unwrap()
            .unwrap();
        assert_eq!(values["x_pos"], FieldValue::Float(12.5));
        assert_eq!(units["x_pos"], "mm");
        assert_eq!(values["disp/COMMENT"], FieldValue::Text(String::from("Wafer 17")));
        assert_eq!(
            values["meas/COND_AXIS_POSITION-7"],
            FieldValue::Text(String::from("-20"))
        );
        assert!(!values.contains_key("meas/INTERNAL_FLAG"));

        let (values, units) = read_group(&hdf_path, "/entry/xrd/scan_10,20/results")
            .unwrap()
            .unwrap();
        assert_eq!(
            values["r_coefficients/Rwp"],
            FieldValue::Text(String::from("4.66%"))
        );
        assert_eq!(values["phases/Al/SpacegroupNo"], FieldValue::Float(225.0));
        assert_eq!(units["phases/Al/A"], "nm");
        assert!(!values.contains_key("phases/Al/UNIT"));

        let (values, _) = read_group(&hdf_path, "/entry/xrd/scan_10,20/image")
            .unwrap()
            .unwrap();
        assert_eq!(values["Detector"], FieldValue::Text(String::from("HyPix")));
        match &values[IMAGE_DATA_NAME] {
            FieldValue::Matrix(m) => assert_eq!(m[[1, 0]], 3.0),
            _ => panic!(),
        }

        let pattern = get_xrd_pattern(&hdf_path, "/entry/xrd/scan_10,20")
            .unwrap()
            .unwrap();
        assert_eq!(pattern.angle, vec![20.0, 20.02]);
        assert_eq!(pattern.counts, vec![125.0, 131.0]);
        assert_eq!(pattern.angle_units, "degrees");
    }

    #[test]
    fn test_optional_sections_omitted() {
        let dir = TempDir::new().unwrap();
        let ras_path = setup(&dir, "0", "0");
        let hdf_path = dir.path().join("wafer.h5");

        let scan = XrdScan::read(&ras_path, &SmvDecoder).unwrap();
        assert_eq!(scan.index, ScanIndex::new(10, 20));
        assert!(scan.refinement.is_none() && scan.image.is_none());

        write_xrd_to_hdf5(&hdf_path, &ras_path, &WriteOptions::default()).unwrap();
        let file = hdf5::File::open(&hdf_path).unwrap();
        let scan = file.group("entry/xrd/scan_10,20").unwrap();
        assert!(scan.link_exists(MEASUREMENT_NAME));
        assert!(!scan.link_exists(RESULTS_NAME));
        assert!(!scan.link_exists(IMAGE_NAME));
    }

    #[test]
    fn test_edge_and_conflict() {
        let dir = TempDir::new().unwrap();
        let hdf_path = dir.path().join("wafer.h5");

        let ras_path = setup(&dir, "45", "0");
        let outcome = write_xrd_to_hdf5(&hdf_path, &ras_path, &WriteOptions::default()).unwrap();
        assert_eq!(outcome, WriteOutcome::SkippedEdge);
        assert!(!hdf_path.exists());

        let ras_path = setup(&dir, "5", "5");
        write_xrd_to_hdf5(&hdf_path, &ras_path, &WriteOptions::default()).unwrap();
        match write_xrd_to_hdf5(&hdf_path, &ras_path, &WriteOptions::default()) {
            Err(XrdError::HDFError(HDF5WriterError::ScanExists(_))) => (),
            _ => panic!(),
        }
    }

    #[test]
    fn test_bad_name_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let hdf_path = dir.path().join("wafer.h5");
        assert!(matches!(
            write_xrd_to_hdf5(&hdf_path, &dir.path().join("scan.ras"), &WriteOptions::default()),
            Err(XrdError::FileNameError(_))
        ));
        assert!(matches!(
            write_xrd_to_hdf5(&hdf_path, &dir.path().join(RAS_NAME), &WriteOptions::default()),
            Err(XrdError::ParseError(ParseError::MissingFile(_)))
        ));
    }
}
