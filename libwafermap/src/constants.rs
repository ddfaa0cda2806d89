// Scan grid: 5 mm pitch starting at -40 mm, indexed from 1
pub const GRID_ORIGIN_MM: f64 = -40.0;
pub const GRID_STEP_MM: f64 = 5.0;

pub const DEFAULT_WAFER_DIAMETER_MM: f64 = 100.0;
pub const DEFAULT_EDGE_MARGIN_MM: f64 = 10.0;

/// MOKE oscilloscope sampling period in microseconds (50 ns)
pub const MOKE_TIME_STEP_US: f64 = 0.05;
/// Number of preamble lines in every MOKE data file
pub const MOKE_PREAMBLE_LINES: usize = 2;

pub const ENTRY_NAME: &str = "entry";
pub const MOKE_NAME: &str = "moke";
pub const XRD_NAME: &str = "xrd";

pub const INSTRUMENT_NAME: &str = "instrument";
pub const MEASUREMENT_NAME: &str = "measurement";
pub const RESULTS_NAME: &str = "results";
pub const IMAGE_NAME: &str = "image";

pub const NX_CLASS: &str = "NX_class";
pub const NX_INSTRUMENT: &str = "HTinstrument";
pub const NX_MEASUREMENT: &str = "HTmeasurement";
pub const NX_RESULTS: &str = "HTresults";
pub const NX_IMAGE: &str = "HTimage";

pub const UNITS_ATTR: &str = "units";
