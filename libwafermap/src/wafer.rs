use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::constants::{
    DEFAULT_EDGE_MARGIN_MM, DEFAULT_WAFER_DIAMETER_MM, GRID_ORIGIN_MM, GRID_STEP_MM,
};

/// Discrete position of a scan on the wafer map, 1-based in both directions.
///
/// MOKE derives it from the stage position in millimeters, XRD reads it straight out of
/// the file name. Either way it names the scan group as `scan_<x>,<y>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanIndex {
    pub x: i32,
    pub y: i32,
}

impl ScanIndex {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn group_name(&self) -> String {
        format!("scan_{self}")
    }
}

impl Display for ScanIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Stage position in millimeters, measured from the wafer center
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaferPosition {
    pub x_mm: f64,
    pub y_mm: f64,
}

impl WaferPosition {
    pub fn new(x_mm: f64, y_mm: f64) -> Self {
        Self { x_mm, y_mm }
    }

    pub fn scan_index(&self) -> ScanIndex {
        scan_index(self.x_mm, self.y_mm)
    }

    pub fn radius(&self) -> f64 {
        self.x_mm.hypot(self.y_mm)
    }
}

/// Convert a stage position into its grid index. No bounds are checked here; positions
/// off the grid still get an index and are filtered by [`WaferEdgeRule`].
pub fn scan_index(x_mm: f64, y_mm: f64) -> ScanIndex {
    ScanIndex::new(grid_coordinate(x_mm), grid_coordinate(y_mm))
}

fn grid_coordinate(value_mm: f64) -> i32 {
    ((value_mm - GRID_ORIGIN_MM) / GRID_STEP_MM).floor() as i32 + 1
}

/// Decides which positions are off the wafer or too close to its edge to be kept.
///
/// The wafer is a disc centered on the stage origin. Anything further from the center
/// than `diameter / 2 - margin` is outside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaferEdgeRule {
    pub diameter_mm: f64,
    pub margin_mm: f64,
}

impl Default for WaferEdgeRule {
    fn default() -> Self {
        Self {
            diameter_mm: DEFAULT_WAFER_DIAMETER_MM,
            margin_mm: DEFAULT_EDGE_MARGIN_MM,
        }
    }
}

impl WaferEdgeRule {
    pub fn new(diameter_mm: f64, margin_mm: f64) -> Self {
        Self {
            diameter_mm,
            margin_mm,
        }
    }

    pub fn usable_radius(&self) -> f64 {
        self.diameter_mm / 2.0 - self.margin_mm
    }

    pub fn is_outside(&self, x_mm: f64, y_mm: f64) -> bool {
        WaferPosition::new(x_mm, y_mm).radius() > self.usable_radius()
    }
}

/// Edge test with the default wafer geometry
pub fn is_outside_wafer(x_mm: f64, y_mm: f64) -> bool {
    WaferEdgeRule::default().is_outside(x_mm, y_mm)
}

/// Per-write switches shared by the MOKE and XRD compilers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteOptions {
    pub exclude_wafer_edges: bool,
    pub edge_rule: WaferEdgeRule,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            exclude_wafer_edges: true,
            edge_rule: WaferEdgeRule::default(),
        }
    }
}

impl WriteOptions {
    /// True when the position should not be written at all
    pub fn skips(&self, x_mm: f64, y_mm: f64) -> bool {
        self.exclude_wafer_edges && self.edge_rule.is_outside(x_mm, y_mm)
    }
}

/// What a compile call did with its scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(ScanIndex),
    SkippedEdge,
}
