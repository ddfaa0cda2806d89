use super::constants::{MOKE_NAME, XRD_NAME};

#[derive(Debug, Clone, Default)]
pub enum BarColor {
    #[default]
    CYAN,
    MAGENTA,
    RED,
    GREEN,
}

impl BarColor {
    /// Progress color used for a technique
    pub fn for_technique(technique: &str) -> Self {
        match technique {
            MOKE_NAME => Self::CYAN,
            XRD_NAME => Self::MAGENTA,
            _ => Self::GREEN,
        }
    }
}

/// Progress report sent from the batch worker after each scan file
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub technique: String,
    pub file_name: String,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(progress: f32, technique: &str, file_name: &str, color: BarColor) -> Self {
        Self {
            progress,
            technique: technique.to_string(),
            file_name: file_name.to_string(),
            color,
        }
    }
}
