use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::ParseError;
use super::node::{text_tree, Node, Tree};
use super::text_file::{read_latin1, split_key_value};

const R_FACTORS_PREFIX: &str = "Rp=";
const GLOBAL_PREFIX: &str = "Q";
const PHASE_PREFIX: &str = "Local parameters and GOALs for phase";
const WEIGHT_PREFIX: &str = "GEWICHT=";
const ATOMIC_POSITIONS_PREFIX: &str = "Atomic positions for phase";
pub const ATOMIC_POSITIONS_KEY: &str = "Atomic positions";

/// Per phase values kept from the refinement, everything else in the listing is ignored
const PHASE_ATTRIBUTES: [&str; 11] = [
    "SpacegroupNo=",
    "HermannMauguin=",
    "XrayDensity=",
    "Rphase=",
    "UNIT=",
    "A=",
    "B=",
    "C=",
    "k1=",
    "k2=",
    "B1=",
];

/// Results of a BGMN Rietveld refinement, read from its `.lst` listing.
///
/// The listing is scanned line by line; phase scoped values go to whichever phase was
/// opened last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Refinement {
    pub r_coefficients: BTreeMap<String, String>,
    pub global_parameters: BTreeMap<String, String>,
    pub phases: BTreeMap<String, Tree>,
}

impl Refinement {
    pub fn read(path: &Path) -> Result<Self, ParseError> {
        let contents = read_latin1(path)?;
        let mut refinement = Self::default();
        let mut current_phase: Option<String> = None;
        let mut lines = contents.lines().enumerate();

        while let Some((index, raw_line)) = lines.next() {
            let line = raw_line.trim_end();
            if line.starts_with(R_FACTORS_PREFIX) {
                for token in line.split_whitespace() {
                    let (key, value) = split_key_value(path, index, token)?;
                    refinement
                        .r_coefficients
                        .insert(key.to_string(), value.to_string());
                }
            } else if line.starts_with(GLOBAL_PREFIX) {
                let (key, value) = split_key_value(path, index, line.trim())?;
                refinement
                    .global_parameters
                    .insert(key.to_string(), value.to_string());
            } else if line.starts_with(PHASE_PREFIX) {
                let name = line.split_whitespace().last().unwrap_or_default().to_string();
                refinement.phases.insert(name.clone(), Tree::new());
                current_phase = Some(name);
            } else if PHASE_ATTRIBUTES.iter().any(|attr| line.starts_with(attr)) {
                let Some(phase) = refinement.phase_mut(&current_phase, path, index) else {
                    continue;
                };
                let (key, value) = split_key_value(path, index, line.trim())?;
                phase.insert(key.to_string(), Node::coerce(value));
            } else if line.starts_with(WEIGHT_PREFIX) {
                let Some(phase) = refinement.phase_mut(&current_phase, path, index) else {
                    continue;
                };
                let mut parts = line.trim().split(", ");
                if let Some(part) = parts.next() {
                    let (key, value) = split_key_value(path, index, part)?;
                    phase.insert(key.to_string(), Node::from(value));
                }
                // The mean weight fraction is only there when it was computed
                if let Some(part) = parts.next() {
                    let (key, value) = split_key_value(path, index, part)?;
                    let mean = value.trim().parse::<f64>().map_err(|e| {
                        ParseError::bad_line(path, index, format!("{value:?}: {e}"))
                    })?;
                    phase.insert(key.to_string(), Node::Float(mean));
                }
            } else if line.starts_with(ATOMIC_POSITIONS_PREFIX) {
                // Column header
                lines.next();
                let mut positions = Vec::new();
                for (_, position_line) in lines.by_ref() {
                    let position_line = position_line.trim();
                    if position_line.is_empty() {
                        break;
                    }
                    positions.push(position_line.to_string());
                }
                if let Some(phase) = refinement.phase_mut(&current_phase, path, index) {
                    phase.insert(ATOMIC_POSITIONS_KEY.to_string(), Node::Texts(positions));
                }
            }
        }
        Ok(refinement)
    }

    fn phase_mut(
        &mut self,
        current_phase: &Option<String>,
        path: &Path,
        index: usize,
    ) -> Option<&mut Tree> {
        let phase = current_phase
            .as_ref()
            .and_then(|name| self.phases.get_mut(name));
        if phase.is_none() {
            spdlog::warn!(
                "{} line {}: phase value found before any phase was opened, skipping",
                path.to_string_lossy(),
                index + 1
            );
        }
        phase
    }

    pub fn r_coefficients_tree(&self) -> Tree {
        text_tree(&self.r_coefficients)
    }

    pub fn global_parameters_tree(&self) -> Tree {
        text_tree(&self.global_parameters)
    }

    pub fn phases_tree(&self) -> Tree {
        self.phases
            .iter()
            .map(|(name, fields)| (name.clone(), Node::Group(fields.clone())))
            .collect()
    }
}

/// The refinement listing which belongs to a `.ras` file
pub fn refinement_path(ras_path: &Path) -> PathBuf {
    ras_path.with_extension("lst")
}
