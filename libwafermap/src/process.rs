use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::config::Config;
use super::constants::{MOKE_NAME, XRD_NAME};
use super::error::ProcessorError;
use super::moke::write_moke_to_hdf5;
use super::wafer::{WriteOptions, WriteOutcome};
use super::worker_status::{BarColor, WorkerStatus};
use super::xrd::write_xrd_to_hdf5;

/// Tally of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ProcessSummary {
    /// Count one result, returning false for a failed scan
    fn record<E: std::fmt::Display>(
        &mut self,
        path: &Path,
        result: Result<WriteOutcome, E>,
    ) -> bool {
        match result {
            Ok(WriteOutcome::Written(_)) => self.written += 1,
            Ok(WriteOutcome::SkippedEdge) => self.skipped += 1,
            Err(e) => {
                spdlog::error!("Failed to compile {}: {e}", path.to_string_lossy());
                self.failed += 1;
                return false;
            }
        }
        true
    }
}

/// Compile every file of one technique, reporting progress after each file
fn process_technique<E: std::fmt::Display>(
    technique: &str,
    files: &[PathBuf],
    tx: &Sender<WorkerStatus>,
    summary: &mut ProcessSummary,
    mut compile: impl FnMut(&Path) -> Result<WriteOutcome, E>,
) -> Result<(), ProcessorError> {
    if files.is_empty() {
        return Ok(());
    }
    spdlog::info!("Compiling {} {technique} files...", files.len());
    let color = BarColor::for_technique(technique);
    tx.send(WorkerStatus::new(0.0, technique, "", color.clone()))?;
    for (idx, path) in files.iter().enumerate() {
        let compiled = summary.record(path, compile(path));
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        tx.send(WorkerStatus::new(
            (idx + 1) as f32 / files.len() as f32,
            technique,
            &file_name,
            if compiled {
                color.clone()
            } else {
                BarColor::RED
            },
        ))?;
    }
    spdlog::info!("Done with {technique} files.");
    Ok(())
}

/// The main loop of the wafer map compiler.
///
/// Takes a config (and progress channel) and appends every MOKE scan, then every XRD
/// scan, to the configured container. A scan that fails is logged and counted; the batch
/// carries on with the next file.
pub fn process(config: Config, tx: Sender<WorkerStatus>) -> Result<ProcessSummary, ProcessorError> {
    let options: WriteOptions = config.write_options();
    let hdf_path = config.hdf_path.as_path();
    let mut summary = ProcessSummary::default();

    let moke_files = config.moke_files()?;
    process_technique(MOKE_NAME, &moke_files, &tx, &mut summary, |path| {
        write_moke_to_hdf5(hdf_path, path, &options)
    })?;

    let xrd_files = config.xrd_files()?;
    process_technique(XRD_NAME, &xrd_files, &tx, &mut summary, |path| {
        write_xrd_to_hdf5(hdf_path, path, &options)
    })?;

    spdlog::info!(
        "Wrote {} scans, skipped {} edge positions, {} failed",
        summary.written,
        summary.skipped,
        summary.failed
    );
    if hdf_path.exists() {
        let size = std::fs::metadata(hdf_path)?.len();
        spdlog::info!(
            "Container {} is now {}",
            hdf_path.to_string_lossy(),
            human_bytes::human_bytes(size as f64)
        );
    }
    Ok(summary)
}
