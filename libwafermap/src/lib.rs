//! # wafermap
//!
//! wafermap compiles the output of high-throughput thin film characterization into a
//! single wafer map, written in Rust. It takes the files produced by a MOKE
//! (magneto-optical Kerr effect) scanner and by a Rigaku XRD diffractometer, one file set
//! per position on the wafer, and writes them into one HDF5 container laid out on the
//! stage's 5 mm scan grid.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### HDF5
//!
//! Before building and running wafermap, HDF5 must be installed. Typically this will be
//! installed using a package manager (homebrew, apt, etc), and the Rust libraries will
//! auto detect the location of the HDF install. If HDF5 lives in a custom location, write
//! the following snippet into the file `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./wafermap_cli` from the top
//! level repository.
//!
//! ## Inputs
//!
//! ### MOKE
//!
//! Each position is a set of files named `p<N>_x<x>_y<y>_<kind>.txt` where `kind` is one
//! of `magnetization`, `pulse`, `sum` and `loop`. The first three hold one column per
//! acquisition, sampled every 50 ns; `loop` holds the processed hysteresis as applied
//! field and magnetization. Every data file starts with a 2 line preamble. The directory
//! also holds an `info.txt` header (sample name and date behind `#`, then `key=value`
//! lines) and optionally a `*MOKE.dat` table of `x y coercivity reflectivity` rows.
//!
//! ### XRD
//!
//! Each position is a Rigaku `.ras` file whose name ends with the scan number as 6 digits
//! (`SAMPLE_010020.ras` is grid position (10, 20)). The stage position is read from the
//! `*MEAS_COND_AXIS_POSITION-6/7` header keys. Optionally a BGMN refinement listing with
//! the same stem (`SAMPLE_010020.lst`) and a detector frame whose name contains the stem
//! and ends in `.img` (SMV format) sit next to it.
//!
//! ## Configuration
//!
//! The CLI reads a YAML configuration:
//!
//! ```yml
//! hdf_path: wafer.h5
//! moke_path: null
//! xrd_path: null
//! exclude_wafer_edges: true
//! wafer_diameter_mm: 100.0
//! edge_margin_mm: 10.0
//! ```
//!
//! A directory set to `null` is not compiled. With `exclude_wafer_edges` set, positions
//! further than `wafer_diameter_mm / 2 - edge_margin_mm` from the center are skipped.
//!
//! ## Output
//!
//! wafermap outputs two files: the HDF5 container and a log file. Scans are appended to
//! an existing container; writing a grid position that is already present is an error
//! and never overwrites data.
//!
//! ### HDF5 Data Format
//!
//! ```text
//! wafer.h5
//! entry
//! |---- moke
//! |    |---- scan_#,#
//! |    |    |---- instrument(HTinstrument) - x_pos, y_pos, info.txt header
//! |    |    |---- measurement(HTmeasurement)
//! |    |    |    |---- measurement_#     - magnetization, pulse, reflectivity, time
//! |    |    |    |---- measurement_avg   - magnetization, pulse, sum, time
//! |    |    |---- results(HTresults) - coercivity, reflectivity, applied field, magnetization
//! |---- xrd
//! |    |---- scan_#,#
//! |    |    |---- instrument(HTinstrument) - x_pos, y_pos
//! |    |    |    |---- disp, file, hardware, meas
//! |    |    |---- results(HTresults)
//! |    |    |    |---- r_coefficients, global_parameters
//! |    |    |    |---- phases
//! |    |    |    |    |---- <phase>
//! |    |    |---- measurement(HTmeasurement) - angle, counts
//! |    |    |---- image(HTimage) - frame header, 2D_Camera_Image
//! ```
//!
//! Every numeric dataset with a physical unit carries a `units` attribute. The
//! [`hdf_reader`] module reads results and patterns back out of a container.
pub mod config;
pub mod constants;
pub mod error;
pub mod hdf_reader;
pub mod hdf_writer;
pub mod img_file;
pub mod lst_file;
pub mod moke;
pub mod node;
pub mod process;
pub mod ras_file;
pub mod text_file;
pub mod wafer;
pub mod worker_status;
pub mod xrd;
