use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use libwafermap::config::Config;
use libwafermap::process::process;
use libwafermap::worker_status::{BarColor, WorkerStatus};

fn make_template_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

/// Library messages go to a log file, the terminal only gets the summary
fn init_file_logger() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./wafermap.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn bar_style(color: &BarColor) -> ProgressStyle {
    let color = match color {
        BarColor::CYAN => "cyan",
        BarColor::MAGENTA => "magenta",
        BarColor::RED => "red",
        BarColor::GREEN => "green",
    };
    ProgressStyle::with_template(&format!(
        "{{prefix:>5}} [{{bar:40.{color}}}] {{pos:>3}}% {{msg}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn main() {
    // Create a cli
    let matches = Command::new("wafermap_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }
    if let Err(e) = init_file_logger() {
        log::warn!("Could not create log file, library messages will be lost: {e}");
    }

    // Parse the cli
    let Some(config_path) = matches.get_one::<String>("path").map(PathBuf::from) else {
        log::error!("A configuration path is required (-p/--path)");
        return;
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("Could not write template config: {e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("HDF5 Path: {}", config.hdf_path.to_string_lossy());
    if let Some(path) = &config.moke_path {
        log::info!("MOKE Path: {}", path.to_string_lossy());
    }
    if let Some(path) = &config.xrd_path {
        log::info!("XRD Path: {}", path.to_string_lossy());
    }
    log::info!(
        "Exclude wafer edges: {} (diameter {} mm, margin {} mm)",
        config.exclude_wafer_edges,
        config.wafer_diameter_mm,
        config.edge_margin_mm
    );
    spdlog::info!("Starting wafermap with config {}", config_path.to_string_lossy());

    // One bar per technique
    let mut bars: HashMap<String, ProgressBar> = HashMap::new();
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(config, tx));

    loop {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(status) => {
                let bar = bars.entry(status.technique.clone()).or_insert_with(|| {
                    let bar = pb_manager.add(ProgressBar::new(100));
                    bar.set_prefix(status.technique.clone());
                    bar
                });
                // A failed scan shows in red until the next one compiles
                bar.set_style(bar_style(&status.color));
                bar.set_position((status.progress * 100.0) as u64);
                bar.set_message(status.file_name);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => (),
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    for bar in bars.values() {
        bar.finish();
    }

    match handle.join() {
        Ok(Ok(summary)) => {
            log::info!(
                "Wrote {} scans, skipped {} edge positions.",
                summary.written,
                summary.skipped
            );
            if summary.failed > 0 {
                log::warn!(
                    "{} scans failed to compile, check wafermap.log for details.",
                    summary.failed
                );
            }
        }
        Ok(Err(e)) => log::error!("Compiling failed with error: {e}"),
        Err(_) => log::error!("Failed to join compile task!"),
    }

    log::info!("Done.");
}
