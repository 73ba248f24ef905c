//! MF4 to CSV Converter CLI Application
//!
//! This is the command-line interface for the MF4 to CSV converter.
//! It uses the mf4-csv-core library and adds:
//! - TOML configuration (paths, timestamp limits, profile table)
//! - Recursive discovery of recordings in directories
//! - Parallel batch conversion
//! - A batch summary (log and JSON)

use anyhow::{Context, Result};
use clap::Parser;
use mf4_csv_core::{Converter, LogSink};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod config;
mod report;

use report::BatchSummary;

/// MF4 to CSV - Convert vehicle recordings into time-aligned tables
#[derive(Parser, Debug)]
#[command(name = "mf4-csv")]
#[command(about = "Convert MF4 recordings into time-aligned CSV tables", long_about = None)]
#[command(version)]
struct Args {
    /// MF4 files or directories to convert (directories are searched recursively)
    #[arg(value_name = "PATH", required = true)]
    inputs: Vec<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root directory replaced by the output root in output paths
    #[arg(long, value_name = "DIR")]
    input_root: Option<PathBuf>,

    /// Directory receiving the CSV files
    #[arg(short, long, value_name = "DIR")]
    output_root: Option<PathBuf>,

    /// Number of files converted in parallel
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Write a JSON summary of the batch to this file
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Verbosity level: -v for debug, -vv (or more) for trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("MF4 CSV CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using converter library v{}", mf4_csv_core::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => config::AppConfig::default(),
    };

    let output_root = args
        .output_root
        .clone()
        .or_else(|| app_config.paths.output_root.clone())
        .context("No output root given (use --output-root or [paths] output_root)")?;
    let input_root = args
        .input_root
        .clone()
        .or_else(|| app_config.paths.input_root.clone());

    let jobs = collect_jobs(&args.inputs, input_root.as_deref())?;
    if jobs.is_empty() {
        log::warn!("No MF4 files found");
        return Ok(ExitCode::SUCCESS);
    }
    log::info!("Found {} recording(s)", jobs.len());

    let converter = Converter::mdf4(app_config.converter_config()?);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs.max(1))
        .build()
        .context("Failed to create worker pool")?;

    let results = pool.install(|| {
        jobs.par_iter()
            .map(|(file, root)| converter.run(file, root, &output_root, &LogSink))
            .collect::<Vec<_>>()
    });

    let summary = BatchSummary::from_results(results);
    summary.log();
    if let Some(path) = &args.summary {
        summary.write_json(path)?;
    }

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Expand the inputs into `(recording, input root)` pairs
///
/// Without an explicit input root, a directory argument is the root of the
/// files found in it and a file argument is rooted at its parent.
fn collect_jobs(inputs: &[PathBuf], input_root: Option<&Path>) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut jobs = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let root = input_root.unwrap_or(input.as_path()).to_path_buf();
            let mut files = Vec::new();
            find_recordings(input, &mut files)?;
            jobs.extend(files.into_iter().map(|file| (file, root.clone())));
        } else {
            let root = match input_root {
                Some(root) => root.to_path_buf(),
                None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
            };
            jobs.push((input.clone(), root));
        }
    }
    Ok(jobs)
}

/// Recursively collect `*.mf4` files (any case), sorted by path
fn find_recordings(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {:?}", dir))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to read directory: {:?}", dir))?;
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            find_recordings(&path, files)?;
        } else if is_recording(&path) {
            files.push(path);
        } else {
            log::debug!("Skipping non-recording file: {:?}", path);
        }
    }
    Ok(())
}

fn is_recording(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mf4"))
}

/// Log level for the command line flags
///
/// Info by default, debug with `-v`, trace with `-vv` or more; `--quiet`
/// keeps errors only and wins over `-v`.
fn log_level(verbose: u8, quiet: bool) -> log::LevelFilter {
    use log::LevelFilter;

    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use std::io::Write;

    Builder::new()
        .filter_level(log_level(verbose, quiet))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_recording() {
        assert!(is_recording(Path::new("a/Run_GPS.mf4")));
        assert!(is_recording(Path::new("a/Run_XCP_RCAR.MF4")));
        assert!(!is_recording(Path::new("a/Run_GPS.csv")));
        assert!(!is_recording(Path::new("a/mf4")));
    }

    #[test]
    fn test_log_level_tiers() {
        use log::LevelFilter;

        assert_eq!(log_level(0, false), LevelFilter::Info);
        assert_eq!(log_level(1, false), LevelFilter::Debug);
        assert_eq!(log_level(2, false), LevelFilter::Trace);
        assert_eq!(log_level(3, false), LevelFilter::Trace);
        assert_eq!(log_level(2, true), LevelFilter::Error);
    }

    #[test]
    fn test_collect_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("2021").join("12");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Run_GPS.mf4"), b"").unwrap();
        fs::write(nested.join("Run_XCP_AURIX.MF4"), b"").unwrap();
        fs::write(nested.join("notes.txt"), b"").unwrap();

        let jobs = collect_jobs(&[dir.path().to_path_buf()], None).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|(_, root)| root == dir.path()));
        assert_eq!(jobs[0].0, nested.join("Run_GPS.mf4"));

        let single = nested.join("Run_GPS.mf4");
        let jobs = collect_jobs(&[single.clone()], None).unwrap();
        assert_eq!(jobs, vec![(single, nested.clone())]);
    }
}
