//! MF4 to CSV Converter Library
//!
//! Converts vehicle measurement recordings (ASAM MDF 4) into one
//! time-aligned table: every channel is resampled onto the cadence of the
//! recording's profile and joined on a shared time index.
//!
//! # Architecture
//!
//! One file is processed at a time, synchronously:
//! - The profile (cadence and extraction strategy) is resolved from the file name
//! - The channel catalog selects groups and value channels
//! - Raw samples are extracted per channel or per group
//! - Timestamps are made absolute, checked for corruption and trimmed
//! - Vector and matrix samples are expanded into scalar columns
//! - Each unit is resampled (last value per bin) and forward-filled
//! - All units are joined into an [`AlignedTable`]
//!
//! Every failure is terminal for the file being converted and is returned as
//! a [`ConvertError`]. Batch driving, configuration files and logger setup
//! live in the application layer (mf4-csv-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use mf4_csv_core::{Converter, ConverterConfig, LogSink};
//! use std::path::Path;
//!
//! let converter = Converter::mdf4(ConverterConfig::default());
//!
//! match converter.run(
//!     Path::new("/data/in/2021/Run_XCP_AURIX.MF4"),
//!     Path::new("/data/in"),
//!     Path::new("/data/out"),
//!     &LogSink,
//! ) {
//!     Ok(csv) => println!("Wrote {}", csv.display()),
//!     Err(failure) => eprintln!("{}: {}", failure.kind, failure.reason),
//! }
//! ```

// Public modules
pub mod catalog;
pub mod config;
pub mod converter;
pub mod expander;
pub mod extractor;
pub mod formats;
pub mod report;
pub mod resampler;
pub mod table;
pub mod types;
pub mod validator;

// Re-export main types for convenience
pub use config::{Cadence, ConverterConfig, Profile, ProfileRule, ProfileTable, Strategy, TimestampLimits};
pub use converter::{output_path, Converter};
pub use extractor::{ExtractionStrategy, SampleSeries};
pub use formats::{MeasurementSource, Mdf4Source, MemorySource, Recording};
pub use report::{FailureEvent, FailureSink, LogSink, MemorySink};
pub use table::{AlignedTable, TableAssembler};
pub use types::{ConvertError, ErrorKind, Result, Sample, SampleShape, Timestamp, ValueMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: the built-in profiles resolve the known logger files
        let config = ConverterConfig::default();
        let profile = config.profiles.resolve("20211201_XCP_RCAR.MF4").unwrap();
        assert_eq!(profile.strategy, Strategy::PerGroup);
        assert_eq!(profile.cadence, Cadence::from_millis(200).unwrap());
        assert_eq!(config.index_label, "Time");
    }
}
