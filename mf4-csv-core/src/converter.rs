//! Main converter API
//!
//! The [`Converter`] is the entry point of the library. It opens a recording
//! through a [`MeasurementSource`], resolves the processing profile from the
//! file name, runs the extraction pipeline and returns the aligned table.

use crate::config::{ConverterConfig, Profile};
use crate::formats::{MeasurementSource, Mdf4Source, Recording};
use crate::report::{FailureEvent, FailureSink};
use crate::table::{AlignedTable, TableAssembler};
use crate::types::Result;
use crate::validator::TimestampValidator;
use std::path::{Path, PathBuf};

/// Converts recordings into aligned tables
pub struct Converter<S = Mdf4Source> {
    source: S,
    config: ConverterConfig,
}

impl Converter<Mdf4Source> {
    /// Create a converter reading MDF4 files from disk
    ///
    /// # Example
    /// ```no_run
    /// use mf4_csv_core::{Converter, ConverterConfig};
    /// use std::path::Path;
    ///
    /// let converter = Converter::mdf4(ConverterConfig::default());
    /// let table = converter.convert(Path::new("data/Run_GPS.mf4")).unwrap();
    /// println!("{} rows, {} columns", table.len(), table.columns().len());
    /// ```
    pub fn mdf4(config: ConverterConfig) -> Self {
        Self::new(Mdf4Source, config)
    }
}

impl<S: MeasurementSource> Converter<S> {
    pub fn new(source: S, config: ConverterConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Convert one recording
    ///
    /// The recording is opened first, then the profile is resolved from the
    /// file name. The recording handle is released before the final table is
    /// assembled. Any error is terminal for this file; no partial table is
    /// returned.
    pub fn convert(&self, path: &Path) -> Result<AlignedTable> {
        log::info!("Converting recording: {:?}", path);

        let assembler = {
            let recording = self.source.open(path)?;
            let profile = self.config.profiles.resolve(&file_name(path))?;
            self.extract(recording.as_ref(), profile)?
        };

        let table = assembler.finish(&self.config.index_label)?;
        log::info!(
            "Converted {:?}: {} rows, {} columns",
            path,
            table.len(),
            table.columns().len()
        );
        Ok(table)
    }

    /// Convert an already opened recording with an explicit profile
    pub fn convert_recording(
        &self,
        recording: &dyn Recording,
        profile: Profile,
    ) -> Result<AlignedTable> {
        self.extract(recording, profile)?
            .finish(&self.config.index_label)
    }

    /// Convert one recording and write it as CSV under `output_root`
    ///
    /// Returns the path written. Nothing is written for a failed file.
    pub fn convert_to_csv(
        &self,
        input: &Path,
        input_root: &Path,
        output_root: &Path,
    ) -> Result<PathBuf> {
        let table = self.convert(input)?;
        let output = output_path(input, input_root, output_root);
        table.save(&output)?;
        Ok(output)
    }

    /// [`convert_to_csv`](Self::convert_to_csv), reporting a failure to `sink`
    pub fn run(
        &self,
        input: &Path,
        input_root: &Path,
        output_root: &Path,
        sink: &dyn FailureSink,
    ) -> std::result::Result<PathBuf, FailureEvent> {
        match self.convert_to_csv(input, input_root, output_root) {
            Ok(output) => {
                log::info!("Saved {}", output.display());
                Ok(output)
            }
            Err(e) => {
                let event = FailureEvent::new(input.display().to_string(), &e);
                sink.report(&event);
                Err(event)
            }
        }
    }

    /// Run every selected unit through extraction, validation and alignment
    fn extract(&self, recording: &dyn Recording, profile: Profile) -> Result<TableAssembler> {
        let strategy = profile.strategy.extractor();
        let validator = TimestampValidator::new(recording.start_time(), self.config.limits);
        let mut assembler = TableAssembler::new();

        log::debug!(
            "Recording starts at {}, {} groups, strategy {}, cadence {}",
            recording.start_time(),
            recording.groups().len(),
            profile.strategy,
            profile.cadence
        );

        for selection in strategy.select(recording) {
            let frames = strategy
                .extract(recording, &selection)?
                .into_iter()
                .map(|series| validator.validate(series))
                .collect::<Result<Vec<_>>>()?;

            match strategy.align(frames, profile.cadence) {
                Some(frame) => assembler.push(frame),
                None => log::debug!("Group {} produced no columns", selection.group),
            }
        }

        Ok(assembler)
    }
}

/// File name component used for profile matching
fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Output location of a converted recording
///
/// The `input_root` prefix of `input` is replaced by `output_root` and the
/// extension by `csv`. An input outside `input_root` lands directly in
/// `output_root`.
pub fn output_path(input: &Path, input_root: &Path, output_root: &Path) -> PathBuf {
    let mut output = match input.strip_prefix(input_root) {
        Ok(relative) => output_root.join(relative),
        Err(_) => output_root.join(input.file_name().unwrap_or(input.as_os_str())),
    };
    output.set_extension("csv");
    output
}
