//! Converter configuration types
//!
//! The profile table maps file-name fragments to a resampling cadence and an
//! extraction strategy. Tables, limits and the index label are explicit
//! values handed to the [`Converter`](crate::Converter); nothing here is
//! process-wide state.

use crate::types::{ConvertError, Result};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;

/// Fixed resampling interval, e.g. `"100ms"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cadence {
    nanos: i64,
}

impl Cadence {
    /// Create a cadence from a positive number of nanoseconds
    pub fn from_nanos(nanos: i64) -> Result<Self> {
        if nanos <= 0 {
            return Err(ConvertError::Config(format!(
                "cadence must be positive, got {} ns",
                nanos
            )));
        }
        Ok(Self { nanos })
    }

    pub fn from_millis(millis: i64) -> Result<Self> {
        millis
            .checked_mul(NANOS_PER_MILLI)
            .ok_or_else(|| ConvertError::Config(format!("cadence {} ms is too large", millis)))
            .and_then(Self::from_nanos)
    }

    pub fn nanos(&self) -> i64 {
        self.nanos
    }

    pub fn as_delta(&self) -> TimeDelta {
        TimeDelta::nanoseconds(self.nanos)
    }
}

impl FromStr for Cadence {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (count, unit) = s.split_at(split);

        let count: i64 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| ConvertError::Config(format!("invalid cadence: {:?}", s)))?
        };

        let unit_nanos = match unit {
            "ns" | "N" => 1,
            "us" | "U" => NANOS_PER_MICRO,
            "ms" | "L" => NANOS_PER_MILLI,
            "s" | "S" => NANOS_PER_SECOND,
            "min" | "T" => NANOS_PER_MINUTE,
            "h" | "H" => NANOS_PER_HOUR,
            "d" | "D" => NANOS_PER_DAY,
            _ => {
                return Err(ConvertError::Config(format!(
                    "invalid cadence unit in {:?}",
                    s
                )))
            }
        };

        let nanos = count
            .checked_mul(unit_nanos)
            .ok_or_else(|| ConvertError::Config(format!("cadence {:?} is too large", s)))?;
        Self::from_nanos(nanos)
    }
}

impl TryFrom<String> for Cadence {
    type Error = ConvertError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Cadence> for String {
    fn from(cadence: Cadence) -> Self {
        cadence.to_string()
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Largest unit that divides the interval exactly
        let units = [
            (NANOS_PER_HOUR, "h"),
            (NANOS_PER_MINUTE, "min"),
            (NANOS_PER_SECOND, "s"),
            (NANOS_PER_MILLI, "ms"),
            (NANOS_PER_MICRO, "us"),
        ];
        for (size, suffix) in units {
            if self.nanos % size == 0 {
                return write!(f, "{}{}", self.nanos / size, suffix);
            }
        }
        write!(f, "{}ns", self.nanos)
    }
}

/// Extraction strategy applied to a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Read, expand and resample each channel on its own
    #[serde(alias = "v1")]
    PerChannel,
    /// Read each group as one aligned table, resample, then expand
    #[serde(alias = "v2")]
    PerGroup,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::PerChannel => write!(f, "per-channel"),
            Strategy::PerGroup => write!(f, "per-group"),
        }
    }
}

impl FromStr for Strategy {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "per-channel" | "v1" => Ok(Strategy::PerChannel),
            "per-group" | "v2" => Ok(Strategy::PerGroup),
            other => Err(ConvertError::Config(format!("unknown strategy: {:?}", other))),
        }
    }
}

/// Resolved processing profile for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub cadence: Cadence,
    pub strategy: Strategy,
}

/// One entry of the profile table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRule {
    /// Case-sensitive substring matched against the file name
    pub fragment: String,
    pub cadence: Cadence,
    pub strategy: Strategy,
}

impl ProfileRule {
    pub fn new(fragment: impl Into<String>, cadence: Cadence, strategy: Strategy) -> Self {
        Self {
            fragment: fragment.into(),
            cadence,
            strategy,
        }
    }

    pub fn profile(&self) -> Profile {
        Profile {
            cadence: self.cadence,
            strategy: self.strategy,
        }
    }
}

/// Ordered mapping from file-name fragment to processing profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileTable {
    rules: Vec<ProfileRule>,
}

impl ProfileTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Builder method: append a rule
    pub fn with_rule(mut self, fragment: impl Into<String>, cadence: Cadence, strategy: Strategy) -> Self {
        self.rules.push(ProfileRule::new(fragment, cadence, strategy));
        self
    }

    pub fn rules(&self) -> &[ProfileRule] {
        &self.rules
    }

    /// Resolve the profile for a file name
    ///
    /// Exactly one rule fragment must occur in `file_name`; zero or several
    /// matches fail with [`ConvertError::ProfileResolution`].
    pub fn resolve(&self, file_name: &str) -> Result<Profile> {
        let mut matches = self
            .rules
            .iter()
            .filter(|rule| file_name.contains(rule.fragment.as_str()));

        match (matches.next(), matches.next()) {
            (Some(rule), None) => {
                log::debug!(
                    "Profile for {:?}: fragment {:?} -> {} {}",
                    file_name,
                    rule.fragment,
                    rule.cadence,
                    rule.strategy
                );
                Ok(rule.profile())
            }
            (None, _) => Err(ConvertError::ProfileResolution {
                file: file_name.to_string(),
                matches: 0,
            }),
            (Some(_), Some(_)) => Err(ConvertError::ProfileResolution {
                file: file_name.to_string(),
                matches: 2 + matches.count(),
            }),
        }
    }
}

impl Default for ProfileTable {
    /// The built-in vehicle logger profiles
    fn default() -> Self {
        let ms = |n| Cadence { nanos: n * NANOS_PER_MILLI };
        Self::new()
            .with_rule("GPS.mf4", ms(100), Strategy::PerChannel)
            .with_rule("Monitoring.mf4", ms(100), Strategy::PerChannel)
            .with_rule("XCP_AURIX.MF4", ms(10), Strategy::PerGroup)
            .with_rule("XCP_RCAR.MF4", ms(200), Strategy::PerGroup)
    }
}

/// Bounds applied to absolute timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampLimits {
    /// A file whose latest timestamp lies further than this from the start is corrupt
    pub corruption_window: TimeDelta,
    /// Samples at or beyond this distance from the start are dropped
    pub retention_window: TimeDelta,
}

impl TimestampLimits {
    pub fn new(corruption_window: TimeDelta, retention_window: TimeDelta) -> Self {
        Self {
            corruption_window,
            retention_window,
        }
    }

    pub fn from_secs(corruption_secs: i64, retention_secs: i64) -> Result<Self> {
        let delta = |secs: i64| {
            TimeDelta::try_seconds(secs)
                .filter(|d| *d > TimeDelta::zero())
                .ok_or_else(|| ConvertError::Config(format!("invalid window: {} s", secs)))
        };
        Ok(Self::new(delta(corruption_secs)?, delta(retention_secs)?))
    }
}

impl Default for TimestampLimits {
    fn default() -> Self {
        // The retention window is a 20 day span, matching the behaviour of the
        // existing converter output.
        Self::new(TimeDelta::days(1), TimeDelta::days(20))
    }
}

/// Complete configuration of a [`Converter`](crate::Converter)
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterConfig {
    pub profiles: ProfileTable,
    pub limits: TimestampLimits,
    /// Name of the time index column in the output
    pub index_label: String,
}

impl ConverterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: replace the profile table
    pub fn with_profiles(mut self, profiles: ProfileTable) -> Self {
        self.profiles = profiles;
        self
    }

    /// Builder method: replace the timestamp limits
    pub fn with_limits(mut self, limits: TimestampLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Builder method: rename the time index column
    pub fn with_index_label(mut self, label: impl Into<String>) -> Self {
        self.index_label = label.into();
        self
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            profiles: ProfileTable::default(),
            limits: TimestampLimits::default(),
            index_label: "Time".to_string(),
        }
    }
}
