//! Recommendation model identity, stage and version

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use reco_common::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::db::{BATCH_JOBS_TABLE, MODELS_TABLE};
use crate::services::signal_validator::SignalFormat;

/// Separators a multi-part signal may be joined with
pub const ALLOWED_CONCATENATORS: &[&str] = &["_", "-", "|", ":", "#", ".", ","];

/// Suffix of the keyspace holding a model's staged data
const STAGING_SUFFIX: &str = "_staging";

/// Model lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    /// Writable, not served
    Staged,
    /// Read-only, served to clients
    Published,
}

/// Semantic version `major.minor.patch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    /// Version of a freshly created (or deleted) model
    pub const INITIAL: SemVer = SemVer::new(0, 1, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn bump_major(self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }

    pub fn bump_minor(self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    pub fn bump_patch(self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidInput(format!("Not a major.minor.patch version: {}", s)));
        }
        let parse = |p: &str| {
            p.parse::<u64>().map_err(|_| {
                Error::InvalidInput(format!("Invalid version component '{}' in {}", p, s))
            })
        };
        Ok(Self::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl Serialize for SemVer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemVer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Named recommendation dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub name: String,
    pub stage: Stage,
    pub version: SemVer,
    /// Field names making up a signal, in order
    pub signal_order: Vec<String>,
    /// Separator between signal parts; empty for single-field signals
    pub concatenator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Build a STAGED model at version 0.1.0 after checking name and signal shape
    pub fn new(
        name: impl Into<String>,
        concatenator: impl Into<String>,
        signal_order: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        let concatenator = concatenator.into();
        validate_name(&name)?;
        validate_signal_shape(&concatenator, &signal_order)?;

        let now = Utc::now();
        Ok(Self {
            name,
            stage: Stage::Staged,
            version: SemVer::INITIAL,
            signal_order,
            concatenator,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn staging_table(&self) -> String {
        format!("{}{}", self.name, STAGING_SUFFIX)
    }

    pub fn production_table(&self) -> String {
        self.name.clone()
    }

    /// Keyspace receiving writes and serving reads in the current stage
    pub fn active_table(&self) -> String {
        match self.stage {
            Stage::Staged => self.staging_table(),
            Stage::Published => self.production_table(),
        }
    }

    pub fn is_published(&self) -> bool {
        self.stage == Stage::Published
    }

    /// Stateless format rule for this model's signals
    pub fn signal_format(&self) -> SignalFormat<'_> {
        SignalFormat::new(&self.concatenator, self.signal_order.len())
    }

    /// Structural check only: `signal` splits into exactly `signal_order.len()` parts
    pub fn correct_signal_format(&self, signal: &str) -> bool {
        self.signal_format().matches(signal)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("Model name must not be empty".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidInput(format!(
            "Model name may only contain letters, digits, '_' and '-': {}",
            name
        )));
    }
    if name.ends_with(STAGING_SUFFIX) {
        return Err(Error::InvalidInput(format!(
            "Model name must not end with '{}': {}",
            STAGING_SUFFIX, name
        )));
    }
    // Production keyspace is the bare name and must not alias a metadata table
    if name == MODELS_TABLE || name == BATCH_JOBS_TABLE {
        return Err(Error::InvalidInput(format!("Model name is reserved: {}", name)));
    }
    Ok(())
}

/// Concatenator/arity rule:
/// - one field → concatenator must be empty
/// - several fields → concatenator must be one of [`ALLOWED_CONCATENATORS`]
pub fn validate_signal_shape(concatenator: &str, signal_order: &[String]) -> Result<()> {
    if signal_order.is_empty() {
        return Err(Error::InvalidInput(
            "signalOrder must name at least one field".to_string(),
        ));
    }
    if signal_order.iter().any(|f| f.trim().is_empty()) {
        return Err(Error::InvalidInput(
            "signalOrder field names must not be empty".to_string(),
        ));
    }

    if signal_order.len() == 1 {
        if !concatenator.is_empty() {
            return Err(Error::InvalidInput(format!(
                "concatenator must be empty for a single-field signal (got '{}')",
                concatenator
            )));
        }
        return Ok(());
    }

    if !ALLOWED_CONCATENATORS.contains(&concatenator) {
        return Err(Error::InvalidInput(format!(
            "concatenator '{}' is not allowed for a {}-field signal; use one of: {}",
            concatenator,
            signal_order.len(),
            ALLOWED_CONCATENATORS.join(" ")
        )));
    }
    Ok(())
}
