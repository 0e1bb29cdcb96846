//! Matching configuration.
//!
//! All tunables live in one immutable [`MatchConfig`] that is validated before a
//! session is built. Every field has a default, so a TOML file only needs the
//! values it overrides:
//!
//! ```toml
//! strong_threshold = 0.03
//!
//! [weights]
//! album = 4.0
//!
//! [tolerances]
//! year = 1
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::core::types::Field;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Weight for '{field}' must be a non-negative number, got {value}")]
    NegativeWeight { field: Field, value: f64 },

    #[error("At least one {0} weight must be positive")]
    NoPositiveWeight(&'static str),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("acceptance_ceiling ({ceiling}) must not be below strong_threshold ({threshold})")]
    CeilingBelowThreshold { ceiling: f64, threshold: f64 },

    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Default distance for a field present on only one side
pub const DEFAULT_MISSING_DISTANCE: f64 = 0.5;

/// Relative importance of each comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceWeights {
    pub album: f64,
    pub artist: f64,
    pub year: f64,
    pub media: f64,
    pub mediums: f64,
    pub country: f64,
    pub label: f64,
    pub album_id: f64,
    pub tracks: f64,
    pub track_count: f64,
    pub track_title: f64,
    pub track_artist: f64,
    pub track_index: f64,
    pub track_length: f64,
    pub track_id: f64,
}

impl Default for DistanceWeights {
    fn default() -> Self {
        Self {
            album: 3.0,
            artist: 3.0,
            year: 1.0,
            media: 1.0,
            mediums: 1.0,
            country: 0.5,
            label: 0.5,
            album_id: 5.0,
            tracks: 4.0,
            track_count: 4.0,
            track_title: 3.0,
            track_artist: 2.0,
            track_index: 1.0,
            track_length: 2.0,
            track_id: 5.0,
        }
    }
}

/// Fields compared once per release
pub const RELEASE_FIELDS: [Field; 10] = [
    Field::Album,
    Field::Artist,
    Field::Year,
    Field::Media,
    Field::Mediums,
    Field::Country,
    Field::Label,
    Field::AlbumId,
    Field::Tracks,
    Field::TrackCount,
];

/// Fields compared per track
pub const TRACK_FIELDS: [Field; 5] = [
    Field::TrackTitle,
    Field::TrackArtist,
    Field::TrackIndex,
    Field::TrackLength,
    Field::TrackId,
];

impl DistanceWeights {
    #[must_use]
    pub fn get(&self, field: Field) -> f64 {
        match field {
            Field::Album => self.album,
            Field::Artist => self.artist,
            Field::Year => self.year,
            Field::Media => self.media,
            Field::Mediums => self.mediums,
            Field::Country => self.country,
            Field::Label => self.label,
            Field::AlbumId => self.album_id,
            Field::Tracks => self.tracks,
            Field::TrackCount => self.track_count,
            Field::TrackTitle => self.track_title,
            Field::TrackArtist => self.track_artist,
            Field::TrackIndex => self.track_index,
            Field::TrackLength => self.track_length,
            Field::TrackId => self.track_id,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for field in RELEASE_FIELDS.iter().chain(TRACK_FIELDS.iter()) {
            let value = self.get(*field);
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeWeight {
                    field: *field,
                    value,
                });
            }
        }
        if RELEASE_FIELDS.iter().all(|f| self.get(*f) == 0.0) {
            return Err(ConfigError::NoPositiveWeight("release-level"));
        }
        if TRACK_FIELDS.iter().all(|f| self.get(*f) == 0.0) {
            return Err(ConfigError::NoPositiveWeight("track-level"));
        }
        Ok(())
    }
}

/// Partial credit between two categorical values, in either order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialCredit {
    pub a: String,
    pub b: String,
    pub distance: f64,
}

/// Per-field tolerances for numeric and categorical comparisons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Year difference at which the year distance saturates at 1
    pub year: u32,
    /// Duration difference (seconds) that is still considered identical
    pub duration_grace: f64,
    /// Duration difference (seconds) at which the distance saturates at 1
    pub duration_max: f64,
    pub media_partial_credit: Vec<PartialCredit>,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            year: 2,
            duration_grace: 10.0,
            duration_max: 30.0,
            media_partial_credit: Vec::new(),
        }
    }
}

/// Track aligner parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Cost of leaving one local or candidate track unmatched, in per-pair
    /// distance units. Two tracks are paired only if their distance is below
    /// twice this value.
    pub unmatched_cost: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            unmatched_cost: 0.35,
        }
    }
}

/// Complete configuration for a match session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Best distance at or below which a unique candidate is a strong match
    pub strong_threshold: f64,
    /// Candidates within this distance of the best prevent a strong match
    pub near_tie_margin: f64,
    /// Best distance above which nothing is recommended
    pub acceptance_ceiling: f64,
    /// Number of candidates carried by an ambiguous match
    pub top_n: usize,
    /// Distance for a field present on only one side
    pub missing_distance: f64,
    /// Multiplier on the fraction of missing and extra tracks
    pub unmatched_track_penalty: f64,
    /// Backend requests in flight at once
    pub max_concurrent_requests: usize,
    /// Per-backend request timeout in milliseconds
    pub backend_timeout_ms: u64,
    /// Values written to every track when a match is applied
    pub set_fields: BTreeMap<String, String>,
    pub weights: DistanceWeights,
    pub tolerances: Tolerances,
    pub alignment: AlignmentConfig,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            strong_threshold: 0.04,
            near_tie_margin: 0.01,
            acceptance_ceiling: 0.25,
            top_n: 5,
            missing_distance: DEFAULT_MISSING_DISTANCE,
            unmatched_track_penalty: 1.0,
            max_concurrent_requests: 4,
            backend_timeout_ms: 10_000,
            set_fields: BTreeMap::new(),
            weights: DistanceWeights::default(),
            tolerances: Tolerances::default(),
            alignment: AlignmentConfig::default(),
        }
    }
}

impl MatchConfig {
    /// Load and validate a TOML config file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` or `ConfigError::Parse` if the file cannot be
    /// loaded, or a validation error if a value is out of range.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML, or a validation error.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Serialize` if a value cannot be represented.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    /// Check every value is within its documented range
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;

        check_unit("strong_threshold", self.strong_threshold)?;
        check_unit("near_tie_margin", self.near_tie_margin)?;
        check_unit("acceptance_ceiling", self.acceptance_ceiling)?;
        check_unit("missing_distance", self.missing_distance)?;

        if self.acceptance_ceiling < self.strong_threshold {
            return Err(ConfigError::CeilingBelowThreshold {
                ceiling: self.acceptance_ceiling,
                threshold: self.strong_threshold,
            });
        }
        if self.top_n == 0 {
            return Err(invalid("top_n", "must be at least 1"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(invalid("max_concurrent_requests", "must be at least 1"));
        }
        if self.backend_timeout_ms == 0 {
            return Err(invalid("backend_timeout_ms", "must be at least 1"));
        }
        if !self.unmatched_track_penalty.is_finite() || self.unmatched_track_penalty < 0.0 {
            return Err(invalid(
                "unmatched_track_penalty",
                format!("must be non-negative, got {}", self.unmatched_track_penalty),
            ));
        }

        let alignment_cost = self.alignment.unmatched_cost;
        if !(alignment_cost > 0.0 && alignment_cost <= 1.0) {
            return Err(invalid(
                "alignment.unmatched_cost",
                format!("must be in (0, 1], got {alignment_cost}"),
            ));
        }

        let tol = &self.tolerances;
        if !tol.duration_grace.is_finite() || tol.duration_grace < 0.0 {
            return Err(invalid(
                "tolerances.duration_grace",
                format!("must be non-negative, got {}", tol.duration_grace),
            ));
        }
        if !tol.duration_max.is_finite() || tol.duration_max <= tol.duration_grace {
            return Err(invalid(
                "tolerances.duration_max",
                format!(
                    "must exceed duration_grace ({}), got {}",
                    tol.duration_grace, tol.duration_max
                ),
            ));
        }
        for credit in &tol.media_partial_credit {
            check_unit("tolerances.media_partial_credit", credit.distance)?;
        }

        Ok(())
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        reason: reason.into(),
    }
}

fn check_unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(name, format!("must be in [0, 1], got {value}")))
    }
}
