use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::core::track::VARIOUS_ARTISTS;
use crate::utils::validation::{clean_text, normalize_identifier, MAX_TRACKS};

/// Why a candidate was excluded from scoring
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CandidateError {
    #[error("Malformed candidate {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("Alignment infeasible for candidate {id}: {reason}")]
    AlignmentInfeasible { id: String, reason: String },
}

impl CandidateError {
    fn malformed(id: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            id: if id.is_empty() { "<unknown>".to_string() } else { id.to_string() },
            reason: reason.into(),
        }
    }
}

/// One track of a candidate release
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateTrack {
    /// Recording identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub title: String,

    /// Per-track artist, set on compilations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,

    /// Duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Position within its disc
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disc_number: Option<u32>,
}

impl CandidateTrack {
    #[must_use]
    pub fn new(title: impl Into<String>, duration: f64) -> Self {
        Self {
            title: title.into(),
            duration: Some(duration),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    #[must_use]
    pub fn with_position(mut self, disc_number: u32, track_number: u32) -> Self {
        self.disc_number = Some(disc_number);
        self.track_number = Some(track_number);
        self
    }
}

/// A release returned by a metadata backend.
///
/// Instances coming straight from a backend may be incomplete; call
/// [`CandidateRelease::normalize`] before scoring.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateRelease {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub artist: String,

    /// Release date as reported (YYYY, YYYY-MM or YYYY-MM-DD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    /// Medium format, e.g. "CD", "Vinyl", "Digital Media"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,

    /// Number of mediums (discs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mediums: Option<u32>,

    /// Total track count as reported by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_total: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub compilation: bool,

    /// Name of the service the record came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,

    #[serde(default)]
    pub tracks: Vec<CandidateTrack>,
}

impl CandidateRelease {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    #[must_use]
    pub fn with_media(mut self, media: impl Into<String>) -> Self {
        self.media = Some(media.into());
        self
    }

    #[must_use]
    pub fn with_tracks(mut self, tracks: Vec<CandidateTrack>) -> Self {
        self.tracks = tracks;
        self
    }

    /// Whether the release credits many artists rather than one
    #[must_use]
    pub fn is_various_artists(&self) -> bool {
        self.compilation || self.artist.eq_ignore_ascii_case(VARIOUS_ARTISTS)
    }

    /// Artist credited on a given track, falling back to the release artist
    #[must_use]
    pub fn track_artist(&self, index: usize) -> &str {
        self.tracks
            .get(index)
            .and_then(|t| t.artist.as_deref())
            .unwrap_or(&self.artist)
    }

    /// (disc, track number) of every track, in track order.
    ///
    /// Unset values count as disc 1 and track 0; normalized releases have
    /// both.
    #[must_use]
    pub fn positions(&self) -> Vec<(u32, u32)> {
        self.tracks
            .iter()
            .map(|t| (t.disc_number.unwrap_or(1), t.track_number.unwrap_or(0)))
            .collect()
    }

    /// Validate required fields and fill derived ones.
    ///
    /// - `id`, `title` and `artist` are required; every track needs a title
    /// - empty strings become None, non-finite or negative durations are dropped
    /// - `year` is derived from `date` when absent
    /// - tracks without a disc are placed on disc 1; tracks without a number are
    ///   numbered after the highest number already used on their disc
    /// - (disc, track number) pairs must be unique
    /// - `mediums` and `track_total` default to what the track list shows
    ///
    /// # Errors
    ///
    /// Returns `CandidateError::Malformed` when a required field is missing, the
    /// track list is too long, or two tracks share a position.
    pub fn normalize(self) -> Result<Self, CandidateError> {
        let raw_id = self.id.trim().to_string();
        let id = normalize_identifier(&raw_id)
            .ok_or_else(|| CandidateError::malformed(&raw_id, "missing or invalid identifier"))?;

        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(CandidateError::malformed(&id, "missing release title"));
        }

        let artist = self.artist.trim().to_string();
        if artist.is_empty() {
            return Err(CandidateError::malformed(&id, "missing release artist"));
        }

        if self.tracks.len() > MAX_TRACKS {
            return Err(CandidateError::malformed(
                &id,
                format!("{} tracks exceeds maximum of {MAX_TRACKS}", self.tracks.len()),
            ));
        }

        let date = clean_text(self.date);
        let year = self
            .year
            .filter(|y| (1..=9999).contains(y))
            .or_else(|| date.as_deref().and_then(parse_year));

        let tracks = normalize_tracks(&id, self.tracks)?;

        let mediums = self
            .mediums
            .filter(|&m| m > 0)
            .or_else(|| tracks.iter().filter_map(|t| t.disc_number).max());
        let track_total = self.track_total.filter(|&n| n > 0).or(if tracks.is_empty() {
            None
        } else {
            Some(tracks.len())
        });

        Ok(Self {
            id,
            title,
            artist,
            date,
            year,
            media: clean_text(self.media),
            mediums,
            track_total,
            country: clean_text(self.country),
            label: clean_text(self.label),
            compilation: self.compilation,
            data_source: clean_text(self.data_source),
            tracks,
        })
    }
}

fn normalize_tracks(
    id: &str,
    tracks: Vec<CandidateTrack>,
) -> Result<Vec<CandidateTrack>, CandidateError> {
    let mut seen: HashSet<(u32, u32)> = HashSet::new();
    let mut highest_on_disc: HashMap<u32, u32> = HashMap::new();

    for track in &tracks {
        if let Some(number) = track.track_number.filter(|&n| n > 0) {
            let disc = track.disc_number.filter(|&d| d > 0).unwrap_or(1);
            let entry = highest_on_disc.entry(disc).or_insert(0);
            *entry = (*entry).max(number);
        }
    }

    let mut normalized = Vec::with_capacity(tracks.len());
    for (i, track) in tracks.into_iter().enumerate() {
        let title = track.title.trim().to_string();
        if title.is_empty() {
            return Err(CandidateError::malformed(
                id,
                format!("track {} has no title", i + 1),
            ));
        }

        let disc = track.disc_number.filter(|&d| d > 0).unwrap_or(1);
        let number = match track.track_number.filter(|&n| n > 0) {
            Some(n) => n,
            None => {
                let next = highest_on_disc.entry(disc).or_insert(0);
                *next = next
                    .checked_add(1)
                    .ok_or_else(|| CandidateError::malformed(id, "track number overflow"))?;
                *next
            }
        };

        if !seen.insert((disc, number)) {
            return Err(CandidateError::malformed(
                id,
                format!("duplicate track position disc {disc} track {number}"),
            ));
        }

        normalized.push(CandidateTrack {
            id: track.id.as_deref().and_then(normalize_identifier),
            title,
            artist: clean_text(track.artist),
            duration: track.duration.filter(|d| d.is_finite() && *d >= 0.0),
            track_number: Some(number),
            disc_number: Some(disc),
        });
    }

    Ok(normalized)
}

/// Extract a year from a `YYYY`, `YYYY-MM` or `YYYY-MM-DD` date string
fn parse_year(date: &str) -> Option<i32> {
    if let Ok(full) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return Some(full.year());
    }
    let prefix = date.get(..4)?;
    if !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok().filter(|y| (1..=9999).contains(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release() -> CandidateRelease {
        CandidateRelease::new("rel-1", " Abbey Road ", "The Beatles").with_tracks(vec![
            CandidateTrack::new("Come Together", 259.0),
            CandidateTrack::new("Something", 182.0),
        ])
    }

    #[test]
    fn test_normalize_fills_derived_fields() {
        let normalized = release().normalize().unwrap();
        assert_eq!(normalized.title, "Abbey Road");
        assert_eq!(normalized.mediums, Some(1));
        assert_eq!(normalized.track_total, Some(2));
        assert_eq!(normalized.tracks[1].track_number, Some(2));
        assert_eq!(normalized.tracks[1].disc_number, Some(1));
    }

    #[test]
    fn test_normalize_year_from_date() {
        let mut r = release();
        r.date = Some("1969-09-26".to_string());
        assert_eq!(r.normalize().unwrap().year, Some(1969));

        let mut r = release();
        r.date = Some("1969".to_string());
        assert_eq!(r.normalize().unwrap().year, Some(1969));

        let mut r = release();
        r.date = Some("unknown".to_string());
        assert_eq!(r.normalize().unwrap().year, None);
    }

    #[test]
    fn test_normalize_rejects_missing_fields() {
        let mut r = release();
        r.title = "  ".to_string();
        assert!(matches!(r.normalize(), Err(CandidateError::Malformed { .. })));

        let mut r = release();
        r.id = String::new();
        assert!(matches!(r.normalize(), Err(CandidateError::Malformed { .. })));

        let mut r = release();
        r.tracks[0].title = String::new();
        let err = r.normalize().unwrap_err();
        assert!(err.to_string().contains("track 1 has no title"));
    }

    #[test]
    fn test_normalize_rejects_duplicate_positions() {
        let r = CandidateRelease::new("rel-2", "Dup", "Artist").with_tracks(vec![
            CandidateTrack::new("A", 100.0).with_position(1, 1),
            CandidateTrack::new("B", 100.0).with_position(1, 1),
        ]);
        assert!(matches!(r.normalize(), Err(CandidateError::Malformed { .. })));
    }

    #[test]
    fn test_normalize_numbers_after_explicit_positions() {
        let r = CandidateRelease::new("rel-3", "Mixed", "Artist").with_tracks(vec![
            CandidateTrack::new("A", 100.0).with_position(1, 2),
            CandidateTrack::new("B", 100.0),
        ]);
        let normalized = r.normalize().unwrap();
        assert_eq!(normalized.tracks[1].track_number, Some(3));
    }

    #[test]
    fn test_normalize_rejects_track_number_overflow() {
        let r = CandidateRelease::new("rel-4", "Album", "Artist").with_tracks(vec![
            CandidateTrack::new("A", 100.0).with_position(1, u32::MAX),
            CandidateTrack::new("B", 100.0),
        ]);
        let err = r.normalize().unwrap_err();
        assert!(matches!(err, CandidateError::Malformed { .. }));
        assert!(err.to_string().contains("track number overflow"));
    }

    #[test]
    fn test_normalize_cleans_optional_text() {
        let mut r = release().with_media(" CD ");
        r.data_source = Some("  ".to_string());
        let normalized = r.normalize().unwrap();
        assert_eq!(normalized.media.as_deref(), Some("CD"));
        assert!(normalized.data_source.is_none());

        let mut r = release();
        r.data_source = Some("MusicBrainz ".to_string());
        assert_eq!(r.normalize().unwrap().data_source.as_deref(), Some("MusicBrainz"));
    }

    #[test]
    fn test_normalize_drops_bad_durations() {
        let mut r = release();
        r.tracks[0].duration = Some(f64::NAN);
        r.tracks[1].duration = Some(-3.0);
        let normalized = r.normalize().unwrap();
        assert!(normalized.tracks.iter().all(|t| t.duration.is_none()));
    }

    #[test]
    fn test_various_artists_detection() {
        let r = CandidateRelease::new("va", "Hits", "various artists");
        assert!(r.is_various_artists());
        let mut r = CandidateRelease::new("c", "Hits", "Some DJ");
        assert!(!r.is_various_artists());
        r.compilation = true;
        assert!(r.is_various_artists());
    }

    #[test]
    fn test_track_artist_fallback() {
        let mut r = release();
        r.tracks[1].artist = Some("George Harrison".to_string());
        assert_eq!(r.track_artist(0), "The Beatles");
        assert_eq!(r.track_artist(1), "George Harrison");
    }
}
