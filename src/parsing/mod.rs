//! Parsers for reading local track tags from files.
//!
//! This module provides parsers for:
//!
//! - **JSON files**: An array of tracks, or an object with a `tracks` array
//! - **TSV/CSV files**: One track per line, with an optional header row
//!
//! ## Example
//!
//! ```rust,no_run
//! use autotag::parsing::parse_tracks_file;
//! use std::path::Path;
//!
//! let tracks = parse_tracks_file(Path::new("album.tsv")).unwrap();
//! println!("{} tracks", tracks.len());
//! ```
//!
//! ## Supported Columns
//!
//! TSV/CSV headers (case-insensitive) and JSON keys:
//!
//! | Column | JSON key | Description |
//! |--------|----------|-------------|
//! | title | `title` | Track title |
//! | artist | `artist` | Track artist |
//! | album | `album` | Album title |
//! | albumartist | `album_artist` | Album artist |
//! | length, duration | `duration` | Seconds, or `m:ss` in TSV/CSV |
//! | track | `track_number` | Track number, `n` or `n/total` |
//! | disc | `disc_number` | Disc number, `n` or `n/total` |
//! | year | `year` | Release year |
//! | media, country, label | same | Release details |
//! | mb_albumid | `release_id` | Existing release identifier |
//! | mb_trackid | `recording_id` | Existing recording identifier |
//! | path | `path` | File path, informational |

pub mod json;
pub mod tsv;

use std::path::Path;
use thiserror::Error;

use crate::core::track::LocalTrack;
use crate::utils::validation::MAX_TRACKS;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid track list: {0}")]
    InvalidFormat(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Too many tracks: {0} exceeds maximum allowed ({MAX_TRACKS})")]
    TooManyTracks(usize),
}

/// Parse a track list, choosing the format from the file extension
///
/// # Errors
///
/// Returns `ParseError::UnsupportedFormat` for unknown extensions, or the
/// error of the underlying parser.
pub fn parse_tracks_file(path: &Path) -> Result<Vec<LocalTrack>, ParseError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "json" => json::parse_json_file(path),
        "tsv" | "txt" => tsv::parse_tsv_file(path, b'\t'),
        "csv" => tsv::parse_tsv_file(path, b','),
        other => Err(ParseError::UnsupportedFormat(if other.is_empty() {
            path.display().to_string()
        } else {
            format!(".{other}")
        })),
    }
}
