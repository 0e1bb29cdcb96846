use serde::Deserialize;
use std::path::Path;

use crate::core::track::LocalTrack;
use crate::parsing::ParseError;
use crate::utils::validation::{clean_text, MAX_TRACKS};

#[derive(Deserialize)]
#[serde(untagged)]
enum TrackList {
    Bare(Vec<LocalTrack>),
    Wrapped { tracks: Vec<LocalTrack> },
}

/// Parse a JSON file of local tracks
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or other parse errors
/// if the content is invalid.
pub fn parse_json_file(path: &Path) -> Result<Vec<LocalTrack>, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_json_text(&content)
}

/// Parse a JSON array of tracks, or an object with a `tracks` array.
///
/// Blank strings become absent, tracks without a position get their list
/// index, and non-finite or negative durations are dropped.
///
/// # Errors
///
/// Returns `ParseError::Json` for malformed JSON, `ParseError::InvalidFormat`
/// if the list is empty, or `ParseError::TooManyTracks` if the limit is
/// exceeded.
pub fn parse_json_text(text: &str) -> Result<Vec<LocalTrack>, ParseError> {
    let tracks = match serde_json::from_str::<TrackList>(text)? {
        TrackList::Bare(tracks) | TrackList::Wrapped { tracks } => tracks,
    };

    if tracks.len() > MAX_TRACKS {
        return Err(ParseError::TooManyTracks(tracks.len()));
    }
    if tracks.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No tracks found in file".to_string(),
        ));
    }

    Ok(tracks
        .into_iter()
        .enumerate()
        .map(|(i, track)| clean(track, i))
        .collect())
}

fn clean(track: LocalTrack, index: usize) -> LocalTrack {
    LocalTrack {
        path: clean_text(track.path),
        position: track.position.or(Some(index)),
        title: clean_text(track.title),
        artist: clean_text(track.artist),
        album: clean_text(track.album),
        album_artist: clean_text(track.album_artist),
        duration: track.duration.filter(|d| d.is_finite() && *d >= 0.0),
        track_number: track.track_number.filter(|&n| n > 0),
        disc_number: track.disc_number.filter(|&n| n > 0),
        year: track.year,
        media: clean_text(track.media),
        country: clean_text(track.country),
        label: clean_text(track.label),
        release_id: clean_text(track.release_id),
        recording_id: clean_text(track.recording_id),
    }
}
