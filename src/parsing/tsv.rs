use std::path::Path;

use crate::core::track::LocalTrack;
use crate::parsing::ParseError;
use crate::utils::validation::{check_track_limit, clean_text};

/// Columns assumed when the file has no header row
const DEFAULT_COLUMNS: [Column; 4] = [Column::Title, Column::Artist, Column::Album, Column::Length];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Path,
    Title,
    Artist,
    Album,
    AlbumArtist,
    Length,
    Track,
    Disc,
    Year,
    Media,
    Country,
    Label,
    ReleaseId,
    RecordingId,
    Ignored,
}

impl Column {
    fn from_header(name: &str) -> Option<Self> {
        let column = match name.trim().to_lowercase().replace([' ', '_'], "").as_str() {
            "path" | "file" => Self::Path,
            "title" => Self::Title,
            "artist" => Self::Artist,
            "album" => Self::Album,
            "albumartist" => Self::AlbumArtist,
            "length" | "duration" => Self::Length,
            "track" | "tracknumber" => Self::Track,
            "disc" | "discnumber" => Self::Disc,
            "year" | "date" => Self::Year,
            "media" => Self::Media,
            "country" => Self::Country,
            "label" => Self::Label,
            "mbalbumid" | "releaseid" => Self::ReleaseId,
            "mbtrackid" | "recordingid" => Self::RecordingId,
            _ => return None,
        };
        Some(column)
    }
}

/// Parse a TSV/CSV file of local tracks
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or other parse errors
/// if the content is invalid.
pub fn parse_tsv_file(path: &Path, delimiter: u8) -> Result<Vec<LocalTrack>, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_tsv_text(&content, delimiter)
}

/// Parse TSV/CSV text with one track per record.
///
/// The first non-comment record is a header if its first field names a known
/// column; unknown header columns are ignored. Without a header the columns are
/// title, artist, album, length. CSV fields may be quoted; TSV fields are read
/// verbatim, so titles keep any literal quotes.
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` if a value cannot be parsed or no tracks
/// are found, `ParseError::Csv` if the text cannot be split into records, or
/// `ParseError::TooManyTracks` if the limit is exceeded.
pub fn parse_tsv_text(text: &str, delimiter: u8) -> Result<Vec<LocalTrack>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .quoting(delimiter != b'\t')
        .from_reader(text.as_bytes());

    let mut tracks = Vec::new();
    let mut columns: Vec<Column> = DEFAULT_COLUMNS.to_vec();
    let mut first_record = true;

    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        // Check if the first record is a header
        if first_record {
            first_record = false;
            if record.get(0).and_then(Column::from_header).is_some() {
                columns = record
                    .iter()
                    .map(|f| Column::from_header(f).unwrap_or(Column::Ignored))
                    .collect();
                continue;
            }
        }

        // Line numbers in errors are 1-based for user friendliness
        let line_num = record
            .position()
            .and_then(|p| usize::try_from(p.line()).ok())
            .unwrap_or(0);

        if check_track_limit(tracks.len()).is_some() {
            return Err(ParseError::TooManyTracks(tracks.len() + 1));
        }

        let mut track = LocalTrack {
            position: Some(tracks.len()),
            ..LocalTrack::default()
        };
        for (column, value) in columns.iter().zip(record.iter()) {
            apply(&mut track, *column, value, line_num)?;
        }
        tracks.push(track);
    }

    if tracks.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No tracks found in file".to_string(),
        ));
    }

    Ok(tracks)
}

fn apply(track: &mut LocalTrack, column: Column, raw: &str, line_num: usize) -> Result<(), ParseError> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(());
    }
    let text = || clean_text(Some(value.to_string()));

    match column {
        Column::Path => track.path = text(),
        Column::Title => track.title = text(),
        Column::Artist => track.artist = text(),
        Column::Album => track.album = text(),
        Column::AlbumArtist => track.album_artist = text(),
        Column::Media => track.media = text(),
        Column::Country => track.country = text(),
        Column::Label => track.label = text(),
        Column::ReleaseId => track.release_id = text(),
        Column::RecordingId => track.recording_id = text(),
        Column::Length => {
            track.duration = Some(parse_duration(value).ok_or_else(|| invalid("length", value, line_num))?);
        }
        Column::Track => {
            track.track_number = Some(parse_index(value).ok_or_else(|| invalid("track", value, line_num))?);
        }
        Column::Disc => {
            track.disc_number = Some(parse_index(value).ok_or_else(|| invalid("disc", value, line_num))?);
        }
        Column::Year => {
            // Accept full dates; only the year is kept
            let year = value
                .get(..4)
                .and_then(|y| y.parse::<i32>().ok())
                .filter(|y| (1..=9999).contains(y))
                .ok_or_else(|| invalid("year", value, line_num))?;
            track.year = Some(year);
        }
        Column::Ignored => {}
    }
    Ok(())
}

fn invalid(column: &str, value: &str, line_num: usize) -> ParseError {
    ParseError::InvalidFormat(format!("Invalid {column} on line {line_num}: '{value}'"))
}

/// Seconds as a number, or `m:ss` / `h:mm:ss`
fn parse_duration(value: &str) -> Option<f64> {
    let mut seconds = 0.0;
    for part in value.split(':') {
        let n: f64 = part.trim().parse().ok()?;
        if !n.is_finite() || n < 0.0 {
            return None;
        }
        seconds = seconds * 60.0 + n;
    }
    Some(seconds)
}

/// `n` or `n/total`; zero is rejected
fn parse_index(value: &str) -> Option<u32> {
    let number = value.split('/').next()?.trim();
    number.parse().ok().filter(|&n| n > 0)
}
