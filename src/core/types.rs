use serde::{Deserialize, Serialize};

/// What a session is matching: a group of tracks or a single track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Album,
    Singleton,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Album => write!(f, "album"),
            Self::Singleton => write!(f, "singleton"),
        }
    }
}

/// A weighted comparison that contributes to a candidate's distance.
///
/// Release-level fields are compared once per candidate; track-level fields are
/// compared per aligned track pair (album matching) or once (singleton matching).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Album,
    Artist,
    Year,
    Media,
    Mediums,
    Country,
    Label,
    AlbumId,
    /// Mean per-track alignment cost
    Tracks,
    /// Missing and extra tracks
    TrackCount,
    TrackTitle,
    TrackArtist,
    TrackIndex,
    TrackLength,
    TrackId,
}

impl Field {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Year => "year",
            Self::Media => "media",
            Self::Mediums => "mediums",
            Self::Country => "country",
            Self::Label => "label",
            Self::AlbumId => "album_id",
            Self::Tracks => "tracks",
            Self::TrackCount => "track_count",
            Self::TrackTitle => "track_title",
            Self::TrackArtist => "track_artist",
            Self::TrackIndex => "track_index",
            Self::TrackLength => "track_length",
            Self::TrackId => "track_id",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How confidently a session identified a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    None,
    Ambiguous,
    Strong,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "no match"),
            Self::Ambiguous => write!(f, "ambiguous match"),
            Self::Strong => write!(f, "strong match"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Strong > Confidence::Ambiguous);
        assert!(Confidence::Ambiguous > Confidence::None);
        assert_eq!(Confidence::Ambiguous.to_string(), "ambiguous match");
    }

    #[test]
    fn test_field_serde_matches_display() {
        for field in [Field::Album, Field::TrackCount, Field::TrackLength, Field::AlbumId] {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{field}\""));
        }
    }
}
