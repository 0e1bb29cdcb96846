use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Album artist used when local tracks disagree on their artist
pub const VARIOUS_ARTISTS: &str = "Various Artists";

/// A single local audio file's current tags.
///
/// Every field is optional because real-world files are frequently half-tagged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalTrack {
    /// Path of the file, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Ordered position in the local set, when the caller knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,

    /// Duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disc_number: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Existing release identifier tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_id: Option<String>,

    /// Existing recording identifier tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<String>,
}

impl LocalTrack {
    #[must_use]
    pub fn new(title: impl Into<String>, duration: f64) -> Self {
        Self {
            title: Some(title.into()),
            duration: Some(duration),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    #[must_use]
    pub fn with_album_artist(mut self, album_artist: impl Into<String>) -> Self {
        self.album_artist = Some(album_artist.into());
        self
    }

    #[must_use]
    pub fn with_track_number(mut self, track_number: u32) -> Self {
        self.track_number = Some(track_number);
        self
    }

    #[must_use]
    pub fn with_disc_number(mut self, disc_number: u32) -> Self {
        self.disc_number = Some(disc_number);
        self
    }

    #[must_use]
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn with_release_id(mut self, id: impl Into<String>) -> Self {
        self.release_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_recording_id(mut self, id: impl Into<String>) -> Self {
        self.recording_id = Some(id.into());
        self
    }

    /// Disc number, defaulting to the first disc
    #[must_use]
    pub fn disc(&self) -> u32 {
        self.disc_number.unwrap_or(1)
    }
}

/// Compute each local track's ordinal from the local list alone.
///
/// When every track carries an explicit position, ordinals are the rank by
/// position. Otherwise the list order is used.
#[must_use]
pub fn local_ordinals(tracks: &[LocalTrack]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..tracks.len()).collect();
    if tracks.iter().all(|t| t.position.is_some()) {
        order.sort_by_key(|&i| (tracks[i].position, i));
    }

    let mut ordinals = vec![0; tracks.len()];
    for (rank, &i) in order.iter().enumerate() {
        ordinals[i] = rank;
    }
    ordinals
}

/// Candidate index each local track is expected to occupy.
///
/// `candidate` holds the (disc, track number) of every candidate track, in
/// candidate order. When every local track is numbered, each one is expected
/// at the candidate track with the same position, or where that position would
/// fall among the candidate positions if the candidate lacks it. Otherwise
/// [`local_ordinals`] is used.
#[must_use]
pub fn expected_positions(tracks: &[LocalTrack], candidate: &[(u32, u32)]) -> Vec<usize> {
    let keys: Option<Vec<(u32, u32)>> = tracks
        .iter()
        .map(|t| t.track_number.map(|n| (t.disc(), n)))
        .collect();
    let Some(keys) = keys.filter(|k| !k.is_empty()) else {
        return local_ordinals(tracks);
    };

    keys.iter()
        .map(|key| {
            candidate
                .iter()
                .position(|p| p == key)
                .unwrap_or_else(|| candidate.iter().filter(|&p| p < key).count())
        })
        .collect()
}

/// A value chosen by plurality across local tracks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Likely<T> {
    pub value: T,
    /// True when every track that has the field agrees
    pub consensus: bool,
}

/// Album-level values inferred from a set of local tracks.
///
/// Used to build backend queries and as the local side of release-level
/// comparisons. A field is None when no track carries it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LikelyMetadata {
    pub artist: Option<Likely<String>>,
    pub album: Option<Likely<String>>,
    pub year: Option<Likely<i32>>,
    pub media: Option<Likely<String>>,
    pub country: Option<Likely<String>>,
    pub label: Option<Likely<String>>,
    pub release_id: Option<Likely<String>>,
    /// Highest disc number seen
    pub mediums: Option<u32>,
}

impl LikelyMetadata {
    /// Infer album-level metadata from local tracks.
    ///
    /// The artist is taken from the album artist tag when present. Otherwise the
    /// most common track artist is used; when track artists disagree the set is
    /// treated as a compilation and the artist becomes [`VARIOUS_ARTISTS`].
    #[must_use]
    pub fn from_tracks(tracks: &[LocalTrack]) -> Self {
        let artist = plurality(tracks.iter().filter_map(|t| t.album_artist.clone())).or_else(|| {
            plurality(tracks.iter().filter_map(|t| t.artist.clone())).map(|likely| {
                if likely.consensus {
                    likely
                } else {
                    Likely {
                        value: VARIOUS_ARTISTS.to_string(),
                        consensus: false,
                    }
                }
            })
        });

        Self {
            artist,
            album: plurality(tracks.iter().filter_map(|t| t.album.clone())),
            year: plurality(tracks.iter().filter_map(|t| t.year)),
            media: plurality(tracks.iter().filter_map(|t| t.media.clone())),
            country: plurality(tracks.iter().filter_map(|t| t.country.clone())),
            label: plurality(tracks.iter().filter_map(|t| t.label.clone())),
            release_id: plurality(tracks.iter().filter_map(|t| t.release_id.clone())),
            mediums: tracks.iter().filter_map(|t| t.disc_number).max(),
        }
    }

    #[must_use]
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_ref().map(|l| l.value.as_str())
    }

    #[must_use]
    pub fn album(&self) -> Option<&str> {
        self.album.as_ref().map(|l| l.value.as_str())
    }

    #[must_use]
    pub fn year(&self) -> Option<i32> {
        self.year.as_ref().map(|l| l.value)
    }

    /// Release identifier shared by every local track, if any
    #[must_use]
    pub fn consensus_release_id(&self) -> Option<&str> {
        self.release_id
            .as_ref()
            .filter(|l| l.consensus)
            .map(|l| l.value.as_str())
    }
}

/// Most common value; ties go to the value seen first
fn plurality<T, I>(values: I) -> Option<Likely<T>>
where
    T: Eq + std::hash::Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (seen, value) in values.into_iter().enumerate() {
        counts.entry(value).or_insert((0, seen)).0 += 1;
    }

    let distinct = counts.len();
    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(value, _)| Likely {
            value,
            consensus: distinct == 1,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_likely_artist_consensus() {
        let tracks = vec![
            LocalTrack::new("One", 200.0).with_artist("Low").with_album("Things We Lost"),
            LocalTrack::new("Two", 210.0).with_artist("Low").with_album("Things We Lost"),
        ];
        let likely = LikelyMetadata::from_tracks(&tracks);
        assert_eq!(likely.artist(), Some("Low"));
        assert!(likely.artist.as_ref().unwrap().consensus);
        assert_eq!(likely.album(), Some("Things We Lost"));
    }

    #[test]
    fn test_likely_artist_various() {
        let tracks = vec![
            LocalTrack::new("One", 200.0).with_artist("Low"),
            LocalTrack::new("Two", 210.0).with_artist("Codeine"),
        ];
        let likely = LikelyMetadata::from_tracks(&tracks);
        assert_eq!(likely.artist(), Some(VARIOUS_ARTISTS));
        assert!(!likely.artist.unwrap().consensus);
    }

    #[test]
    fn test_album_artist_overrides_track_artists() {
        let tracks = vec![
            LocalTrack::new("One", 200.0)
                .with_artist("Low feat. Someone")
                .with_album_artist("Low"),
            LocalTrack::new("Two", 210.0).with_artist("Low").with_album_artist("Low"),
        ];
        let likely = LikelyMetadata::from_tracks(&tracks);
        assert_eq!(likely.artist(), Some("Low"));
    }

    #[test]
    fn test_plurality_tie_goes_to_first_seen() {
        let likely = plurality(vec!["b", "a", "a", "b"]).unwrap();
        assert_eq!(likely.value, "b");
        assert!(!likely.consensus);
    }

    #[test]
    fn test_consensus_release_id() {
        let id = "00000000-0000-0000-0000-000000000000";
        let tracks = vec![
            LocalTrack::new("One", 1.0).with_release_id(id),
            LocalTrack::new("Two", 1.0).with_release_id(id),
        ];
        assert_eq!(LikelyMetadata::from_tracks(&tracks).consensus_release_id(), Some(id));

        let mixed = vec![
            LocalTrack::new("One", 1.0).with_release_id(id),
            LocalTrack::new("Two", 1.0).with_release_id("other"),
        ];
        assert_eq!(LikelyMetadata::from_tracks(&mixed).consensus_release_id(), None);
    }

    #[test]
    fn test_local_ordinals_by_position() {
        let tracks = vec![
            LocalTrack::new("c", 1.0).with_position(7),
            LocalTrack::new("a", 1.0).with_position(2),
            LocalTrack::new("b", 1.0).with_position(5),
        ];
        assert_eq!(local_ordinals(&tracks), vec![2, 0, 1]);
    }

    #[test]
    fn test_local_ordinals_fall_back_to_list_order() {
        let tracks = vec![
            LocalTrack::new("a", 1.0).with_position(3),
            LocalTrack::new("b", 1.0),
        ];
        assert_eq!(local_ordinals(&tracks), vec![0, 1]);
    }

    #[test]
    fn test_expected_positions_follow_track_numbers() {
        let candidate = [(1, 1), (1, 2), (1, 3), (1, 4)];
        let tracks = vec![
            LocalTrack::new("c", 1.0).with_track_number(3),
            LocalTrack::new("d", 1.0).with_track_number(4),
        ];
        assert_eq!(expected_positions(&tracks, &candidate), vec![2, 3]);
    }

    #[test]
    fn test_expected_positions_multi_disc() {
        let candidate = [(1, 1), (1, 2), (2, 1), (2, 2)];
        let tracks = vec![
            LocalTrack::new("d2t1", 1.0).with_disc_number(2).with_track_number(1),
            LocalTrack::new("d1t2", 1.0).with_disc_number(1).with_track_number(2),
            LocalTrack::new("d1t1", 1.0).with_track_number(1),
        ];
        assert_eq!(expected_positions(&tracks, &candidate), vec![2, 1, 0]);
    }

    #[test]
    fn test_expected_positions_absent_from_candidate() {
        // Track 5 would sit after the candidate's four tracks on disc 1
        let candidate = [(1, 1), (1, 2), (1, 3), (1, 4), (2, 1)];
        let tracks = vec![
            LocalTrack::new("a", 1.0).with_track_number(1),
            LocalTrack::new("e", 1.0).with_track_number(5),
        ];
        assert_eq!(expected_positions(&tracks, &candidate), vec![0, 4]);
    }

    #[test]
    fn test_expected_positions_fall_back_without_numbers() {
        let candidate = [(1, 1), (1, 2)];
        let tracks = vec![
            LocalTrack::new("a", 1.0).with_track_number(2),
            LocalTrack::new("b", 1.0),
        ];
        assert_eq!(expected_positions(&tracks, &candidate), vec![0, 1]);
        assert!(expected_positions(&[], &candidate).is_empty());
    }

    #[test]
    fn test_deserialize_sparse_track() {
        let track: LocalTrack = serde_json::from_str(r#"{"title": "Untitled"}"#).unwrap();
        assert_eq!(track.title.as_deref(), Some("Untitled"));
        assert!(track.duration.is_none());
        assert_eq!(track.disc(), 1);
    }
}
