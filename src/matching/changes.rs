//! Field-level change-sets for an accepted match.
//!
//! The engine never writes tags itself. It describes, per local track, which
//! tag goes from which old value to which new value; the caller persists it.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::release::CandidateRelease;
use crate::core::track::{LocalTrack, VARIOUS_ARTISTS};
use crate::core::types::MatchKind;
use crate::matching::scoring::ScoredCandidate;

/// One tag update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<String>,
    pub new: String,
}

/// Updates for one local track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackChanges {
    /// Index into the local track list
    pub local_index: usize,
    /// Index of the candidate track it was matched to
    pub candidate_index: usize,
    pub changes: Vec<FieldChange>,
}

/// Everything the caller needs to apply a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyPlan {
    pub kind: MatchKind,
    pub candidate_id: String,
    pub source: String,
    pub tracks: Vec<TrackChanges>,
    /// Local tracks with no counterpart; left untouched
    pub unmatched_local: Vec<usize>,
}

impl ApplyPlan {
    /// Build the change-set for a chosen candidate.
    ///
    /// Only fields whose value would actually change are listed. `set_fields`
    /// are written to every matched track after the candidate's values.
    #[must_use]
    pub fn build(
        kind: MatchKind,
        local: &[LocalTrack],
        chosen: &ScoredCandidate,
        set_fields: &BTreeMap<String, String>,
    ) -> Self {
        let release = &chosen.release;
        let tracks = chosen
            .alignment
            .pairs
            .iter()
            .filter_map(|pair| {
                let track = local.get(pair.local)?;
                let mut new_values = match kind {
                    MatchKind::Album => album_values(release, pair.candidate),
                    MatchKind::Singleton => singleton_values(release, pair.candidate),
                };
                for (field, value) in set_fields {
                    upsert(&mut new_values, field, value.clone());
                }

                let changes = new_values
                    .into_iter()
                    .filter_map(|(field, new)| {
                        let old = current_value(track, &field);
                        (old.as_deref() != Some(new.as_str())).then_some(FieldChange {
                            field,
                            old,
                            new,
                        })
                    })
                    .collect();

                Some(TrackChanges {
                    local_index: pair.local,
                    candidate_index: pair.candidate,
                    changes,
                })
            })
            .collect();

        Self {
            kind,
            candidate_id: release.id.clone(),
            source: chosen.source.clone(),
            tracks,
            unmatched_local: chosen.alignment.unmatched_local.clone(),
        }
    }

    /// Number of individual tag updates
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.tracks.iter().map(|t| t.changes.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }
}

fn album_values(release: &CandidateRelease, index: usize) -> Vec<(String, String)> {
    let Some(track) = release.tracks.get(index) else {
        return Vec::new();
    };
    let various = release.is_various_artists();

    let mut values = vec![
        ("title".to_string(), track.title.clone()),
        ("artist".to_string(), release.track_artist(index).to_string()),
        ("album".to_string(), release.title.clone()),
        (
            "albumartist".to_string(),
            if various {
                VARIOUS_ARTISTS.to_string()
            } else {
                release.artist.clone()
            },
        ),
        ("mb_albumid".to_string(), release.id.clone()),
    ];
    if let Some(n) = track.track_number {
        values.push(("track".to_string(), n.to_string()));
    }
    if let Some(d) = track.disc_number {
        values.push(("disc".to_string(), d.to_string()));
    }
    if let Some(total) = release.track_total {
        values.push(("tracktotal".to_string(), total.to_string()));
    }
    if let Some(mediums) = release.mediums {
        values.push(("disctotal".to_string(), mediums.to_string()));
    }
    if let Some(year) = release.year {
        values.push(("year".to_string(), year.to_string()));
    }
    for (name, value) in [
        ("media", &release.media),
        ("country", &release.country),
        ("label", &release.label),
    ] {
        if let Some(v) = value {
            values.push((name.to_string(), v.clone()));
        }
    }
    if let Some(id) = &track.id {
        values.push(("mb_trackid".to_string(), id.clone()));
    }
    if various {
        values.push(("comp".to_string(), "true".to_string()));
    }
    values
}

fn singleton_values(release: &CandidateRelease, index: usize) -> Vec<(String, String)> {
    let Some(track) = release.tracks.get(index) else {
        return Vec::new();
    };
    let mut values = vec![
        ("title".to_string(), track.title.clone()),
        ("artist".to_string(), release.track_artist(index).to_string()),
    ];
    if let Some(id) = &track.id {
        values.push(("mb_trackid".to_string(), id.clone()));
    }
    values
}

fn upsert(values: &mut Vec<(String, String)>, field: &str, value: String) {
    match values.iter_mut().find(|(f, _)| f == field) {
        Some(entry) => entry.1 = value,
        None => values.push((field.to_string(), value)),
    }
}

/// Current value of a tag on a local track, for the tags the engine knows
fn current_value(track: &LocalTrack, field: &str) -> Option<String> {
    match field {
        "title" => track.title.clone(),
        "artist" => track.artist.clone(),
        "album" => track.album.clone(),
        "albumartist" => track.album_artist.clone(),
        "track" => track.track_number.map(|n| n.to_string()),
        "disc" => track.disc_number.map(|n| n.to_string()),
        "year" => track.year.map(|y| y.to_string()),
        "media" => track.media.clone(),
        "country" => track.country.clone(),
        "label" => track.label.clone(),
        "mb_albumid" => track.release_id.clone(),
        "mb_trackid" => track.recording_id.clone(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use crate::core::release::CandidateTrack;
    use crate::core::track::LikelyMetadata;
    use crate::matching::scoring::{score_album, score_track};

    fn release() -> CandidateRelease {
        CandidateRelease::new("rel-1", "Songs", "Band")
            .with_year(2001)
            .with_tracks(vec![
                CandidateTrack::new("First", 120.0).with_id("rec-1"),
                CandidateTrack::new("Second", 150.0),
            ])
            .normalize()
            .unwrap()
    }

    fn plan(local: &[LocalTrack], release: &CandidateRelease, config: &MatchConfig) -> ApplyPlan {
        let scored = score_album(local, &LikelyMetadata::from_tracks(local), release, config)
            .unwrap()
            .with_source("catalog", 0);
        ApplyPlan::build(MatchKind::Album, local, &scored, &config.set_fields)
    }

    fn change<'a>(plan: &'a ApplyPlan, local: usize, field: &str) -> Option<&'a FieldChange> {
        plan.tracks
            .iter()
            .find(|t| t.local_index == local)?
            .changes
            .iter()
            .find(|c| c.field == field)
    }

    #[test]
    fn test_album_plan_lists_only_changes() {
        let local = vec![
            LocalTrack::new("first", 121.0).with_artist("Band").with_track_number(1),
            LocalTrack::new("Second", 150.0).with_artist("Band").with_track_number(2),
        ];
        let plan = plan(&local, &release(), &MatchConfig::default());

        assert_eq!(plan.candidate_id, "rel-1");
        assert_eq!(plan.source, "catalog");
        let title = change(&plan, 0, "title").unwrap();
        assert_eq!(title.old.as_deref(), Some("first"));
        assert_eq!(title.new, "First");
        assert!(change(&plan, 1, "title").is_none());
        assert!(change(&plan, 0, "artist").is_none());
        assert_eq!(change(&plan, 0, "mb_trackid").unwrap().new, "rec-1");
        assert_eq!(change(&plan, 1, "year").unwrap().new, "2001");
        assert!(change(&plan, 0, "comp").is_none());
    }

    #[test]
    fn test_set_fields_applied_to_every_track() {
        let mut config = MatchConfig::default();
        config
            .set_fields
            .insert("genre".to_string(), "Indie".to_string());
        config
            .set_fields
            .insert("album".to_string(), "Songs (Remastered)".to_string());
        let local = vec![
            LocalTrack::new("First", 120.0),
            LocalTrack::new("Second", 150.0),
        ];
        let plan = plan(&local, &release(), &config);
        for i in 0..2 {
            assert_eq!(change(&plan, i, "genre").unwrap().new, "Indie");
            assert_eq!(change(&plan, i, "album").unwrap().new, "Songs (Remastered)");
        }
    }

    #[test]
    fn test_compilation_plan() {
        let release = CandidateRelease::new("va", "Mix", "Various Artists")
            .with_tracks(vec![CandidateTrack::new("Song", 200.0).with_artist("Low")])
            .normalize()
            .unwrap();
        let local = vec![LocalTrack::new("Song", 200.0)];
        let plan = plan(&local, &release, &MatchConfig::default());
        assert_eq!(change(&plan, 0, "artist").unwrap().new, "Low");
        assert_eq!(change(&plan, 0, "albumartist").unwrap().new, VARIOUS_ARTISTS);
        assert_eq!(change(&plan, 0, "comp").unwrap().new, "true");
    }

    #[test]
    fn test_unmatched_local_tracks_untouched() {
        let local = vec![
            LocalTrack::new("First", 120.0),
            LocalTrack::new("Second", 150.0),
            LocalTrack::new("Hidden Bonus Track", 900.0),
        ];
        let plan = plan(&local, &release(), &MatchConfig::default());
        assert_eq!(plan.unmatched_local, vec![2]);
        assert!(plan.tracks.iter().all(|t| t.local_index != 2));
        assert!(plan.change_count() > 0);
    }

    #[test]
    fn test_singleton_plan() {
        let local = LocalTrack::new("first", 120.0).with_artist("Band");
        let config = MatchConfig::default();
        let scored = score_track(&local, &release(), &config).unwrap();
        let plan = ApplyPlan::build(
            MatchKind::Singleton,
            std::slice::from_ref(&local),
            &scored,
            &config.set_fields,
        );
        assert_eq!(plan.kind, MatchKind::Singleton);
        assert_eq!(change(&plan, 0, "title").unwrap().new, "First");
        assert!(change(&plan, 0, "album").is_none());
        assert_eq!(change(&plan, 0, "mb_trackid").unwrap().new, "rec-1");
    }

    #[test]
    fn test_no_changes_when_already_tagged() {
        let release = CandidateRelease::new("r", "A", "B")
            .with_tracks(vec![CandidateTrack::new("T", 100.0)])
            .normalize()
            .unwrap();
        let local = vec![LocalTrack {
            title: Some("T".to_string()),
            artist: Some("B".to_string()),
            album: Some("A".to_string()),
            album_artist: Some("B".to_string()),
            track_number: Some(1),
            disc_number: Some(1),
            release_id: Some("r".to_string()),
            duration: Some(100.0),
            ..LocalTrack::default()
        }];
        let plan = plan(&local, &release, &MatchConfig::default());
        // tracktotal and disctotal are not tracked on local files
        let fields: Vec<&str> = plan.tracks[0]
            .changes
            .iter()
            .map(|c| c.field.as_str())
            .collect();
        assert_eq!(fields, vec!["tracktotal", "disctotal"]);
    }
}
