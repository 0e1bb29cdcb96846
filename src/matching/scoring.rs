use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{DistanceWeights, MatchConfig};
use crate::core::release::{CandidateError, CandidateRelease};
use crate::core::track::{expected_positions, LikelyMetadata, LocalTrack};
use crate::core::types::Field;
use crate::matching::alignment::{align, Alignment, AlignmentError, CostMatrix};
use crate::matching::distance::{
    categorical_distance, duration_distance, identifier_distance, index_distance,
    string_distance, year_distance,
};
use crate::utils::validation::count_to_f64;

/// One field's distance and the weight it carried
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldDistance {
    pub distance: f64,
    pub weight: f64,
}

/// Weighted distance between local data and one candidate.
///
/// Only fields that were in play are present; the total is the weighted mean of
/// their distances and is always in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distance {
    pub fields: BTreeMap<Field, FieldDistance>,
    pub total: f64,
}

impl Distance {
    /// Distance per field, without weights
    #[must_use]
    pub fn breakdown(&self) -> BTreeMap<Field, f64> {
        self.fields.iter().map(|(f, d)| (*f, d.distance)).collect()
    }

    #[must_use]
    pub fn get(&self, field: Field) -> Option<f64> {
        self.fields.get(&field).map(|d| d.distance)
    }

    /// Sum of the weights of every field in play
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.fields.values().map(|d| d.weight).sum()
    }

    /// Share of the total contributed by one field
    #[must_use]
    pub fn contribution(&self, field: Field) -> f64 {
        let total_weight = self.total_weight();
        match self.fields.get(&field) {
            Some(d) if total_weight > 0.0 => d.weight * d.distance / total_weight,
            _ => 0.0,
        }
    }

    /// Fields ordered by how much they add to the total, largest first
    #[must_use]
    pub fn worst_fields(&self) -> Vec<(Field, f64)> {
        let mut fields: Vec<(Field, f64)> = self
            .fields
            .keys()
            .map(|f| (*f, self.contribution(*f)))
            .filter(|(_, c)| *c > 0.0)
            .collect();
        fields.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        fields
    }
}

/// Accumulates field distances and computes the weighted total
struct DistanceBuilder<'a> {
    weights: &'a DistanceWeights,
    fields: BTreeMap<Field, FieldDistance>,
}

impl<'a> DistanceBuilder<'a> {
    fn new(weights: &'a DistanceWeights) -> Self {
        Self {
            weights,
            fields: BTreeMap::new(),
        }
    }

    fn add(&mut self, field: Field, distance: f64) {
        let distance = if distance.is_nan() { 1.0 } else { distance.clamp(0.0, 1.0) };
        self.fields.insert(
            field,
            FieldDistance {
                distance,
                weight: self.weights.get(field),
            },
        );
    }

    fn add_opt(&mut self, field: Field, distance: Option<f64>) {
        if let Some(d) = distance {
            self.add(field, d);
        }
    }

    /// `neutral` is used when no weight is in play
    fn build(self, neutral: f64) -> Distance {
        let total_weight: f64 = self.fields.values().map(|d| d.weight).sum();
        let total = if total_weight > 0.0 {
            let weighted: f64 = self.fields.values().map(|d| d.weight * d.distance).sum();
            (weighted / total_weight).clamp(0.0, 1.0)
        } else {
            neutral
        };
        Distance {
            fields: self.fields,
            total,
        }
    }
}

/// A candidate with its alignment and distance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub release: CandidateRelease,
    pub alignment: Alignment,
    pub distance: Distance,
    /// Name of the backend that produced the candidate
    pub source: String,
    /// Backend order; lower wins ties
    pub source_priority: usize,
}

impl ScoredCandidate {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.distance.total
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>, priority: usize) -> Self {
        self.source = source.into();
        self.source_priority = priority;
        self
    }
}

/// Distance between one local track and one candidate track.
///
/// Fields compared:
/// - title, always
/// - artist, when the candidate track credits its own artist or the release is
///   a compilation
/// - track number, when the local track has one
/// - length
/// - recording id, when both sides carry one
#[must_use]
pub fn track_distance(
    local: &LocalTrack,
    release: &CandidateRelease,
    index: usize,
    config: &MatchConfig,
) -> Distance {
    let Some(candidate) = release.tracks.get(index) else {
        return Distance {
            fields: BTreeMap::new(),
            total: 1.0,
        };
    };
    let missing = config.missing_distance;
    let tol = &config.tolerances;
    let mut dist = DistanceBuilder::new(&config.weights);

    dist.add(
        Field::TrackTitle,
        string_distance(local.title.as_deref(), Some(&candidate.title), missing),
    );

    if candidate.artist.is_some() || release.is_various_artists() {
        dist.add(
            Field::TrackArtist,
            string_distance(local.artist.as_deref(), Some(release.track_artist(index)), missing),
        );
    }

    if local.track_number.is_some() {
        dist.add(
            Field::TrackIndex,
            index_distance(local.track_number, candidate.track_number, missing),
        );
    }

    if local.duration.is_some() || candidate.duration.is_some() {
        dist.add(
            Field::TrackLength,
            duration_distance(
                local.duration,
                candidate.duration,
                tol.duration_grace,
                tol.duration_max,
                missing,
            ),
        );
    }

    dist.add_opt(
        Field::TrackId,
        identifier_distance(local.recording_id.as_deref(), candidate.id.as_deref()),
    );

    dist.build(missing)
}

/// Score a normalized candidate release against a group of local tracks.
///
/// Equal-cost alignments are resolved toward the local track numbers, or the
/// local list order when tracks are unnumbered.
///
/// Release-level fields compare the likely album metadata with the release.
/// Media, mediums, country and label are only compared when the local tracks
/// carry them. The `tracks` field is the mean cost of the aligned pairs and the
/// `track_count` field penalizes missing and extra tracks.
///
/// # Errors
///
/// Returns `CandidateError::AlignmentInfeasible` if the release has no tracks
/// while local tracks exist, or the alignment cannot be computed.
pub fn score_album(
    local: &[LocalTrack],
    likely: &LikelyMetadata,
    release: &CandidateRelease,
    config: &MatchConfig,
) -> Result<ScoredCandidate, CandidateError> {
    if release.tracks.is_empty() && !local.is_empty() {
        return Err(CandidateError::AlignmentInfeasible {
            id: release.id.clone(),
            reason: "release has no tracks".to_string(),
        });
    }

    let costs = CostMatrix::from_fn(local.len(), release.tracks.len(), |i, j| {
        track_distance(&local[i], release, j, config).total
    });
    let alignment = align(
        &costs,
        &expected_positions(local, &release.positions()),
        config.alignment.unmatched_cost,
    )
    .map_err(|e| infeasible(release, &e))?;

    let missing = config.missing_distance;
    let tol = &config.tolerances;
    let mut dist = DistanceBuilder::new(&config.weights);

    dist.add(
        Field::Album,
        string_distance(likely.album(), Some(&release.title), missing),
    );
    dist.add(
        Field::Artist,
        string_distance(likely.artist(), Some(&release.artist), missing),
    );
    if likely.year.is_some() || release.year.is_some() {
        dist.add(
            Field::Year,
            year_distance(likely.year(), release.year, tol.year, missing),
        );
    }
    if let Some(media) = &likely.media {
        dist.add(
            Field::Media,
            categorical_distance(
                Some(&media.value),
                release.media.as_deref(),
                &tol.media_partial_credit,
                missing,
            ),
        );
    }
    if likely.mediums.is_some() {
        dist.add(
            Field::Mediums,
            index_distance(likely.mediums, release.mediums, missing),
        );
    }
    if let Some(country) = &likely.country {
        dist.add(
            Field::Country,
            categorical_distance(Some(&country.value), release.country.as_deref(), &[], missing),
        );
    }
    if let Some(label) = &likely.label {
        dist.add(
            Field::Label,
            categorical_distance(Some(&label.value), release.label.as_deref(), &[], missing),
        );
    }
    dist.add_opt(
        Field::AlbumId,
        identifier_distance(likely.consensus_release_id(), Some(&release.id)),
    );

    dist.add(Field::Tracks, alignment.mean_pair_cost().unwrap_or(1.0));
    dist.add(
        Field::TrackCount,
        track_count_distance(&alignment, local.len(), release.tracks.len(), config),
    );

    Ok(ScoredCandidate {
        release: release.clone(),
        alignment,
        distance: dist.build(missing),
        source: String::new(),
        source_priority: 0,
    })
}

/// Score a normalized candidate against one local track.
///
/// The candidate's closest track is chosen (lowest index on ties) and the
/// track-level fields of that pair form the distance.
///
/// # Errors
///
/// Returns `CandidateError::AlignmentInfeasible` if the candidate has no tracks.
pub fn score_track(
    local: &LocalTrack,
    release: &CandidateRelease,
    config: &MatchConfig,
) -> Result<ScoredCandidate, CandidateError> {
    let best = (0..release.tracks.len())
        .map(|j| (j, singleton_distance(local, release, j, config)))
        .min_by(|(ja, a), (jb, b)| a.total.total_cmp(&b.total).then(ja.cmp(jb)));

    let Some((index, distance)) = best else {
        return Err(CandidateError::AlignmentInfeasible {
            id: release.id.clone(),
            reason: "candidate has no tracks".to_string(),
        });
    };

    Ok(ScoredCandidate {
        release: release.clone(),
        alignment: Alignment::single(index, distance.total),
        distance,
        source: String::new(),
        source_priority: 0,
    })
}

/// Like [`track_distance`], but the artist is always compared and the track
/// number is not, since a lone file has no album position to check.
fn singleton_distance(
    local: &LocalTrack,
    release: &CandidateRelease,
    index: usize,
    config: &MatchConfig,
) -> Distance {
    let candidate = &release.tracks[index];
    let missing = config.missing_distance;
    let tol = &config.tolerances;
    let mut dist = DistanceBuilder::new(&config.weights);

    dist.add(
        Field::TrackTitle,
        string_distance(local.title.as_deref(), Some(&candidate.title), missing),
    );
    dist.add(
        Field::TrackArtist,
        string_distance(local.artist.as_deref(), Some(release.track_artist(index)), missing),
    );
    if local.duration.is_some() || candidate.duration.is_some() {
        dist.add(
            Field::TrackLength,
            duration_distance(
                local.duration,
                candidate.duration,
                tol.duration_grace,
                tol.duration_max,
                missing,
            ),
        );
    }
    dist.add_opt(
        Field::TrackId,
        identifier_distance(local.recording_id.as_deref(), candidate.id.as_deref()),
    );

    dist.build(missing)
}

/// `min(1, penalty × (missing + extra) / max(m, n))`
fn track_count_distance(
    alignment: &Alignment,
    local_count: usize,
    candidate_count: usize,
    config: &MatchConfig,
) -> f64 {
    let largest = local_count.max(candidate_count);
    if largest == 0 {
        return 0.0;
    }
    let unmatched = alignment.unmatched_local.len() + alignment.unmatched_candidate.len();
    (config.unmatched_track_penalty * count_to_f64(unmatched) / count_to_f64(largest)).min(1.0)
}

fn infeasible(release: &CandidateRelease, err: &AlignmentError) -> CandidateError {
    CandidateError::AlignmentInfeasible {
        id: release.id.clone(),
        reason: err.to_string(),
    }
}
