use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::backend::{BackendError, MetadataBackend, ReleaseQuery, TrackQuery};
use crate::core::release::CandidateRelease;
use crate::matching::distance::string_distance;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Catalog version for compatibility checking
pub const CATALOG_VERSION: &str = "1.0.0";

/// Largest distance between query and catalog text that still counts as a hit
const SEARCH_CUTOFF: f64 = 0.5;

/// Most results returned by one search
const MAX_SEARCH_RESULTS: usize = 20;

/// Serializable catalog format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogData {
    pub version: String,
    pub created_at: String,
    pub releases: Vec<CandidateRelease>,
}

/// A metadata backend over a local JSON catalog of releases.
///
/// Releases are served exactly as stored; the session normalizes them, so a
/// catalog may contain incomplete entries.
#[derive(Debug)]
pub struct CatalogBackend {
    name: String,

    /// All releases in catalog order
    pub releases: Vec<CandidateRelease>,

    /// Index: release ID -> index in releases vec
    id_to_index: HashMap<String, usize>,

    /// Index: recording ID -> (release index, track index)
    recording_to_track: HashMap<String, (usize, usize)>,
}

impl CatalogBackend {
    /// Create an empty catalog
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            releases: Vec::new(),
            id_to_index: HashMap::new(),
            recording_to_track: HashMap::new(),
        }
    }

    /// Load catalog from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse catalog from JSON string
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let data: CatalogData = serde_json::from_str(json)?;

        // Version check (warn but don't fail)
        if data.version != CATALOG_VERSION {
            tracing::warn!(
                expected = CATALOG_VERSION,
                found = %data.version,
                "Catalog version mismatch"
            );
        }

        let mut catalog = Self::new("catalog");
        for release in data.releases {
            catalog.add_release(release);
        }

        Ok(catalog)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a release to the catalog
    pub fn add_release(&mut self, release: CandidateRelease) {
        let index = self.releases.len();

        let id = release.id.trim().to_lowercase();
        if !id.is_empty() {
            self.id_to_index.entry(id).or_insert(index);
        }

        for (track_index, track) in release.tracks.iter().enumerate() {
            if let Some(recording) = &track.id {
                self.recording_to_track
                    .entry(recording.trim().to_lowercase())
                    .or_insert((index, track_index));
            }
        }

        self.releases.push(release);
    }

    /// Get a release by ID (case-insensitive)
    pub fn get(&self, id: &str) -> Option<&CandidateRelease> {
        self.id_to_index
            .get(&id.trim().to_lowercase())
            .map(|&idx| &self.releases[idx])
    }

    /// Export catalog to JSON
    pub fn to_json(&self) -> Result<String, CatalogError> {
        let data = CatalogData {
            version: CATALOG_VERSION.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            releases: self.releases.clone(),
        };
        Ok(serde_json::to_string_pretty(&data)?)
    }

    /// Number of releases in catalog
    pub fn len(&self) -> usize {
        self.releases.len()
    }

    /// Check if catalog is empty
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// Releases whose artist and title are close to the query, closest first
    fn find_releases(&self, query: &ReleaseQuery) -> Vec<CandidateRelease> {
        let mut hits: Vec<(f64, usize)> = self
            .releases
            .iter()
            .enumerate()
            .filter_map(|(i, release)| {
                let score = text_score(
                    query.artist.as_deref(),
                    &release.artist,
                    query.title.as_deref(),
                    &release.title,
                )?;
                Some((score, i))
            })
            .collect();

        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.into_iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|(_, i)| self.releases[i].clone())
            .collect()
    }

    /// Single-track candidates whose title and artist are close to the query
    fn find_tracks(&self, query: &TrackQuery) -> Vec<CandidateRelease> {
        let mut hits: Vec<(f64, usize, usize)> = Vec::new();
        for (ri, release) in self.releases.iter().enumerate() {
            for (ti, track) in release.tracks.iter().enumerate() {
                let artist = track.artist.as_deref().unwrap_or(&release.artist);
                if let Some(score) =
                    text_score(query.artist.as_deref(), artist, query.title.as_deref(), &track.title)
                {
                    hits.push((score, ri, ti));
                }
            }
        }

        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then((a.1, a.2).cmp(&(b.1, b.2))));
        hits.into_iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|(_, ri, ti)| single_track_release(&self.releases[ri], ti))
            .collect()
    }
}

impl Default for CatalogBackend {
    fn default() -> Self {
        Self::new("catalog")
    }
}

#[async_trait]
impl MetadataBackend for CatalogBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search_release(
        &self,
        query: &ReleaseQuery,
    ) -> Result<Vec<CandidateRelease>, BackendError> {
        Ok(self.find_releases(query))
    }

    async fn search_track(
        &self,
        query: &TrackQuery,
    ) -> Result<Vec<CandidateRelease>, BackendError> {
        Ok(self.find_tracks(query))
    }

    async fn release_for_id(&self, id: &str) -> Result<Option<CandidateRelease>, BackendError> {
        Ok(self.get(id).cloned())
    }

    async fn track_for_id(&self, id: &str) -> Result<Option<CandidateRelease>, BackendError> {
        Ok(self
            .recording_to_track
            .get(&id.trim().to_lowercase())
            .map(|&(ri, ti)| single_track_release(&self.releases[ri], ti)))
    }
}

/// Mean distance of the query terms given, or None if any term misses.
///
/// A query with no terms matches nothing.
fn text_score(
    query_artist: Option<&str>,
    artist: &str,
    query_title: Option<&str>,
    title: &str,
) -> Option<f64> {
    let mut total = 0.0;
    let mut terms = 0.0;
    for (wanted, actual) in [(query_artist, artist), (query_title, title)] {
        let Some(wanted) = wanted.filter(|w| !w.trim().is_empty()) else {
            continue;
        };
        let d = string_distance(Some(wanted), Some(actual), 1.0);
        if d > SEARCH_CUTOFF {
            return None;
        }
        total += d;
        terms += 1.0;
    }
    (terms > 0.0).then(|| total / terms)
}

/// A release reduced to one of its tracks, identified by the recording
fn single_track_release(release: &CandidateRelease, track_index: usize) -> CandidateRelease {
    let track = release.tracks[track_index].clone();
    let id = track
        .id
        .clone()
        .unwrap_or_else(|| format!("{}#{}", release.id, track_index + 1));
    CandidateRelease {
        id,
        track_total: None,
        mediums: None,
        tracks: vec![track],
        ..release.clone()
    }
}
