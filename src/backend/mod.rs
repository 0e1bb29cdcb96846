//! Metadata backends that supply candidate releases.
//!
//! A backend is anything implementing [`MetadataBackend`]. A session holds an
//! ordered list of them; the order is the tie-break priority when two
//! candidates score the same.

pub mod catalog;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::core::release::CandidateRelease;

pub use catalog::CatalogBackend;

/// Failure of one backend call. Never fatal to a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Request timed out")]
    Timeout,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Album search terms
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseQuery {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub track_count: Option<usize>,
}

/// Single-track search terms
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackQuery {
    pub artist: Option<String>,
    pub title: Option<String>,
}

/// A source of candidate releases
#[async_trait]
pub trait MetadataBackend: Send + Sync {
    /// Short name used in warnings and output
    fn name(&self) -> &str;

    /// Candidate releases for an album
    async fn search_release(
        &self,
        query: &ReleaseQuery,
    ) -> Result<Vec<CandidateRelease>, BackendError>;

    /// Candidates for a single track, each a release carrying the matching
    /// track(s)
    async fn search_track(&self, query: &TrackQuery)
        -> Result<Vec<CandidateRelease>, BackendError>;

    /// Look up one release by identifier
    async fn release_for_id(&self, _id: &str) -> Result<Option<CandidateRelease>, BackendError> {
        Ok(None)
    }

    /// Look up one track by recording identifier
    async fn track_for_id(&self, _id: &str) -> Result<Option<CandidateRelease>, BackendError> {
        Ok(None)
    }
}
