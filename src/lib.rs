//! # autotag
//!
//! A library for identifying which release a set of local music tracks belongs to.
//!
//! Files ripped or downloaded from various sources carry tags of varying
//! quality: titles are misspelled, track numbers are missing, bonus tracks
//! appear or go missing. `autotag` compares what the files say about
//! themselves against candidate releases from one or more metadata backends
//! and decides whether one release is a confident match.
//!
//! ## Features
//!
//! - **Weighted distance**: Per-field distances combined into one total in [0, 1]
//! - **Track alignment**: Optimal assignment of local tracks to release tracks,
//!   tolerating reordering as well as missing and extra tracks
//! - **Recommendation**: Strong match, ambiguous shortlist, or no match
//! - **Concurrent backends**: Bounded fan-out with timeouts and cancellation
//! - **Change-sets**: The exact tag updates implied by accepting a match
//!
//! ## Example
//!
//! ```rust,no_run
//! use autotag::{CandidateRelease, CandidateTrack, LikelyMetadata, LocalTrack, MatchConfig};
//! use autotag::matching::scoring::score_album;
//!
//! let local = vec![
//!     LocalTrack::new("Come Together", 259.0).with_artist("The Beatles").with_track_number(1),
//!     LocalTrack::new("Something", 182.0).with_artist("The Beatles").with_track_number(2),
//! ];
//! let release = CandidateRelease::new("abbey-road", "Abbey Road", "The Beatles")
//!     .with_tracks(vec![
//!         CandidateTrack::new("Come Together", 259.0),
//!         CandidateTrack::new("Something", 183.0),
//!     ])
//!     .normalize()
//!     .unwrap();
//!
//! let likely = LikelyMetadata::from_tracks(&local);
//! let scored = score_album(&local, &likely, &release, &MatchConfig::default()).unwrap();
//! println!("{}: {:.3}", scored.release.title, scored.total());
//! ```
//!
//! ## Modules
//!
//! - [`backend`]: Metadata backend trait and the JSON catalog backend
//! - [`config`]: Weights, thresholds and tolerances
//! - [`core`]: Local tracks, candidate releases and shared types
//! - [`matching`]: Distances, alignment, recommendation and the match session
//! - [`parsing`]: Readers for local track listings (JSON, TSV, CSV)
//! - [`cli`]: Command-line interface implementation

pub mod backend;
pub mod cli;
pub mod config;
pub mod core;
pub mod matching;
pub mod parsing;
pub mod utils;

// Re-export commonly used types for convenience
pub use backend::{BackendError, CatalogBackend, MetadataBackend};
pub use config::{ConfigError, MatchConfig};
pub use core::release::{CandidateError, CandidateRelease, CandidateTrack};
pub use core::track::{LikelyMetadata, LocalTrack};
pub use core::types::*;
pub use matching::{
    ApplyPlan, Decision, MatchSession, ScoredCandidate, SessionOptions, SessionOutcome,
    SessionWarning,
};
