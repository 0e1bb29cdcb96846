//! Candidate scoring and the match decision.
//!
//! This module provides the core matching functionality:
//!
//! - [`MatchSession`]: Main entry point; queries backends and returns a decision
//! - [`Distance`]: Weighted per-field distance between local data and a candidate
//! - [`Decision`]: Strong, ambiguous or no match
//! - [`ApplyPlan`]: Tag changes for an accepted match
//!
//! ## Matching Algorithm
//!
//! For each candidate release:
//!
//! 1. **Normalization**: Required fields are checked and derived fields filled
//! 2. **Alignment**: Local tracks are assigned to candidate tracks by a
//!    minimum-cost assignment that may leave tracks on either side unmatched
//! 3. **Field distances**: Release-level fields are compared with the likely
//!    album metadata of the local tracks
//! 4. **Aggregation**: Weighted mean of the field distances
//!
//! ## Scoring
//!
//! Every distance lies in [0, 1], with 0 meaning identical. The total combines:
//!
//! - **Album, artist, year**: String and numeric comparisons
//! - **Media, mediums, country, label**: Only when the local tracks carry them
//! - **Album ID**: Only when local tracks agree on a release identifier
//! - **Tracks**: Mean cost of aligned track pairs
//! - **Track count**: Fraction of missing and extra tracks
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use autotag::{
//!     CatalogBackend, LocalTrack, MatchConfig, MatchSession, MetadataBackend, SessionOptions,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let catalog = CatalogBackend::load_from_file(Path::new("releases.json"))?;
//! let backends: Vec<Arc<dyn MetadataBackend>> = vec![Arc::new(catalog)];
//! let session = MatchSession::new(MatchConfig::default(), backends)?;
//!
//! let tracks = vec![LocalTrack::new("Come Together", 259.0).with_artist("The Beatles")];
//! let outcome = session.match_album(&tracks, &SessionOptions::default()).await;
//!
//! for candidate in outcome.decision.candidates() {
//!     println!("{}: {:.3}", candidate.release.title, candidate.total());
//! }
//! # Ok(())
//! # }
//! ```

pub mod alignment;
pub mod changes;
pub mod distance;
pub mod recommend;
pub mod scoring;
pub mod session;

pub use alignment::{Alignment, AlignmentError};
pub use changes::{ApplyPlan, FieldChange, TrackChanges};
pub use recommend::{recommend, Decision};
pub use scoring::{Distance, ScoredCandidate};
pub use session::{MatchSession, SessionOptions, SessionOutcome, SessionWarning};
