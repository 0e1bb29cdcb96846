//! Core data types for music metadata matching.
//!
//! This module provides the fundamental types used throughout the library:
//!
//! - [`LocalTrack`](track::LocalTrack): A snapshot of the tags read from one local audio file
//! - [`LikelyMetadata`](track::LikelyMetadata): Consensus album-level values across a set of local tracks
//! - [`CandidateRelease`](release::CandidateRelease), [`CandidateTrack`](release::CandidateTrack): A normalized release from a metadata backend
//! - [`Field`](types::Field), [`MatchKind`](types::MatchKind): Classification types
//!
//! Local data is read once per session and never mutated by the engine. Candidate
//! releases own a flat list of tracks; alignments refer to those tracks by index.

pub mod release;
pub mod track;
pub mod types;
