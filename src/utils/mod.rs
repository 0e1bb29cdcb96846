//! Shared helpers: input limits, identifier validation and numeric conversions.

pub mod validation;
