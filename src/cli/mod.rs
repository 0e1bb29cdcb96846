//! Command-line interface for autotag.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **identify**: Match local tracks against one or more release catalogs
//! - **compare**: Show the full distance breakdown against one release
//! - **catalog**: List or show releases in a catalog
//! - **config**: Print the effective configuration
//!
//! ## Usage
//!
//! ```text
//! # Identify an album from a TSV export of its tags
//! autotag identify album.tsv --catalog releases.json
//!
//! # JSON output with the change-set for the best match
//! autotag identify album.tsv --catalog releases.json --plan --format json
//!
//! # Match a single track
//! autotag identify track.json --catalog releases.json --singleton
//!
//! # Why does this release score the way it does?
//! autotag compare album.tsv abbey-road --catalog releases.json
//! ```

use std::path::Path;

use clap::{Parser, Subcommand};

use crate::config::MatchConfig;

pub mod catalog;
pub mod compare;
pub mod config;
pub mod identify;

#[derive(Parser)]
#[command(name = "autotag")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Match local music tracks against release metadata")]
#[command(
    long_about = "autotag identifies which release a set of local audio tracks belongs to.\n\nIt compares the tracks' current tags against candidate releases and provides:\n- A strong match when one release clearly fits\n- A ranked shortlist when several releases are plausible\n- The exact tag changes needed to apply a match"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find the release matching a set of local tracks
    Identify(identify::IdentifyArgs),

    /// Compare local tracks against one catalog release
    Compare(compare::CompareArgs),

    /// Inspect a release catalog
    Catalog(catalog::CatalogArgs),

    /// Print the effective matching configuration as TOML
    Config(config::ConfigArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Load a config file, or the defaults when no path is given
pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<MatchConfig> {
    match path {
        Some(path) => MatchConfig::load(path)
            .map_err(|e| anyhow::anyhow!("{}: {e}", path.display())),
        None => Ok(MatchConfig::default()),
    }
}
