use std::path::PathBuf;

use clap::Args;

use crate::backend::CatalogBackend;
use crate::cli::{load_config, OutputFormat};
use crate::core::track::{LikelyMetadata, LocalTrack};
use crate::matching::scoring::{score_album, score_track, ScoredCandidate};
use crate::parsing;

#[derive(Args)]
pub struct CompareArgs {
    /// Local tracks (JSON, TSV, or CSV)
    #[arg(required = true)]
    pub input: PathBuf,

    /// Release ID from the catalog
    #[arg(required = true)]
    pub release: String,

    /// Release catalog containing the release
    #[arg(long, required = true)]
    pub catalog: PathBuf,

    /// Matching configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Compare a single track instead of an album
    #[arg(long)]
    pub singleton: bool,
}

/// Execute compare subcommand
///
/// # Errors
///
/// Returns an error if inputs cannot be loaded, the release is unknown or
/// malformed, or the tracks cannot be aligned with it.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: CompareArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let tracks = parsing::parse_tracks_file(&args.input)?;
    let catalog = CatalogBackend::load_from_file(&args.catalog)?;

    let release = catalog
        .get(&args.release)
        .ok_or_else(|| anyhow::anyhow!("Release '{}' not found in catalog", args.release))?
        .clone()
        .normalize()?;

    if verbose {
        eprintln!(
            "Comparing {} local tracks against {} ({} tracks)",
            tracks.len(),
            release.id,
            release.tracks.len()
        );
    }

    let scored = if args.singleton {
        let track = match tracks.as_slice() {
            [track] => track,
            _ => anyhow::bail!(
                "--singleton expects exactly one track, found {}",
                tracks.len()
            ),
        };
        score_track(track, &release, &config)?
    } else {
        let likely = LikelyMetadata::from_tracks(&tracks);
        score_album(&tracks, &likely, &release, &config)?
    };
    let scored = scored.with_source("catalog", 0);

    match format {
        OutputFormat::Text => print_text_comparison(&scored, &tracks),
        OutputFormat::Json => print_json_comparison(&scored)?,
        OutputFormat::Tsv => print_tsv_comparison(&scored),
    }

    Ok(())
}

fn print_text_comparison(scored: &ScoredCandidate, tracks: &[LocalTrack]) {
    let release = &scored.release;
    println!("{} - {} ({})", release.artist, release.title, release.id);
    println!("Distance: {:.4}", scored.total());

    println!("\nFields:");
    for (field, d) in &scored.distance.fields {
        println!(
            "   {:<14} {:.3} × {:<4} → {:.4}",
            field.as_str(),
            d.distance,
            d.weight,
            scored.distance.contribution(*field)
        );
    }

    println!("\nAlignment (cost {:.4}):", scored.alignment.cost);
    for pair in &scored.alignment.pairs {
        let local = tracks
            .get(pair.local)
            .and_then(|t| t.title.as_deref())
            .unwrap_or("(untitled)");
        let candidate = release
            .tracks
            .get(pair.candidate)
            .map_or("", |t| t.title.as_str());
        println!("   {local} → {candidate} ({:.3})", pair.cost);
    }
    for &i in &scored.alignment.unmatched_local {
        let local = tracks
            .get(i)
            .and_then(|t| t.title.as_deref())
            .unwrap_or("(untitled)");
        println!("   {local} → (extra)");
    }
    for &j in &scored.alignment.unmatched_candidate {
        let candidate = release.tracks.get(j).map_or("", |t| t.title.as_str());
        println!("   (missing) → {candidate}");
    }
}

fn print_json_comparison(scored: &ScoredCandidate) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "release_id": scored.release.id,
        "distance": scored.total(),
        "fields": scored.distance.fields,
        "alignment": scored.alignment,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_tsv_comparison(scored: &ScoredCandidate) {
    println!("field\tdistance\tweight\tcontribution");
    for (field, d) in &scored.distance.fields {
        println!(
            "{}\t{:.4}\t{}\t{:.4}",
            field,
            d.distance,
            d.weight,
            scored.distance.contribution(*field)
        );
    }
}
