use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::backend::{CatalogBackend, MetadataBackend};
use crate::cli::{load_config, OutputFormat};
use crate::core::track::LocalTrack;
use crate::matching::{
    ApplyPlan, MatchSession, ScoredCandidate, SessionOptions, SessionOutcome,
};
use crate::parsing;

#[derive(Args)]
pub struct IdentifyArgs {
    /// Local tracks (JSON, TSV, or CSV)
    #[arg(required = true)]
    pub input: PathBuf,

    /// Release catalog(s) to search; earlier catalogs win ties
    #[arg(long = "catalog", required = true, num_args = 1..)]
    pub catalogs: Vec<PathBuf>,

    /// Matching configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Match a single track instead of an album
    #[arg(long)]
    pub singleton: bool,

    /// Look up these release (or recording) IDs instead of searching
    #[arg(long = "id")]
    pub ids: Vec<String>,

    /// Number of candidates to show for an ambiguous match
    #[arg(short = 'n', long)]
    pub max_matches: Option<usize>,

    /// Print the tag changes for the best candidate
    #[arg(long)]
    pub plan: bool,

    /// Give up on backends after this many milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// After cancellation, decide over the candidates already scored
    #[arg(long)]
    pub best_effort: bool,
}

/// Execute identify subcommand
///
/// # Errors
///
/// Returns an error if the configuration, tracks, or catalogs cannot be loaded.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: IdentifyArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(n) = args.max_matches {
        config.top_n = n;
    }

    let tracks = parsing::parse_tracks_file(&args.input)?;
    if args.singleton && tracks.len() != 1 {
        anyhow::bail!(
            "--singleton expects exactly one track, found {}",
            tracks.len()
        );
    }

    if verbose {
        eprintln!("Parsed {} tracks from input", tracks.len());
    }

    let mut backends: Vec<Arc<dyn MetadataBackend>> = Vec::with_capacity(args.catalogs.len());
    for path in &args.catalogs {
        let name = path
            .file_stem()
            .map_or_else(|| "catalog".to_string(), |s| s.to_string_lossy().into_owned());
        let catalog = CatalogBackend::load_from_file(path)?.with_name(name);
        if verbose {
            eprintln!("Loaded catalog {} with {} releases", path.display(), catalog.len());
        }
        backends.push(Arc::new(catalog));
    }

    let session = MatchSession::new(config, backends)?;
    let options = SessionOptions {
        search_ids: args.ids.clone(),
        best_effort: args.best_effort,
    };

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(identify(&session, &tracks, &options, &args));

    let plan = if args.plan {
        outcome
            .decision
            .best()
            .map(|best| session.apply_plan(outcome.kind, &tracks, best))
    } else {
        None
    };

    match format {
        OutputFormat::Text => print_text_results(&outcome, plan.as_ref(), &tracks, verbose),
        OutputFormat::Json => print_json_results(&outcome, plan.as_ref())?,
        OutputFormat::Tsv => print_tsv_results(&outcome),
    }

    Ok(())
}

/// Run the session, cancelling it on Ctrl-C or when the deadline passes
async fn identify(
    session: &MatchSession,
    tracks: &[LocalTrack],
    options: &SessionOptions,
    args: &IdentifyArgs,
) -> SessionOutcome {
    let token = session.cancel_token();
    let deadline = args.deadline_ms.map(Duration::from_millis);
    let watcher = tokio::spawn(async move {
        let expired = async {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            () = expired => {}
        }
        token.cancel();
    });

    let outcome = match (args.singleton, tracks.first()) {
        (true, Some(track)) => session.match_track(track, options).await,
        _ => session.match_album(tracks, options).await,
    };

    watcher.abort();
    outcome
}

fn print_text_results(
    outcome: &SessionOutcome,
    plan: Option<&ApplyPlan>,
    tracks: &[LocalTrack],
    verbose: bool,
) {
    let confidence = outcome.decision.confidence();
    let candidates = outcome.decision.candidates();

    if candidates.is_empty() {
        println!("No match found.");
    } else {
        println!("{} ({})", capitalize(&confidence.to_string()), outcome.kind);
    }

    for (i, candidate) in candidates.iter().enumerate() {
        if i > 0 {
            println!("\n{}", "─".repeat(60));
        }
        print_candidate(i + 1, candidate, verbose);
    }

    if let Some(plan) = plan {
        print_text_plan(plan, tracks);
    }

    if !outcome.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &outcome.warnings {
            println!("   - {warning}");
        }
    }
    if outcome.cancelled {
        println!("\nMatching was cancelled before all candidates were scored.");
    }
}

fn print_candidate(rank: usize, candidate: &ScoredCandidate, verbose: bool) {
    let release = &candidate.release;
    let year = release
        .year
        .map(|y| format!(" ({y})"))
        .unwrap_or_default();
    println!("\n#{rank} {} - {}{year}", release.artist, release.title);
    println!("   ID: {}", release.id);
    println!("   Source: {}", candidate.source);
    println!("   Distance: {:.4}", candidate.total());

    let alignment = &candidate.alignment;
    println!(
        "   Tracks: {} matched, {} missing, {} extra",
        alignment.pairs.len(),
        alignment.unmatched_candidate.len(),
        alignment.unmatched_local.len()
    );

    let worst = candidate.distance.worst_fields();
    if !worst.is_empty() {
        let shown: Vec<String> = worst
            .iter()
            .take(if verbose { worst.len() } else { 3 })
            .map(|(field, contribution)| format!("{field} {contribution:.3}"))
            .collect();
        println!("   Penalties: {}", shown.join(", "));
    }
}

fn print_text_plan(plan: &ApplyPlan, tracks: &[LocalTrack]) {
    println!("\nChanges for {} ({} updates):", plan.candidate_id, plan.change_count());
    for track in &plan.tracks {
        if track.changes.is_empty() {
            continue;
        }
        let label = tracks
            .get(track.local_index)
            .and_then(|t| t.path.clone().or_else(|| t.title.clone()))
            .unwrap_or_else(|| format!("track {}", track.local_index + 1));
        println!("   {label}");
        for change in &track.changes {
            println!(
                "      {}: {} -> {}",
                change.field,
                change.old.as_deref().unwrap_or("(none)"),
                change.new
            );
        }
    }
    if !plan.unmatched_local.is_empty() {
        let unmatched: Vec<String> = plan
            .unmatched_local
            .iter()
            .map(|i| (i + 1).to_string())
            .collect();
        println!("   Unmatched local tracks: {}", unmatched.join(", "));
    }
}

fn print_json_results(outcome: &SessionOutcome, plan: Option<&ApplyPlan>) -> anyhow::Result<()> {
    let candidates: Vec<serde_json::Value> = outcome
        .decision
        .candidates()
        .iter()
        .enumerate()
        .map(|(i, c)| {
            serde_json::json!({
                "rank": i + 1,
                "release": {
                    "id": c.release.id,
                    "title": c.release.title,
                    "artist": c.release.artist,
                    "year": c.release.year,
                    "track_total": c.release.track_total,
                },
                "source": c.source,
                "distance": c.total(),
                "breakdown": c.distance.breakdown(),
                "tracks": {
                    "matched": c.alignment.pairs.len(),
                    "missing": c.alignment.unmatched_candidate.len(),
                    "extra": c.alignment.unmatched_local.len(),
                },
            })
        })
        .collect();

    let warnings: Vec<String> = outcome.warnings.iter().map(ToString::to_string).collect();

    let output = serde_json::json!({
        "kind": outcome.kind,
        "decision": outcome.decision.confidence(),
        "cancelled": outcome.cancelled,
        "candidates": candidates,
        "warnings": warnings,
        "plan": plan,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_tsv_results(outcome: &SessionOutcome) {
    println!("rank\tid\ttitle\tartist\tyear\tsource\tdistance\tmatched\tmissing\textra\tdecision");
    let decision = outcome.decision.confidence();
    for (i, c) in outcome.decision.candidates().iter().enumerate() {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{:.4}\t{}\t{}\t{}\t{:?}",
            i + 1,
            c.release.id,
            c.release.title,
            c.release.artist,
            c.release.year.map(|y| y.to_string()).unwrap_or_default(),
            c.source,
            c.total(),
            c.alignment.pairs.len(),
            c.alignment.unmatched_candidate.len(),
            c.alignment.unmatched_local.len(),
            decision,
        );
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
