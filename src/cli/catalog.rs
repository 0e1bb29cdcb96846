use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::backend::CatalogBackend;
use crate::cli::OutputFormat;
use crate::core::release::CandidateRelease;

#[derive(Args)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub command: CatalogCommands,
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// List all releases in the catalog
    List {
        /// Path to catalog file
        #[arg(long, required = true)]
        catalog: PathBuf,

        /// Filter by artist (case-insensitive substring)
        #[arg(long)]
        artist: Option<String>,
    },

    /// Show details of a specific release
    Show {
        /// Release ID
        #[arg(required = true)]
        id: String,

        /// Path to catalog file
        #[arg(long, required = true)]
        catalog: PathBuf,
    },
}

/// Execute catalog subcommand
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded or the release is unknown.
pub fn run(args: CatalogArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    match args.command {
        CatalogCommands::List { catalog, artist } => {
            run_list(&catalog, artist.as_deref(), format, verbose)
        }
        CatalogCommands::Show { id, catalog } => run_show(&id, &catalog, format),
    }
}

fn run_list(
    catalog_path: &PathBuf,
    artist_filter: Option<&str>,
    format: OutputFormat,
    verbose: bool,
) -> anyhow::Result<()> {
    let catalog = CatalogBackend::load_from_file(catalog_path)?;

    if verbose {
        eprintln!("Loaded catalog with {} releases", catalog.len());
    }

    // Filter releases
    let filtered: Vec<&CandidateRelease> = catalog
        .releases
        .iter()
        .filter(|r| {
            artist_filter.map_or(true, |a| r.artist.to_lowercase().contains(&a.to_lowercase()))
        })
        .collect();

    match format {
        OutputFormat::Text => {
            println!("{:<24} {:<28} {:<32} {:>6} {:>6}", "ID", "Artist", "Title", "Year", "Tracks");
            println!("{}", "-".repeat(100));
            for r in &filtered {
                println!(
                    "{:<24} {:<28} {:<32} {:>6} {:>6}",
                    r.id,
                    truncate(&r.artist, 28),
                    truncate(&r.title, 32),
                    r.year.map(|y| y.to_string()).unwrap_or_default(),
                    r.tracks.len()
                );
            }
            println!("\nTotal: {} releases", filtered.len());
        }
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = filtered
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "id": r.id,
                        "artist": r.artist,
                        "title": r.title,
                        "year": r.year,
                        "tracks": r.tracks.len(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => {
            println!("id\tartist\ttitle\tyear\ttracks");
            for r in &filtered {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    r.id,
                    r.artist,
                    r.title,
                    r.year.map(|y| y.to_string()).unwrap_or_default(),
                    r.tracks.len()
                );
            }
        }
    }

    Ok(())
}

fn run_show(id: &str, catalog_path: &PathBuf, format: OutputFormat) -> anyhow::Result<()> {
    let catalog = CatalogBackend::load_from_file(catalog_path)?;
    let release = catalog
        .get(id)
        .ok_or_else(|| anyhow::anyhow!("Release '{id}' not found in catalog"))?;

    match format {
        OutputFormat::Text => {
            println!("{} - {}", release.artist, release.title);
            println!("ID: {}", release.id);
            if let Some(date) = release.date.as_deref() {
                println!("Date: {date}");
            } else if let Some(year) = release.year {
                println!("Year: {year}");
            }
            for (label, value) in [
                ("Media", &release.media),
                ("Country", &release.country),
                ("Label", &release.label),
                ("Data source", &release.data_source),
            ] {
                if let Some(v) = value {
                    println!("{label}: {v}");
                }
            }
            if release.compilation {
                println!("Compilation: yes");
            }
            println!("\nTracks ({}):", release.tracks.len());
            for (i, t) in release.tracks.iter().enumerate() {
                let number = match (t.disc_number, t.track_number) {
                    (Some(d), Some(n)) => format!("{d}-{n}"),
                    (None, Some(n)) => n.to_string(),
                    _ => (i + 1).to_string(),
                };
                let length = t.duration.map(format_duration).unwrap_or_default();
                let artist = t
                    .artist
                    .as_deref()
                    .map(|a| format!(" [{a}]"))
                    .unwrap_or_default();
                println!("  {number:>5}  {:<40} {length:>6}{artist}", t.title);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(release)?);
        }
        OutputFormat::Tsv => {
            println!("disc\ttrack\ttitle\tartist\tlength");
            for t in &release.tracks {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    t.disc_number.map(|d| d.to_string()).unwrap_or_default(),
                    t.track_number.map(|n| n.to_string()).unwrap_or_default(),
                    t.title,
                    t.artist.as_deref().unwrap_or(""),
                    t.duration.map(|d| format!("{d:.1}")).unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // durations are small and non-negative
fn format_duration(seconds: f64) -> String {
    let total = seconds.round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer title", 10), "a much ...");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(259.0), "4:19");
        assert_eq!(format_duration(59.6), "1:00");
    }
}
