use std::path::PathBuf;

use clap::Args;

use crate::cli::{load_config, OutputFormat};

#[derive(Args)]
pub struct ConfigArgs {
    /// Configuration file to load (defaults are printed when omitted)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Execute config subcommand
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or is invalid.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: ConfigArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;

    if verbose {
        match &args.config {
            Some(path) => eprintln!("Loaded configuration from {}", path.display()),
            None => eprintln!("Using default configuration"),
        }
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text | OutputFormat::Tsv => print!("{}", config.to_toml_string()?),
    }

    Ok(())
}
