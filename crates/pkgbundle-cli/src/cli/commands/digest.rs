//! `pkgbundle digest` - Print the canonical digest of a manifest.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use pkgbundle_core::canonicalize::{compute_digest, parse_manifest};
use pkgbundle_core::trust::DEFAULT_DOMAIN_NAME;

use crate::cli::helpers::read_input;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct DigestArgs {
    /// Manifest file (YAML), or `-` for stdin
    pub object: PathBuf,

    /// Trust domain whose excludes apply
    #[arg(long, default_value = DEFAULT_DOMAIN_NAME)]
    pub domain: String,

    /// Also print the canonical YAML the digest covers
    #[arg(long)]
    pub yaml: bool,
}

pub fn cmd_digest(args: DigestArgs) -> i32 {
    match run_digest(&args) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_codes::INPUT_ERROR
        }
    }
}

fn run_digest(args: &DigestArgs) -> Result<()> {
    let content = read_input(&args.object)?;
    let manifest = parse_manifest(&content)
        .with_context(|| format!("failed to parse manifest: {}", args.object.display()))?;
    let digest = compute_digest(&manifest, &args.domain)?;

    println!("{}", digest.hex());
    if args.yaml {
        println!("---");
        print!("{}", digest.yaml_str());
    }
    Ok(())
}
