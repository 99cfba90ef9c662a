//! `pkgbundle sign` - Sign a Kubernetes object manifest.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

use pkgbundle_core::canonicalize::{encode_excludes, excludes_annotation, parse_manifest};
use pkgbundle_core::sign::{set_annotation, sign_manifest};
use pkgbundle_core::trust::DEFAULT_DOMAIN_NAME;

use crate::cli::helpers::read_input;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Manifest file (YAML), or `-` for stdin
    pub object: PathBuf,

    /// Private key file (SEC1 or PKCS#8 PEM)
    #[arg(long, short = 's')]
    pub key: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(long, short)]
    pub out: Option<PathBuf>,

    /// Trust domain whose annotations are written
    #[arg(long, default_value = DEFAULT_DOMAIN_NAME)]
    pub domain: String,

    /// Field selector left out of the signature (repeatable), e.g. `.spec.packages[0].source.registry`
    #[arg(long = "exclude", value_name = "SELECTOR")]
    pub excludes: Vec<String>,
}

pub fn cmd_sign(args: SignArgs) -> i32 {
    match run_sign(args) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_codes::INPUT_ERROR
        }
    }
}

fn run_sign(args: SignArgs) -> Result<()> {
    let key_pem = fs::read_to_string(&args.key)
        .with_context(|| format!("failed to read private key: {}", args.key.display()))?;

    let content = read_input(&args.object)?;
    let mut manifest = parse_manifest(&content)
        .with_context(|| format!("failed to parse manifest: {}", args.object.display()))?;

    if !args.excludes.is_empty() {
        set_annotation(
            &mut manifest,
            &excludes_annotation(&args.domain),
            &encode_excludes(&args.excludes),
        )?;
    }

    let signed = sign_manifest(&manifest, &key_pem, &args.domain)
        .with_context(|| format!("failed to sign: {}", args.object.display()))?;

    match &args.out {
        Some(out) => {
            fs::write(out, &signed.yaml)
                .with_context(|| format!("failed to write output: {}", out.display()))?;
            eprintln!("Signed manifest:");
            eprintln!("  Output:    {}", out.display());
            eprintln!("  Digest:    {}", signed.digest.hex());
            eprintln!("  Signature: {}", signed.signature);
        }
        None => {
            let yaml = String::from_utf8_lossy(&signed.yaml);
            print!("{yaml}");
        }
    }

    Ok(())
}
