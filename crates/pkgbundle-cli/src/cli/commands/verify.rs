//! `pkgbundle verify` - Verify a signed manifest.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use pkgbundle_core::trust::{DEFAULT_DOMAIN_NAME, PUBLIC_KEY_ENV};
use pkgbundle_core::verify::verify_yaml;
use pkgbundle_core::{SignatureError, TrustDomain};

use crate::cli::helpers::read_input;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Signed manifest file (YAML), or `-` for stdin
    pub object: PathBuf,

    /// Base64 PKIX public key (defaults to the trust domain's key)
    #[arg(long, env = PUBLIC_KEY_ENV)]
    pub public_key: Option<String>,

    /// Trust domain whose annotations are read
    #[arg(long, default_value = DEFAULT_DOMAIN_NAME)]
    pub domain: String,

    /// Quiet mode - only exit code, no output
    #[arg(long, short)]
    pub quiet: bool,
}

/// The signature was well-formed but did not verify.
#[derive(Debug, thiserror::Error)]
#[error("signature is invalid for the configured public key (digest {digest})")]
struct InvalidSignature {
    digest: String,
}

pub fn cmd_verify(args: VerifyArgs) -> i32 {
    match run_verify(&args) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            if !args.quiet {
                eprintln!("error: {e:#}");
            }
            if e.downcast_ref::<InvalidSignature>().is_some() {
                exit_codes::INVALID_SIGNATURE
            } else if let Some(sig_err) = e.downcast_ref::<SignatureError>() {
                sig_err.exit_code()
            } else {
                exit_codes::INPUT_ERROR
            }
        }
    }
}

fn run_verify(args: &VerifyArgs) -> Result<()> {
    let content = read_input(&args.object)?;

    let domain = match &args.public_key {
        Some(key) => TrustDomain::new(args.domain.clone(), key.clone()),
        None if args.domain == DEFAULT_DOMAIN_NAME => TrustDomain::default(),
        None => anyhow::bail!("--public-key is required for domain {}", args.domain),
    };

    let outcome = verify_yaml(&content, &domain)
        .with_context(|| format!("failed to verify: {}", args.object.display()))?;
    if !outcome.valid {
        return Err(InvalidSignature {
            digest: outcome.digest.to_base64(),
        }
        .into());
    }

    if !args.quiet {
        println!("Verification successful!");
        println!();
        println!("  domain: {}", domain.name);
        println!("  digest: {}", outcome.digest.hex());
    }

    Ok(())
}
