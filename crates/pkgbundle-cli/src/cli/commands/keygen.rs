//! `pkgbundle keygen` - Generate a P-256 keypair for signing bundles.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

use pkgbundle_core::trust::PUBLIC_KEY_ENV;
use pkgbundle_core::KeyPair;

use crate::exit_codes;

pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
pub const PUBLIC_KEY_FILE: &str = "public_key.b64";

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Output directory for keypair files
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Force overwrite existing files
    #[arg(long, short)]
    pub force: bool,
}

pub fn cmd_keygen(args: KeygenArgs) -> i32 {
    match run_keygen(args) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_codes::INPUT_ERROR
        }
    }
}

fn run_keygen(args: KeygenArgs) -> Result<()> {
    if !args.out.exists() {
        fs::create_dir_all(&args.out)
            .with_context(|| format!("failed to create directory: {}", args.out.display()))?;
    }

    let private_path = args.out.join(PRIVATE_KEY_FILE);
    let public_path = args.out.join(PUBLIC_KEY_FILE);

    if !args.force {
        for path in [&private_path, &public_path] {
            if path.exists() {
                anyhow::bail!(
                    "key file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
        }
    }

    let pair = KeyPair::generate();
    let private_pem = pair
        .private_key_pem()
        .context("failed to encode private key as SEC1 PEM")?;
    let public_b64 = pair
        .public_key_base64()
        .context("failed to encode public key as PKIX")?;

    fs::write(&private_path, private_pem.as_bytes())
        .with_context(|| format!("failed to write private key: {}", private_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(&private_path, perms)
            .with_context(|| format!("failed to set permissions on: {}", private_path.display()))?;
    }

    fs::write(&public_path, format!("{public_b64}\n"))
        .with_context(|| format!("failed to write public key: {}", public_path.display()))?;

    println!("Generated P-256 keypair:");
    println!(
        "  Private key: {} (SEC1 PEM, mode 0600)",
        private_path.display()
    );
    println!("  Public key:  {} (base64 PKIX)", public_path.display());
    println!();
    println!("public_key: {public_b64}");
    println!();
    println!("Set {PUBLIC_KEY_ENV} to this value to trust signatures from this key.");

    Ok(())
}
