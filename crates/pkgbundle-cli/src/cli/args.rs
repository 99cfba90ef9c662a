use clap::{Parser, Subcommand};

use super::commands::{digest, keygen, sign, states, verify};

#[derive(Parser)]
#[command(
    name = "pkgbundle",
    version,
    about = "Sign, verify and inspect package bundle manifests"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a P-256 keypair for signing
    Keygen(keygen::KeygenArgs),
    /// Sign a Kubernetes object manifest
    Sign(sign::SignArgs),
    /// Verify a signed manifest against a trust domain
    Verify(verify::VerifyArgs),
    /// Print the canonical digest of a manifest
    Digest(digest::DigestArgs),
    /// Compute lifecycle states for a set of bundle manifests
    States(states::StatesArgs),
    Version,
}
