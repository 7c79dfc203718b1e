mod display;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use imghdr_core::{
    BuildId, KeyHandle, PatchRequest, Secp256k1Signer, SynthRequest, inspect, patch_image,
    synthesize,
};
use std::path::PathBuf;

/// Firmware image header tool
#[derive(Parser, Debug)]
#[command(
    name = "imghdr",
    about = "Maintain the 96-byte header of firmware images",
    version,
    author
)]
struct Cli {
    /// Path to the image (or raw payload for `wrap`)
    #[arg(required = true)]
    path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompute the size field, optionally set the entrypoint and sign
    Patch {
        /// Private key for signature generation (PEM format)
        #[arg(short = 'k', long, env = "IMGHDR_KEY")]
        key: Option<PathBuf>,

        /// New entrypoint address (hex or decimal)
        #[arg(long, value_parser = parse_address)]
        entrypoint: Option<u64>,
    },
    /// Only generate and update the signature
    Sign {
        /// Private key for signature generation (PEM format)
        #[arg(short = 'k', long, env = "IMGHDR_KEY")]
        key: Option<PathBuf>,

        /// Accepted for symmetry with `patch`; ignored
        #[arg(long, value_parser = parse_address, hide = true)]
        entrypoint: Option<u64>,
    },
    /// Prepend a fresh header to a payload that has none
    Wrap {
        /// Output file (defaults to the input with an `.img` extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Entrypoint address (hex or decimal)
        #[arg(long, value_parser = parse_address, default_value = "0")]
        entrypoint: u64,

        /// Build identifier, up to 7 printable ASCII characters
        #[arg(long, alias = "git-sha", default_value = "")]
        build_id: BuildId,

        /// Private key for signature generation (PEM format)
        #[arg(short = 'k', long, env = "IMGHDR_KEY")]
        key: Option<PathBuf>,
    },
    /// Show the header fields
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Parses an address the way C literals read: `0x`, `0o`, `0b` or decimal.
fn parse_address(s: &str) -> Result<u64, String> {
    let cleaned = s.trim().replace('_', "");
    let (digits, radix) = match cleaned.get(..2) {
        Some("0x" | "0X") => (&cleaned[2..], 16),
        Some("0o" | "0O") => (&cleaned[2..], 8),
        Some("0b" | "0B") => (&cleaned[2..], 2),
        _ => (cleaned.as_str(), 10),
    };
    u64::from_str_radix(digits, radix).map_err(|e| format!("invalid address `{s}`: {e}"))
}

/// True when the file does not start with the image magic at all.
fn is_foreign(e: &imghdr_core::Error) -> bool {
    matches!(
        e,
        imghdr_core::Error::Format(imghdr_core::FormatError::BadMagic { .. })
    )
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    log::debug!("{cli:?}");
    let signer = Secp256k1Signer;

    match cli.command {
        Command::Patch { key, entrypoint } => {
            let req = PatchRequest::full(key.map(KeyHandle::new), entrypoint);
            let plan = patch_image(&cli.path, &req, &signer)
                .with_context(|| format!("failed to patch '{}'", cli.path.display()))?;
            display::print_patch(&cli.path, &plan);
        }

        Command::Sign { key, entrypoint } => {
            let req = PatchRequest {
                entrypoint,
                ..PatchRequest::signature_only(key.map(KeyHandle::new))
            };
            let plan = patch_image(&cli.path, &req, &signer)
                .with_context(|| format!("failed to sign '{}'", cli.path.display()))?;
            display::print_patch(&cli.path, &plan);
        }

        Command::Wrap {
            output,
            entrypoint,
            build_id,
            key,
        } => {
            let req = SynthRequest {
                output,
                entrypoint,
                build_id,
                key: key.map(KeyHandle::new),
            };
            let report = synthesize(&cli.path, &req, &signer)
                .with_context(|| format!("failed to add header to '{}'", cli.path.display()))?;
            display::print_synth(&report);
        }

        Command::Info { json } => match inspect(&cli.path) {
            Ok(report) if json => {
                println!("{}", serde_json::to_string_pretty(&report.summary())?);
            }
            Ok(report) => display::print_inspect(&report),
            Err(e) => {
                println!("{} {e}", "Error:".red().bold());
                if is_foreign(&e) {
                    println!("File '{}' is not a valid image file", cli.path.display());
                }
            }
        },
    }

    Ok(())
}
