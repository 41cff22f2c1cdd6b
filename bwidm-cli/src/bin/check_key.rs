//! bwidm-check-key - inspect an OpenSSH public key file for a FIDO2 key.
//!
//! Runs the same decoding the key helper applies to FIDO2 command keys and
//! reports whether the blob carries the `sk-ssh-ed25519@openssh.com` marker.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bwidm_cli::exit_codes::{self, ExitCode};
use bwidm_core::keys::fido2::{blob_has_sk_marker, find_sk_public_key, SK_ED25519};
use clap::error::ErrorKind;
use clap::Parser;
use colored::Colorize;

#[derive(Parser, Debug)]
#[command(name = "bwidm-check-key")]
#[command(author, version, about = "Check an OpenSSH public key file for a FIDO2 key", long_about = None)]
#[command(after_help = "Exit codes:\n   0  FIDO2 marker found\n  64  usage error\n  65  no FIDO2 key or marker missing\n  66  file unreadable")]
struct Cli {
    /// OpenSSH public key file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Only report through the exit code
    #[arg(short, long)]
    quiet: bool,
}

enum Inspection {
    Found { blob: String },
    NoKey,
    NoMarker { blob: String },
}

fn inspect(path: &Path) -> Result<Inspection> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file: {}", path.display()))?;

    let Some(blob) = find_sk_public_key(&text) else {
        return Ok(Inspection::NoKey);
    };
    let blob = blob.to_string();
    Ok(if blob_has_sk_marker(&blob) {
        Inspection::Found { blob }
    } else {
        Inspection::NoMarker { blob }
    })
}

fn abbreviate(blob: &str) -> String {
    const SHOWN: usize = 24;
    match blob.get(..SHOWN) {
        Some(head) if blob.len() > SHOWN => format!("{head}..."),
        _ => blob.to_string(),
    }
}

fn run(cli: &Cli) -> ExitCode {
    let inspection = match inspect(&cli.file) {
        Ok(inspection) => inspection,
        Err(err) => return ExitCode::error(exit_codes::INPUT_ERROR, format!("{err:#}")),
    };

    match inspection {
        Inspection::Found { blob } => {
            if !cli.quiet {
                println!("{} {}", "FIDO2 key:".green().bold(), SK_ED25519);
                println!("   {} {}", "Blob:".dimmed(), abbreviate(&blob));
                println!("   {} {}", "Marker:".dimmed(), "present".green());
            }
            ExitCode::success()
        }
        Inspection::NoKey => ExitCode::error(
            exit_codes::KEY_NOT_FOUND,
            format!("No {SK_ED25519} key in {}", cli.file.display()),
        ),
        Inspection::NoMarker { blob } => ExitCode::error(
            exit_codes::KEY_NOT_FOUND,
            format!("Key blob {} does not carry the {SK_ED25519} marker", abbreviate(&blob)),
        ),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::USAGE_ERROR,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let exit = run(&cli);
    if let Some(message) = &exit.message {
        if !cli.quiet {
            eprintln!("{} {message}", "error:".red().bold());
        }
    }
    std::process::exit(exit.code);
}
