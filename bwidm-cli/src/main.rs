//! bwIDM REST SSH - AuthorizedKeysCommand backed by the bwIDM registry.
//!
//! Prints the authorized keys of a login name on stdout. On failure nothing is
//! printed on stdout, one diagnostic line goes to stderr and the exit code
//! names the condition.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bwidm_cli::exit_codes::{self, ExitCode};
use bwidm_core::config::DEFAULT_CONFIG_PATH;
use bwidm_core::local_override::DEFAULT_AUTHORIZED_KEYS_DIR;
use bwidm_core::{
    BwidmRegistry, KeyResolver, KeyStatus, PipelinePolicy, Preset, RegistryCredentials,
};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use regex::Regex;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const EXIT_CODES_HELP: &str = "\
Exit codes:
   0  keys or local override printed
   8  invalid user name
   9  invalid or missing bwIDM user id
  12  config file unreadable
  13  local authorized keys file unreadable
  14  REST.reg_host empty or unusable
  15  REST.rest_user empty
  16  REST.rest_pw empty
  17  SSN.ssn empty
  18  registry unreachable
  19  unexpected HTTP status
  20  malformed registry response
  41  HTTP 401 Login Failed
  42  HTTP 402 Service ID not valid
  43  HTTP 403 No assertion resulted from the AttributeQuery
  44  HTTP 404 User is not registered
  50  HTTP 500 Misconfigured service
  64  usage error
  74  cannot write to stdout";

#[derive(Parser, Debug)]
#[command(name = "bwidm-rest-ssh")]
#[command(author, version, about = "SSH AuthorizedKeysCommand resolving keys from bwIDM", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Login name to resolve
    #[arg(value_name = "USERNAME")]
    username: String,

    /// bwIDM user id (uidNumber); required by the auth-keys presets
    #[arg(value_name = "USER_ID")]
    user_id: Option<String>,

    /// Deployment preset
    #[arg(long, default_value = "auth-keys", env = "BWIDM_REST_SSH_PRESET")]
    preset: Preset,

    /// Registry configuration file
    #[arg(short, long, value_name = "FILE", env = "BWIDM_REST_SSH_CONF", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory of local per-user key files that bypass the registry
    #[arg(long, value_name = "DIR", default_value = DEFAULT_AUTHORIZED_KEYS_DIR)]
    authorized_keys_dir: PathBuf,

    /// Maximum user name length
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    username_max_len: Option<u16>,

    /// Only trust keys whose name matches this regular expression
    #[arg(long, value_name = "REGEX")]
    name_pattern: Option<Regex>,

    /// Trusted key status (repeatable), e.g. ACTIVE or EXPIRED
    #[arg(long = "status", value_name = "STATUS")]
    statuses: Vec<String>,

    /// Only trust keys created less than this many days ago
    #[arg(long, value_name = "DAYS")]
    max_age_days: Option<u32>,

    /// Do not unwrap FIDO2 command keys
    #[arg(long, conflicts_with = "fido2")]
    no_fido2: bool,

    /// Unwrap FIDO2 command keys
    #[arg(long)]
    fido2: bool,

    /// Log progress to stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Preset policy with command-line overrides applied.
    fn policy(&self) -> PipelinePolicy {
        let mut policy = self.preset.policy();
        if let Some(len) = self.username_max_len {
            policy.username_max_len = usize::from(len);
        }
        if let Some(pattern) = &self.name_pattern {
            policy.keys.name_pattern = Some(pattern.clone());
        }
        if !self.statuses.is_empty() {
            policy.keys.status_allow = self.statuses.iter().map(|s| KeyStatus::parse(s)).collect();
        }
        if let Some(days) = self.max_age_days {
            policy.keys.max_age_days = Some(days);
        }
        if self.no_fido2 {
            policy.keys.fido2_unwrap = false;
        } else if self.fido2 {
            policy.keys.fido2_unwrap = true;
        }
        policy
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "off",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init only happens in tests; ignoring it keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(cli: Cli) -> ExitCode {
    let policy = cli.policy();
    debug!(preset = %cli.preset, ?policy, "Resolved policy");

    let resolver = KeyResolver::new(policy, &cli.authorized_keys_dir);
    let config_path: &Path = &cli.config;
    let resolution = match resolver
        .resolve(&cli.username, cli.user_id.as_deref(), || {
            BwidmRegistry::new(RegistryCredentials::load(config_path)?)
        })
        .await
    {
        Ok(resolution) => resolution,
        Err(err) => return ExitCode::from_error(&err),
    };

    let mut stdout = io::stdout().lock();
    match resolution.write_to(&mut stdout).and_then(|()| stdout.flush()) {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::error(exit_codes::IO_ERROR, format!("Failed to write keys: {err}")),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
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

    init_tracing(cli.verbose);

    let exit = run(cli).await;
    if let Some(message) = &exit.message {
        eprintln!("{message}");
    }
    std::process::exit(exit.code);
}
