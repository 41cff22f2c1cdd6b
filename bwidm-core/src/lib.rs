//! bwIDM Core - key resolution for the bwIDM REST SSH helper
//!
//! This crate turns a login name into the SSH keys an SSH daemon should accept,
//! using the bwIDM registry as the source of truth.
//!
//! # Pipeline
//!
//! 1. Validate the username (and a claimed numeric user id, if any)
//! 2. Short-circuit on a local override file
//! 3. Resolve the numeric user id in the registry (lookup-based deployments)
//! 4. Retrieve the user's keys
//! 5. Filter by name, status and age; unwrap FIDO2 command keys
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use bwidm_core::{BwidmRegistry, KeyResolver, Preset, RegistryCredentials};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = KeyResolver::new(Preset::Jumphost.policy(), "/etc/ssh/authorized_keys.d");
//! let resolution = resolver
//!     .resolve("alice", None, || {
//!         let credentials = RegistryCredentials::load(Path::new("/usr/local/etc/bwidm-rest-ssh.conf"))?;
//!         BwidmRegistry::new(credentials)
//!     })
//!     .await?;
//! resolution.write_to(&mut std::io::stdout().lock())?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod keys;
pub mod local_override;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod validation;

// Re-export main types for convenience
pub use config::RegistryCredentials;
pub use error::{ConfigField, DenialReason, KeysError, Result};
pub use keys::{AuthorizedKey, KeyPolicy, KeyStatus, ResolvedKey, ResponseShape, SshKeyEntry};
pub use pipeline::{KeyResolver, Resolution};
pub use policy::{PipelinePolicy, Preset, UserIdSource};
pub use registry::{BwidmRegistry, IdentityRecord, KeyEndpoint, MockRegistry, Registry};
pub use validation::LoginRequest;
