//! Configuration loading, validation and env substitution.
//!
//! Config files: `livefeed.toml`, `livefeed.yaml`, or `livefeed.json`
//! Searched in `./` then `~/.config/livefeed/`.
//!
//! Supports `${ENV_VAR}` substitution anywhere in the file.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Context, Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config, load_config_value},
    schema::{ChannelEntry, LivefeedConfig, MaxRetries, RetryDefaults},
    validate::{Diagnostic, Severity, ValidationResult},
};
