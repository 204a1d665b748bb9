//! Options controlling how Opus files are decoded.
use std::path::Path;

use figment::{providers::{Env, Format, Serialized, Toml}, Figment};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Prefix for environment variables that override decoding options,
/// e.g. `BRUKER_OPUS_PARALLEL=true`.
pub const ENV_PREFIX: &str = "BRUKER_OPUS_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Parse the blocks of a file on the rayon thread pool. Pairing always runs after
    /// every block has been parsed.
    pub parallel: bool,
    /// Keep empty lines from the history (file log) block instead of dropping them.
    pub keep_raw_history: bool,
}

impl DecodeOptions {
    /// The figment layering defaults, then `config_file` (if given), then environment variables.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut fig = Figment::from(Serialized::defaults(DecodeOptions::default()));
        if let Some(p) = config_file {
            fig = fig.merge(Toml::file(p));
        }
        fig.merge(Env::prefixed(ENV_PREFIX))
    }
}

/// Load decoding options from the defaults, an optional TOML file and the environment.
///
/// Note that a `config_file` path that does not exist is silently skipped, as figment
/// treats missing files as empty.
pub fn load_options(config_file: Option<&Path>) -> Result<DecodeOptions, ConfigError> {
    let opts = DecodeOptions::figment(config_file).extract()?;
    Ok(opts)
}
