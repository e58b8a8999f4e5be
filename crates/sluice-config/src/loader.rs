// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with figment.
//!
//! Merge order, later wins:
//! 1. compiled defaults
//! 2. `/etc/sluice/sluice.toml`
//! 3. `~/.config/sluice/sluice.toml`
//! 4. `./sluice.toml`
//! 5. `SLUICE_*` environment variables

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use tracing::debug;

use crate::model::SluiceConfig;

const ENV_PREFIX: &str = "SLUICE_";

/// Top-level sections an environment variable may address.
const SECTIONS: &[&str] = &["agent", "codex", "turn", "routing", "approval"];

/// Files of the hierarchy, lowest precedence first.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/sluice/sluice.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("sluice/sluice.toml"));
    }
    paths.push(PathBuf::from("sluice.toml"));
    paths
}

/// Builds the full figment without extracting, so callers can inspect metadata.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(SluiceConfig::default()));
    for path in config_paths() {
        debug!(path = %path.display(), present = path.exists(), "config layer");
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Loads from the standard hierarchy with env overrides.
pub fn load_config() -> Result<SluiceConfig, figment::Error> {
    build_figment().extract()
}

/// Loads from a TOML string over the defaults. No files, no env.
pub fn load_config_from_str(toml_content: &str) -> Result<SluiceConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SluiceConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Loads from one explicit file with env overrides.
pub fn load_config_from_path(path: &Path) -> Result<SluiceConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SluiceConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Maps `SLUICE_<SECTION>_<KEY>` onto `<section>.<key>`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `SLUICE_ROUTING_TERMINAL_RETRY_ATTEMPTS` lands on
/// `routing.terminal_retry_attempts`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
