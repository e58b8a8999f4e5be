// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Sluice turn engine.
//!
//! TOML files are layered with figment (system, user, local), overridden by
//! `SLUICE_*` environment variables, rejected on unknown keys and then
//! validated. Errors render as miette diagnostics with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use sluice_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("default model: {}", config.codex.default_model);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::SluiceConfig;

/// Loads configuration from the standard hierarchy and validates it.
pub fn load_and_validate() -> Result<SluiceConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let toml_sources = collect_toml_sources();
            Err(diagnostic::collect_errors(err, &toml_sources))
        }
    }
}

/// Loads configuration from an explicit file, with env overrides, and validates it.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<SluiceConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = std::fs::read_to_string(path)
                .map(|content| vec![(path.display().to_string(), content)])
                .unwrap_or_default();
            Err(diagnostic::collect_errors(err, &sources))
        }
    }
}

/// Loads configuration from a TOML string and validates it.
pub fn load_and_validate_str(toml_content: &str) -> Result<SluiceConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::collect_errors(err, &sources))
        }
    }
}

/// Reads the TOML files of the hierarchy for source span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    loader::config_paths()
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            let shown = if path.is_relative() {
                std::env::current_dir()
                    .map(|d| d.join(&path).display().to_string())
                    .unwrap_or_else(|_| path.display().to_string())
            } else {
                path.display().to_string()
            };
            Some((shown, content))
        })
        .collect()
}
