// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment extraction failures into miette diagnostics.
//!
//! Unknown keys are located in the TOML text they came from so the report can
//! underline them, and a close valid key is offered when one exists.

// The miette derive assigns label fields in a way rustc flags as unused.
#![allow(unused_assignments)]

use std::fmt::Write as _;

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a valid key needs before it is offered as a fix.
const MIN_SIMILARITY: f64 = 0.8;

/// One problem found while loading or validating `sluice.toml`.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("`{key}` is not a recognized setting")]
    #[diagnostic(code(sluice::config::unknown_key), help("{}", unknown_key_help(suggestion.as_deref(), valid_keys)))]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not recognized here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(sluice::config::invalid_type), help("use a value of type {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    #[error("`{key}` has an unsupported value: {detail}")]
    #[diagnostic(code(sluice::config::invalid_value))]
    InvalidValue { key: String, detail: String },

    #[error("`{key}` must be set")]
    #[diagnostic(code(sluice::config::missing_key), help("set `{key}` in sluice.toml or through SLUICE_* variables"))]
    MissingKey { key: String },

    #[error("{message}")]
    #[diagnostic(code(sluice::config::validation))]
    Validation { message: String },

    #[error("could not load configuration: {message}")]
    #[diagnostic(code(sluice::config::load))]
    Load { message: String },
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    let mut help = String::new();
    if let Some(suggestion) = suggestion {
        let _ = write!(help, "did you mean `{suggestion}`? ");
    }
    let _ = write!(help, "known keys here: {valid_keys}");
    help
}

/// Raw TOML text of one loaded layer, keyed by the name shown in reports.
pub type TomlSource = (String, String);

/// Flattens a figment error chain into one `ConfigError` per failure.
pub fn collect_errors(err: figment::Error, sources: &[TomlSource]) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| classify(&error, sources))
        .collect()
}

fn classify(error: &figment::Error, sources: &[TomlSource]) -> ConfigError {
    let table: Vec<&str> = error.path.iter().map(String::as_str).collect();
    let dotted = table.join(".");

    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let (span, src) = source_of(error, sources)
                .and_then(|(name, text)| {
                    let offset = locate_key(text, &table, field)?;
                    Some((
                        SourceSpan::new(offset.into(), field.len()),
                        NamedSource::new(name, text.clone()),
                    ))
                })
                .unzip();
            ConfigError::UnknownKey {
                key: field.clone(),
                suggestion: closest_key(field, expected),
                valid_keys: expected.join(", "),
                span,
                src,
            }
        }
        Kind::MissingField(field) => ConfigError::MissingKey {
            key: if dotted.is_empty() {
                field.to_string()
            } else {
                format!("{dotted}.{field}")
            },
        },
        Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
            key: dotted,
            detail: format!("got {actual}"),
            expected: expected.clone(),
        },
        Kind::UnknownVariant(actual, expected) => ConfigError::InvalidValue {
            key: dotted,
            detail: format!("`{actual}`, expected one of {}", expected.join(", ")),
        },
        _ => ConfigError::Load {
            message: error.to_string(),
        },
    }
}

/// The loaded layer an error was raised from.
///
/// Layers parsed from a string have no file name, so a lone source is assumed
/// to be the culprit.
fn source_of<'a>(error: &figment::Error, sources: &'a [TomlSource]) -> Option<&'a TomlSource> {
    let file = error
        .metadata
        .as_ref()
        .and_then(|meta| meta.source.as_ref())
        .and_then(figment::Source::file_path)
        .map(|path| path.display().to_string());

    match file {
        Some(file) => sources.iter().find(|(name, _)| *name == file),
        None if sources.len() == 1 => sources.first(),
        None => None,
    }
}

/// Byte offset of the `key = ...` line for `key` inside table `table`.
///
/// An empty `table` means the top level, before any header.
pub fn locate_key(text: &str, table: &[&str], key: &str) -> Option<usize> {
    let wanted = table.join(".");
    let mut current = String::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let content = line.trim_start();
        let indent = line.len() - content.len();

        if let Some(header) = content.strip_prefix('[') {
            current = header
                .split(']')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
        } else if current == wanted
            && let Some((name, _)) = content.split_once('=')
            && name.trim() == key
        {
            return Some(offset + indent);
        }

        offset += line.len();
    }

    None
}

/// The valid key most similar to `unknown`, if any is similar enough.
pub fn closest_key(unknown: &str, valid: &[&str]) -> Option<String> {
    let mut best: Option<(f64, &str)> = None;
    for candidate in valid {
        let score = strsim::jaro_winkler(unknown, candidate);
        if score >= MIN_SIMILARITY && best.is_none_or(|(top, _)| score > top) {
            best = Some((score, *candidate));
        }
    }
    best.map(|(_, key)| key.to_string())
}

/// Renders every error as a graphical miette report.
pub fn render_to_string(errors: &[ConfigError]) -> String {
    let handler = GraphicalReportHandler::new();
    let mut out = String::new();
    for error in errors {
        if handler.render_report(&mut out, error as &dyn Diagnostic).is_err() {
            let _ = writeln!(out, "error: {error}");
        }
    }
    out
}

/// Prints [`render_to_string`] output to stderr.
pub fn render_errors(errors: &[ConfigError]) {
    eprint!("{}", render_to_string(errors));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offers_the_nearest_key() {
        let valid = ["idle_timeout_secs", "mailbox_capacity", "edit_throttle_ms"];
        assert_eq!(
            closest_key("idle_timout_secs", &valid).as_deref(),
            Some("idle_timeout_secs")
        );
        assert_eq!(closest_key("zzzzzz", &["ttl_secs", "command_prefix"]), None);
    }

    #[test]
    fn locates_key_in_its_own_table() {
        let text = "[codex]\nmailbox_capcity = 1\n\n[turn]\n  mailbox_capcity = 4\n";
        let offset = locate_key(text, &["turn"], "mailbox_capcity").unwrap();
        assert_eq!(&text[offset..offset + 15], "mailbox_capcity");
        assert!(offset > text.find("[turn]").unwrap());
    }

    #[test]
    fn key_in_another_table_is_not_located() {
        let text = "[codex]\nbogus = 1\n[turn]\nidle_timeout_secs = 3\n";
        assert_eq!(locate_key(text, &["turn"], "bogus"), None);
    }

    #[test]
    fn top_level_keys_are_located_before_any_header() {
        let text = "log_level = \"info\"\n[turn]\nlog_level = 1\n";
        assert_eq!(locate_key(text, &[], "log_level"), Some(0));
    }

    #[test]
    fn rendered_report_names_the_key_and_fix() {
        let errors = vec![ConfigError::UnknownKey {
            key: "ttl_sec".into(),
            suggestion: Some("ttl_secs".into()),
            valid_keys: "ttl_secs, command_prefix".into(),
            span: None,
            src: None,
        }];
        let report = render_to_string(&errors);
        assert!(report.contains("ttl_sec"));
        assert!(report.contains("did you mean `ttl_secs`?"));
    }
}
