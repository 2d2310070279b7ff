//! Configuration validation engine.
//!
//! Checks a config file for syntax errors, unknown or misspelled fields,
//! type errors, and channel definitions that cannot be resolved to an
//! endpoint.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{
    env_subst::substitute_env,
    loader::{find_config_file, parse_config, parse_config_value},
    schema::{ChannelEntry, LivefeedConfig},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "endpoint",
    /// "retry", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "channels.prices.path"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

fn diag(
    severity: Severity,
    category: &'static str,
    path: impl Into<String>,
    message: impl Into<String>,
) -> Diagnostic {
    Diagnostic {
        severity,
        category,
        path: path.into(),
        message: message.into(),
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    /// A table with fixed field names.
    Struct(HashMap<&'static str, KnownKeys>),
    /// A table with dynamic keys whose values have a known shape.
    Map(Box<KnownKeys>),
    /// Scalar or free-form value; not descended into.
    Leaf,
}

const RETRY_FIELDS: &[&str] = &[
    "max_retries",
    "base_delay_ms",
    "backoff",
    "max_delay_ms",
    "connect_timeout_ms",
];

fn build_schema_map() -> KnownKeys {
    let leaves = |names: &[&'static str]| -> HashMap<&'static str, KnownKeys> {
        names.iter().map(|n| (*n, KnownKeys::Leaf)).collect()
    };

    let defaults = KnownKeys::Struct(leaves(RETRY_FIELDS));

    let mut channel = leaves(RETRY_FIELDS);
    channel.extend(leaves(&["url", "path", "on_open"]));
    let channels = KnownKeys::Map(Box::new(KnownKeys::Struct(channel)));

    let mut root = leaves(&["origin", "ca_file"]);
    root.insert("defaults", defaults);
    root.insert("channels", channels);
    KnownKeys::Struct(root)
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(),
    };

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![diag(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let mut result = match std::fs::read_to_string(&actual_path) {
        Ok(content) => validate_str(&substitute_env(&content), &actual_path),
        Err(e) => ValidationResult {
            diagnostics: vec![diag(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate config text; `path` only selects the format by extension.
#[must_use]
pub fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();

    // 1. Syntax
    let value = match parse_config_value(raw, path) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(diag(Severity::Error, "syntax", "", format!("syntax error: {e}")));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    // 2. Unknown fields
    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    // 3. Types, then semantics on the parsed config
    match parse_config(raw, path) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(diag(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn check_unknown_fields(
    value: &Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (value, schema) {
        (Value::Object(table), KnownKeys::Struct(fields)) => {
            let mut known_keys: Vec<&str> = fields.keys().copied().collect();
            known_keys.sort_unstable();
            for (key, child_value) in table {
                let path = child_path(prefix, key);
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child_value, child_schema, &path, diagnostics);
                    continue;
                }
                let message = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(diag(Severity::Error, "unknown-field", path, message));
            }
        },
        (Value::Object(table), KnownKeys::Map(value_schema)) => {
            for (key, child_value) in table {
                check_unknown_fields(
                    child_value,
                    value_schema,
                    &child_path(prefix, key),
                    diagnostics,
                );
            }
        },
        // Leaf or type mismatch; type errors are reported later.
        _ => {},
    }
}

fn check_semantics(config: &LivefeedConfig, diagnostics: &mut Vec<Diagnostic>) {
    if let Some(origin) = &config.origin {
        match url::Url::parse(origin) {
            Ok(url) if matches!(url.scheme(), "http" | "https" | "ws" | "wss") => {},
            Ok(url) => diagnostics.push(diag(
                Severity::Error,
                "endpoint",
                "origin",
                format!("unsupported scheme `{}`, expected http(s) or ws(s)", url.scheme()),
            )),
            Err(e) => diagnostics.push(diag(
                Severity::Error,
                "endpoint",
                "origin",
                format!("invalid URL: {e}"),
            )),
        }
    }

    if let Some(ca_file) = &config.ca_file
        && !ca_file.exists()
    {
        diagnostics.push(diag(
            Severity::Warning,
            "file-ref",
            "ca_file",
            format!("file not found: {}", ca_file.display()),
        ));
    }

    let defaults = &config.defaults;
    check_delays(
        "defaults",
        Some(defaults.base_delay_ms),
        defaults.max_delay_ms,
        defaults.base_delay_ms,
        diagnostics,
    );
    if defaults.connect_timeout_ms == 0 {
        diagnostics.push(diag(
            Severity::Error,
            "retry",
            "defaults.connect_timeout_ms",
            "connect timeout must be greater than zero",
        ));
    }

    if config.channels.is_empty() {
        diagnostics.push(diag(
            Severity::Info,
            "endpoint",
            "channels",
            "no channels configured",
        ));
    }

    for (name, entry) in &config.channels {
        check_channel(config, name, entry, diagnostics);
    }
}

fn check_channel(
    config: &LivefeedConfig,
    name: &str,
    entry: &ChannelEntry,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let prefix = format!("channels.{name}");

    if entry.url.is_some() && entry.path.is_some() {
        diagnostics.push(diag(
            Severity::Warning,
            "endpoint",
            &prefix,
            "both `url` and `path` are set; `url` is used",
        ));
    }
    match (&entry.url, &entry.path) {
        (None, None) => diagnostics.push(diag(
            Severity::Error,
            "endpoint",
            &prefix,
            "missing endpoint: set `url` or `path`",
        )),
        (None, Some(_)) if config.origin.is_none() => diagnostics.push(diag(
            Severity::Warning,
            "endpoint",
            format!("{prefix}.path"),
            "relative path needs `origin` (or --origin at runtime)",
        )),
        _ => {
            if let Err(e) = entry.endpoint(name, config.origin.as_deref()) {
                let field = if entry.url.is_some() {
                    "url"
                } else {
                    "path"
                };
                diagnostics.push(diag(
                    Severity::Error,
                    "endpoint",
                    format!("{prefix}.{field}"),
                    e.to_string(),
                ));
            }
        },
    }

    let base = entry
        .base_delay_ms
        .unwrap_or(config.defaults.base_delay_ms);
    check_delays(
        &prefix,
        entry.base_delay_ms,
        entry.max_delay_ms.or(config.defaults.max_delay_ms),
        base,
        diagnostics,
    );
}

/// `own_base` is the value set at this level (reported on), `base` the
/// effective one (compared against `max_delay_ms`).
fn check_delays(
    prefix: &str,
    own_base: Option<u64>,
    max_delay_ms: Option<u64>,
    base: u64,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if own_base == Some(0) {
        diagnostics.push(diag(
            Severity::Error,
            "retry",
            format!("{prefix}.base_delay_ms"),
            "base delay must be greater than zero",
        ));
    }
    if let Some(max) = max_delay_ms
        && max < base
    {
        diagnostics.push(diag(
            Severity::Warning,
            "retry",
            format!("{prefix}.max_delay_ms"),
            format!("max_delay_ms ({max}) is below base_delay_ms ({base})"),
        ));
    }
}
