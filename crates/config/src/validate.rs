//! Configuration validation engine.
//!
//! Validates TOML configuration against the known schema, detects
//! unknown/misspelled fields, and reports semantic problems that would make
//! the relay misbehave at runtime.

use std::{collections::HashMap, path::Path};

use crate::schema::RiftConfig;

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
    /// Category: "syntax", "unknown-field", "type-error", "semantic", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "timeouts.join_secs"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
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

// ── Schema tree for unknown-field detection ─────────────────────────────────

/// Represents the expected shape of the configuration schema.
enum KnownKeys {
    /// A struct with fixed field names.
    Struct(HashMap<&'static str, KnownKeys>),
    /// A map with dynamic keys (`irc.networks`) whose values have a known shape.
    Map(Box<KnownKeys>),
    /// An array of typed items.
    Array(Box<KnownKeys>),
    /// Scalar value, stop recursion.
    Leaf,
}

/// Destination prefixes accepted in `[[rifts]]` entries.
const DESTINATION_PREFIXES: &[&str] = &["irc:", "channel:", "dm:"];

/// Build the full schema map mirroring every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Array, Leaf, Map, Struct};

    let relay = Struct(HashMap::from([
        ("notify", Leaf),
        ("exit_keyword", Leaf),
        ("provenance_capacity", Leaf),
        ("max_attachments", Leaf),
        ("one_way", Leaf),
        ("report_failures", Leaf),
    ]));

    let timeouts = Struct(HashMap::from([
        ("connect_secs", Leaf),
        ("join_secs", Leaf),
        ("disambiguation_secs", Leaf),
    ]));

    let network = Struct(HashMap::from([
        ("host", Leaf),
        ("port", Leaf),
        ("password", Leaf),
        ("nickname", Leaf),
    ]));

    let irc = Struct(HashMap::from([
        ("nickname", Leaf),
        ("username", Leaf),
        ("realname", Leaf),
        ("message_limit", Leaf),
        ("networks", Map(Box::new(network))),
    ]));

    let rift = Struct(HashMap::from([("name", Leaf), ("destinations", Leaf)]));

    Struct(HashMap::from([
        ("relay", relay),
        ("timeouts", timeouts),
        ("irc", irc),
        ("rifts", Array(Box::new(rift))),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Find the closest candidate within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    match std::fs::read_to_string(actual_path) {
        Ok(content) => {
            let content = crate::env_subst::substitute_env(&content);
            let mut result = validate_toml_str(&content);
            result.config_path = Some(actual_path.clone());
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: Some(actual_path.clone()),
        },
    }
}

/// Validate a TOML string without file-system side effects.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    // 1. Syntax
    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    // 2. Unknown fields
    let schema = build_schema_map();
    check_unknown_fields(&toml_value, &schema, "", &mut diagnostics);

    // 3. Types, then semantics on the parsed config
    match toml::from_str::<RiftConfig>(toml_str) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Walk the TOML value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (value, schema) {
        (toml::Value::Table(table), KnownKeys::Struct(fields)) => {
            let known_keys: Vec<&str> = fields.keys().copied().collect();
            for (key, child_value) in table {
                let path = join_path(prefix, key);
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child_value, child_schema, &path, diagnostics);
                    continue;
                }
                let message = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    category: "unknown-field",
                    path,
                    message,
                });
            }
        },
        (toml::Value::Table(table), KnownKeys::Map(value_schema)) => {
            for (key, child_value) in table {
                check_unknown_fields(
                    child_value,
                    value_schema,
                    &join_path(prefix, key),
                    diagnostics,
                );
            }
        },
        (toml::Value::Array(arr), KnownKeys::Array(item_schema)) => {
            for (i, item) in arr.iter().enumerate() {
                let path = format!("{prefix}[{i}]");
                check_unknown_fields(item, item_schema, &path, diagnostics);
            }
        },
        // Leaf or type mismatch: stop recursion, type errors are caught later
        _ => {},
    }
}

/// Run semantic checks on a successfully parsed config.
fn check_semantics(config: &RiftConfig, diagnostics: &mut Vec<Diagnostic>) {
    let mut push = |severity, path: String, message: String| {
        diagnostics.push(Diagnostic {
            severity,
            category: "semantic",
            path,
            message,
        });
    };

    for (field, secs) in [
        ("connect_secs", config.timeouts.connect_secs),
        ("join_secs", config.timeouts.join_secs),
        ("disambiguation_secs", config.timeouts.disambiguation_secs),
    ] {
        if secs == 0 {
            push(
                Severity::Error,
                format!("timeouts.{field}"),
                "timeout must be at least one second".into(),
            );
        }
    }

    if config.relay.provenance_capacity == 0 {
        push(
            Severity::Warning,
            "relay.provenance_capacity".into(),
            "edits and deletions will never be relayed with a capacity of 0".into(),
        );
    }

    if config.relay.exit_keyword.trim().is_empty() {
        push(
            Severity::Warning,
            "relay.exit_keyword".into(),
            "empty exit keyword; rifts can only be closed by command".into(),
        );
    }

    if config.irc.nickname.trim().is_empty() {
        push(
            Severity::Error,
            "irc.nickname".into(),
            "IRC nickname must not be empty".into(),
        );
    }

    if !(32..=450).contains(&config.irc.message_limit) {
        push(
            Severity::Warning,
            "irc.message_limit".into(),
            format!(
                "{} bytes per line is outside the usual 32..=450 range",
                config.irc.message_limit
            ),
        );
    }

    for (i, rift) in config.rifts.iter().enumerate() {
        if rift.destinations.len() < 2 {
            push(
                Severity::Error,
                format!("rifts[{i}].destinations"),
                "a rift needs at least two destinations".into(),
            );
        }
        for (j, dest) in rift.destinations.iter().enumerate() {
            if !DESTINATION_PREFIXES.iter().any(|p| dest.starts_with(p)) {
                push(
                    Severity::Error,
                    format!("rifts[{i}].destinations[{j}]"),
                    format!(
                        "\"{dest}\" must start with one of {}",
                        DESTINATION_PREFIXES.join(", ")
                    ),
                );
            }
        }
    }
}
