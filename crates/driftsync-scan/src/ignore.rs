//! Ignore rules: glob patterns compiled to path predicates, plus the
//! best-effort `find` prune subset embedded in the remote enumeration
//! command
//!
//! File format: one glob per line; blank lines and `#` comments skipped;
//! `**` matches any number of path segments, `*` within one segment,
//! `?` one character.

use regex::Regex;
use std::path::Path;
use tracing::debug;

/// Compiled ignore rules for one replica pair.
///
/// Keeps both the compiled predicates (applied client-side to every
/// listing) and the raw lines (source for the remote prune expression).
#[derive(Debug, Default)]
pub struct IgnoreSet {
    patterns: Vec<Regex>,
    raw: Vec<String>,
}

/// Compile one glob line into a path-matching regex
fn compile_pattern(raw: &str) -> Option<Regex> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut escaped = regex::escape(line);
    escaped = escaped.replace(r"\*\*", "\u{1}");
    escaped = escaped.replace(r"\*", "[^/]*");
    escaped = escaped.replace(r"\?", "[^/]");
    escaped = escaped.replace('\u{1}', ".*");
    if !escaped.starts_with('/') {
        escaped = format!("(^|.*/){escaped}");
    }
    Regex::new(&format!("{escaped}(/.*)?$")).ok()
}

impl IgnoreSet {
    /// Load rules from a file; a missing file yields an empty set
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(_) => {
                debug!("no ignore file at {}", path.display());
                Self::default()
            }
        }
    }

    /// Parse rules from text
    pub fn parse(text: &str) -> Self {
        let mut patterns = Vec::new();
        let mut raw = Vec::new();
        for line in text.lines() {
            if let Some(regex) = compile_pattern(line) {
                patterns.push(regex);
                raw.push(line.trim().to_string());
            }
        }
        Self { patterns, raw }
    }

    /// Number of compiled patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the set holds no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether a relative path matches any ignore pattern
    pub fn is_ignored(&self, rel: &str) -> bool {
        let norm = rel.replace('\\', "/");
        self.patterns.iter().any(|p| p.is_match(&norm))
    }

    /// Emit a `find … \( <prune> \) -o …` fragment covering the pattern
    /// shapes expressible as name or path-suffix globs.
    ///
    /// Three shapes are handled; anything else is left to the client-side
    /// [`is_ignored`](Self::is_ignored) filter that re-checks every
    /// returned path:
    ///
    /// 1. bare name glob (`*.jar`, `.DS_Store`) → `-name "…"`
    /// 2. `**/name` → `-name "name"` (any depth, cheapest)
    /// 3. `**/path/segments`, `*/…`, `./…`, `…/**` → `-path "*/…"`
    ///
    /// Version-control metadata is always pruned regardless of rules.
    pub fn find_prune_expr(&self) -> String {
        let mut name_prunes: Vec<String> = Vec::new();
        let mut path_prunes: Vec<String> = Vec::new();

        for line in &self.raw {
            if let Some(tail) = line.strip_prefix("**/") {
                if tail.is_empty() {
                    continue;
                }
                if tail.contains('/') {
                    path_prunes.push(format!("-path \"*/{tail}\""));
                } else {
                    name_prunes.push(format!("-name \"{tail}\""));
                }
            } else if !line.contains('/') {
                name_prunes.push(format!("-name \"{line}\""));
            } else if line.starts_with("*/") {
                path_prunes.push(format!("-path \"{line}\""));
            } else if let Some(tail) = line.strip_prefix("./") {
                path_prunes.push(format!("-path \"*/{tail}\""));
            } else if let Some(tail) = line.strip_suffix("/**") {
                let tail = tail.strip_prefix("./").unwrap_or(tail);
                if !tail.is_empty() {
                    path_prunes.push(format!("-path \"*/{tail}\""));
                }
            }
            // Leading-slash absolute patterns and other complex forms are
            // handled client-side only.
        }

        path_prunes.push("-path \"*/.git/*\"".to_string());

        let parts: Vec<String> = name_prunes
            .into_iter()
            .chain(path_prunes)
            .map(|p| format!(r"\( {p} -prune \)"))
            .collect();
        format!(r"\( {} \) -o", parts.join(" -o "))
    }
}
