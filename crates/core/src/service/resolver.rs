//! Selecting a service variant from its service-identifier pattern.
//!
//! | Pattern | Variant |
//! |---------|---------|
//! | blank | unresolved |
//! | compiles as a regular expression | [`ServiceVariant::Regex`] |
//! | contains `*` or `?` | [`ServiceVariant::Ant`] |
//! | anything else | unresolved |
//!
//! The first matching row wins. Many glob patterns are also valid regular
//! expressions (`https://app/*` compiles), so those resolve to `Regex` even
//! when the author meant a glob.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a registered service interprets its service-identifier pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceVariant {
    /// Regular expression, matched against the whole service URL.
    #[default]
    Regex,
    /// Ant-style glob (`*`, `**`, `?`).
    Ant,
}

impl ServiceVariant {
    /// Short label for logging and display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::Ant => "ant",
        }
    }
}

impl std::fmt::Display for ServiceVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a service-identifier pattern. `None` means unresolved: the
/// pattern is neither a usable regex nor a glob.
pub fn resolve(pattern: &str) -> Option<ServiceVariant> {
    if pattern.trim().is_empty() {
        debug!("blank service pattern is unresolved");
        return None;
    }

    if is_valid_regex(pattern) {
        return Some(ServiceVariant::Regex);
    }

    if is_ant_pattern(pattern) {
        return Some(ServiceVariant::Ant);
    }

    debug!(pattern, "service pattern is neither regex nor glob");
    None
}

fn is_valid_regex(pattern: &str) -> bool {
    match regex_lite::Regex::new(pattern) {
        Ok(_) => true,
        Err(e) => {
            debug!(pattern, error = %e, "failed to identify pattern as a regular expression");
            false
        }
    }
}

/// Compile `pattern` to match whole inputs, case-insensitively.
///
/// The pattern must compile on its own before it is wrapped: `x)|(.*` is
/// invalid, but `^(?:x)|(.*)$` is valid and matches everything.
pub fn full_match_regex(pattern: &str) -> Result<regex_lite::Regex, regex_lite::Error> {
    regex_lite::Regex::new(pattern)?;
    regex_lite::Regex::new(&format!("(?i)^(?:{})$", pattern))
}

/// Whether `pattern` carries glob wildcards.
pub fn is_ant_pattern(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}
