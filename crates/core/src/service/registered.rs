//! The registered-service entity.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::policy::{AttributeReleasePolicy, ProxyPolicy, UsernameAttributeProvider};
use super::resolver::{self, ServiceVariant};

/// A client application allowed to use the authentication gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredService {
    /// Directory-wide identifier. `None` until first persisted.
    #[serde(default)]
    pub id: Option<i64>,

    /// How `service_id` is matched against incoming service URLs.
    #[serde(default)]
    pub variant: ServiceVariant,

    /// Service-identifier pattern (regex or glob, per `variant`).
    pub service_id: String,

    /// Display name.
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub sso_enabled: bool,

    /// Lower values are evaluated first when several services match.
    #[serde(default)]
    pub evaluation_order: i32,

    #[serde(default)]
    pub theme: Option<String>,

    /// Authentication handlers that must have succeeded for this service.
    #[serde(default)]
    pub required_handlers: BTreeSet<String>,

    #[serde(default)]
    pub username_attribute_provider: Option<UsernameAttributeProvider>,

    #[serde(default)]
    pub attribute_release_policy: Option<AttributeReleasePolicy>,

    #[serde(default)]
    pub proxy_policy: Option<ProxyPolicy>,
}

fn default_true() -> bool {
    true
}

impl RegisteredService {
    /// A new, unpersisted service with the given variant.
    pub fn new(
        variant: ServiceVariant,
        service_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            variant,
            service_id: service_id.into(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            sso_enabled: true,
            evaluation_order: 0,
            theme: None,
            required_handlers: BTreeSet::new(),
            username_attribute_provider: None,
            attribute_release_policy: None,
            proxy_policy: None,
        }
    }

    pub fn regex(service_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ServiceVariant::Regex, service_id, name)
    }

    pub fn ant(service_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ServiceVariant::Ant, service_id, name)
    }

    /// Build a service whose variant is picked from the pattern itself.
    /// `None` if the pattern resolves to neither variant.
    pub fn from_pattern(service_id: impl Into<String>, name: impl Into<String>) -> Option<Self> {
        let service_id = service_id.into();
        let variant = resolver::resolve(&service_id)?;
        Some(Self::new(variant, service_id, name))
    }

    /// Return the identifier, assigning a fresh one first if unset.
    pub fn ensure_id(&mut self) -> i64 {
        *self.id.get_or_insert_with(|| {
            let id = next_identifier();
            debug!(id, service_id = %self.service_id, "assigned service identifier");
            id
        })
    }

    /// Whether `service_url` is covered by this service's pattern.
    ///
    /// Regex services match the whole URL, case-insensitively. Ant services
    /// use glob semantics where `*` stops at `/` and `**` does not.
    pub fn matches(&self, service_url: &str) -> bool {
        match self.variant {
            ServiceVariant::Regex => match resolver::full_match_regex(&self.service_id) {
                Ok(re) => re.is_match(service_url),
                Err(e) => {
                    warn!(service_id = %self.service_id, error = %e, "invalid service pattern");
                    false
                }
            },
            ServiceVariant::Ant => glob_match::glob_match(&self.service_id, service_url),
        }
    }
}

static LAST_IDENTIFIER: AtomicI64 = AtomicI64::new(0);

/// Next identifier from a per-process source seeded by the nanosecond clock.
/// Strictly positive and strictly increasing, even when the clock stalls.
pub fn next_identifier() -> i64 {
    let now = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros())
        .max(1);
    let previous = LAST_IDENTIFIER
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(previous + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let svc = RegisteredService::regex(r"^https://app\.example\.org/.*", "App");
        assert_eq!(svc.id, None);
        assert!(svc.enabled);
        assert!(svc.sso_enabled);
        assert!(svc.required_handlers.is_empty());
        assert!(svc.proxy_policy.is_none());
    }

    #[test]
    fn test_ensure_id_is_idempotent() {
        let mut svc = RegisteredService::regex("https://app", "App");
        let first = svc.ensure_id();
        assert!(first > 0);
        assert_eq!(svc.ensure_id(), first);
        assert_eq!(svc.id, Some(first));
    }

    #[test]
    fn test_ensure_id_keeps_existing() {
        let mut svc = RegisteredService::regex("https://app", "App");
        svc.id = Some(17);
        assert_eq!(svc.ensure_id(), 17);
    }

    #[test]
    fn test_identifiers_increase() {
        let ids: Vec<i64> = (0..1000).map(|_| next_identifier()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_identifiers_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..500).map(|_| next_identifier()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn test_from_pattern() {
        let svc = RegisteredService::from_pattern("*.example.org/**", "Glob").unwrap();
        assert_eq!(svc.variant, ServiceVariant::Ant);
        assert!(RegisteredService::from_pattern("", "Nothing").is_none());
    }

    #[test]
    fn test_regex_matching_is_full_and_case_insensitive() {
        let svc = RegisteredService::regex(r"https://app\.example\.org/.*", "App");
        assert!(svc.matches("https://app.example.org/login"));
        assert!(svc.matches("HTTPS://APP.EXAMPLE.ORG/login"));
        assert!(!svc.matches("https://evil.net/?https://app.example.org/"));
    }

    #[test]
    fn test_ant_matching() {
        let svc = RegisteredService::ant("*://app.example.org/**", "App");
        assert!(svc.matches("https://app.example.org/a/b/c"));
        assert!(!svc.matches("https://other.example.org/a"));
    }

    #[test]
    fn test_broken_regex_matches_nothing() {
        let svc = RegisteredService::regex("x)|(.*", "Broken");
        assert!(!svc.matches("https://evil.attacker.net/"));
        assert!(!svc.matches("x"));
    }

    #[test]
    fn test_json_defaults() {
        let svc: RegisteredService =
            serde_json::from_str(r#"{"service_id": "https://app", "name": "App"}"#).unwrap();
        assert_eq!(svc.variant, ServiceVariant::Regex);
        assert!(svc.enabled);
        assert!(svc.theme.is_none());
    }
}
