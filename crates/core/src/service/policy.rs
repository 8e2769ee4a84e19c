//! Policy objects attached to a registered service.
//!
//! Each policy kind is a closed tagged union. The serialized form is a
//! self-describing JSON document whose `@type` field names the variant:
//!
//! ```json
//! {"@type": "ReturnAllowedAttributeReleasePolicy", "allowed_attributes": ["mail"]}
//! ```
//!
//! New behaviour is added by extending the relevant enum.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::resolver;

/// Principal attributes as released by the authentication layer.
pub type Attributes = BTreeMap<String, Vec<String>>;

/// Common bound for anything the policy codec can embed in an attribute.
pub trait Policy: Serialize + DeserializeOwned {
    /// Human-readable kind, used in error messages.
    const KIND: &'static str;

    /// Reject values that parse but cannot be enforced.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Username release
// ---------------------------------------------------------------------------

/// Decides which username a service receives for an authenticated principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum UsernameAttributeProvider {
    /// Release the principal id unchanged.
    #[default]
    #[serde(rename = "DefaultUsernameProvider")]
    Default,

    /// Release the first value of a principal attribute.
    #[serde(rename = "PrincipalAttributeUsernameProvider")]
    PrincipalAttribute { username_attribute: String },

    /// Release an opaque per-service identifier derived from the principal.
    #[serde(rename = "AnonymousUsernameProvider")]
    Anonymous {
        #[serde(default)]
        salt: String,
    },
}

impl UsernameAttributeProvider {
    /// Resolve the username released to `service` for `principal_id`.
    pub fn resolve_username(
        &self,
        principal_id: &str,
        attributes: &Attributes,
        service: &str,
    ) -> String {
        match self {
            Self::Default => principal_id.to_string(),
            Self::PrincipalAttribute { username_attribute } => {
                match attributes.get(username_attribute).and_then(|v| v.first()) {
                    Some(value) => value.clone(),
                    None => {
                        warn!(
                            principal_id,
                            attribute = %username_attribute,
                            "principal lacks username attribute, releasing principal id"
                        );
                        principal_id.to_string()
                    }
                }
            }
            Self::Anonymous { salt } => {
                let mut hasher = Sha256::new();
                hasher.update(service.as_bytes());
                hasher.update(b"!");
                hasher.update(principal_id.as_bytes());
                hasher.update(b"!");
                hasher.update(salt.as_bytes());
                hex::encode(hasher.finalize())
            }
        }
    }
}

impl Policy for UsernameAttributeProvider {
    const KIND: &'static str = "username attribute provider";
}

// ---------------------------------------------------------------------------
// Attribute release
// ---------------------------------------------------------------------------

/// Decides which principal attributes a service may receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum AttributeReleasePolicy {
    /// Release only the listed attributes.
    #[serde(rename = "ReturnAllowedAttributeReleasePolicy")]
    ReturnAllowed {
        #[serde(default)]
        allowed_attributes: Vec<String>,
        #[serde(default)]
        authorized_to_release_credential_password: bool,
        #[serde(default)]
        authorized_to_release_proxy_granting_ticket: bool,
    },

    /// Release everything the principal carries.
    #[serde(rename = "ReturnAllAttributeReleasePolicy")]
    ReturnAll,

    /// Release nothing.
    #[serde(rename = "DenyAllAttributeReleasePolicy")]
    DenyAll,

    /// Release the listed attributes under new names (source -> released).
    #[serde(rename = "ReturnMappedAttributeReleasePolicy")]
    ReturnMapped {
        #[serde(default)]
        allowed_attributes: BTreeMap<String, String>,
    },
}

impl Default for AttributeReleasePolicy {
    /// Allow-list policy with an empty list.
    fn default() -> Self {
        Self::return_allowed(Vec::<String>::new())
    }
}

impl AttributeReleasePolicy {
    /// Allow-list policy releasing `allowed` and no credentials.
    pub fn return_allowed<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ReturnAllowed {
            allowed_attributes: allowed.into_iter().map(Into::into).collect(),
            authorized_to_release_credential_password: false,
            authorized_to_release_proxy_granting_ticket: false,
        }
    }

    /// Filter `attributes` down to what this policy releases.
    pub fn release(&self, attributes: &Attributes) -> Attributes {
        let released: Attributes = match self {
            Self::ReturnAllowed {
                allowed_attributes, ..
            } => attributes
                .iter()
                .filter(|(name, _)| allowed_attributes.iter().any(|a| a == *name))
                .map(|(name, values)| (name.clone(), values.clone()))
                .collect(),
            Self::ReturnAll => attributes.clone(),
            Self::DenyAll => Attributes::new(),
            Self::ReturnMapped { allowed_attributes } => allowed_attributes
                .iter()
                .filter_map(|(source, target)| {
                    attributes
                        .get(source)
                        .map(|values| (target.clone(), values.clone()))
                })
                .collect(),
        };
        debug!(
            offered = attributes.len(),
            released = released.len(),
            "applied attribute release policy"
        );
        released
    }

    pub fn releases_credential_password(&self) -> bool {
        matches!(
            self,
            Self::ReturnAllowed {
                authorized_to_release_credential_password: true,
                ..
            }
        )
    }

    pub fn releases_proxy_granting_ticket(&self) -> bool {
        matches!(
            self,
            Self::ReturnAllowed {
                authorized_to_release_proxy_granting_ticket: true,
                ..
            }
        )
    }
}

impl Policy for AttributeReleasePolicy {
    const KIND: &'static str = "attribute release policy";
}

// ---------------------------------------------------------------------------
// Proxying
// ---------------------------------------------------------------------------

/// Decides whether a service may obtain proxy-granting tickets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ProxyPolicy {
    /// Proxying is never allowed.
    #[default]
    #[serde(rename = "RefuseProxyPolicy")]
    Refuse,

    /// Proxying is allowed for callback URLs fully matching `pattern`.
    #[serde(rename = "RegexProxyPolicy")]
    Regex { pattern: String },
}

impl ProxyPolicy {
    /// Whether a proxy callback at `callback_url` may be issued a ticket.
    pub fn allows_proxying(&self, callback_url: &str) -> bool {
        match self {
            Self::Refuse => false,
            Self::Regex { pattern } => match resolver::full_match_regex(pattern) {
                Ok(re) => re.is_match(callback_url),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "invalid proxy callback pattern");
                    false
                }
            },
        }
    }
}

impl Policy for ProxyPolicy {
    const KIND: &'static str = "proxy policy";

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Refuse => Ok(()),
            Self::Regex { pattern } => resolver::full_match_regex(pattern)
                .map(|_| ())
                .map_err(|e| format!("invalid proxy callback pattern '{}': {}", pattern, e)),
        }
    }
}
