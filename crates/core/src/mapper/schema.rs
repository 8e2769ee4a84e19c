//! Physical directory attribute names for each field of a registered service.
//!
//! Every name has a default matching the stock directory schema and can be
//! overridden from the `[schema]` table of the config file or through the
//! setters. [`AttributeSchema::validate`] runs when a
//! [`ServiceMapper`](super::ServiceMapper) is built, so a bad schema is
//! reported at startup instead of on the first mapping call.

use serde::{Deserialize, Serialize};

use crate::directory::entry::OBJECT_CLASS_ATTRIBUTE;
use crate::errors::MappingError;

/// Logical field -> physical attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeSchema {
    object_class: String,
    id_attribute: String,
    service_id_attribute: String,
    service_name_attribute: String,
    service_description_attribute: String,
    service_enabled_attribute: String,
    service_sso_enabled_attribute: String,
    service_proxy_policy_attribute: String,
    service_theme_attribute: String,
    username_attribute_provider_attribute: String,
    attribute_release_policy_attribute: String,
    evaluation_order_attribute: String,
    required_handlers_attribute: String,
}

impl Default for AttributeSchema {
    fn default() -> Self {
        Self {
            object_class: "casRegisteredService".into(),
            id_attribute: "uid".into(),
            service_id_attribute: "casServiceUrlPattern".into(),
            service_name_attribute: "cn".into(),
            service_description_attribute: "description".into(),
            service_enabled_attribute: "casServiceEnabled".into(),
            service_sso_enabled_attribute: "casServiceSsoEnabled".into(),
            service_proxy_policy_attribute: "casServiceProxyPolicy".into(),
            service_theme_attribute: "casServiceTheme".into(),
            username_attribute_provider_attribute: "casUsernameAttributeProvider".into(),
            attribute_release_policy_attribute: "casAttributeReleasePolicy".into(),
            evaluation_order_attribute: "casEvaluationOrder".into(),
            required_handlers_attribute: "casRequiredHandlers".into(),
        }
    }
}

macro_rules! schema_accessors {
    ($($field:ident => $setter:ident),* $(,)?) => {
        impl AttributeSchema {
            $(
                pub fn $field(&self) -> &str {
                    &self.$field
                }

                pub fn $setter(&mut self, value: impl Into<String>) -> &mut Self {
                    self.$field = value.into();
                    self
                }
            )*
        }
    };
}

schema_accessors! {
    object_class => set_object_class,
    id_attribute => set_id_attribute,
    service_id_attribute => set_service_id_attribute,
    service_name_attribute => set_service_name_attribute,
    service_description_attribute => set_service_description_attribute,
    service_enabled_attribute => set_service_enabled_attribute,
    service_sso_enabled_attribute => set_service_sso_enabled_attribute,
    service_proxy_policy_attribute => set_service_proxy_policy_attribute,
    service_theme_attribute => set_service_theme_attribute,
    username_attribute_provider_attribute => set_username_attribute_provider_attribute,
    attribute_release_policy_attribute => set_attribute_release_policy_attribute,
    evaluation_order_attribute => set_evaluation_order_attribute,
    required_handlers_attribute => set_required_handlers_attribute,
}

impl AttributeSchema {
    /// Every attribute-name field as `(field, physical name)`, in entry order.
    /// The object class is a value, not an attribute name, and is excluded.
    pub fn attribute_fields(&self) -> [(&'static str, &str); 12] {
        [
            ("id_attribute", self.id_attribute.as_str()),
            ("service_id_attribute", self.service_id_attribute.as_str()),
            ("service_name_attribute", self.service_name_attribute.as_str()),
            ("service_description_attribute", self.service_description_attribute.as_str()),
            ("service_enabled_attribute", self.service_enabled_attribute.as_str()),
            ("service_sso_enabled_attribute", self.service_sso_enabled_attribute.as_str()),
            ("evaluation_order_attribute", self.evaluation_order_attribute.as_str()),
            ("service_theme_attribute", self.service_theme_attribute.as_str()),
            ("required_handlers_attribute", self.required_handlers_attribute.as_str()),
            ("username_attribute_provider_attribute", self.username_attribute_provider_attribute.as_str()),
            ("attribute_release_policy_attribute", self.attribute_release_policy_attribute.as_str()),
            ("service_proxy_policy_attribute", self.service_proxy_policy_attribute.as_str()),
        ]
    }

    /// Reject blank names and physical names shared by two fields.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.object_class.trim().is_empty() {
            return Err(MappingError::SchemaMisconfiguration {
                field: "object_class".into(),
                detail: "object class must not be blank".into(),
            });
        }

        let fields = self.attribute_fields();
        for (i, (field, name)) in fields.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(MappingError::SchemaMisconfiguration {
                    field: (*field).into(),
                    detail: "attribute name must not be blank".into(),
                });
            }
            if name.eq_ignore_ascii_case(OBJECT_CLASS_ATTRIBUTE) {
                return Err(MappingError::SchemaMisconfiguration {
                    field: (*field).into(),
                    detail: format!("'{}' is reserved for object classes", name),
                });
            }
            if let Some((other, _)) = fields[..i]
                .iter()
                .find(|(_, earlier)| earlier.eq_ignore_ascii_case(name))
            {
                return Err(MappingError::SchemaMisconfiguration {
                    field: (*field).into(),
                    detail: format!("attribute '{}' is already used by '{}'", name, other),
                });
            }
        }
        Ok(())
    }
}
