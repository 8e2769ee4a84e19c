//! TOML-based configuration for svcreg.
//!
//! The bind password is never stored in the file. `bind_password_env` names
//! an environment variable that [`AppConfig::resolve_env_vars`] reads at
//! runtime.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::mapper::AttributeSchema;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directory server holding the service entries.
    pub directory: DirectoryConfig,

    /// Physical attribute names used for service entries.
    #[serde(default)]
    pub schema: AttributeSchema,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Directory server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// LDAP URL (e.g. `ldaps://ldap.example.org:636`).
    pub url: String,

    /// Parent DN under which service entries live.
    pub base_dn: String,

    /// DN to bind as. Anonymous bind when unset.
    #[serde(default)]
    pub bind_dn: Option<String>,

    /// Environment variable holding the bind password.
    #[serde(default)]
    pub bind_password_env: Option<String>,

    /// Connection timeout in seconds (default 10).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Resolved bind password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub bind_password: Option<String>,
}

fn default_timeout() -> u64 {
    10
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: "ldap://localhost:389".into(),
            base_dn: "ou=services,dc=example,dc=org".into(),
            bind_dn: None,
            bind_password_env: None,
            timeout_secs: default_timeout(),
            bind_password: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve `*_env` fields from the environment. A missing variable is
    /// logged, not fatal: anonymous reads still work without a password.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref env_name) = self.directory.bind_password_env {
            self.directory.bind_password =
                resolve_optional_env(env_name, "directory.bind_password_env");
        }
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "directory.url".into(),
                detail: "directory URL must not be empty".into(),
            });
        }
        if !(self.directory.url.starts_with("ldap://")
            || self.directory.url.starts_with("ldaps://")
            || self.directory.url.starts_with("ldapi://"))
        {
            return Err(ConfigError::InvalidValue {
                field: "directory.url".into(),
                detail: "directory URL must use ldap://, ldaps:// or ldapi://".into(),
            });
        }
        if self.directory.base_dn.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "directory.base_dn".into(),
                detail: "base DN must not be empty".into(),
            });
        }
        if self.directory.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "directory.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        self.schema.validate()?;
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[logging]
log_level = "debug"

[directory]
url = "ldaps://ldap.example.org:636"
base_dn = "ou=services,dc=example,dc=org"
bind_dn = "cn=gateway,ou=system,dc=example,dc=org"
bind_password_env = "SVCREG_BIND_PASSWORD"
timeout_secs = 5

[schema]
id_attribute = "serviceNumber"
object_class = "gatewayService"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.directory.url, "ldaps://ldap.example.org:636");
        assert_eq!(config.directory.timeout_secs, 5);
        assert_eq!(config.schema.id_attribute(), "serviceNumber");
        assert_eq!(config.schema.service_name_attribute(), "cn");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svcreg.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.schema.object_class(), "gatewayService");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/svcreg.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[directory\nurl = ").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.directory.url = "https://ldap.example.org".into();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "directory.url"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_base_dn() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.directory.base_dn = " ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "directory.base_dn"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_schema() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.schema.set_service_theme_attribute("cn");
        assert!(matches!(config.validate(), Err(ConfigError::Schema(_))));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("SVCREG_TEST_BIND_PW", "s3cret");

        let toml_str = r#"
[directory]
url = "ldap://localhost"
base_dn = "ou=services,dc=test"
bind_dn = "cn=admin,dc=test"
bind_password_env = "SVCREG_TEST_BIND_PW"
"#;
        let mut config: AppConfig = toml::from_str(toml_str).unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(config.directory.bind_password.as_deref(), Some("s3cret"));

        std::env::remove_var("SVCREG_TEST_BIND_PW");
    }

    #[test]
    fn test_defaults() {
        let minimal = r#"
[directory]
url = "ldap://localhost"
base_dn = "ou=services,dc=test"
"#;
        let config: AppConfig = toml::from_str(minimal).unwrap();
        assert_eq!(config.logging.log_level, "info");
        assert_eq!(config.directory.timeout_secs, 10);
        assert!(config.directory.bind_dn.is_none());
        assert_eq!(config.schema, AttributeSchema::default());
    }
}
