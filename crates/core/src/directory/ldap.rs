//! `ldap3`-backed [`DirectoryStore`].
//!
//! The connection is established lazily on first use and dropped after any
//! transport error so the next call reconnects.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use ldap3::{ldap_escape, LdapConn, LdapConnSettings, LdapResult, Mod, Scope, SearchEntry};
use tracing::{debug, info, warn};

use super::entry::{DirectoryEntry, OBJECT_CLASS_ATTRIBUTE};
use super::store::DirectoryStore;
use crate::config::DirectoryConfig;
use crate::errors::DirectoryError;

const RC_SUCCESS: u32 = 0;
const RC_NO_SUCH_OBJECT: u32 = 32;

/// A directory reached over LDAP.
pub struct LdapDirectory {
    url: String,
    bind_dn: Option<String>,
    bind_password: Option<String>,
    timeout: Duration,
    conn: Mutex<Option<LdapConn>>,
}

impl LdapDirectory {
    /// Create a new LDAP directory handle. Does not connect.
    pub fn new(config: &DirectoryConfig) -> Self {
        info!(url = %config.url, base_dn = %config.base_dn, "created LdapDirectory");
        Self {
            url: config.url.clone(),
            bind_dn: config.bind_dn.clone(),
            bind_password: config.bind_password.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            conn: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn connect(&self) -> Result<LdapConn, DirectoryError> {
        debug!(url = %self.url, "connecting to LDAP server");
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let mut conn = LdapConn::with_settings(settings, &self.url)?;

        if let Some(ref bind_dn) = self.bind_dn {
            if self.bind_password.is_none() {
                warn!(bind_dn = %bind_dn, "binding without a password");
            }
            let password = self.bind_password.as_deref().unwrap_or("");
            check(conn.simple_bind(bind_dn, password)?, bind_dn)?;
            debug!(bind_dn = %bind_dn, "bound to LDAP server");
        }
        Ok(conn)
    }

    fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut LdapConn) -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| DirectoryError::LockPoisoned("ldap connection".into()))?;
        let slot: &mut Option<LdapConn> = &mut guard;
        if slot.is_none() {
            *slot = Some(self.connect()?);
        }
        let Some(conn) = slot.as_mut() else {
            return Err(DirectoryError::LockPoisoned("ldap connection missing".into()));
        };

        let result = op(conn);
        if matches!(result, Err(DirectoryError::Ldap(_))) {
            warn!(url = %self.url, "dropping LDAP connection after transport error");
            *slot = None;
        }
        result
    }
}

fn check(result: LdapResult, dn: &str) -> Result<(), DirectoryError> {
    if result.rc == RC_SUCCESS {
        return Ok(());
    }
    Err(DirectoryError::OperationFailed {
        dn: dn.to_string(),
        rc: result.rc,
        detail: result.text,
    })
}

fn fetch(conn: &mut LdapConn, dn: &str) -> Result<Option<DirectoryEntry>, DirectoryError> {
    let ldap3::SearchResult(entries, result) =
        conn.search(dn, Scope::Base, "(objectClass=*)", vec!["*"])?;
    if result.rc == RC_NO_SUCH_OBJECT {
        return Ok(None);
    }
    check(result, dn)?;
    Ok(entries
        .into_iter()
        .next()
        .map(|e| DirectoryEntry::from(SearchEntry::construct(e))))
}

/// Modifications turning `existing` into `desired`. Object classes are left
/// alone so a structural class is never swapped out from under an entry.
fn replacement_mods(existing: &DirectoryEntry, desired: &DirectoryEntry) -> Vec<Mod<String>> {
    let mut mods = Vec::new();
    for (name, values) in desired.attributes() {
        if name.eq_ignore_ascii_case(OBJECT_CLASS_ATTRIBUTE) {
            continue;
        }
        mods.push(Mod::Replace(
            name.clone(),
            values.iter().cloned().collect::<HashSet<_>>(),
        ));
    }
    for name in existing.attributes().keys() {
        if name.eq_ignore_ascii_case(OBJECT_CLASS_ATTRIBUTE) || desired.contains(name) {
            continue;
        }
        mods.push(Mod::Delete(name.clone(), HashSet::new()));
    }
    mods
}

impl DirectoryStore for LdapDirectory {
    fn load(&self, dn: &str) -> Result<Option<DirectoryEntry>, DirectoryError> {
        self.with_conn(|conn| fetch(conn, dn))
    }

    fn search(
        &self,
        base_dn: &str,
        object_class: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let filter = format!("(objectClass={})", ldap_escape(object_class));
        self.with_conn(|conn| {
            let ldap3::SearchResult(entries, result) =
                conn.search(base_dn, Scope::Subtree, &filter, vec!["*"])?;
            if result.rc == RC_NO_SUCH_OBJECT {
                debug!(base_dn, "search base does not exist");
                return Ok(Vec::new());
            }
            check(result, base_dn)?;
            let found: Vec<DirectoryEntry> = entries
                .into_iter()
                .map(|e| DirectoryEntry::from(SearchEntry::construct(e)))
                .collect();
            debug!(base_dn, %filter, count = found.len(), "LDAP search");
            Ok(found)
        })
    }

    fn save(&self, entry: &DirectoryEntry) -> Result<(), DirectoryError> {
        self.with_conn(|conn| match fetch(conn, entry.dn())? {
            Some(existing) => {
                debug!(dn = %entry.dn(), "modifying existing entry");
                let mods = replacement_mods(&existing, entry);
                check(conn.modify(entry.dn(), mods)?, entry.dn())
            }
            None => {
                debug!(dn = %entry.dn(), "adding new entry");
                check(conn.add(entry.dn(), entry.to_ldap_attributes())?, entry.dn())
            }
        })
    }

    fn delete(&self, dn: &str) -> Result<bool, DirectoryError> {
        self.with_conn(|conn| {
            let result = conn.delete(dn)?;
            if result.rc == RC_NO_SUCH_OBJECT {
                return Ok(false);
            }
            check(result, dn)?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_does_not_connect() {
        let config = DirectoryConfig {
            url: "ldap://127.0.0.1:1".into(),
            ..DirectoryConfig::default()
        };
        let dir = LdapDirectory::new(&config);
        assert_eq!(dir.url(), "ldap://127.0.0.1:1");
        assert!(dir.conn.lock().unwrap().is_none());
    }

    #[test]
    fn test_replacement_mods() {
        let existing = DirectoryEntry::new("uid=1,ou=s")
            .with_attribute("objectClass", ["top", "casRegisteredService"])
            .with_attribute("cn", ["Old"])
            .with_attribute("casRequiredHandlers", ["ldap"]);
        let desired = DirectoryEntry::new("uid=1,ou=s")
            .with_attribute("objectClass", ["top", "casRegisteredService"])
            .with_attribute("cn", ["New"]);

        let mods = replacement_mods(&existing, &desired);
        assert_eq!(mods.len(), 2);
        assert!(mods.iter().any(|m| matches!(
            m,
            Mod::Replace(name, values) if name == "cn" && values.contains("New")
        )));
        assert!(mods.iter().any(|m| matches!(
            m,
            Mod::Delete(name, values) if name == "casRequiredHandlers" && values.is_empty()
        )));
    }

    #[test]
    fn test_check_maps_result_code() {
        let result = LdapResult {
            rc: 68,
            matched: String::new(),
            text: "already exists".into(),
            refs: Vec::new(),
            ctrls: Vec::new(),
        };
        let err = check(result, "uid=1,ou=s").unwrap_err();
        assert!(matches!(err, DirectoryError::OperationFailed { rc: 68, .. }));
    }
}
