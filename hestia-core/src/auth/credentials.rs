//! Credential table: user name to secret and privilege level

use std::collections::HashMap;

use super::digest::{constant_time_eq, ha1, DigestAlgorithm};
use crate::config::UserEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Secret {
    Password(String),
    /// Hex `H(user:realm:password)` for the deployment's algorithm
    Ha1(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub secret: Secret,
    pub level: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    users: HashMap<String, Credential>,
}

impl CredentialTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[UserEntry]) -> Self {
        let mut table = Self::new();
        for entry in entries {
            let secret = match (&entry.ha1, &entry.password) {
                (Some(ha1), _) => Secret::Ha1(ha1.to_ascii_lowercase()),
                (None, Some(password)) => Secret::Password(password.clone()),
                (None, None) => continue,
            };
            table.users.insert(entry.name.clone(), Credential { secret, level: entry.level });
        }
        table
    }

    pub fn insert(&mut self, name: impl Into<String>, secret: Secret, level: u32) {
        self.users.insert(name.into(), Credential { secret, level });
    }

    pub fn get(&self, name: &str) -> Option<&Credential> {
        self.users.get(name)
    }

    /// HA1 for `name` under `realm`
    pub fn ha1(&self, name: &str, algorithm: DigestAlgorithm, realm: &str) -> Option<String> {
        self.users.get(name).map(|credential| match &credential.secret {
            Secret::Password(password) => ha1(algorithm, name, realm, password),
            Secret::Ha1(stored) => stored.clone(),
        })
    }

    /// Check a clear-text password (form login); returns the user's level on success
    pub fn verify_password(
        &self,
        name: &str,
        password: &str,
        algorithm: DigestAlgorithm,
        realm: &str,
    ) -> Option<u32> {
        let credential = self.users.get(name)?;
        let matches = match &credential.secret {
            Secret::Password(stored) => constant_time_eq(stored, password),
            Secret::Ha1(stored) => constant_time_eq(stored, &ha1(algorithm, name, realm, password)),
        };
        matches.then_some(credential.level)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_entries_prefers_ha1() {
        let entries = vec![
            UserEntry { name: "alice".into(), password: Some("wonder".into()), ha1: None, level: 3 },
            UserEntry {
                name: "bob".into(),
                password: Some("ignored".into()),
                ha1: Some(ha1(DigestAlgorithm::Md5, "bob", "hestia", "builder").to_uppercase()),
                level: 1,
            },
        ];
        let table = CredentialTable::from_entries(&entries);
        assert_eq!(table.len(), 2);

        assert_eq!(table.verify_password("alice", "wonder", DigestAlgorithm::Md5, "hestia"), Some(3));
        assert_eq!(table.verify_password("alice", "nope", DigestAlgorithm::Md5, "hestia"), None);
        assert_eq!(table.verify_password("bob", "builder", DigestAlgorithm::Md5, "hestia"), Some(1));
        assert_eq!(table.verify_password("bob", "ignored", DigestAlgorithm::Md5, "hestia"), None);
        assert_eq!(table.verify_password("carol", "x", DigestAlgorithm::Md5, "hestia"), None);
    }

    #[test]
    fn test_ha1_lookup() {
        let mut table = CredentialTable::new();
        table.insert("alice", Secret::Password("wonder".into()), 2);
        assert_eq!(
            table.ha1("alice", DigestAlgorithm::Sha256, "hestia"),
            Some(ha1(DigestAlgorithm::Sha256, "alice", "hestia", "wonder"))
        );
        assert!(table.ha1("nobody", DigestAlgorithm::Md5, "hestia").is_none());
    }
}
