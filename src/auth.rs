//! Credential verification boundary.
//!
//! Clients send a fixed-length pre-digested hash of their password, both at
//! registration and in the `X-Auth-Key` header, so the raw password never
//! reaches the server. The stored hash is argon2 over a server-side salt
//! prepended to that credential; the salt is injected from config at
//! construction, never read from the environment ad hoc.
//!
//! Every authentication failure collapses to the same generic outcome so
//! the response cannot reveal whether a username exists.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::store::{EntityStore, StoreResult, User};

/// The auth gate.
#[derive(Clone)]
pub struct AuthGate {
    store: Arc<dyn EntityStore>,
    salt: String,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the salt stays out of debug output
        f.debug_struct("AuthGate").finish_non_exhaustive()
    }
}

impl AuthGate {
    /// Create an auth gate with the configured server-side salt.
    pub fn new(store: Arc<dyn EntityStore>, salt: String) -> Self {
        Self { store, salt }
    }

    /// Hash a client credential for storage. The credential is already a
    /// digest on the client side, so it is hashed exactly once here.
    pub fn hash_credential(&self, credential: &str) -> Result<String> {
        let salted = format!("{}{}", self.salt, credential);
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(salted.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash credential: {err}"))
    }

    /// Verify a client credential against a stored hash.
    pub fn verify_credential(&self, credential: &str, stored: &str) -> bool {
        let salted = format!("{}{}", self.salt, credential);
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        Argon2::default()
            .verify_password(salted.as_bytes(), &parsed)
            .is_ok()
    }

    /// Authenticate a header pair.
    ///
    /// Missing header, unknown username and credential mismatch all return
    /// `Ok(None)`. Only a storage failure is an error; it must not be
    /// mistaken for unauthorized.
    pub fn authenticate(
        &self,
        username: Option<&str>,
        credential: Option<&str>,
    ) -> StoreResult<Option<User>> {
        let (Some(username), Some(credential)) = (username, credential) else {
            return Ok(None);
        };
        let Some(user) = self.store.get_user_by_name(username)? else {
            return Ok(None);
        };
        if self.verify_credential(credential, &user.password_hash) {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn gate() -> AuthGate {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        AuthGate::new(store, "test-salt".to_string())
    }

    #[test]
    fn hash_and_verify() {
        let gate = gate();
        let hash = gate.hash_credential("5f4dcc3b5aa765d61d8327deb882cf99").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(gate.verify_credential("5f4dcc3b5aa765d61d8327deb882cf99", &hash));
        assert!(!gate.verify_credential("wrong", &hash));
    }

    #[test]
    fn salt_changes_the_hash_space() {
        let store: Arc<dyn EntityStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let gate_a = AuthGate::new(store.clone(), "salt-a".to_string());
        let gate_b = AuthGate::new(store, "salt-b".to_string());
        let hash = gate_a.hash_credential("credential").unwrap();
        assert!(gate_a.verify_credential("credential", &hash));
        assert!(!gate_b.verify_credential("credential", &hash));
    }

    #[test]
    fn garbage_stored_hash_never_verifies() {
        let gate = gate();
        assert!(!gate.verify_credential("credential", "not-a-phc-string"));
    }

    #[test]
    fn all_failures_are_uniform() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let gate = AuthGate::new(store.clone(), "test-salt".to_string());
        let hash = gate.hash_credential("right").unwrap();
        store.create_user("alice", &hash).unwrap();

        assert!(gate.authenticate(None, Some("right")).unwrap().is_none());
        assert!(gate.authenticate(Some("alice"), None).unwrap().is_none());
        assert!(gate.authenticate(Some("nobody"), Some("right")).unwrap().is_none());
        assert!(gate.authenticate(Some("alice"), Some("wrong")).unwrap().is_none());
        assert_eq!(
            gate.authenticate(Some("alice"), Some("right"))
                .unwrap()
                .unwrap()
                .username,
            "alice"
        );
    }
}
