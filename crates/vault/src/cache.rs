//! Process-lifetime password cache.
//!
//! Remembers the password last used to lock or unlock each workspace so a
//! repeated lock within one run does not prompt again. It starts empty,
//! is never serialized and losing it only costs a prompt.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use secrecy::{ExposeSecret, SecretString};

#[derive(Default)]
pub struct PasswordCache {
    entries: Mutex<FxHashMap<String, SecretString>>,
}

impl PasswordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&self, workspace_id: impl Into<String>, password: &str) {
        self.entries
            .lock()
            .insert(workspace_id.into(), SecretString::from(password.to_owned()));
    }

    /// Copy of the cached password for `workspace_id`.
    pub fn get(&self, workspace_id: &str) -> Option<SecretString> {
        self.entries
            .lock()
            .get(workspace_id)
            .map(|secret| SecretString::from(secret.expose_secret().to_owned()))
    }

    pub fn contains(&self, workspace_id: &str) -> bool {
        self.entries.lock().contains_key(workspace_id)
    }

    /// Drop the cached password. Returns whether one was cached.
    pub fn forget(&self, workspace_id: &str) -> bool {
        self.entries.lock().remove(workspace_id).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for PasswordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCache")
            .field("workspaces", &self.len())
            .field("passwords", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn starts_empty() {
        let cache = PasswordCache::new();
        assert!(cache.is_empty());
        assert!(cache.get("ws").is_none());
    }

    #[test]
    fn remember_get_forget() {
        let cache = PasswordCache::new();
        cache.remember("ws-1", "correct-horse");
        assert!(cache.contains("ws-1"));
        assert_eq!(
            cache.get("ws-1").map(|s| s.expose_secret().to_string()),
            Some("correct-horse".to_string())
        );

        cache.remember("ws-1", "battery-staple");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("ws-1").unwrap().expose_secret(), "battery-staple");

        assert!(cache.forget("ws-1"));
        assert!(!cache.forget("ws-1"));
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = PasswordCache::new();
        cache.remember("a", "1");
        cache.remember("b", "2");
        cache.clear();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn debug_output_hides_passwords() {
        let cache = PasswordCache::new();
        cache.remember("ws", "hunter2");
        let debug = format!("{:?}", cache);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }
}
