use std::path::PathBuf;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use voice_protocol::ids::PlayerId;
use zeroize::Zeroizing;

/// Maps `(username, auth_code)` to a canonical `player_id`; rejects unknown
/// pairs. Auth codes are held in memory only as `Zeroizing<String>` and
/// compared in constant time to avoid leaking their length/prefix via timing.
pub trait CredentialStore: Send + Sync {
    fn verify(&self, username: &str, auth_code: &str) -> Option<PlayerId>;
    fn issue(&self, username: &str, player_id: PlayerId) -> String;
    fn revoke(&self, auth_code: &str);
}

struct Entry {
    player_id: PlayerId,
    auth_code: Zeroizing<String>,
}

/// In-memory store: tests and ephemeral deployments, no persistence.
pub struct InMemoryCredentialStore {
    by_username: DashMap<String, Entry>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            by_username: DashMap::new(),
        }
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

fn codes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

impl CredentialStore for InMemoryCredentialStore {
    fn verify(&self, username: &str, auth_code: &str) -> Option<PlayerId> {
        let entry = self.by_username.get(username)?;
        if codes_match(&entry.auth_code, auth_code) {
            Some(entry.player_id)
        } else {
            None
        }
    }

    fn issue(&self, username: &str, player_id: PlayerId) -> String {
        let code = uuid::Uuid::new_v4().to_string();
        self.by_username.insert(
            username.to_string(),
            Entry {
                player_id,
                auth_code: Zeroizing::new(code.clone()),
            },
        );
        code
    }

    fn revoke(&self, auth_code: &str) {
        self.by_username.retain(|_, e| !codes_match(&e.auth_code, auth_code));
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    username: String,
    player_id: PlayerId,
    auth_code: String,
}

/// JSON-file-backed store: load-on-start, save-on-mutate, the same
/// convention as the runtime settings file.
pub struct FileCredentialStore {
    inner: InMemoryCredentialStore,
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn load_or_create(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let inner = InMemoryCredentialStore::new();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let entries: Vec<PersistedEntry> = serde_json::from_str(&content)?;
            for entry in entries {
                inner.by_username.insert(
                    entry.username,
                    Entry {
                        player_id: entry.player_id,
                        auth_code: Zeroizing::new(entry.auth_code),
                    },
                );
            }
        }
        Ok(Self { inner, path })
    }

    fn save(&self) -> anyhow::Result<()> {
        let entries: Vec<PersistedEntry> = self
            .inner
            .by_username
            .iter()
            .map(|e| PersistedEntry {
                username: e.key().clone(),
                player_id: e.value().player_id,
                auth_code: e.value().auth_code.to_string(),
            })
            .collect();
        let content = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn verify(&self, username: &str, auth_code: &str) -> Option<PlayerId> {
        self.inner.verify(username, auth_code)
    }

    fn issue(&self, username: &str, player_id: PlayerId) -> String {
        let code = self.inner.issue(username, player_id);
        if let Err(err) = self.save() {
            tracing::warn!(%err, path = %self.path.display(), "failed to persist credential store");
        }
        code
    }

    fn revoke(&self, auth_code: &str) {
        self.inner.revoke(auth_code);
        if let Err(err) = self.save() {
            tracing::warn!(%err, path = %self.path.display(), "failed to persist credential store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_username_rejected() {
        let store = InMemoryCredentialStore::new();
        assert!(store.verify("nobody", "any").is_none());
    }

    #[test]
    fn issue_then_verify_succeeds() {
        let store = InMemoryCredentialStore::new();
        let player_id = PlayerId::new_random();
        let code = store.issue("alice", player_id);
        assert_eq!(store.verify("alice", &code), Some(player_id));
    }

    #[test]
    fn wrong_code_rejected() {
        let store = InMemoryCredentialStore::new();
        let player_id = PlayerId::new_random();
        store.issue("alice", player_id);
        assert!(store.verify("alice", "wrong-code").is_none());
    }

    #[test]
    fn revoke_invalidates_code() {
        let store = InMemoryCredentialStore::new();
        let player_id = PlayerId::new_random();
        let code = store.issue("alice", player_id);
        store.revoke(&code);
        assert!(store.verify("alice", &code).is_none());
    }

    #[test]
    fn file_store_persists_across_reload() {
        let path = std::env::temp_dir().join("voice-credential-store-test.json");
        let _ = std::fs::remove_file(&path);
        let player_id = PlayerId::new_random();
        let code = {
            let store = FileCredentialStore::load_or_create(&path).unwrap();
            store.issue("alice", player_id)
        };
        let reloaded = FileCredentialStore::load_or_create(&path).unwrap();
        assert_eq!(reloaded.verify("alice", &code), Some(player_id));
        let _ = std::fs::remove_file(&path);
    }
}
