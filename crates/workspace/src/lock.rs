//! Locking and unlocking workspaces.
//!
//! Locking encrypts a workspace's terminals and layout into its record,
//! tears down the live sessions and drops the terminals from the document.
//! Unlocking reverses that under fresh terminal ids; the UI spawns sessions
//! for the restored terminals lazily.

use crate::error::LockError;
use crate::layout::SplitNode;
use crate::snapshot::{TerminalRecord, WorkspaceSnapshot};
use rustc_hash::{FxHashMap, FxHashSet};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use terminal::{SessionId, Supervisor};
use vault::{EncryptedPayload, KdfParams, PasswordCache};

/// Serialized screen contents of live terminals, supplied by the renderer.
pub trait ScrollbackSource {
    /// Current scrollback of `terminal_id`, or `None` to keep the stored one.
    fn scrollback(&self, terminal_id: &str) -> Option<String>;
}

/// Keeps whatever scrollback the snapshot already holds.
pub struct NoScrollback;

impl ScrollbackSource for NoScrollback {
    fn scrollback(&self, _terminal_id: &str) -> Option<String> {
        None
    }
}

impl<F> ScrollbackSource for F
where
    F: Fn(&str) -> Option<String>,
{
    fn scrollback(&self, terminal_id: &str) -> Option<String> {
        self(terminal_id)
    }
}

/// Plaintext sealed inside a locked workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedTerminals {
    pub terminals: Vec<TerminalRecord>,
    #[serde(default)]
    pub split_layout: BTreeMap<String, SplitNode>,
    #[serde(default)]
    pub focused_pane: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSummary {
    pub workspace_id: String,
    pub terminals: usize,
    pub sessions_killed: usize,
}

/// Locks and unlocks workspaces of a snapshot against one supervisor.
pub struct WorkspaceLocker<'a> {
    supervisor: &'a Supervisor,
    passwords: &'a PasswordCache,
    kdf: KdfParams,
}

impl<'a> WorkspaceLocker<'a> {
    pub fn new(supervisor: &'a Supervisor, passwords: &'a PasswordCache) -> Self {
        Self {
            supervisor,
            passwords,
            kdf: KdfParams::default(),
        }
    }

    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// The explicit password, else the one cached for this workspace.
    fn password(&self, workspace_id: &str, password: Option<&str>) -> Result<SecretString, LockError> {
        match password {
            Some(password) => Ok(SecretString::from(password.to_owned())),
            None => self
                .passwords
                .get(workspace_id)
                .ok_or(LockError::PasswordRequired),
        }
    }

    /// Encrypt a workspace's terminals and kill its sessions.
    ///
    /// Nothing is torn down unless encryption succeeded.
    pub fn lock_workspace(
        &self,
        snapshot: &mut WorkspaceSnapshot,
        workspace_id: &str,
        password: Option<&str>,
        hint: Option<&str>,
        scrollback: &dyn ScrollbackSource,
    ) -> Result<LockSummary, LockError> {
        let workspace = snapshot
            .workspace(workspace_id)
            .ok_or_else(|| LockError::UnknownWorkspace(workspace_id.to_string()))?;
        if workspace.is_locked {
            return Err(LockError::AlreadyLocked(workspace_id.to_string()));
        }
        let password = self.password(workspace_id, password)?;

        let terminals: Vec<TerminalRecord> = snapshot
            .terminals_in(workspace_id)
            .map(|record| {
                let mut record = record.clone();
                if let Some(text) = scrollback.scrollback(&record.id) {
                    record.scrollback = Some(text);
                }
                record
            })
            .collect();
        let ids: FxHashSet<&str> = terminals.iter().map(|t| t.id.as_str()).collect();
        let plaintext = LockedTerminals {
            split_layout: snapshot
                .split_layout
                .iter()
                .filter(|(root, _)| ids.contains(root.as_str()))
                .map(|(root, node)| (root.clone(), node.clone()))
                .collect(),
            focused_pane: snapshot
                .focused_pane
                .clone()
                .filter(|pane| ids.contains(pane.as_str())),
            terminals: terminals.clone(),
        };

        let payload = vault::lock_document_with_params(
            &plaintext,
            password.expose_secret(),
            hint,
            self.kdf.clone(),
        )?;
        let encoded = payload.encode()?;

        let mut sessions_killed = self.supervisor.kill_workspace(workspace_id);
        for terminal in &terminals {
            match self.supervisor.kill(&SessionId::new(terminal.id.clone())) {
                Ok(()) => sessions_killed += 1,
                Err(e) if e.is_unknown_session() => {}
                Err(e) => tracing::warn!(terminal_id = %terminal.id, error = %e, "kill during lock"),
            }
        }

        snapshot.remove_terminals_of(workspace_id);
        if let Some(workspace) = snapshot.workspace_mut(workspace_id) {
            workspace.is_locked = true;
            workspace.encrypted_payload = Some(encoded);
        }
        self.passwords.remember(workspace_id, password.expose_secret());

        tracing::info!(
            workspace_id,
            terminals = terminals.len(),
            sessions_killed,
            "workspace locked"
        );
        Ok(LockSummary {
            workspace_id: workspace_id.to_string(),
            terminals: terminals.len(),
            sessions_killed,
        })
    }

    /// Decrypt a locked workspace back into the snapshot.
    ///
    /// Restored terminals get fresh ids; split parents and layouts are
    /// remapped to match. Returns the restored terminals.
    pub fn unlock_workspace(
        &self,
        snapshot: &mut WorkspaceSnapshot,
        workspace_id: &str,
        password: Option<&str>,
    ) -> Result<Vec<TerminalRecord>, LockError> {
        let workspace = snapshot
            .workspace(workspace_id)
            .ok_or_else(|| LockError::UnknownWorkspace(workspace_id.to_string()))?;
        if !workspace.is_locked {
            return Err(LockError::NotLocked(workspace_id.to_string()));
        }
        let encoded = workspace
            .encrypted_payload
            .as_deref()
            .ok_or_else(|| LockError::MissingPayload(workspace_id.to_string()))?;
        let password = self.password(workspace_id, password)?;

        let payload = EncryptedPayload::decode(encoded)?;
        let locked: LockedTerminals = vault::unlock_document(&payload, password.expose_secret())?;

        let id_map: FxHashMap<String, String> = locked
            .terminals
            .iter()
            .map(|t| (t.id.clone(), uuid::Uuid::new_v4().to_string()))
            .collect();
        let restored: Vec<TerminalRecord> = locked
            .terminals
            .into_iter()
            .filter_map(|mut t| {
                t.id = id_map.get(&t.id)?.clone();
                t.workspace_id = workspace_id.to_string();
                t.split_from_id = t
                    .split_from_id
                    .and_then(|parent| id_map.get(&parent).cloned());
                Some(t)
            })
            .collect();

        for (root, mut node) in locked.split_layout {
            let Some(new_root) = id_map.get(&root) else {
                continue;
            };
            node.remap(&id_map);
            snapshot.split_layout.insert(new_root.clone(), node);
        }
        if let Some(pane) = locked.focused_pane.and_then(|p| id_map.get(&p).cloned()) {
            snapshot.focused_pane = Some(pane);
        }
        snapshot.terminals.extend(restored.iter().cloned());
        if let Some(workspace) = snapshot.workspace_mut(workspace_id) {
            workspace.is_locked = false;
            workspace.encrypted_payload = None;
        }
        self.passwords.remember(workspace_id, password.expose_secret());

        tracing::info!(workspace_id, terminals = restored.len(), "workspace unlocked");
        Ok(restored)
    }
}

/// Hint of a locked workspace, readable without the password.
pub fn workspace_hint(
    snapshot: &WorkspaceSnapshot,
    workspace_id: &str,
) -> Result<Option<String>, LockError> {
    let workspace = snapshot
        .workspace(workspace_id)
        .ok_or_else(|| LockError::UnknownWorkspace(workspace_id.to_string()))?;
    let encoded = workspace
        .encrypted_payload
        .as_deref()
        .ok_or_else(|| LockError::NotLocked(workspace_id.to_string()))?;
    Ok(vault::hint(encoded)?)
}
