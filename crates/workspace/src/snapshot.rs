//! The persisted workspace document.

use crate::error::ValidationError;
use crate::layout::SplitNode;
use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use settings::constants::snapshot::{MAX_SPLIT_DEPTH, SCHEMA_VERSION};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecord {
    pub id: String,
    pub name: String,
    pub folder_path: PathBuf,
    #[serde(default)]
    pub is_locked: bool,
    /// Encoded [`vault::EncryptedPayload`] while locked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_payload: Option<String>,
}

impl WorkspaceRecord {
    pub fn new(name: impl Into<String>, folder_path: impl Into<PathBuf>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            folder_path: folder_path.into(),
            is_locked: false,
            encrypted_payload: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalRecord {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    pub cwd: PathBuf,
    /// Serialized screen contents, produced by the renderer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrollback: Option<String>,
    /// The main terminal this pane was split from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_from_id: Option<String>,
}

impl TerminalRecord {
    pub fn new(
        workspace_id: impl Into<String>,
        title: impl Into<String>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: workspace_id.into(),
            title: title.into(),
            cwd: cwd.into(),
            scrollback: None,
            split_from_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSnapshot {
    pub schema_version: String,
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub workspaces: Vec<WorkspaceRecord>,
    #[serde(default)]
    pub active_workspace_id: Option<String>,
    #[serde(default)]
    pub terminals: Vec<TerminalRecord>,
    #[serde(default)]
    pub focused_terminal_id: Option<String>,
    /// Pane trees keyed by the id of their main terminal.
    #[serde(default)]
    pub split_layout: BTreeMap<String, SplitNode>,
    #[serde(default)]
    pub focused_pane: Option<String>,
}

impl Default for WorkspaceSnapshot {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            saved_at: Utc::now(),
            workspaces: Vec::new(),
            active_workspace_id: None,
            terminals: Vec::new(),
            focused_terminal_id: None,
            split_layout: BTreeMap::new(),
            focused_pane: None,
        }
    }
}

impl WorkspaceSnapshot {
    pub fn workspace(&self, id: &str) -> Option<&WorkspaceRecord> {
        self.workspaces.iter().find(|ws| ws.id == id)
    }

    pub fn workspace_mut(&mut self, id: &str) -> Option<&mut WorkspaceRecord> {
        self.workspaces.iter_mut().find(|ws| ws.id == id)
    }

    pub fn terminal(&self, id: &str) -> Option<&TerminalRecord> {
        self.terminals.iter().find(|t| t.id == id)
    }

    pub fn terminals_in<'a>(&'a self, workspace_id: &'a str) -> impl Iterator<Item = &'a TerminalRecord> {
        self.terminals
            .iter()
            .filter(move |t| t.workspace_id == workspace_id)
    }

    /// Add a workspace and make it active. Returns its id.
    pub fn add_workspace(&mut self, record: WorkspaceRecord) -> String {
        let id = record.id.clone();
        self.workspaces.push(record);
        self.active_workspace_id = Some(id.clone());
        id
    }

    pub fn rename_workspace(&mut self, id: &str, name: impl Into<String>) -> bool {
        match self.workspace_mut(id) {
            Some(ws) => {
                ws.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Drop a workspace together with its terminals and their layouts.
    pub fn remove_workspace(&mut self, id: &str) -> Option<WorkspaceRecord> {
        let index = self.workspaces.iter().position(|ws| ws.id == id)?;
        let removed = self.workspaces.remove(index);
        self.remove_terminals_of(id);
        if self.active_workspace_id.as_deref() == Some(id) {
            self.active_workspace_id = self.workspaces.first().map(|ws| ws.id.clone());
        }
        Some(removed)
    }

    /// Remove one terminal after its shell exits or its tab closes.
    ///
    /// Focus markers on it are cleared and its pane leaves any split layout.
    /// A layout rooted at it is dropped. Terminals split from it move up to
    /// its own split parent.
    pub fn remove_terminal(&mut self, id: &str) -> Option<TerminalRecord> {
        let index = self.terminals.iter().position(|t| t.id == id)?;
        let removed = self.terminals.remove(index);

        for terminal in &mut self.terminals {
            if terminal.split_from_id.as_deref() == Some(id) {
                terminal.split_from_id = removed.split_from_id.clone();
            }
        }

        self.split_layout.remove(id);
        self.split_layout.retain(|_, node| {
            node.remove(id);
            node.pane_count() > 1
        });

        if self.focused_terminal_id.as_deref() == Some(id) {
            self.focused_terminal_id = None;
        }
        if self.focused_pane.as_deref() == Some(id) {
            self.focused_pane = None;
        }
        Some(removed)
    }

    /// Remove every terminal of `workspace_id` and the layouts rooted at
    /// them, clearing focus markers that pointed at them.
    pub(crate) fn remove_terminals_of(&mut self, workspace_id: &str) -> Vec<TerminalRecord> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.terminals)
            .into_iter()
            .partition(|t| t.workspace_id == workspace_id);
        self.terminals = kept;

        for terminal in &removed {
            self.split_layout.remove(&terminal.id);
            if self.focused_terminal_id.as_deref() == Some(terminal.id.as_str()) {
                self.focused_terminal_id = None;
            }
            if self.focused_pane.as_deref() == Some(terminal.id.as_str()) {
                self.focused_pane = None;
            }
        }
        removed
    }

    /// Refresh the schema version and save time before writing.
    pub fn stamp(&mut self) {
        self.schema_version = SCHEMA_VERSION.to_string();
        self.saved_at = Utc::now();
    }

    /// Check the document's structural rules.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut workspace_ids = FxHashSet::default();
        for ws in &self.workspaces {
            if !workspace_ids.insert(ws.id.as_str()) {
                return Err(ValidationError::DuplicateWorkspace(ws.id.clone()));
            }
            if ws.is_locked && ws.encrypted_payload.is_none() {
                return Err(ValidationError::MissingPayload(ws.id.clone()));
            }
            if !ws.is_locked && ws.encrypted_payload.is_some() {
                return Err(ValidationError::UnexpectedPayload(ws.id.clone()));
            }
        }

        let mut terminals: FxHashMap<&str, &TerminalRecord> = FxHashMap::default();
        for terminal in &self.terminals {
            if terminals.insert(terminal.id.as_str(), terminal).is_some() {
                return Err(ValidationError::DuplicateTerminal(terminal.id.clone()));
            }
            let Some(ws) = self.workspace(&terminal.workspace_id) else {
                return Err(ValidationError::UnknownWorkspace {
                    terminal: terminal.id.clone(),
                    workspace: terminal.workspace_id.clone(),
                });
            };
            if ws.is_locked {
                return Err(ValidationError::LockedWithTerminals(ws.id.clone()));
            }
        }

        validate_split_forest(&terminals)?;

        if let Some(active) = &self.active_workspace_id {
            if !workspace_ids.contains(active.as_str()) {
                return Err(ValidationError::UnknownActiveWorkspace(active.clone()));
            }
        }
        for focused in [&self.focused_terminal_id, &self.focused_pane].into_iter().flatten() {
            if !terminals.contains_key(focused.as_str()) {
                return Err(ValidationError::UnknownFocusedTerminal(focused.clone()));
            }
        }

        for (root, node) in &self.split_layout {
            let unknown = std::iter::once(root.as_str())
                .chain(node.leaf_ids())
                .find(|id| !terminals.contains_key(id));
            if let Some(terminal) = unknown {
                return Err(ValidationError::UnknownLayoutTerminal {
                    root: root.clone(),
                    terminal: terminal.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Split parents must exist in the same workspace, chains must end at a
/// root within `MAX_SPLIT_DEPTH` hops, and a root holds at most
/// `MAX_SPLIT_DEPTH` split children.
fn validate_split_forest(terminals: &FxHashMap<&str, &TerminalRecord>) -> Result<(), ValidationError> {
    let mut group_sizes: FxHashMap<&str, usize> = FxHashMap::default();

    for terminal in terminals.values() {
        let mut current = *terminal;
        let mut depth = 0;
        while let Some(parent_id) = current.split_from_id.as_deref() {
            let Some(&parent) = terminals.get(parent_id) else {
                return Err(ValidationError::UnknownSplitParent {
                    terminal: current.id.clone(),
                    parent: parent_id.to_string(),
                });
            };
            if parent.workspace_id != current.workspace_id {
                return Err(ValidationError::CrossWorkspaceSplit {
                    terminal: current.id.clone(),
                    parent: parent_id.to_string(),
                });
            }
            depth += 1;
            if depth > terminals.len() {
                return Err(ValidationError::SplitCycle(terminal.id.clone()));
            }
            current = parent;
        }
        if depth > MAX_SPLIT_DEPTH {
            return Err(ValidationError::SplitTooDeep(current.id.clone()));
        }
        *group_sizes.entry(current.id.as_str()).or_default() += 1;
    }

    match group_sizes.into_iter().find(|(_, size)| *size > MAX_SPLIT_DEPTH + 1) {
        Some((root, _)) => Err(ValidationError::SplitTooDeep(root.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> WorkspaceSnapshot {
        let mut snapshot = WorkspaceSnapshot::default();
        let ws = snapshot.add_workspace(WorkspaceRecord::new("api", "/srv/api"));
        let mut main = TerminalRecord::new(&ws, "main", "/srv/api");
        main.id = "main".into();
        let mut child = TerminalRecord::new(&ws, "logs", "/srv/api/logs");
        child.id = "child".into();
        child.split_from_id = Some("main".into());
        snapshot.terminals = vec![main, child];
        let mut layout = SplitNode::leaf("main");
        layout.split("main", crate::layout::SplitDirection::Horizontal, "child");
        snapshot.split_layout.insert("main".into(), layout);
        snapshot.focused_terminal_id = Some("child".into());
        snapshot
    }

    fn chained(n: usize) -> WorkspaceSnapshot {
        let mut snapshot = WorkspaceSnapshot::default();
        let ws = snapshot.add_workspace(WorkspaceRecord::new("deep", "/tmp"));
        for i in 0..n {
            let mut t = TerminalRecord::new(&ws, format!("t{i}"), "/tmp");
            t.id = format!("t{i}");
            if i > 0 {
                t.split_from_id = Some(format!("t{}", i - 1));
            }
            snapshot.terminals.push(t);
        }
        snapshot
    }

    #[test]
    fn sample_is_valid() {
        assert_eq!(sample().validate(), Ok(()));
    }

    #[test]
    fn empty_document_uses_current_schema() {
        let snapshot = WorkspaceSnapshot::default();
        assert_eq!(snapshot.schema_version, SCHEMA_VERSION);
        assert_eq!(snapshot.validate(), Ok(()));
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("schemaVersion").is_some());
        assert!(json.get("activeWorkspaceId").is_some());
        assert_eq!(json["terminals"][1]["splitFromId"], "main");
        assert!(json["terminals"][0].get("scrollback").is_none());
        assert_eq!(json["workspaces"][0]["isLocked"], false);
    }

    #[test]
    fn rejects_unknown_workspace() {
        let mut snapshot = sample();
        snapshot.terminals[0].workspace_id = "ghost".into();
        assert!(matches!(
            snapshot.validate(),
            Err(ValidationError::UnknownWorkspace { .. })
        ));
    }

    #[test]
    fn rejects_missing_split_parent() {
        let mut snapshot = sample();
        snapshot.terminals[1].split_from_id = Some("nope".into());
        assert!(matches!(
            snapshot.validate(),
            Err(ValidationError::UnknownSplitParent { .. })
        ));
    }

    #[test]
    fn rejects_cross_workspace_split() {
        let mut snapshot = sample();
        let other = snapshot.add_workspace(WorkspaceRecord::new("web", "/srv/web"));
        snapshot.active_workspace_id = Some(other.clone());
        snapshot.terminals[1].workspace_id = other;
        snapshot.split_layout.clear();
        assert!(matches!(
            snapshot.validate(),
            Err(ValidationError::CrossWorkspaceSplit { .. })
        ));
    }

    #[test]
    fn rejects_cycles() {
        let mut snapshot = sample();
        snapshot.terminals[0].split_from_id = Some("child".into());
        assert!(matches!(snapshot.validate(), Err(ValidationError::SplitCycle(_))));
    }

    #[test]
    fn split_depth_limit() {
        assert_eq!(chained(MAX_SPLIT_DEPTH + 1).validate(), Ok(()));
        assert!(matches!(
            chained(MAX_SPLIT_DEPTH + 2).validate(),
            Err(ValidationError::SplitTooDeep(_))
        ));
    }

    #[test]
    fn at_most_four_panes_per_root() {
        let mut snapshot = chained(1);
        let ws = snapshot.workspaces[0].id.clone();
        for i in 0..=MAX_SPLIT_DEPTH {
            let mut t = TerminalRecord::new(&ws, "pane", "/tmp");
            t.id = format!("pane{i}");
            t.split_from_id = Some("t0".into());
            snapshot.terminals.push(t);
        }
        assert_eq!(
            snapshot.validate(),
            Err(ValidationError::SplitTooDeep("t0".into()))
        );
    }

    #[test]
    fn locked_workspace_rules() {
        let mut snapshot = sample();
        snapshot.workspaces[0].is_locked = true;
        assert!(matches!(snapshot.validate(), Err(ValidationError::MissingPayload(_))));

        snapshot.workspaces[0].encrypted_payload = Some("{}".into());
        assert!(matches!(
            snapshot.validate(),
            Err(ValidationError::LockedWithTerminals(_))
        ));

        let ws = snapshot.workspaces[0].id.clone();
        snapshot.remove_terminals_of(&ws);
        assert_eq!(snapshot.validate(), Ok(()));

        snapshot.workspaces[0].is_locked = false;
        assert!(matches!(
            snapshot.validate(),
            Err(ValidationError::UnexpectedPayload(_))
        ));
    }

    #[test]
    fn layout_must_name_terminals() {
        let mut snapshot = sample();
        snapshot.split_layout.insert("ghost".into(), SplitNode::leaf("ghost"));
        assert!(matches!(
            snapshot.validate(),
            Err(ValidationError::UnknownLayoutTerminal { .. })
        ));
    }

    #[test]
    fn remove_workspace_drops_terminals_and_layout() {
        let mut snapshot = sample();
        let ws = snapshot.workspaces[0].id.clone();
        let removed = snapshot.remove_workspace(&ws).unwrap();
        assert_eq!(removed.name, "api");
        assert!(snapshot.terminals.is_empty());
        assert!(snapshot.split_layout.is_empty());
        assert_eq!(snapshot.focused_terminal_id, None);
        assert_eq!(snapshot.active_workspace_id, None);
        assert_eq!(snapshot.validate(), Ok(()));
    }

    fn three_panes() -> WorkspaceSnapshot {
        let mut snapshot = sample();
        let ws = snapshot.workspaces[0].id.clone();
        let mut grandchild = TerminalRecord::new(&ws, "tests", "/srv/api");
        grandchild.id = "grandchild".into();
        grandchild.split_from_id = Some("child".into());
        snapshot.terminals.push(grandchild);
        snapshot
            .split_layout
            .get_mut("main")
            .unwrap()
            .split("child", crate::layout::SplitDirection::Vertical, "grandchild");
        snapshot.focused_pane = Some("child".into());
        snapshot
    }

    #[test]
    fn remove_focused_terminal_keeps_document_valid() {
        let mut snapshot = three_panes();
        assert_eq!(snapshot.validate(), Ok(()));

        let removed = snapshot.remove_terminal("child").unwrap();
        assert_eq!(removed.title, "logs");
        assert_eq!(snapshot.focused_terminal_id, None);
        assert_eq!(snapshot.focused_pane, None);
        assert_eq!(
            snapshot.terminal("grandchild").unwrap().split_from_id.as_deref(),
            Some("main")
        );
        assert_eq!(snapshot.split_layout["main"].leaf_ids(), vec!["main", "grandchild"]);
        assert_eq!(snapshot.validate(), Ok(()));
    }

    #[test]
    fn removing_a_layout_root_drops_its_layout() {
        let mut snapshot = three_panes();
        snapshot.remove_terminal("main").unwrap();

        assert!(snapshot.split_layout.is_empty());
        assert_eq!(snapshot.terminal("child").unwrap().split_from_id, None);
        assert_eq!(
            snapshot.terminal("grandchild").unwrap().split_from_id.as_deref(),
            Some("child")
        );
        assert_eq!(snapshot.validate(), Ok(()));
    }

    #[test]
    fn removing_the_last_split_child_collapses_the_layout() {
        let mut snapshot = sample();
        snapshot.remove_terminal("child").unwrap();
        assert!(snapshot.split_layout.is_empty());
        assert_eq!(snapshot.terminals.len(), 1);
        assert_eq!(snapshot.validate(), Ok(()));
    }

    #[test]
    fn remove_unknown_terminal_is_none() {
        let mut snapshot = sample();
        assert!(snapshot.remove_terminal("ghost").is_none());
        assert_eq!(snapshot.terminals.len(), 2);
    }

    #[test]
    fn rename() {
        let mut snapshot = sample();
        let ws = snapshot.workspaces[0].id.clone();
        assert!(snapshot.rename_workspace(&ws, "backend"));
        assert!(!snapshot.rename_workspace("missing", "x"));
        assert_eq!(snapshot.workspace(&ws).unwrap().name, "backend");
    }
}
