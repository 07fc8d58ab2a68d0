//! Portable export/import document.
//!
//! A plain JSON subset of the snapshot meant for moving workspaces between
//! machines. Ids are not exported; importing assigns fresh ones.

use crate::error::PersistenceError;
use crate::snapshot::{TerminalRecord, WorkspaceRecord, WorkspaceSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use settings::constants::snapshot::EXPORT_SCHEMA_VERSION;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub schema_version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default)]
    pub workspaces: Vec<ExportedWorkspace>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedWorkspace {
    pub name: String,
    pub folder_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_ratio: Option<f32>,
    #[serde(default)]
    pub terminals: Vec<ExportedTerminal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedTerminal {
    pub title: String,
    pub cwd: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrollback: Option<String>,
}

/// Records produced by [`import`], ready to merge into a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedWorkspaces {
    pub workspaces: Vec<WorkspaceRecord>,
    pub terminals: Vec<TerminalRecord>,
}

/// Build an export of every workspace in `snapshot`.
///
/// Locked workspaces are exported by name and folder only; their terminals
/// exist solely inside the encrypted payload.
pub fn export(snapshot: &WorkspaceSnapshot, theme: Option<&str>) -> ExportDocument {
    let workspaces = snapshot
        .workspaces
        .iter()
        .map(|ws| {
            if ws.is_locked {
                return ExportedWorkspace {
                    name: ws.name.clone(),
                    folder_path: ws.folder_path.clone(),
                    split_ratio: None,
                    terminals: Vec::new(),
                };
            }
            let terminals: Vec<&TerminalRecord> = snapshot.terminals_in(&ws.id).collect();
            let split_ratio = terminals
                .iter()
                .find_map(|t| snapshot.split_layout.get(&t.id))
                .and_then(|layout| layout.root_ratio());
            ExportedWorkspace {
                name: ws.name.clone(),
                folder_path: ws.folder_path.clone(),
                split_ratio,
                terminals: terminals
                    .into_iter()
                    .map(|t| ExportedTerminal {
                        title: t.title.clone(),
                        cwd: t.cwd.clone(),
                        scrollback: t.scrollback.clone(),
                    })
                    .collect(),
            }
        })
        .collect();

    ExportDocument {
        schema_version: EXPORT_SCHEMA_VERSION.to_string(),
        exported_at: Utc::now(),
        theme: theme.map(str::to_string),
        workspaces,
    }
}

/// Turn an export into new records with fresh ids.
pub fn import(document: &ExportDocument) -> ImportedWorkspaces {
    let mut imported = ImportedWorkspaces::default();
    for exported in &document.workspaces {
        let ws = WorkspaceRecord::new(exported.name.clone(), exported.folder_path.clone());
        imported
            .terminals
            .extend(exported.terminals.iter().map(|t| TerminalRecord {
                scrollback: t.scrollback.clone(),
                ..TerminalRecord::new(ws.id.clone(), t.title.clone(), t.cwd.clone())
            }));
        imported.workspaces.push(ws);
    }
    imported
}

/// Append imported records to `snapshot`. Returns how many workspaces were added.
pub fn merge_import(snapshot: &mut WorkspaceSnapshot, imported: ImportedWorkspaces) -> usize {
    let count = imported.workspaces.len();
    if snapshot.active_workspace_id.is_none() {
        snapshot.active_workspace_id = imported.workspaces.first().map(|ws| ws.id.clone());
    }
    snapshot.workspaces.extend(imported.workspaces);
    snapshot.terminals.extend(imported.terminals);
    count
}

impl ExportDocument {
    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        let document: Self = serde_json::from_str(json)?;
        if document.schema_version.split('.').next() != EXPORT_SCHEMA_VERSION.split('.').next() {
            return Err(PersistenceError::IncompatibleSchema {
                found: document.schema_version,
            });
        }
        Ok(document)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), PersistenceError> {
        let json = self.to_json()?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json).map_err(|e| PersistenceError::io(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| PersistenceError::io(path, e))?;
        tracing::info!(path = %path.display(), workspaces = self.workspaces.len(), "workspaces exported");
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, PersistenceError> {
        let json = fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
        Self::from_json(&json)
    }
}
