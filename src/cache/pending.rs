use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::model::FileMapping;
use crate::changelist::ChangelistId;

/// The server-side effect a pending update stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateAction {
    /// Open for add, or for edit when the depot already has the file
    AddEditFile,
    /// Open for edit only; never adds
    EditFile,
    DeleteFile,
    /// Reopen into another changelist; opens for edit when not yet open
    MoveFile,
    IntegrateFile,
    RenameChangelist,
    DeleteChangelist,
}

impl UpdateAction {
    pub fn as_str(&self) -> &str {
        match self {
            UpdateAction::AddEditFile => "add-edit",
            UpdateAction::EditFile => "edit",
            UpdateAction::DeleteFile => "delete",
            UpdateAction::MoveFile => "move",
            UpdateAction::IntegrateFile => "integrate",
            UpdateAction::RenameChangelist => "rename-changelist",
            UpdateAction::DeleteChangelist => "delete-changelist",
        }
    }

    /// Actions that open the file itself, as opposed to reassigning it.
    pub fn opens_file(&self) -> bool {
        matches!(
            self,
            UpdateAction::AddEditFile
                | UpdateAction::EditFile
                | UpdateAction::DeleteFile
                | UpdateAction::IntegrateFile
        )
    }
}

/// What a pending update is about; two updates with the same target are the
/// same update.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateTarget {
    File(FileMapping),
    Changelist(ChangelistId),
}

impl fmt::Display for UpdateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateTarget::File(mapping) => write!(f, "{}", mapping.local_path().display()),
            UpdateTarget::Changelist(id) => write!(f, "changelist {id}"),
        }
    }
}

/// One queued local mutation that the server has not seen yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpdateState {
    target: UpdateTarget,
    changelist: ChangelistId,
    action: UpdateAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    integrate_source: Option<FileMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    created: DateTime<Utc>,
}

impl PartialEq for PendingUpdateState {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl Eq for PendingUpdateState {}

impl PendingUpdateState {
    pub(crate) fn for_file(
        file: FileMapping,
        changelist: ChangelistId,
        action: UpdateAction,
    ) -> Self {
        PendingUpdateState {
            target: UpdateTarget::File(file),
            changelist,
            action,
            integrate_source: None,
            description: None,
            created: Utc::now(),
        }
    }

    pub(crate) fn integrate(
        source: FileMapping,
        target: FileMapping,
        changelist: ChangelistId,
    ) -> Self {
        PendingUpdateState {
            integrate_source: Some(source),
            ..Self::for_file(target, changelist, UpdateAction::IntegrateFile)
        }
    }

    pub(crate) fn rename_changelist(changelist: ChangelistId, description: String) -> Self {
        PendingUpdateState {
            target: UpdateTarget::Changelist(changelist),
            changelist,
            action: UpdateAction::RenameChangelist,
            integrate_source: None,
            description: Some(description),
            created: Utc::now(),
        }
    }

    pub(crate) fn delete_changelist(changelist: ChangelistId) -> Self {
        PendingUpdateState {
            target: UpdateTarget::Changelist(changelist),
            changelist,
            action: UpdateAction::DeleteChangelist,
            integrate_source: None,
            description: None,
            created: Utc::now(),
        }
    }

    pub fn target(&self) -> &UpdateTarget {
        &self.target
    }

    /// The file this update is about, for file-level updates.
    pub fn file(&self) -> Option<&FileMapping> {
        match &self.target {
            UpdateTarget::File(mapping) => Some(mapping),
            UpdateTarget::Changelist(_) => None,
        }
    }

    pub fn changelist(&self) -> ChangelistId {
        self.changelist
    }

    pub fn action(&self) -> UpdateAction {
        self.action
    }

    pub fn integrate_source(&self) -> Option<&FileMapping> {
        self.integrate_source.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Point every reference to `from` at `to`.
    pub(crate) fn remap_changelist(&mut self, from: ChangelistId, to: ChangelistId) {
        if self.changelist == from {
            self.changelist = to;
        }
        if self.target == UpdateTarget::Changelist(from) {
            self.target = UpdateTarget::Changelist(to);
        }
    }
}

impl fmt::Display for PendingUpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} {}", self.target, self.changelist, self.action.as_str())
    }
}

/// Ordered queue of pending updates, at most one per target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingQueue {
    updates: Vec<PendingUpdateState>,
}

impl PendingQueue {
    /// Add an update, superseding any queued update for the same target.
    ///
    /// Moving a file that already has a queued open action keeps that action
    /// and only changes its changelist.
    pub fn push(&mut self, update: PendingUpdateState) {
        if let Some(index) = self.updates.iter().position(|u| *u == update) {
            let existing = &mut self.updates[index];
            if update.action == UpdateAction::MoveFile && existing.action.opens_file() {
                existing.changelist = update.changelist;
                return;
            }
            self.updates.remove(index);
        }
        self.updates.push(update);
    }

    /// Remove the update for `target`, if any.
    pub fn remove(&mut self, target: &UpdateTarget) -> Option<PendingUpdateState> {
        let index = self.updates.iter().position(|u| &u.target == target)?;
        Some(self.updates.remove(index))
    }

    pub fn get(&self, target: &UpdateTarget) -> Option<&PendingUpdateState> {
        self.updates.iter().find(|u| &u.target == target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingUpdateState> {
        self.updates.iter()
    }

    pub fn first(&self) -> Option<&PendingUpdateState> {
        self.updates.first()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&PendingUpdateState) -> bool) {
        self.updates.retain(keep);
    }

    /// Replace queued copies of `mapping` with the newer one.
    pub(crate) fn refresh_mapping(&mut self, mapping: &FileMapping) {
        for update in &mut self.updates {
            if let UpdateTarget::File(queued) = &mut update.target {
                if queued == mapping {
                    *queued = mapping.clone();
                }
            }
            if let Some(source) = &mut update.integrate_source {
                if source == mapping {
                    *source = mapping.clone();
                }
            }
        }
    }

    pub(crate) fn remap_changelist(&mut self, from: ChangelistId, to: ChangelistId) {
        for update in &mut self.updates {
            update.remap_changelist(from, to);
        }
    }
}
