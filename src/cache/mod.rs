//! Per-connection cache of server state plus the queue of local mutations
//! the server has not seen yet.
//!
//! The server view (opened files, changelists, jobs, workspace roots) is only
//! ever replaced by a refresh. What callers read is that view with the
//! pending queue folded on top, so a queued edit is visible right away.

pub mod ignore;
pub mod model;
pub mod pending;
pub mod roots;
pub mod store;

pub use ignore::IgnorePatterns;
pub use model::{ChangelistState, FileAction, FileMapping, Job, OpenedFile, ServerOpenedFile};
pub use pending::{PendingQueue, PendingUpdateState, UpdateAction, UpdateTarget};
pub use roots::ClientRoots;
pub use store::CacheStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::changelist::ChangelistId;
use crate::client::ClientServerId;

/// Default changelist description shown before the server reports one.
const DEFAULT_CHANGELIST_DESCRIPTION: &str = "default";

/// One cached collection that a live server call can replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshQuery {
    WorkspaceRoots,
    FileActions,
    Changelists,
    JobStatusValues,
    Jobs(Vec<String>),
}

impl RefreshQuery {
    pub fn name(&self) -> &str {
        match self {
            RefreshQuery::WorkspaceRoots => "workspace-roots",
            RefreshQuery::FileActions => "file-actions",
            RefreshQuery::Changelists => "changelists",
            RefreshQuery::JobStatusValues => "job-status-values",
            RefreshQuery::Jobs(_) => "jobs",
        }
    }
}

/// Server answer to a [`RefreshQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshResult {
    WorkspaceRoots(Vec<PathBuf>),
    FileActions(Vec<ServerOpenedFile>),
    Changelists(Vec<ChangelistState>),
    JobStatusValues(Vec<String>),
    Jobs(Vec<Job>),
}

/// Everything persisted for one client workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedState {
    #[serde(default)]
    pub workspace_roots: Vec<PathBuf>,
    #[serde(default)]
    pub opened_files: Vec<OpenedFile>,
    /// Changelists as the server last reported them
    #[serde(default)]
    pub changelists: Vec<ChangelistState>,
    /// Changelists reserved here and not created on the server yet
    #[serde(default)]
    pub local_changelists: Vec<ChangelistState>,
    #[serde(default)]
    pub job_status_values: Vec<String>,
    #[serde(default)]
    pub jobs: BTreeMap<String, Job>,
    /// IDE changelist name to the changelist it is bound to
    #[serde(default)]
    pub changelist_bindings: BTreeMap<String, ChangelistId>,
    #[serde(default)]
    pub file_mappings: Vec<FileMapping>,
    #[serde(default = "first_local")]
    pub next_local_id: ChangelistId,
    #[serde(default)]
    pub pending: PendingQueue,
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
}

fn first_local() -> ChangelistId {
    ChangelistId::FIRST_LOCAL
}

impl Default for CachedState {
    fn default() -> Self {
        CachedState {
            workspace_roots: Vec::new(),
            opened_files: Vec::new(),
            changelists: Vec::new(),
            local_changelists: Vec::new(),
            job_status_values: Vec::new(),
            jobs: BTreeMap::new(),
            changelist_bindings: BTreeMap::new(),
            file_mappings: Vec::new(),
            next_local_id: ChangelistId::FIRST_LOCAL,
            pending: PendingQueue::default(),
            last_refreshed: None,
        }
    }
}

/// Cache and pending-update queue of one client workspace.
///
/// Not synchronized on its own; the owning connection serializes writers.
#[derive(Debug, Clone)]
pub struct ClientCacheManager {
    id: ClientServerId,
    state: CachedState,
    /// Bumped on every change to `state`
    revision: u64,
}

impl ClientCacheManager {
    pub fn new(id: ClientServerId) -> Self {
        Self::from_state(id, CachedState::default())
    }

    pub fn from_state(id: ClientServerId, state: CachedState) -> Self {
        ClientCacheManager {
            id,
            state,
            revision: 0,
        }
    }

    pub fn id(&self) -> &ClientServerId {
        &self.id
    }

    pub fn state(&self) -> &CachedState {
        &self.state
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.last_refreshed
    }

    /// Changes whenever the cached state does.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // Refresh

    /// Replace the cached collection a refresh answered for.
    pub fn apply_refresh(&mut self, result: RefreshResult) {
        match result {
            RefreshResult::WorkspaceRoots(roots) => self.state.workspace_roots = roots,
            RefreshResult::FileActions(files) => {
                let opened = files
                    .into_iter()
                    .map(|file| {
                        let mut mapping = self.mapping_for(&file.local_path);
                        mapping.set_depot_path(file.depot_path);
                        self.store_mapping(&mapping);
                        OpenedFile {
                            file: mapping,
                            action: file.action,
                            changelist: file.changelist,
                            source: None,
                        }
                    })
                    .collect();
                self.state.opened_files = opened;
            }
            RefreshResult::Changelists(changelists) => self.state.changelists = changelists,
            RefreshResult::JobStatusValues(values) => self.state.job_status_values = values,
            RefreshResult::Jobs(jobs) => {
                for job in jobs {
                    self.state.jobs.insert(job.id.clone(), job);
                }
            }
        }
        self.state.last_refreshed = Some(Utc::now());
        self.touch();
    }

    // Views

    /// Open files as the server reported them with pending updates applied.
    pub fn open_files(&self) -> Vec<OpenedFile> {
        let mut files: Vec<OpenedFile> = self.state.opened_files.clone();
        for update in self.state.pending.iter() {
            let Some(mapping) = update.file() else {
                continue;
            };
            let existing = files
                .iter()
                .position(|f| f.file.local_path() == mapping.local_path());
            let opened = match (update.action(), existing) {
                (
                    UpdateAction::AddEditFile | UpdateAction::EditFile | UpdateAction::MoveFile,
                    Some(index),
                ) if files[index].action != FileAction::Delete
                        || update.action() == UpdateAction::MoveFile =>
                {
                    files[index].changelist = update.changelist();
                    continue;
                }
                (UpdateAction::AddEditFile, _) => FileAction::AddEdit,
                (UpdateAction::EditFile | UpdateAction::MoveFile, _) => FileAction::Edit,
                (UpdateAction::DeleteFile, _) => FileAction::Delete,
                (UpdateAction::IntegrateFile, _) => FileAction::Integrate,
                (UpdateAction::RenameChangelist | UpdateAction::DeleteChangelist, _) => continue,
            };
            let entry = OpenedFile {
                file: mapping.clone(),
                action: opened,
                changelist: update.changelist(),
                source: update.integrate_source().cloned(),
            };
            match existing {
                Some(index) => files[index] = entry,
                None => files.push(entry),
            }
        }
        files
    }

    /// The view entry for one file, if it is open.
    pub fn open_file(&self, path: &Path) -> Option<OpenedFile> {
        self.open_files()
            .into_iter()
            .find(|f| f.file.local_path() == path)
    }

    /// Pending changelists, server and local, with pending renames and
    /// deletes applied. The default changelist is always present.
    pub fn changelists(&self) -> Vec<ChangelistState> {
        let mut changelists: Vec<ChangelistState> = self
            .state
            .changelists
            .iter()
            .chain(self.state.local_changelists.iter())
            .cloned()
            .collect();
        if !changelists.iter().any(|c| c.id.is_default()) {
            changelists.insert(
                0,
                ChangelistState::new(ChangelistId::DEFAULT, DEFAULT_CHANGELIST_DESCRIPTION),
            );
        }
        for update in self.state.pending.iter() {
            let UpdateTarget::Changelist(id) = update.target() else {
                continue;
            };
            match update.action() {
                UpdateAction::RenameChangelist => {
                    if let Some(changelist) = changelists.iter_mut().find(|c| c.id == *id) {
                        changelist.description =
                            update.description().unwrap_or_default().to_string();
                    }
                }
                UpdateAction::DeleteChangelist => changelists.retain(|c| c.id != *id),
                _ => {}
            }
        }
        changelists
    }

    pub fn changelist(&self, id: ChangelistId) -> Option<ChangelistState> {
        self.changelists().into_iter().find(|c| c.id == id)
    }

    pub fn workspace_roots(&self) -> &[PathBuf] {
        &self.state.workspace_roots
    }

    /// Job status values; empty when never fetched.
    pub fn job_status_values(&self) -> Vec<String> {
        self.state.job_status_values.clone()
    }

    /// Cached jobs among `ids`, in the order asked for.
    pub fn jobs_for_ids(&self, ids: &[String]) -> Vec<Job> {
        ids.iter()
            .filter_map(|id| self.state.jobs.get(id).cloned())
            .collect()
    }

    /// Cached jobs attached to any of the given changelists.
    pub fn jobs_in_changelists(&self, ids: &[ChangelistId]) -> BTreeMap<ChangelistId, Vec<Job>> {
        self.changelists()
            .into_iter()
            .filter(|c| ids.contains(&c.id))
            .map(|c| (c.id, self.jobs_for_ids(&c.jobs)))
            .collect()
    }

    pub fn pending_updates(&self) -> &PendingQueue {
        &self.state.pending
    }

    pub fn file_mapping(&self, path: &Path) -> Option<&FileMapping> {
        self.state
            .file_mappings
            .iter()
            .find(|m| m.local_path() == path)
    }

    pub fn file_mapping_by_id(&self, id: &str) -> Option<&FileMapping> {
        self.state.file_mappings.iter().find(|m| m.id() == id)
    }

    // Changelist ids

    /// Hand out a fresh local changelist id and record its description.
    pub fn reserve_local_changelist_id(&mut self, description: &str) -> ChangelistId {
        let id = self.state.next_local_id;
        self.state.next_local_id = id.next_local();
        self.state
            .local_changelists
            .push(ChangelistState::new(id, description));
        self.touch();
        log::debug!("{}: reserved local changelist {}", self.id, id);
        id
    }

    pub fn changelist_for(&self, ide_name: &str) -> Option<ChangelistId> {
        self.state.changelist_bindings.get(ide_name).copied()
    }

    pub fn bind_changelist(&mut self, ide_name: &str, id: ChangelistId) {
        self.state
            .changelist_bindings
            .insert(ide_name.to_string(), id);
        self.touch();
    }

    /// Replace a local changelist id with the id the server assigned, everywhere.
    pub fn confirm_changelist(&mut self, local: ChangelistId, confirmed: ChangelistId) {
        if let Some(index) = self
            .state
            .local_changelists
            .iter()
            .position(|c| c.id == local)
        {
            let mut changelist = self.state.local_changelists.remove(index);
            changelist.id = confirmed;
            self.state.changelists.push(changelist);
        }
        self.state.pending.remap_changelist(local, confirmed);
        for file in &mut self.state.opened_files {
            if file.changelist == local {
                file.changelist = confirmed;
            }
        }
        for bound in self.state.changelist_bindings.values_mut() {
            if *bound == local {
                *bound = confirmed;
            }
        }
        self.touch();
        log::info!("{}: local changelist {} is now {}", self.id, local, confirmed);
    }

    /// Local changelist backing `id`, if it still needs creating on the server.
    pub fn local_changelist(&self, id: ChangelistId) -> Option<&ChangelistState> {
        self.state.local_changelists.iter().find(|c| c.id == id)
    }

    // Mutations. Each one queues what it produces and returns it.

    /// Open a file for add or edit. `None` when it already is.
    pub fn add_or_edit_file(
        &mut self,
        path: &Path,
        changelist: ChangelistId,
    ) -> Option<PendingUpdateState> {
        if self.is_open_for_write_in(path, changelist) {
            return None;
        }
        let mapping = self.ensure_mapping(path);
        self.enqueue(PendingUpdateState::for_file(
            mapping,
            changelist,
            UpdateAction::AddEditFile,
        ))
    }

    /// Open a file for edit. `None` when it already is.
    pub fn edit_file(
        &mut self,
        path: &Path,
        changelist: ChangelistId,
    ) -> Option<PendingUpdateState> {
        if self.is_open_for_write_in(path, changelist) {
            return None;
        }
        let mapping = self.ensure_mapping(path);
        self.enqueue(PendingUpdateState::for_file(
            mapping,
            changelist,
            UpdateAction::EditFile,
        ))
    }

    /// Open a file for delete.
    ///
    /// A file whose only change is a queued add the server never saw just
    /// loses that add.
    pub fn delete_file(
        &mut self,
        path: &Path,
        changelist: ChangelistId,
    ) -> Option<PendingUpdateState> {
        if let Some(open) = self.open_file(path) {
            if open.action == FileAction::Delete && open.changelist == changelist {
                return None;
            }
        }
        let known_to_server = self
            .state
            .opened_files
            .iter()
            .any(|f| f.file.local_path() == path);
        if !known_to_server {
            if let Some(mapping) = self.file_mapping(path).cloned() {
                let target = UpdateTarget::File(mapping);
                if self
                    .state
                    .pending
                    .get(&target)
                    .is_some_and(|u| u.action() == UpdateAction::AddEditFile)
                {
                    self.state.pending.remove(&target);
                    self.touch();
                    log::debug!("{}: cancelled pending add of {}", self.id, path.display());
                    return None;
                }
            }
        }
        let mapping = self.ensure_mapping(path);
        self.enqueue(PendingUpdateState::for_file(
            mapping,
            changelist,
            UpdateAction::DeleteFile,
        ))
    }

    /// Branch `source` onto `target`.
    pub fn integrate_file(
        &mut self,
        source: &Path,
        target: &Path,
        changelist: ChangelistId,
    ) -> Option<PendingUpdateState> {
        let source = self.ensure_mapping(source);
        let target = self.ensure_mapping(target);
        self.enqueue(PendingUpdateState::integrate(source, target, changelist))
    }

    /// Move files to the changelist bound to an IDE changelist, reserving
    /// and binding a local id when none is bound yet.
    pub fn move_files_to_changelist(
        &mut self,
        paths: &[PathBuf],
        ide_name: &str,
    ) -> Vec<PendingUpdateState> {
        let changelist = match self.changelist_for(ide_name) {
            Some(id) => id,
            None => {
                let id = self.reserve_local_changelist_id(ide_name);
                self.bind_changelist(ide_name, id);
                id
            }
        };
        self.move_files_to(paths, changelist)
    }

    /// Move files to a known changelist, skipping those already in it.
    pub fn move_files_to(
        &mut self,
        paths: &[PathBuf],
        changelist: ChangelistId,
    ) -> Vec<PendingUpdateState> {
        let view = self.open_files();
        paths
            .iter()
            .filter(|path| {
                !view
                    .iter()
                    .any(|f| f.file.local_path() == path.as_path() && f.changelist == changelist)
            })
            .filter_map(|path| {
                let mapping = self.ensure_mapping(path);
                self.enqueue(PendingUpdateState::for_file(
                    mapping,
                    changelist,
                    UpdateAction::MoveFile,
                ))
            })
            .collect()
    }

    /// Change a changelist description. Protected ids are left alone.
    ///
    /// A local changelist is renamed in place since it only reaches the
    /// server when it is created.
    pub fn rename_changelist(
        &mut self,
        id: ChangelistId,
        description: &str,
    ) -> Option<PendingUpdateState> {
        if id.is_protected() {
            return None;
        }
        if let Some(local) = self
            .state
            .local_changelists
            .iter_mut()
            .find(|c| c.id == id)
        {
            local.description = description.to_string();
            self.touch();
            return None;
        }
        match self.changelist(id) {
            Some(current) if current.description != description => self.enqueue(
                PendingUpdateState::rename_changelist(id, description.to_string()),
            ),
            _ => None,
        }
    }

    /// Delete a changelist, moving its files to the default changelist.
    /// Protected ids are left alone.
    pub fn delete_changelist(&mut self, id: ChangelistId) -> Vec<PendingUpdateState> {
        if id.is_protected() {
            return Vec::new();
        }
        if id.is_local() {
            self.state.pending.remove(&UpdateTarget::Changelist(id));
            self.state.pending.remap_changelist(id, ChangelistId::DEFAULT);
            self.state.local_changelists.retain(|c| c.id != id);
            self.state.changelist_bindings.retain(|_, bound| *bound != id);
            self.touch();
            log::debug!("{}: dropped local changelist {}", self.id, id);
            return Vec::new();
        }
        if self.changelist(id).is_none() {
            return Vec::new();
        }
        let paths: Vec<PathBuf> = self
            .open_files()
            .into_iter()
            .filter(|f| f.changelist == id)
            .map(|f| f.file.local_path().to_path_buf())
            .collect();
        let mut updates = self.move_files_to(&paths, ChangelistId::DEFAULT);
        self.state.changelist_bindings.retain(|_, bound| *bound != id);
        updates.extend(self.enqueue(PendingUpdateState::delete_changelist(id)));
        updates
    }

    // Queue

    /// Drop a pending update without sending it.
    pub fn discard_pending(&mut self, target: &UpdateTarget) -> Option<PendingUpdateState> {
        let removed = self.state.pending.remove(target);
        if let Some(update) = &removed {
            self.touch();
            log::info!("{}: discarded pending update {}", self.id, update);
        }
        removed
    }

    /// Fold an update the server accepted into the server view and drop it
    /// from the queue.
    pub fn mark_applied(&mut self, update: &PendingUpdateState) {
        self.state.pending.remove(update.target());
        self.touch();
        match (update.target(), update.action()) {
            (UpdateTarget::Changelist(id), UpdateAction::RenameChangelist) => {
                if let Some(changelist) = self.state.changelists.iter_mut().find(|c| c.id == *id) {
                    changelist.description = update.description().unwrap_or_default().to_string();
                }
            }
            (UpdateTarget::Changelist(id), UpdateAction::DeleteChangelist) => {
                self.state.changelists.retain(|c| c.id != *id);
            }
            (UpdateTarget::File(mapping), action) => {
                let existing = self
                    .state
                    .opened_files
                    .iter_mut()
                    .find(|f| f.file.local_path() == mapping.local_path());
                let file_action = match action {
                    UpdateAction::AddEditFile => FileAction::AddEdit,
                    UpdateAction::DeleteFile => FileAction::Delete,
                    UpdateAction::IntegrateFile => FileAction::Integrate,
                    _ => FileAction::Edit,
                };
                match existing {
                    Some(file) => {
                        file.changelist = update.changelist();
                        if action != UpdateAction::MoveFile {
                            file.action = file_action;
                        }
                    }
                    None => self.state.opened_files.push(OpenedFile {
                        file: mapping.clone(),
                        action: file_action,
                        changelist: update.changelist(),
                        source: update.integrate_source().cloned(),
                    }),
                }
            }
            _ => {}
        }
    }

    fn enqueue(&mut self, update: PendingUpdateState) -> Option<PendingUpdateState> {
        log::debug!("{}: queued {}", self.id, update);
        self.state.pending.push(update.clone());
        self.touch();
        Some(update)
    }

    fn is_open_for_write_in(&self, path: &Path, changelist: ChangelistId) -> bool {
        self.open_file(path)
            .is_some_and(|f| f.action.is_open_for_write() && f.changelist == changelist)
    }

    fn mapping_for(&self, path: &Path) -> FileMapping {
        self.file_mapping(path)
            .cloned()
            .unwrap_or_else(|| FileMapping::new(path))
    }

    fn store_mapping(&mut self, mapping: &FileMapping) {
        match self
            .state
            .file_mappings
            .iter_mut()
            .find(|m| m.id() == mapping.id())
        {
            Some(existing) => *existing = mapping.clone(),
            None => self.state.file_mappings.push(mapping.clone()),
        }
        self.state.pending.refresh_mapping(mapping);
    }

    fn ensure_mapping(&mut self, path: &Path) -> FileMapping {
        let mapping = self.mapping_for(path);
        self.store_mapping(&mapping);
        mapping
    }
}
