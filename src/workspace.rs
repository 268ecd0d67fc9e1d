//! High level operations on one client workspace.
//!
//! [`WorkspaceClient`] is what the CLI and other front ends talk to. It picks
//! the right execution primitive of the shared [`ServerConnection`] for each
//! operation and never lets a lost connection surface as a failure on reads
//! that have cached data to fall back on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::{
    ChangelistState, ClientRoots, IgnorePatterns, Job, OpenedFile, PendingUpdateState,
    RefreshQuery, UpdateTarget,
};
use crate::cancel::CancelToken;
use crate::changelist::ChangelistId;
use crate::client::ClientConfig;
use crate::connection::{
    AnnotatedLine, ConnectionManager, FileRevision, FileStatus, ReconcileReport, ServerConnection,
};
use crate::error::{P4Error, P4Result};

/// One client workspace bound to a project.
///
/// A client whose connection could not be opened is invalid: it is always
/// offline, reads return empty results and mutations do nothing.
pub struct WorkspaceClient {
    config: Arc<ClientConfig>,
    connection: Option<Arc<ServerConnection>>,
    ignore: IgnorePatterns,
    disposed: AtomicBool,
}

impl WorkspaceClient {
    pub fn new(config: Arc<ClientConfig>, manager: &ConnectionManager) -> Self {
        let connection = match manager.connection_for(&config) {
            Ok(connection) => Some(connection),
            Err(e) => {
                log::warn!("{}: cannot open connection: {}", config, e);
                None
            }
        };
        let ignore_file = config
            .project_root()
            .join(&manager.preferences().ignore_file_name);
        let ignore = IgnorePatterns::load(&ignore_file).unwrap_or_else(|e| {
            log::warn!("{:#}", e);
            IgnorePatterns::default()
        });
        WorkspaceClient {
            config,
            connection,
            ignore,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn client_config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    pub fn connection(&self) -> Option<&Arc<ServerConnection>> {
        self.live()
    }

    fn live(&self) -> Option<&Arc<ServerConnection>> {
        if self.disposed.load(Ordering::SeqCst) {
            None
        } else {
            self.connection.as_ref()
        }
    }

    // State

    pub fn is_valid(&self) -> bool {
        self.live().is_some()
    }

    pub fn is_working_online(&self) -> bool {
        self.live().is_some_and(|c| c.is_working_online())
    }

    pub fn is_working_offline(&self) -> bool {
        !self.is_working_online()
    }

    pub fn work_online(&self) {
        if let Some(connection) = self.live() {
            connection.work_online();
        }
    }

    pub fn work_offline(&self) {
        if let Some(connection) = self.live() {
            connection.work_offline();
        }
    }

    /// Stop using this client. The shared connection stays open for others.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            log::debug!("{}: disposed", self.config);
        }
    }

    // Reads

    pub fn open_files(&self, cancel: &CancelToken) -> Vec<OpenedFile> {
        self.cache_query(&[RefreshQuery::FileActions], cancel, |c| c.open_files())
            .unwrap_or_default()
    }

    pub fn open_changelists(&self, cancel: &CancelToken) -> Vec<ChangelistState> {
        self.cache_query(&[RefreshQuery::Changelists], cancel, |c| c.changelists())
            .unwrap_or_default()
    }

    pub fn job_status_values(&self, cancel: &CancelToken) -> Vec<String> {
        self.cache_query(&[RefreshQuery::JobStatusValues], cancel, |c| {
            c.job_status_values()
        })
        .unwrap_or_default()
    }

    pub fn jobs_for_ids(&self, ids: &[String], cancel: &CancelToken) -> Vec<Job> {
        self.cache_query(&[RefreshQuery::Jobs(ids.to_vec())], cancel, |c| {
            c.jobs_for_ids(ids)
        })
        .unwrap_or_default()
    }

    /// Jobs attached to each of the given changelists.
    pub fn jobs_in_changelists(
        &self,
        ids: &[ChangelistId],
        cancel: &CancelToken,
    ) -> BTreeMap<ChangelistId, Vec<Job>> {
        let job_ids: Vec<String> = self
            .cache_query(&[RefreshQuery::Changelists], cancel, |c| {
                c.changelists()
                    .into_iter()
                    .filter(|cl| ids.contains(&cl.id))
                    .flat_map(|cl| cl.jobs)
                    .collect()
            })
            .unwrap_or_default();
        self.cache_query(&[RefreshQuery::Jobs(job_ids)], cancel, |c| {
            c.jobs_in_changelists(ids)
        })
        .unwrap_or_default()
    }

    /// Directories inside both this workspace and the project.
    pub fn roots(&self, cancel: &CancelToken) -> ClientRoots {
        let source_dirs = self.config.project().source_dirs();
        self.cache_query(&[RefreshQuery::WorkspaceRoots], cancel, |c| {
            let workspace_roots = if c.workspace_roots().is_empty() {
                self.config.roots().iter().cloned().collect()
            } else {
                c.workspace_roots().to_vec()
            };
            ClientRoots::compute(&workspace_roots, source_dirs)
        })
        .unwrap_or_default()
    }

    /// See [`ClientRoots::match_depth`].
    pub fn match_depth(&self, file: &Path, cancel: &CancelToken) -> Option<usize> {
        self.roots(cancel).match_depth(file)
    }

    pub fn is_ignored(&self, file: &Path) -> bool {
        self.ignore.is_ignored(file)
    }

    /// Live depot status of a file; `None` while offline or on failure.
    pub fn file_status(&self, file: &Path, cancel: &CancelToken) -> Option<FileStatus> {
        let connection = self.live()?;
        if connection.is_working_offline() {
            return None;
        }
        match connection.query(cancel, |exec| exec.file_status(file)) {
            Ok(status) => status,
            Err(e) => {
                log::debug!("{}: no status for {}: {}", self.config, file.display(), e);
                None
            }
        }
    }

    pub fn annotations(&self, file: &Path, cancel: &CancelToken) -> P4Result<Vec<AnnotatedLine>> {
        self.live()
            .ok_or(P4Error::Disconnected)?
            .query(cancel, |exec| exec.annotations(file))
    }

    /// Submitted revisions of a file, newest first.
    pub fn revision_history(
        &self,
        file: &Path,
        cancel: &CancelToken,
    ) -> P4Result<Vec<FileRevision>> {
        let mut history = self
            .live()
            .ok_or(P4Error::Disconnected)?
            .query(cancel, |exec| exec.revision_history(file))?;
        history.sort_by(|a, b| b.revision.cmp(&a.revision));
        Ok(history)
    }

    /// The queue of updates the server has not seen yet.
    pub fn pending_updates(&self) -> Vec<PendingUpdateState> {
        self.live()
            .map(|c| c.cached(|cache| cache.pending_updates().iter().cloned().collect()))
            .unwrap_or_default()
    }

    // Mutations

    /// Open files for add or edit, skipping ignored ones.
    pub fn add_or_edit_files(
        &self,
        files: &[PathBuf],
        changelist: ChangelistId,
    ) -> Vec<PendingUpdateState> {
        let files: Vec<&PathBuf> = files.iter().filter(|f| !self.is_ignored(f)).collect();
        self.queue_updates(|cache| {
            files
                .iter()
                .filter_map(|file| cache.add_or_edit_file(file, changelist))
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn edit_file(&self, file: &Path, changelist: ChangelistId) -> Option<PendingUpdateState> {
        self.queue_updates(|cache| cache.edit_file(file, changelist))
            .flatten()
    }

    pub fn delete_files(
        &self,
        files: &[PathBuf],
        changelist: ChangelistId,
    ) -> Vec<PendingUpdateState> {
        self.queue_updates(|cache| {
            files
                .iter()
                .filter_map(|file| cache.delete_file(file, changelist))
                .collect()
        })
        .unwrap_or_default()
    }

    /// Move files to the changelist bound to an IDE changelist name.
    pub fn move_files_to_changelist(
        &self,
        files: &[PathBuf],
        ide_name: &str,
    ) -> Vec<PendingUpdateState> {
        self.queue_updates(|cache| cache.move_files_to_changelist(files, ide_name))
            .unwrap_or_default()
    }

    pub fn rename_changelist(
        &self,
        id: ChangelistId,
        description: &str,
    ) -> Option<PendingUpdateState> {
        self.queue_updates(|cache| cache.rename_changelist(id, description))
            .flatten()
    }

    pub fn delete_changelist(&self, id: ChangelistId) -> Vec<PendingUpdateState> {
        self.queue_updates(|cache| cache.delete_changelist(id))
            .unwrap_or_default()
    }

    /// Send the pending queue to the server.
    pub fn reconcile(&self, cancel: &CancelToken) -> P4Result<ReconcileReport> {
        self.live().ok_or(P4Error::Disconnected)?.reconcile(cancel)
    }

    pub fn discard_pending(&self, target: &UpdateTarget) -> Option<PendingUpdateState> {
        self.live()?.discard_pending(target)
    }

    fn cache_query<T>(
        &self,
        refresh: &[RefreshQuery],
        cancel: &CancelToken,
        op: impl FnOnce(&crate::cache::ClientCacheManager) -> T,
    ) -> Option<T> {
        Some(self.live()?.cache_query(refresh, cancel, op))
    }

    fn queue_updates<T>(
        &self,
        builder: impl FnOnce(&mut crate::cache::ClientCacheManager) -> T,
    ) -> Option<T> {
        Some(self.live()?.queue_updates(builder))
    }
}
