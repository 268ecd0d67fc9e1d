use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{ChangelistState, FileAction, Job, PendingUpdateState, ServerOpenedFile};
use crate::changelist::ChangelistId;
use crate::client::ClientConfig;
use crate::error::P4Result;

/// Depot status of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub local_path: PathBuf,
    pub depot_path: String,
    pub head_revision: Option<u32>,
    pub have_revision: Option<u32>,
    /// How the file is open on this client, if at all
    pub action: Option<FileAction>,
}

/// One line of `annotate` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedLine {
    pub revision: u32,
    pub changelist: ChangelistId,
    pub author: String,
    pub line: String,
}

/// One submitted revision of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRevision {
    pub revision: u32,
    pub changelist: ChangelistId,
    pub author: String,
    pub date: DateTime<Utc>,
    pub description: String,
}

/// Live round-trips to one client workspace on one server.
///
/// Every call may block on the network. Errors are classified through
/// [`P4Error`](crate::error::P4Error) so the connection can tell lost
/// connectivity from authentication failures and server rejections.
pub trait ServerExec: Send + Sync {
    fn workspace_roots(&self) -> P4Result<Vec<PathBuf>>;

    fn opened_files(&self) -> P4Result<Vec<ServerOpenedFile>>;

    fn pending_changelists(&self) -> P4Result<Vec<ChangelistState>>;

    fn job_status_values(&self) -> P4Result<Vec<String>>;

    fn jobs(&self, ids: &[String]) -> P4Result<Vec<Job>>;

    fn file_status(&self, path: &Path) -> P4Result<Option<FileStatus>>;

    fn annotations(&self, path: &Path) -> P4Result<Vec<AnnotatedLine>>;

    fn revision_history(&self, path: &Path) -> P4Result<Vec<FileRevision>>;

    /// Create a pending changelist and return the number the server assigned.
    fn create_changelist(&self, description: &str) -> P4Result<ChangelistId>;

    /// Perform the server side of a queued update. Local changelist ids are
    /// never passed here.
    fn apply(&self, update: &PendingUpdateState) -> P4Result<()>;
}

/// Opens a [`ServerExec`] for a client configuration.
pub trait Connector: Send + Sync {
    fn connect(&self, config: &ClientConfig) -> P4Result<Arc<dyn ServerExec>>;
}
