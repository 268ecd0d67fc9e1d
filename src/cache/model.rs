use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::changelist::ChangelistId;

/// Link between a local file and its depot path.
///
/// The id is stable for the life of the cache and is what persisted pending
/// updates refer to. Two mappings are equal when their ids are, whatever
/// depot path each copy has learned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMapping {
    id: String,
    local_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    depot_path: Option<String>,
}

impl PartialEq for FileMapping {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FileMapping {}

impl Hash for FileMapping {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl FileMapping {
    pub(crate) fn new(local_path: &Path) -> Self {
        FileMapping {
            id: uuid::Uuid::new_v4().to_string(),
            local_path: local_path.to_path_buf(),
            depot_path: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn depot_path(&self) -> Option<&str> {
        self.depot_path.as_deref()
    }

    pub(crate) fn set_depot_path(&mut self, depot_path: Option<String>) {
        if depot_path.is_some() {
            self.depot_path = depot_path;
        }
    }
}

/// How a file is open on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileAction {
    Add,
    Edit,
    /// Opened locally for add or edit; which one is decided by the server
    AddEdit,
    Delete,
    Move,
    Integrate,
}

impl FileAction {
    pub fn as_str(&self) -> &str {
        match self {
            FileAction::Add => "add",
            FileAction::Edit => "edit",
            FileAction::AddEdit => "add/edit",
            FileAction::Delete => "delete",
            FileAction::Move => "move",
            FileAction::Integrate => "integrate",
        }
    }

    /// The file exists in the workspace after this action.
    pub fn is_open_for_write(&self) -> bool {
        !matches!(self, FileAction::Delete)
    }
}

/// A file opened on the client, as the server reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOpenedFile {
    pub local_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depot_path: Option<String>,
    pub action: FileAction,
    pub changelist: ChangelistId,
}

/// A file open on the client, from the cache's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenedFile {
    pub file: FileMapping,
    pub action: FileAction,
    pub changelist: ChangelistId,
    /// Integration source, when the action is an integrate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<FileMapping>,
}

/// A pending changelist on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelistState {
    pub id: ChangelistId,
    pub description: String,
    #[serde(default)]
    pub jobs: Vec<String>,
}

impl ChangelistState {
    pub fn new(id: ChangelistId, description: impl Into<String>) -> Self {
        ChangelistState {
            id,
            description: description.into(),
            jobs: Vec::new(),
        }
    }
}

/// A job as cached from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub description: String,
}
