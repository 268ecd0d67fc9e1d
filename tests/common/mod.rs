//! Shared fixtures for integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use p4_workspace::cache::{ChangelistState, Job, PendingUpdateState, ServerOpenedFile};
use p4_workspace::changelist::ChangelistId;
use p4_workspace::client::ClientConfig;
use p4_workspace::connection::{AnnotatedLine, Connector, FileRevision, FileStatus, ServerExec};
use p4_workspace::parts::{ConfigPart, DataPart, PartFields, PartSource};
use p4_workspace::P4Result;

/// A manual data part naming a server and client, optionally scoped.
pub fn part(root: Option<&Path>, port: &str, client: &str) -> ConfigPart {
    let data = DataPart::new(
        PartSource::Manual(format!("{port}/{client}")),
        PartFields {
            port: Some(port.to_string()),
            user: Some("jdoe".to_string()),
            client: Some(client.to_string()),
            ..Default::default()
        },
    );
    match root {
        Some(root) => data.with_root(root).into(),
        None => data.into(),
    }
}

/// Server that records what it is asked and counts every call.
#[derive(Default)]
pub struct RecordingServer {
    calls: AtomicUsize,
    pub opened: Mutex<Vec<ServerOpenedFile>>,
    pub changelists: Mutex<Vec<ChangelistState>>,
    pub created: Mutex<Vec<String>>,
    pub applied: Mutex<Vec<PendingUpdateState>>,
    next_changelist: AtomicUsize,
}

impl RecordingServer {
    pub fn new() -> Arc<Self> {
        let server = RecordingServer::default();
        server.next_changelist.store(500, Ordering::SeqCst);
        Arc::new(server)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl ServerExec for RecordingServer {
    fn workspace_roots(&self) -> P4Result<Vec<PathBuf>> {
        self.call();
        Ok(Vec::new())
    }

    fn opened_files(&self) -> P4Result<Vec<ServerOpenedFile>> {
        self.call();
        Ok(self.opened.lock().clone())
    }

    fn pending_changelists(&self) -> P4Result<Vec<ChangelistState>> {
        self.call();
        Ok(self.changelists.lock().clone())
    }

    fn job_status_values(&self) -> P4Result<Vec<String>> {
        self.call();
        Ok(vec!["open".to_string(), "closed".to_string()])
    }

    fn jobs(&self, _ids: &[String]) -> P4Result<Vec<Job>> {
        self.call();
        Ok(Vec::new())
    }

    fn file_status(&self, _path: &Path) -> P4Result<Option<FileStatus>> {
        self.call();
        Ok(None)
    }

    fn annotations(&self, _path: &Path) -> P4Result<Vec<AnnotatedLine>> {
        self.call();
        Ok(Vec::new())
    }

    fn revision_history(&self, _path: &Path) -> P4Result<Vec<FileRevision>> {
        self.call();
        Ok(Vec::new())
    }

    fn create_changelist(&self, description: &str) -> P4Result<ChangelistId> {
        self.call();
        let id = self.next_changelist.fetch_add(1, Ordering::SeqCst) as i64;
        self.created.lock().push(description.to_string());
        self.changelists
            .lock()
            .push(ChangelistState::new(ChangelistId::new(id), description));
        Ok(ChangelistId::new(id))
    }

    fn apply(&self, update: &PendingUpdateState) -> P4Result<()> {
        self.call();
        self.applied.lock().push(update.clone());
        Ok(())
    }
}

pub struct RecordingConnector(pub Arc<RecordingServer>);

impl Connector for RecordingConnector {
    fn connect(&self, _config: &ClientConfig) -> P4Result<Arc<dyn ServerExec>> {
        Ok(self.0.clone())
    }
}
