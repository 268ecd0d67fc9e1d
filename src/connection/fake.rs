use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{AnnotatedLine, Connector, FileRevision, FileStatus, ServerExec};
use crate::cache::{
    ChangelistState, FileAction, Job, PendingUpdateState, ServerOpenedFile, UpdateAction,
};
use crate::changelist::ChangelistId;
use crate::client::ClientConfig;
use crate::error::{P4Error, P4Result};

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub roots: Vec<PathBuf>,
    pub opened: Vec<ServerOpenedFile>,
    pub changelists: Vec<ChangelistState>,
    pub job_status_values: Vec<String>,
    pub jobs: Vec<Job>,
    pub applied: Vec<PendingUpdateState>,
    pub created: Vec<String>,
    /// Returned by every call while set
    pub failure: Option<P4Error>,
    /// Number of upcoming calls that fail authentication
    pub auth_failures: u32,
    /// Files whose updates the server refuses
    pub rejected_paths: Vec<PathBuf>,
    /// Reason given for refusing every new changelist
    pub changelist_refusal: Option<String>,
    pub next_changelist: i64,
}

/// Scriptable in-memory server that counts its calls.
#[derive(Debug, Default)]
pub(crate) struct FakeServer {
    calls: AtomicUsize,
    pub state: Mutex<FakeState>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        let server = FakeServer::default();
        server.state.lock().next_changelist = 100;
        Arc::new(server)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn call(&self) -> P4Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.auth_failures > 0 {
            state.auth_failures -= 1;
            return Err(P4Error::Authentication {
                server: "fake".to_string(),
                message: "password invalid".to_string(),
            });
        }
        match &state.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

impl ServerExec for FakeServer {
    fn workspace_roots(&self) -> P4Result<Vec<PathBuf>> {
        self.call()?;
        Ok(self.state.lock().roots.clone())
    }

    fn opened_files(&self) -> P4Result<Vec<ServerOpenedFile>> {
        self.call()?;
        Ok(self.state.lock().opened.clone())
    }

    fn pending_changelists(&self) -> P4Result<Vec<ChangelistState>> {
        self.call()?;
        Ok(self.state.lock().changelists.clone())
    }

    fn job_status_values(&self) -> P4Result<Vec<String>> {
        self.call()?;
        Ok(self.state.lock().job_status_values.clone())
    }

    fn jobs(&self, ids: &[String]) -> P4Result<Vec<Job>> {
        self.call()?;
        Ok(self
            .state
            .lock()
            .jobs
            .iter()
            .filter(|j| ids.contains(&j.id))
            .cloned()
            .collect())
    }

    fn file_status(&self, path: &Path) -> P4Result<Option<FileStatus>> {
        self.call()?;
        let state = self.state.lock();
        Ok(Some(FileStatus {
            local_path: path.to_path_buf(),
            depot_path: format!("//depot{}", path.display()),
            head_revision: Some(3),
            have_revision: Some(3),
            action: state
                .opened
                .iter()
                .find(|f| f.local_path == path)
                .map(|f| f.action),
        }))
    }

    fn annotations(&self, _path: &Path) -> P4Result<Vec<AnnotatedLine>> {
        self.call()?;
        Ok(vec![AnnotatedLine {
            revision: 1,
            changelist: ChangelistId::new(7),
            author: "jdoe".to_string(),
            line: "fn main() {}".to_string(),
        }])
    }

    fn revision_history(&self, _path: &Path) -> P4Result<Vec<FileRevision>> {
        self.call()?;
        Ok((1..=3)
            .map(|revision| FileRevision {
                revision,
                changelist: ChangelistId::new(i64::from(revision) * 10),
                author: "jdoe".to_string(),
                date: Utc
                    .with_ymd_and_hms(2024, 1, revision, 12, 0, 0)
                    .single()
                    .unwrap_or_default(),
                description: format!("revision {revision}"),
            })
            .collect())
    }

    fn create_changelist(&self, description: &str) -> P4Result<ChangelistId> {
        self.call()?;
        let mut state = self.state.lock();
        if let Some(reason) = &state.changelist_refusal {
            return Err(P4Error::Rejected(reason.clone()));
        }
        let id = ChangelistId::new(state.next_changelist);
        state.next_changelist += 1;
        state.created.push(description.to_string());
        state.changelists.push(ChangelistState::new(id, description));
        Ok(id)
    }

    fn apply(&self, update: &PendingUpdateState) -> P4Result<()> {
        self.call()?;
        let mut state = self.state.lock();
        if let Some(file) = update.file() {
            if state.rejected_paths.iter().any(|p| p == file.local_path()) {
                return Err(P4Error::Rejected(format!(
                    "{} - file(s) not on client",
                    file.local_path().display()
                )));
            }
            let action = match update.action() {
                UpdateAction::AddEditFile => FileAction::Add,
                UpdateAction::DeleteFile => FileAction::Delete,
                UpdateAction::IntegrateFile => FileAction::Integrate,
                _ => FileAction::Edit,
            };
            state.opened.retain(|f| f.local_path != file.local_path());
            state.opened.push(ServerOpenedFile {
                local_path: file.local_path().to_path_buf(),
                depot_path: None,
                action,
                changelist: update.changelist(),
            });
        }
        state.applied.push(update.clone());
        Ok(())
    }
}

/// Connector that always hands out the same fake server.
#[derive(Debug)]
pub(crate) struct FakeConnector {
    pub server: Arc<FakeServer>,
    pub connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(server: Arc<FakeServer>) -> Arc<Self> {
        Arc::new(FakeConnector {
            server,
            connects: AtomicUsize::new(0),
        })
    }
}

impl Connector for FakeConnector {
    fn connect(&self, _config: &ClientConfig) -> P4Result<Arc<dyn ServerExec>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.server.clone())
    }
}

/// A valid client config rooted at `root`.
pub(crate) fn client_config(root: &str, client: &str) -> Arc<ClientConfig> {
    client_config_as(root, client, "jdoe")
}

pub(crate) fn client_config_as(root: &str, client: &str, user: &str) -> Arc<ClientConfig> {
    use crate::parts::{DataPart, MergedDataPart, PartFields, PartSource};
    use crate::project::Project;
    use crate::server::ServerConfig;

    let part = DataPart::new(
        PartSource::Manual("fake".to_string()),
        PartFields {
            port: Some("ssl:perforce:1666".to_string()),
            user: Some(user.to_string()),
            client: Some(client.to_string()),
            ..Default::default()
        },
    )
    .with_root(root);
    let merged = MergedDataPart::merge(Path::new(root), [&part]);
    let server = Arc::new(ServerConfig::create_from(&merged).expect("valid server"));
    let project = Project::new(root);
    Arc::new(
        ClientConfig::create_from(&project, server, &merged, vec![PathBuf::from(root)])
            .expect("valid client"),
    )
}
