use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::parts::{ConfigProblem, MergedDataPart};
use crate::project::Project;
use crate::server::ServerConfig;

/// Key of a connection: one client workspace on one server identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientServerId {
    server_id: String,
    client_name: String,
}

impl ClientServerId {
    pub fn new(server_id: impl Into<String>, client_name: impl Into<String>) -> Self {
        ClientServerId {
            server_id: server_id.into(),
            client_name: client_name.into(),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// File-system safe name used for the persisted cache.
    pub fn storage_name(&self) -> String {
        let raw = format!("{}__{}", self.client_name, self.server_id);
        raw.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for ClientServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.server_id, self.client_name)
    }
}

/// A validated binding of a client workspace to a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    project: Project,
    server: Arc<ServerConfig>,
    client_name: String,
    roots: BTreeSet<PathBuf>,
    charset: Option<String>,
    client_hostname: Option<String>,
}

impl ClientConfig {
    /// Problems that block a client config beyond those of the server.
    pub fn problems_for(part: &MergedDataPart) -> Vec<ConfigProblem> {
        let mut problems = Vec::new();
        match part.fields().client.as_deref() {
            None | Some("") => problems.push(part.problem("client name (P4CLIENT) is not set")),
            Some(name) if name.chars().any(char::is_whitespace) => problems.push(
                part.problem(format!("client name '{name}' contains whitespace")),
            ),
            Some(_) => {}
        }
        problems
    }

    /// Build a config; `None` if the part has problems of its own.
    pub fn create_from(
        project: &Project,
        server: Arc<ServerConfig>,
        part: &MergedDataPart,
        roots: impl IntoIterator<Item = PathBuf>,
    ) -> Option<ClientConfig> {
        if !part.problems().is_empty() || !Self::problems_for(part).is_empty() {
            return None;
        }
        Some(ClientConfig {
            project: project.clone(),
            server,
            client_name: part.fields().client.clone()?,
            roots: roots.into_iter().collect(),
            charset: part.fields().charset.clone(),
            client_hostname: part.fields().client_hostname.clone(),
        })
    }

    pub fn client_server_id(&self) -> ClientServerId {
        ClientServerId::new(self.server.server_id(), self.client_name.clone())
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn server_config(&self) -> &Arc<ServerConfig> {
        &self.server
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Directories whose configuration resolved to this client.
    pub fn roots(&self) -> &BTreeSet<PathBuf> {
        &self.roots
    }

    pub fn project_root(&self) -> &Path {
        self.project.root()
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn client_hostname(&self) -> Option<&str> {
        self.client_hostname.as_deref()
    }
}

impl fmt::Display for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.client_name, self.server)
    }
}

/// Diagnostic record of one attempted client configuration.
///
/// Exists whether or not the configuration resolved; never used to run
/// commands.
#[derive(Debug, Clone)]
pub struct ClientConfigSetup {
    client_config: Option<Arc<ClientConfig>>,
    problems: Vec<ConfigProblem>,
    source: MergedDataPart,
    roots: BTreeSet<PathBuf>,
}

impl ClientConfigSetup {
    pub(crate) fn new(
        client_config: Option<Arc<ClientConfig>>,
        problems: Vec<ConfigProblem>,
        source: MergedDataPart,
        roots: BTreeSet<PathBuf>,
    ) -> Self {
        ClientConfigSetup {
            client_config,
            problems,
            source,
            roots,
        }
    }

    pub fn client_config(&self) -> Option<&Arc<ClientConfig>> {
        self.client_config.as_ref()
    }

    pub fn problems(&self) -> &[ConfigProblem] {
        &self.problems
    }

    pub fn source(&self) -> &MergedDataPart {
        &self.source
    }

    pub fn roots(&self) -> &BTreeSet<PathBuf> {
        &self.roots
    }

    pub fn is_valid(&self) -> bool {
        self.client_config.is_some()
    }
}
