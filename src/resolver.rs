//! Resolution of a config part tree into a directory → client map.
//!
//! [`resolve`] is a pure function of the part tree and the project (plus an
//! optional previous result whose instances are reused). [`ProjectConfigStack`]
//! owns the parts of one project and publishes each result as an immutable
//! snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cancel::CancelToken;
use crate::client::{ClientConfig, ClientConfigSetup};
use crate::error::P4Result;
use crate::parts::{
    CompositePart, ConfigPart, ConfigProblem, DataPart, MergedDataPart, PartSource,
};
use crate::project::Project;
use crate::server::ServerConfig;

/// The immutable outcome of one resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    directories: BTreeMap<PathBuf, Arc<ClientConfig>>,
    setups: Vec<ClientConfigSetup>,
    problems: Vec<ConfigProblem>,
}

impl ResolvedConfig {
    /// Build a snapshot from an explicit directory map.
    pub fn from_directories(directories: BTreeMap<PathBuf, Arc<ClientConfig>>) -> Self {
        ResolvedConfig {
            directories,
            ..Default::default()
        }
    }

    /// The client governing `file`: the nearest enclosing mapped directory.
    pub fn client_config_for(&self, file: &Path) -> Option<&Arc<ClientConfig>> {
        file.ancestors().find_map(|dir| self.directories.get(dir))
    }

    pub fn directories(&self) -> &BTreeMap<PathBuf, Arc<ClientConfig>> {
        &self.directories
    }

    /// Distinct client configs, by instance.
    pub fn client_configs(&self) -> Vec<Arc<ClientConfig>> {
        let mut out: Vec<Arc<ClientConfig>> = Vec::new();
        for config in self.directories.values() {
            if !out.iter().any(|c| Arc::ptr_eq(c, config)) {
                out.push(config.clone());
            }
        }
        out
    }

    /// Distinct server configs, by instance.
    pub fn server_configs(&self) -> Vec<Arc<ServerConfig>> {
        let mut out: Vec<Arc<ServerConfig>> = Vec::new();
        for config in self.directories.values() {
            let server = config.server_config();
            if !out.iter().any(|s| Arc::ptr_eq(s, server)) {
                out.push(server.clone());
            }
        }
        out
    }

    /// One setup per attempted client/server pair, valid or not.
    pub fn setups(&self) -> &[ClientConfigSetup] {
        &self.setups
    }

    pub fn problems(&self) -> &[ConfigProblem] {
        &self.problems
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }
}

/// Resolve a part tree from scratch.
pub fn resolve(root: &ConfigPart, project: &Project) -> ResolvedConfig {
    let never = CancelToken::new();
    match resolve_with(root, project, None, &never) {
        Ok(resolved) => resolved,
        // Only cancellation can fail, and this token is never cancelled.
        Err(_) => ResolvedConfig::default(),
    }
}

/// Directories that resolved to the same server identity and client name.
struct SetupBuilder {
    server: Option<Arc<ServerConfig>>,
    port: Option<String>,
    client_name: Option<String>,
    merged: MergedDataPart,
    roots: BTreeSet<PathBuf>,
    problems: Vec<ConfigProblem>,
}

impl SetupBuilder {
    fn matches(&self, server: &Option<Arc<ServerConfig>>, merged: &MergedDataPart) -> bool {
        let same_server = match (&self.server, server) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => self.port == merged.fields().port,
            _ => false,
        };
        same_server && self.client_name == merged.fields().client
    }

    fn is_valid(&self) -> bool {
        self.server.is_some() && self.problems.is_empty()
    }
}

fn push_unique(problems: &mut Vec<ConfigProblem>, new: impl IntoIterator<Item = ConfigProblem>) {
    for problem in new {
        if !problems.contains(&problem) {
            problems.push(problem);
        }
    }
}

/// Number of levels `dir` sits above `base`, if it is `base` or an ancestor.
fn levels_above(base: &Path, dir: &Path) -> Option<usize> {
    base.ancestors().position(|ancestor| ancestor == dir)
}

/// Resolve a part tree, reusing server and client instances from `previous`
/// where they are unchanged.
///
/// Cancellation is checked between phases; a cancelled run returns
/// `Err(P4Error::Cancelled)` and produces nothing.
pub fn resolve_with(
    root: &ConfigPart,
    project: &Project,
    previous: Option<&ResolvedConfig>,
    cancel: &CancelToken,
) -> P4Result<ResolvedConfig> {
    let project_root = project.root();
    let flat = root.flatten();
    let mut problems = flat.problems.clone();

    // Bucket by scope, keeping priority order inside each bucket.
    let mut buckets: BTreeMap<PathBuf, Vec<usize>> = BTreeMap::new();
    for (index, part) in flat.data_parts.iter().enumerate() {
        let dir = part.root().unwrap_or(project_root).to_path_buf();
        log::debug!("Adding {} into {}", part.source(), dir.display());
        buckets.entry(dir).or_default().push(index);
    }

    // Narrower scopes inherit from broader ones below the project root.
    let own_parts = buckets.clone();
    for (dir, indexes) in buckets.iter_mut() {
        for ancestor in dir.ancestors().skip(1) {
            if ancestor == project_root {
                break;
            }
            if let Some(inherited) = own_parts.get(ancestor) {
                for index in inherited {
                    if !indexes.contains(index) {
                        indexes.push(*index);
                    }
                }
            }
        }
    }
    cancel.check()?;

    // Shared server instances; a previous one is reused only while unchanged.
    let previous_servers = previous.map(ResolvedConfig::server_configs).unwrap_or_default();
    let mut servers: HashMap<String, Arc<ServerConfig>> = HashMap::new();

    let mut builders: Vec<SetupBuilder> = Vec::new();
    for (dir, indexes) in &buckets {
        let parts: Vec<&DataPart> = indexes.iter().map(|i| flat.data_parts[*i]).collect();
        if parts.iter().all(|p| *p.source() == PartSource::Default) {
            log::debug!("Skipping {}: only implicit defaults", dir.display());
            continue;
        }
        let merged = MergedDataPart::merge(dir, parts);

        let server_problems = ServerConfig::problems_for(&merged);
        let mut part_problems = merged.problems().to_vec();
        push_unique(&mut part_problems, server_problems.iter().cloned());
        push_unique(&mut part_problems, ClientConfig::problems_for(&merged));
        push_unique(&mut problems, part_problems.iter().cloned());

        let server = if server_problems.is_empty() {
            ServerConfig::create_from(&merged).map(|created| {
                servers
                    .entry(created.server_id())
                    .or_insert_with(|| {
                        previous_servers
                            .iter()
                            .find(|old| ***old == created)
                            .cloned()
                            .unwrap_or_else(|| Arc::new(created))
                    })
                    .clone()
            })
        } else {
            None
        };

        match builders.iter_mut().find(|b| b.matches(&server, &merged)) {
            Some(builder) => {
                builder.roots.insert(dir.clone());
                push_unique(&mut builder.problems, part_problems);
            }
            None => builders.push(SetupBuilder {
                port: merged.fields().port.clone(),
                client_name: merged.fields().client.clone(),
                server,
                roots: BTreeSet::from([dir.clone()]),
                merged,
                problems: part_problems,
            }),
        }
    }
    cancel.check()?;

    let mut mapped: BTreeMap<PathBuf, usize> = BTreeMap::new();
    for (index, builder) in builders.iter().enumerate() {
        for dir in &builder.roots {
            mapped.insert(dir.clone(), index);
        }
    }
    prune_overlapping_roots(project_root, &builders, &mut mapped);

    // Materialize one client config per valid setup.
    let previous_clients = previous.map(ResolvedConfig::client_configs).unwrap_or_default();
    let mut clients: Vec<Option<Arc<ClientConfig>>> = Vec::with_capacity(builders.len());
    for (index, builder) in builders.iter().enumerate() {
        let client = match (&builder.server, builder.is_valid()) {
            (Some(server), true) => {
                let mut roots = builder.roots.clone();
                roots.extend(
                    mapped
                        .iter()
                        .filter(|(_, setup)| **setup == index)
                        .map(|(dir, _)| dir.clone()),
                );
                ClientConfig::create_from(project, server.clone(), &builder.merged, roots).map(
                    |created| {
                        previous_clients
                            .iter()
                            .find(|old| ***old == created)
                            .cloned()
                            .unwrap_or_else(|| Arc::new(created))
                    },
                )
            }
            _ => None,
        };
        clients.push(client);
    }
    cancel.check()?;

    let directories = mapped
        .into_iter()
        .filter_map(|(dir, index)| clients[index].clone().map(|client| (dir, client)))
        .collect();
    let setups = builders
        .into_iter()
        .zip(clients)
        .map(|(builder, client)| {
            ClientConfigSetup::new(client, builder.problems, builder.merged, builder.roots)
        })
        .collect();

    Ok(ResolvedConfig {
        directories,
        setups,
        problems,
    })
}

/// Keep a single setup for the project root and its surroundings.
///
/// The valid setup mapped closest above (or at) the project root wins; it
/// becomes the project root's setup and every other directory at, above or
/// below the project root is dropped. Without such a setup, directories
/// inside the project keep their own mapping.
fn prune_overlapping_roots(
    project_root: &Path,
    builders: &[SetupBuilder],
    mapped: &mut BTreeMap<PathBuf, usize>,
) {
    let best = mapped
        .iter()
        .filter(|(_, setup)| builders[**setup].is_valid())
        .filter_map(|(dir, setup)| levels_above(project_root, dir).map(|d| (d, dir, *setup)))
        .min_by_key(|(distance, _, _)| *distance);

    let Some((_, best_dir, best_setup)) = best else {
        log::debug!("No valid root configs found at or above the project root.");
        return;
    };
    log::debug!("Best root config: {}", best_dir.display());

    mapped.retain(|dir, _| {
        let overlaps = dir.starts_with(project_root) || project_root.starts_with(dir);
        if overlaps {
            log::debug!("Dropping overlapping config directory {}", dir.display());
        }
        !overlaps
    });
    mapped.insert(project_root.to_path_buf(), best_setup);
    log::debug!("Final pruned config directories: {:?}", mapped.keys());
}

/// The configuration of one project, re-resolved on demand.
///
/// Readers see the last published snapshot and never wait for a resolution
/// in progress.
pub struct ProjectConfigStack {
    project: Project,
    parts: Mutex<ConfigPart>,
    snapshot: RwLock<Arc<ResolvedConfig>>,
}

impl ProjectConfigStack {
    /// User parts come first, in priority order; the defaults go last.
    pub fn new(project: Project, user_parts: Vec<ConfigPart>) -> Self {
        let parts = Self::with_defaults(user_parts);
        let resolved = resolve(&parts, &project);
        ProjectConfigStack {
            project,
            parts: Mutex::new(parts),
            snapshot: RwLock::new(Arc::new(resolved)),
        }
    }

    fn with_defaults(mut user_parts: Vec<ConfigPart>) -> ConfigPart {
        user_parts.push(DataPart::defaults().into());
        ConfigPart::Composite(CompositePart::new("project configuration", user_parts))
    }

    /// Re-resolve the current parts.
    pub fn refresh(&self) {
        // A fresh token is never cancelled.
        let _ = self.refresh_with(&CancelToken::new());
    }

    /// Re-resolve; on cancellation the previous snapshot stays published.
    pub fn refresh_with(&self, cancel: &CancelToken) -> P4Result<()> {
        let parts = self.parts.lock();
        self.publish(&parts, cancel)
    }

    /// Replace the user parts and re-resolve.
    pub fn set_parts(&self, user_parts: Vec<ConfigPart>, cancel: &CancelToken) -> P4Result<()> {
        let mut parts = self.parts.lock();
        let replacement = Self::with_defaults(user_parts);
        self.publish(&replacement, cancel)?;
        *parts = replacement;
        Ok(())
    }

    fn publish(&self, parts: &ConfigPart, cancel: &CancelToken) -> P4Result<()> {
        let previous = self.snapshot();
        let resolved = resolve_with(parts, &self.project, Some(previous.as_ref()), cancel)?;
        log::debug!(
            "Resolved {} config directories with {} problems",
            resolved.directories.len(),
            resolved.problems.len()
        );
        *self.snapshot.write() = Arc::new(resolved);
        Ok(())
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<ResolvedConfig> {
        self.snapshot.read().clone()
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn client_config_for(&self, file: &Path) -> Option<Arc<ClientConfig>> {
        self.snapshot().client_config_for(file).cloned()
    }

    pub fn client_configs(&self) -> Vec<Arc<ClientConfig>> {
        self.snapshot().client_configs()
    }

    pub fn server_configs(&self) -> Vec<Arc<ServerConfig>> {
        self.snapshot().server_configs()
    }

    pub fn config_problems(&self) -> Vec<ConfigProblem> {
        self.snapshot().problems().to_vec()
    }

    pub fn client_config_setups(&self) -> Vec<ClientConfigSetup> {
        self.snapshot().setups().to_vec()
    }
}
