use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::{CachedState, ClientCacheManager};
use crate::client::ClientServerId;
use crate::config::ConfigManager;

/// JSON persistence for client caches, one file per client workspace.
///
/// Files are written to a temporary sibling and renamed into place so a
/// crash never leaves a half-written cache behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CacheStore { dir: dir.into() }
    }

    /// Store under the project's storage directory.
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(ConfigManager::cache_dir(project_root))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &ClientServerId) -> PathBuf {
        self.dir.join(format!("{}.json", id.storage_name()))
    }

    /// Load the persisted cache of `id`; `None` when nothing was saved yet.
    pub fn load(&self, id: &ClientServerId) -> Result<Option<CachedState>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    /// Cache manager for `id`, starting empty when nothing was saved or the
    /// saved file is unreadable.
    pub fn open(&self, id: &ClientServerId) -> ClientCacheManager {
        match self.load(id) {
            Ok(Some(state)) => {
                log::debug!(
                    "Loaded cache for {} with {} pending update(s)",
                    id,
                    state.pending.len()
                );
                ClientCacheManager::from_state(id.clone(), state)
            }
            Ok(None) => ClientCacheManager::new(id.clone()),
            Err(e) => {
                log::warn!("Ignoring unreadable cache for {}: {:#}", id, e);
                ClientCacheManager::new(id.clone())
            }
        }
    }

    pub fn save(&self, cache: &ClientCacheManager) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory: {}", self.dir.display()))?;

        let path = self.path_for(cache.id());
        let content =
            serde_json::to_string_pretty(cache.state()).context("Failed to serialize cache")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write cache: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace cache: {}", path.display()))?;
        Ok(())
    }

    fn read(path: &Path) -> Result<CachedState> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse cache: {}", path.display()))
    }
}
