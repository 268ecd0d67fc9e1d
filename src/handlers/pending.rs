//! Pending update queue handlers
//!
//! These work on the persisted caches only and never contact a server.

use anyhow::{anyhow, Result};
use colored::Colorize;
use std::path::Path;

use super::load_project;
use crate::cache::{CacheStore, ClientCacheManager, UpdateTarget};
use crate::changelist::ChangelistId;

/// List the queued updates of every resolved client.
pub fn handle_pending(project: Option<&Path>) -> Result<()> {
    let (stack, _) = load_project(project)?;
    let store = CacheStore::for_project(stack.project().root());
    let configs = stack.client_configs();

    if configs.is_empty() {
        println!("{}", "No client workspace configured.".yellow());
        return Ok(());
    }

    for config in configs {
        let cache = store.open(&config.client_server_id());
        let pending = cache.pending_updates();
        println!(
            "\n{} {}",
            config.to_string().bold(),
            format!("({} pending)", pending.len()).dimmed()
        );
        for update in pending.iter() {
            let id = update
                .file()
                .map(|m| m.id().to_string())
                .unwrap_or_else(|| update.changelist().to_string());
            println!(
                "  {} {} {} {}",
                update.created().format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                update.action().as_str().cyan(),
                update.target(),
                format!("[{id}]").dimmed()
            );
        }
    }
    Ok(())
}

/// Drop one queued update, named by file mapping id or changelist number.
pub fn handle_discard(target: &str, project: Option<&Path>) -> Result<()> {
    let (stack, _) = load_project(project)?;
    let store = CacheStore::for_project(stack.project().root());

    for config in stack.client_configs() {
        let mut cache = store.open(&config.client_server_id());
        let Some(target) = find_target(&cache, target) else {
            continue;
        };
        if let Some(update) = cache.discard_pending(&target) {
            store.save(&cache)?;
            println!("{} {}", "Discarded".green(), update);
            return Ok(());
        }
    }
    Err(anyhow!("No pending update matches '{target}'"))
}

fn find_target(cache: &ClientCacheManager, target: &str) -> Option<UpdateTarget> {
    if let Ok(number) = target.parse::<i64>() {
        return Some(UpdateTarget::Changelist(ChangelistId::new(number)));
    }
    cache
        .file_mapping_by_id(target)
        .map(|mapping| UpdateTarget::File(mapping.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientServerId;

    #[test]
    fn test_find_target_by_number_or_mapping_id() {
        let mut cache = ClientCacheManager::new(ClientServerId::new("server", "ws"));
        let update = cache
            .edit_file(Path::new("/p/a.txt"), ChangelistId::DEFAULT)
            .unwrap();
        let mapping_id = update.file().unwrap().id().to_string();

        assert_eq!(
            find_target(&cache, "1201"),
            Some(UpdateTarget::Changelist(ChangelistId::new(1201)))
        );
        assert_eq!(find_target(&cache, &mapping_id), Some(update.target().clone()));
        assert_eq!(find_target(&cache, "no-such-id"), None);
    }
}
