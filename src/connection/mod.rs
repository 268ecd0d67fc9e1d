//! Online/offline connection to one client workspace.
//!
//! A [`ServerConnection`] owns the client's cache and is the only way to
//! touch it: `query` for live calls, `cache_query` for reads that prefer
//! fresh data but never fail for being offline, and `queue_updates` for
//! mutations that reach the server later through `reconcile`.

pub mod auth;
pub mod exec;
#[cfg(test)]
pub(crate) mod fake;
pub mod manager;

pub use auth::{AuthDecision, AuthFailureHandler, AuthPromptGuard, WorkOfflineOnAuthFailure};
pub use exec::{AnnotatedLine, Connector, FileRevision, FileStatus, ServerExec};
pub use manager::ConnectionManager;

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::{
    CacheStore, ClientCacheManager, PendingUpdateState, RefreshQuery, RefreshResult, UpdateTarget,
};
use crate::cancel::CancelToken;
use crate::changelist::ChangelistId;
use crate::client::{ClientConfig, ClientServerId};
use crate::error::{P4Error, P4Result};

/// Outcome of sending the pending queue to the server.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub applied: Vec<PendingUpdateState>,
    /// Updates the server refused, with its reason; they left the queue
    pub rejected: Vec<(PendingUpdateState, String)>,
    /// Local changelist ids and the server ids they became
    pub confirmed: Vec<(ChangelistId, ChangelistId)>,
    /// Local changelists the server refused to create, with its reason;
    /// their updates moved to the default changelist
    pub abandoned: Vec<(ChangelistId, String)>,
    /// Updates still queued when reconciliation stopped
    pub remaining: usize,
}

/// Connection to one client workspace on one server.
pub struct ServerConnection {
    config: Arc<ClientConfig>,
    exec: Arc<dyn ServerExec>,
    online: AtomicBool,
    /// Serializes cache writers: refreshes, queued updates, reconciliation
    writer: Mutex<()>,
    cache: RwLock<ClientCacheManager>,
    store: Option<CacheStore>,
    auth_handler: Arc<dyn AuthFailureHandler>,
    max_auth_retries: u32,
}

impl ServerConnection {
    pub fn new(
        config: Arc<ClientConfig>,
        exec: Arc<dyn ServerExec>,
        cache: ClientCacheManager,
        online: bool,
    ) -> Self {
        ServerConnection {
            config,
            exec,
            online: AtomicBool::new(online),
            writer: Mutex::new(()),
            cache: RwLock::new(cache),
            store: None,
            auth_handler: Arc::new(WorkOfflineOnAuthFailure),
            max_auth_retries: 3,
        }
    }

    /// Persist the cache to `store` after every change.
    pub fn with_store(mut self, store: CacheStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_auth_handler(
        mut self,
        handler: Arc<dyn AuthFailureHandler>,
        max_retries: u32,
    ) -> Self {
        self.auth_handler = handler;
        self.max_auth_retries = max_retries;
        self
    }

    pub fn id(&self) -> ClientServerId {
        self.config.client_server_id()
    }

    pub fn client_config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    pub fn is_working_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn is_working_offline(&self) -> bool {
        !self.is_working_online()
    }

    pub fn work_online(&self) {
        if !self.online.swap(true, Ordering::SeqCst) {
            log::info!("{}: working online", self.config);
        }
    }

    pub fn work_offline(&self) {
        if self.online.swap(false, Ordering::SeqCst) {
            log::info!("{}: working offline", self.config);
        }
    }

    /// Run a live server call.
    ///
    /// Fails with [`P4Error::Disconnected`] while offline. Lost connectivity
    /// switches the connection offline; authentication failures go through
    /// the auth handler, at most one prompt per server and user at a time.
    pub fn query<T>(
        &self,
        cancel: &CancelToken,
        op: impl Fn(&dyn ServerExec) -> P4Result<T>,
    ) -> P4Result<T> {
        let mut attempts = 0;
        loop {
            if self.is_working_offline() {
                return Err(P4Error::Disconnected);
            }
            cancel.check()?;
            let error = match op(self.exec.as_ref()) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if error.is_connectivity() {
                log::warn!("{}: {}", self.config, error);
                self.work_offline();
                return Err(error);
            }
            if !error.is_authentication() {
                return Err(error);
            }

            let server = self.config.server_config();
            let Some(_guard) = AuthPromptGuard::try_acquire(&server.login_key()) else {
                log::info!(
                    "{}: authentication already being handled, dropping: {}",
                    server,
                    error
                );
                return Err(error);
            };
            match self.auth_handler.on_auth_failure(server, &error) {
                AuthDecision::Retry if attempts < self.max_auth_retries => {
                    attempts += 1;
                    log::debug!("{}: retrying after authentication failure ({attempts})", server);
                }
                AuthDecision::Retry | AuthDecision::Reconfigure => return Err(error),
                AuthDecision::WorkOffline => {
                    self.work_offline();
                    return Err(error);
                }
            }
        }
    }

    /// Replace one cached collection with the server's current answer.
    ///
    /// The cache is left untouched when the call fails or is cancelled.
    pub fn refresh(&self, query: &RefreshQuery, cancel: &CancelToken) -> P4Result<()> {
        let _writer = self.writer.lock();
        let result = self.query(cancel, |exec| fetch(exec, query))?;
        cancel.check()?;
        let mut cache = self.cache.write();
        cache.apply_refresh(result);
        log::debug!("{}: refreshed {}", self.config, query.name());
        self.persist(&cache);
        Ok(())
    }

    /// Read the cache, refreshing the given collections first while online.
    ///
    /// Never fails: a failed refresh leaves the last known data in place.
    pub fn cache_query<T>(
        &self,
        refresh: &[RefreshQuery],
        cancel: &CancelToken,
        op: impl FnOnce(&ClientCacheManager) -> T,
    ) -> T {
        for query in refresh {
            if self.is_working_offline() {
                break;
            }
            if let Err(e) = self.refresh(query, cancel) {
                log::debug!("{}: using cached {}: {}", self.config, query.name(), e);
                break;
            }
        }
        op(&self.cache.read())
    }

    /// Apply local mutations to the cache and queue them for the server.
    pub fn queue_updates<T>(&self, builder: impl FnOnce(&mut ClientCacheManager) -> T) -> T {
        let _writer = self.writer.lock();
        let mut cache = self.cache.write();
        let revision = cache.revision();
        let result = builder(&mut cache);
        let changed = cache.revision() != revision;
        if changed {
            self.persist(&cache);
        }
        result
    }

    /// Drop a queued update without sending it.
    pub fn discard_pending(&self, target: &UpdateTarget) -> Option<PendingUpdateState> {
        self.queue_updates(|cache| cache.discard_pending(target))
    }

    /// Send the pending queue in order.
    ///
    /// Local changelists are created on the server first and their ids
    /// remapped everywhere. Rejected updates are dropped and reported; lost
    /// connectivity stops early and keeps the rest queued.
    pub fn reconcile(&self, cancel: &CancelToken) -> P4Result<ReconcileReport> {
        if self.is_working_offline() {
            return Err(P4Error::Disconnected);
        }
        let _writer = self.writer.lock();
        let mut report = ReconcileReport::default();
        let outcome = self.send_pending(cancel, &mut report);
        let cache = self.cache.read();
        report.remaining = cache.pending_updates().len();
        self.persist(&cache);
        log::info!(
            "{}: reconciled {} update(s), {} rejected, {} changelist(s) refused, {} remaining",
            self.config,
            report.applied.len(),
            report.rejected.len(),
            report.abandoned.len(),
            report.remaining
        );
        match outcome {
            Ok(()) => Ok(report),
            Err(e) if e.is_connectivity() => Ok(report),
            Err(e) => Err(e),
        }
    }

    fn send_pending(&self, cancel: &CancelToken, report: &mut ReconcileReport) -> P4Result<()> {
        loop {
            let Some(update) = self.cache.read().pending_updates().first().cloned() else {
                return Ok(());
            };
            cancel.check()?;

            let changelist = update.changelist();
            if changelist.is_local() {
                let description = self
                    .cache
                    .read()
                    .local_changelist(changelist)
                    .map(|c| c.description.clone())
                    .unwrap_or_else(|| format!("changelist {changelist}"));
                match self.query(cancel, |exec| exec.create_changelist(&description)) {
                    Ok(confirmed) => {
                        self.cache.write().confirm_changelist(changelist, confirmed);
                        report.confirmed.push((changelist, confirmed));
                    }
                    Err(P4Error::Rejected(reason)) => {
                        log::warn!(
                            "{}: server refused changelist '{}': {}",
                            self.config,
                            description,
                            reason
                        );
                        self.cache.write().delete_changelist(changelist);
                        report.abandoned.push((changelist, reason));
                    }
                    Err(e) => return Err(e),
                }
                continue;
            }

            match self.query(cancel, |exec| exec.apply(&update)) {
                Ok(()) => {
                    self.cache.write().mark_applied(&update);
                    report.applied.push(update);
                }
                Err(P4Error::Rejected(reason)) => {
                    log::warn!("{}: server rejected {}: {}", self.config, update, reason);
                    self.cache.write().discard_pending(update.target());
                    report.rejected.push((update, reason));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Current cache contents without any refresh.
    pub fn cached<T>(&self, op: impl FnOnce(&ClientCacheManager) -> T) -> T {
        op(&self.cache.read())
    }

    fn persist(&self, cache: &ClientCacheManager) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(cache) {
                log::error!("{}: failed to save cache: {:#}", self.config, e);
            }
        }
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("client", &self.config.client_server_id())
            .field("online", &self.is_working_online())
            .finish()
    }
}

fn fetch(exec: &dyn ServerExec, query: &RefreshQuery) -> P4Result<RefreshResult> {
    Ok(match query {
        RefreshQuery::WorkspaceRoots => RefreshResult::WorkspaceRoots(exec.workspace_roots()?),
        RefreshQuery::FileActions => RefreshResult::FileActions(exec.opened_files()?),
        RefreshQuery::Changelists => RefreshResult::Changelists(exec.pending_changelists()?),
        RefreshQuery::JobStatusValues => {
            RefreshResult::JobStatusValues(exec.job_status_values()?)
        }
        RefreshQuery::Jobs(ids) => RefreshResult::Jobs(exec.jobs(ids)?),
    })
}

#[cfg(test)]
mod tests {
    use super::fake::{client_config, client_config_as, FakeConnector, FakeServer};
    use super::*;
    use crate::cache::{ChangelistState, FileAction, ServerOpenedFile, UpdateAction};
    use crate::preferences::UserPreferences;
    use crate::server::ServerConfig;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicU32;

    fn connection(server: &Arc<FakeServer>) -> ServerConnection {
        ServerConnection::new(
            client_config("/p", "ws"),
            server.clone(),
            ClientCacheManager::new(ClientServerId::new("fake", "ws")),
            true,
        )
    }

    fn opened(path: &str, changelist: i64) -> ServerOpenedFile {
        ServerOpenedFile {
            local_path: PathBuf::from(path),
            depot_path: None,
            action: FileAction::Edit,
            changelist: ChangelistId::new(changelist),
        }
    }

    struct CountingHandler {
        decision: AuthDecision,
        prompts: AtomicU32,
    }

    impl AuthFailureHandler for CountingHandler {
        fn on_auth_failure(&self, _server: &ServerConfig, _error: &P4Error) -> AuthDecision {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            self.decision
        }
    }

    #[test]
    fn test_offline_cache_query_makes_no_call() {
        let server = FakeServer::new();
        server.state.lock().opened = vec![opened("/p/a.txt", 0)];
        let connection = connection(&server);
        let cancel = CancelToken::new();

        let online =
            connection.cache_query(&[RefreshQuery::FileActions], &cancel, |c| c.open_files());
        assert_eq!(online.len(), 1);
        let calls = server.calls();

        connection.work_offline();
        server.state.lock().opened.clear();
        let offline =
            connection.cache_query(&[RefreshQuery::FileActions], &cancel, |c| c.open_files());

        assert_eq!(offline, online);
        assert_eq!(server.calls(), calls);
    }

    #[test]
    fn test_query_while_offline_is_disconnected() {
        let server = FakeServer::new();
        let connection = connection(&server);
        connection.work_offline();

        let result = connection.query(&CancelToken::new(), |exec| exec.workspace_roots());
        assert_eq!(result, Err(P4Error::Disconnected));
        assert_eq!(server.calls(), 0);
    }

    #[test]
    fn test_connectivity_failure_goes_offline_and_keeps_cache() {
        let server = FakeServer::new();
        server.state.lock().opened = vec![opened("/p/a.txt", 0)];
        let connection = connection(&server);
        let cancel = CancelToken::new();
        connection.refresh(&RefreshQuery::FileActions, &cancel).unwrap();

        server.state.lock().failure = Some(P4Error::Connection("connection reset".to_string()));
        let files =
            connection.cache_query(&[RefreshQuery::FileActions], &cancel, |c| c.open_files());

        assert_eq!(files.len(), 1);
        assert!(connection.is_working_offline());
    }

    #[test]
    fn test_cancelled_refresh_leaves_cache_untouched() {
        let server = FakeServer::new();
        server.state.lock().roots = vec![PathBuf::from("/p")];
        let connection = connection(&server);
        let cancel = CancelToken::new();
        cancel.cancel();

        assert_eq!(
            connection.refresh(&RefreshQuery::WorkspaceRoots, &cancel),
            Err(P4Error::Cancelled)
        );
        assert!(connection.cached(|c| c.workspace_roots().is_empty()));
        assert!(connection.cached(|c| c.last_refreshed().is_none()));
    }

    #[test]
    fn test_auth_retry_reruns_query() {
        let server = FakeServer::new();
        server.state.lock().auth_failures = 1;
        let handler = Arc::new(CountingHandler {
            decision: AuthDecision::Retry,
            prompts: AtomicU32::new(0),
        });
        let connection = ServerConnection::new(
            client_config_as("/p", "ws", "retry-user"),
            server.clone(),
            ClientCacheManager::new(ClientServerId::new("fake", "ws")),
            true,
        )
        .with_auth_handler(handler.clone(), 3);

        assert!(connection.query(&CancelToken::new(), |exec| exec.workspace_roots()).is_ok());
        assert_eq!(handler.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(server.calls(), 2);
    }

    #[test]
    fn test_auth_retries_are_bounded() {
        let server = FakeServer::new();
        server.state.lock().auth_failures = 10;
        let handler = Arc::new(CountingHandler {
            decision: AuthDecision::Retry,
            prompts: AtomicU32::new(0),
        });
        let connection = ServerConnection::new(
            client_config_as("/p", "ws", "bounded-user"),
            server.clone(),
            ClientCacheManager::new(ClientServerId::new("fake", "ws")),
            true,
        )
        .with_auth_handler(handler.clone(), 2);

        let result = connection.query(&CancelToken::new(), |exec| exec.workspace_roots());
        assert!(result.unwrap_err().is_authentication());
        assert_eq!(server.calls(), 3);
        assert!(connection.is_working_online());
    }

    #[test]
    fn test_auth_failure_while_prompting_is_dropped() {
        let config = client_config_as("/p", "ws", "dedup-user");
        let server = FakeServer::new();
        server.state.lock().auth_failures = 1;
        let handler = Arc::new(CountingHandler {
            decision: AuthDecision::WorkOffline,
            prompts: AtomicU32::new(0),
        });
        let connection = ServerConnection::new(
            config.clone(),
            server.clone(),
            ClientCacheManager::new(ClientServerId::new("fake", "ws")),
            true,
        )
        .with_auth_handler(handler.clone(), 3);

        let _prompt = AuthPromptGuard::try_acquire(&config.server_config().login_key()).unwrap();
        let result = connection.query(&CancelToken::new(), |exec| exec.workspace_roots());

        assert!(result.unwrap_err().is_authentication());
        assert_eq!(handler.prompts.load(Ordering::SeqCst), 0);
        assert!(connection.is_working_online());
    }

    #[test]
    fn test_auth_work_offline_decision() {
        let server = FakeServer::new();
        server.state.lock().auth_failures = 1;
        let connection = ServerConnection::new(
            client_config_as("/p", "ws", "offline-user"),
            server.clone(),
            ClientCacheManager::new(ClientServerId::new("fake", "ws")),
            true,
        );

        assert!(connection.query(&CancelToken::new(), |exec| exec.workspace_roots()).is_err());
        assert!(connection.is_working_offline());
    }

    #[test]
    fn test_queued_updates_survive_state_transitions() {
        let server = FakeServer::new();
        let connection = connection(&server);
        connection.queue_updates(|c| c.edit_file(Path::new("/p/a.txt"), ChangelistId::DEFAULT));

        connection.work_offline();
        connection.work_online();
        connection.work_offline();

        assert_eq!(connection.cached(|c| c.pending_updates().len()), 1);
        assert_eq!(server.calls(), 0);
    }

    #[test]
    fn test_reconcile_creates_local_changelist_once() {
        let server = FakeServer::new();
        let connection = connection(&server);
        let updates = connection.queue_updates(|c| {
            c.move_files_to_changelist(
                &[PathBuf::from("/p/a.txt"), PathBuf::from("/p/b.txt")],
                "Feature",
            )
        });
        let local = updates[0].changelist();

        let report = connection.reconcile(&CancelToken::new()).unwrap();

        assert_eq!(report.confirmed, vec![(local, ChangelistId::new(100))]);
        assert_eq!(report.applied.len(), 2);
        assert_eq!(report.remaining, 0);
        assert_eq!(server.state.lock().created, vec!["Feature".to_string()]);
        assert!(server
            .state
            .lock()
            .applied
            .iter()
            .all(|u| u.changelist() == ChangelistId::new(100)));
        assert_eq!(
            connection.cached(|c| c.changelist_for("Feature")),
            Some(ChangelistId::new(100))
        );
    }

    #[test]
    fn test_reconcile_drops_rejected_updates() {
        let server = FakeServer::new();
        server.state.lock().rejected_paths = vec![PathBuf::from("/p/gone.txt")];
        let connection = connection(&server);
        connection.queue_updates(|c| {
            c.edit_file(Path::new("/p/gone.txt"), ChangelistId::DEFAULT);
            c.edit_file(Path::new("/p/a.txt"), ChangelistId::DEFAULT);
        });

        let report = connection.reconcile(&CancelToken::new()).unwrap();

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].action(), UpdateAction::EditFile);
        assert_eq!(report.remaining, 0);
    }

    #[test]
    fn test_reconcile_moves_refused_changelist_to_default() {
        let server = FakeServer::new();
        server.state.lock().changelist_refusal = Some("description too long".to_string());
        let connection = connection(&server);
        let local = connection.queue_updates(|c| {
            let moved = c.move_files_to_changelist(&[PathBuf::from("/p/a.txt")], "Feature");
            c.edit_file(Path::new("/p/b.txt"), ChangelistId::DEFAULT);
            moved[0].changelist()
        });

        let report = connection.reconcile(&CancelToken::new()).unwrap();

        assert_eq!(
            report.abandoned,
            vec![(local, "description too long".to_string())]
        );
        assert!(report.confirmed.is_empty());
        assert_eq!(report.applied.len(), 2);
        assert!(report
            .applied
            .iter()
            .all(|u| u.changelist() == ChangelistId::DEFAULT));
        assert_eq!(report.remaining, 0);
        assert_eq!(connection.cached(|c| c.changelist_for("Feature")), None);
    }

    #[test]
    fn test_reconcile_stops_when_connection_drops() {
        let server = FakeServer::new();
        server.state.lock().failure = Some(P4Error::Connection("timed out".to_string()));
        let connection = connection(&server);
        connection.queue_updates(|c| c.edit_file(Path::new("/p/a.txt"), ChangelistId::DEFAULT));

        let report = connection.reconcile(&CancelToken::new()).unwrap();

        assert_eq!(report.remaining, 1);
        assert!(connection.is_working_offline());
        assert_eq!(
            connection.reconcile(&CancelToken::new()).unwrap_err(),
            P4Error::Disconnected
        );
    }

    #[test]
    fn test_manager_shares_connections() {
        let server = FakeServer::new();
        server.state.lock().changelists = vec![ChangelistState::new(ChangelistId::new(5), "fix")];
        let connector = FakeConnector::new(server);
        let manager = ConnectionManager::new(connector.clone(), UserPreferences::default())
            .without_persistence();

        let first = manager.connection_for(&client_config("/p", "ws")).unwrap();
        let second = manager.connection_for(&client_config("/p", "ws")).unwrap();
        let other = manager.connection_for(&client_config("/p", "other")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(manager.connections().len(), 2);
    }

    #[test]
    fn test_manager_honours_auto_offline() {
        let connector = FakeConnector::new(FakeServer::new());
        let preferences = UserPreferences {
            auto_offline: true,
            ..Default::default()
        };
        let manager = ConnectionManager::new(connector, preferences).without_persistence();

        let connection = manager.connection_for(&client_config("/p", "ws")).unwrap();
        assert!(connection.is_working_offline());
    }
}
