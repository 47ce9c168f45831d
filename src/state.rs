use std::sync::Arc;

use tracing::{error, info, warn};

use crate::clients::HttpUserDirectory;
use crate::config::Config;
use crate::db::{DocStore, MemStore, PgStore, StoreError};
use crate::services::{Authenticator, CommentLog, JwtAuthenticator, NoDirectory, UserDirectory, VersionStore};
use crate::ws::{BroadcastRelay, LocalFanOut, RoomRegistry, SessionGateway};

/// Everything a request or a session needs. Built once at start-up and
/// dropped at shutdown; there is no global state.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<RoomRegistry>,
    pub versions: Arc<VersionStore>,
    pub comments: Arc<CommentLog>,
    pub relay: Arc<BroadcastRelay>,
    pub gateway: Arc<SessionGateway>,
}

impl AppState {
    /// Wire the components around the given collaborators
    pub fn new(
        config: Config,
        store: Arc<dyn DocStore>,
        authenticator: Arc<dyn Authenticator>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let timeout = config.persistence_timeout();
        let registry = Arc::new(RoomRegistry::new());
        let versions = Arc::new(VersionStore::new(store.clone(), timeout, config.max_scene_bytes));
        let comments = Arc::new(CommentLog::new(store, directory, timeout, config.max_comment_chars));
        let fanout = Arc::new(LocalFanOut::new(registry.clone()));
        let relay = Arc::new(BroadcastRelay::new(registry.clone(), versions.clone(), comments.clone(), fanout));
        let gateway = Arc::new(SessionGateway::new(
            registry.clone(),
            relay.clone(),
            versions.clone(),
            authenticator,
            config.session_outbox_capacity,
        ));
        Self { config, registry, versions, comments, relay, gateway }
    }

    /// Build the state from configuration, connecting to external services.
    ///
    /// A configured database that cannot be reached is an error: the
    /// in-memory store is only used when no database URL is set.
    pub async fn from_config(config: Config) -> Result<Self, StoreError> {
        let store: Arc<dyn DocStore> = match &config.db_url {
            Some(db_url) => match PgStore::connect(db_url).await {
                Ok(store) => {
                    info!("Database initialized successfully");
                    Arc::new(store)
                }
                Err(e) => {
                    error!("Failed to initialize database: {}", e);
                    return Err(e.into());
                }
            },
            None => {
                warn!("No database URL configured - documents are kept in memory only");
                Arc::new(MemStore::new())
            }
        };

        if config.auth_jwt_secret.is_none() {
            warn!("No JWT secret configured - every connection will be refused");
        }
        let authenticator = Arc::new(JwtAuthenticator::new(config.auth_jwt_secret.clone()));

        let directory: Arc<dyn UserDirectory> = match &config.user_service_url {
            Some(url) => match HttpUserDirectory::new(url.clone(), config.auth_jwt_secret.clone(), config.service_name.clone()) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    warn!("Failed to build user service client: {}", e);
                    Arc::new(NoDirectory)
                }
            },
            None => Arc::new(NoDirectory),
        };

        Ok(Self::new(config, store, authenticator, directory))
    }
}
