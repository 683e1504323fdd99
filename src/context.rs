/// Application context and dependency injection
use crate::{
    agent::{AgentAdminClient, AgentServices},
    config::ServerConfig,
    db,
    endorsement::{EndorsementManager, EndorsementStore},
    error::WebvhResult,
    operations::EndorsementEvents,
    protocol::EndorsementHandler,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub store: EndorsementStore,
    pub manager: Arc<EndorsementManager>,
    pub handler: Arc<EndorsementHandler>,
    // Author side: outcomes of requests sent to the endorser
    pub events: EndorsementEvents,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> WebvhResult<Self> {
        // Validate configuration
        config.validate()?;

        // Initialize database
        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        tracing::info!(admin_url = %config.agent.admin_url, "Using agent admin API");
        let agent = AgentServices::from_agent(Arc::new(AgentAdminClient::new(&config.agent)?));

        Ok(Self::with_agent(config, db, agent))
    }

    /// Wire the services around an already opened database and agent
    pub fn with_agent(config: ServerConfig, db: SqlitePool, agent: AgentServices) -> Self {
        let config = Arc::new(config);
        let webvh = Arc::new(config.webvh.clone());

        let store = EndorsementStore::new(db.clone());
        let events = EndorsementEvents::default();

        let manager = EndorsementManager::new(webvh.clone(), agent.clone(), store.clone());
        let handler = EndorsementHandler::new(
            webvh,
            agent.responder.clone(),
            store.clone(),
            manager.signer().clone(),
            Arc::new(events.clone()),
        );

        Self {
            config,
            db,
            store,
            manager: Arc::new(manager),
            handler: Arc::new(handler),
            events,
        }
    }

    /// Get the role this service runs as
    pub fn role(&self) -> crate::config::Role {
        self.config.webvh.role
    }
}
