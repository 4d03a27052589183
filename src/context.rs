use crate::config::IngestConfig;
use crate::database::Database;
use crate::prices_api::PricesApiClient;
use crate::queue::DurableQueue;
use anyhow::Result;

/// Everything a cycle needs, derived from configuration loaded once at start.
pub struct AppContext {
    config: IngestConfig,
    queue: DurableQueue,
}

impl AppContext {
    pub fn initialize(config: IngestConfig) -> Self {
        let queue = DurableQueue::new(&config.queue_dir);
        Self { config, queue }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    /// Opens a fresh session; callers drop it before the cycle returns.
    pub async fn database(&self) -> Result<Database> {
        Database::new(&self.config.database_url).await
    }

    pub fn prices_client(&self) -> Result<PricesApiClient> {
        PricesApiClient::new(&self.config)
    }
}
