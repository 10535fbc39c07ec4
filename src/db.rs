use sqlx::{AnyPool, Pool};
use tracing::info;

use crate::{config::Config, error::ServiceError};

pub struct Database {
    pub pool: Pool<sqlx::Any>,
}

impl Database {
    pub async fn connect(config: &Config) -> Result<Self, ServiceError> {
        let pool = Self::new_pool(&config.database_url, config.min_connections, config.max_connections)
            .await?;
        info!(
            max = config.max_connections,
            min = config.min_connections,
            "database pool opened"
        );
        Ok(Database { pool })
    }

    pub async fn new_pool(url: &str, min: u32, max: u32) -> Result<AnyPool, ServiceError> {
        sqlx::any::install_default_drivers();
        sqlx::any::AnyPoolOptions::new()
            .max_connections(max)
            .min_connections(min)
            .idle_timeout(std::time::Duration::from_secs(30))
            .connect(url)
            .await
            .map_err(ServiceError::DBConnectionError)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("database pool closed");
    }
}
