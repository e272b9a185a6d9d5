use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use super::{auth::AuthKeys, config::Config, database::init_database, uploads::ProofStore};

pub struct AppState {
    pub config: Config,
    pub pool: SqlitePool,
    pub proofs: ProofStore,
    pub auth: AuthKeys,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let pool = init_database(&config.database_url, config.database_max_connections)
            .await
            .context("Failed to open database")?;

        Self::with_pool(config, pool).await
    }

    /// Builds the state around an already opened pool.
    pub async fn with_pool(config: Config, pool: SqlitePool) -> Result<Arc<Self>> {
        let proofs = ProofStore::open(&config.upload_dir)
            .await
            .with_context(|| format!("Failed to create upload dir {}", config.upload_dir))?;
        info!("Storing proofs in {}", proofs.dir().display());

        let auth = AuthKeys::new(&config.jwt_secret, config.token_ttl_secs, config.bcrypt_cost);

        Ok(Arc::new(Self {
            config,
            pool,
            proofs,
            auth,
        }))
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}
