//! MySQL-backed primary store.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS users (
//!     id VARCHAR(36) NOT NULL PRIMARY KEY,
//!     name VARCHAR(255) NOT NULL,
//!     email VARCHAR(255) NOT NULL UNIQUE
//! );
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use faultbox_config::PrimaryConfig;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;

use crate::backend::PrimaryClient;
use crate::error::{TransportError, TransportResult};
use crate::record::User;

const BACKEND: &str = "mysql";

const CREATE_USERS_TABLE: &str = "CREATE TABLE IF NOT EXISTS users (
    id VARCHAR(36) NOT NULL PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL UNIQUE
)";

/// Pooled MySQL connection holding the `users` table.
#[derive(Debug)]
pub struct MySqlPrimary {
    pool: MySqlPool,
    connected: AtomicBool,
}

impl MySqlPrimary {
    /// Opens the pool and makes sure the `users` table exists.
    pub async fn connect(config: &PrimaryConfig) -> TransportResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| TransportError::Connect {
                backend: BACKEND,
                message: e.to_string(),
            })?;

        sqlx::query(CREATE_USERS_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| TransportError::Connect {
                backend: BACKEND,
                message: format!("schema setup failed: {e}"),
            })?;

        tracing::info!(
            max_connections = config.max_connections,
            "MySQL primary store connected"
        );

        Ok(Self {
            pool,
            connected: AtomicBool::new(true),
        })
    }

    fn command_error(&self, err: sqlx::Error) -> TransportError {
        if matches!(err, sqlx::Error::Io(_) | sqlx::Error::PoolClosed) {
            self.connected.store(false, Ordering::Release);
        }
        TransportError::Command {
            backend: BACKEND,
            message: err.to_string(),
        }
    }

    fn ensure_connected(&self) -> TransportResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::Disconnected { backend: BACKEND })
        }
    }
}

#[async_trait]
impl PrimaryClient for MySqlPrimary {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn fetch_users(&self) -> TransportResult<Vec<User>> {
        self.ensure_connected()?;
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT id, name, email FROM users",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.command_error(e))?;

        Ok(rows
            .into_iter()
            .map(|(id, name, email)| User { id, name, email })
            .collect())
    }

    async fn insert_user(&self, user: &User) -> TransportResult<()> {
        self.ensure_connected()?;
        sqlx::query("INSERT INTO users (id, name, email) VALUES (?, ?, ?)")
            .bind(&user.id)
            .bind(&user.name)
            .bind(&user.email)
            .execute(&self.pool)
            .await
            .map_err(|e| self.command_error(e))?;
        Ok(())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::Release);
        self.pool.close().await;
        tracing::info!("MySQL primary store closed");
    }
}
