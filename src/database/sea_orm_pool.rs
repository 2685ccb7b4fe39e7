use crate::database::config::redact_database_url;
use crate::database::DatabaseConfig;
use crate::error::{MemberflowError, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

/// SeaORM connection pool shared by the membership store.
///
/// # Security Note
///
/// The stored URL is automatically redacted (password replaced with `[REDACTED]`)
/// to prevent accidental credential leakage in logs or error messages.
#[derive(Clone)]
pub struct SeaOrmPool {
    conn: DatabaseConnection,
    /// Redacted URL (safe for logging)
    redacted_url: String,
}

impl SeaOrmPool {
    /// Wrap an existing connection
    ///
    /// The URL is automatically redacted for safety.
    pub fn new(conn: DatabaseConnection, url: &str) -> Self {
        Self {
            conn,
            redacted_url: redact_database_url(url),
        }
    }

    /// Connect using the pool settings in `config`
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;

        let mut opt = ConnectOptions::new(&config.url);
        opt.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .sqlx_logging(config.sqlx_logging);

        let conn = Database::connect(opt).await.map_err(|e| {
            tracing::error!(
                url = %config.redacted_url(),
                error = %e,
                "database connection failed"
            );
            MemberflowError::internal(format!("Failed to connect to database: {}", e))
        })?;

        tracing::info!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "database connected"
        );

        Ok(Self::new(conn, &config.url))
    }

    /// Get the inner SeaORM connection
    pub fn inner(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Take the inner SeaORM connection
    pub fn into_inner(self) -> DatabaseConnection {
        self.conn
    }

    /// Connection URL with the password redacted
    pub fn connection_url(&self) -> &str {
        &self.redacted_url
    }

    /// Round-trip a ping to the server.
    pub async fn ping(&self) -> Result<()> {
        self.conn.ping().await.map_err(Into::into)
    }
}

impl std::fmt::Debug for SeaOrmPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeaOrmPool")
            .field("url", &self.redacted_url)
            .finish()
    }
}
