//! PostgreSQL backend and session.
//!
//! One `tokio_postgres` client per session, no pooling. Bulk rows travel
//! through binary COPY (see [`super::encode`]).

use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::quote_pg;
use crate::core::traits::{Backend, CopyRequest, Session};
use crate::core::value::Row;
use crate::drivers::common::{SslMode, TlsBuilder};
use crate::error::{BulkError, Result};

use super::dialect::PostgresDialect;
use super::encode::encode_copy_rows;

/// TCP keepalive idle time.
const KEEPALIVE_IDLE: Duration = Duration::from_secs(30);

/// A configured PostgreSQL database.
pub struct PostgresBackend {
    config: TargetConfig,
    ssl_mode: SslMode,
    dialect: PostgresDialect,
}

impl PostgresBackend {
    /// Create a backend from configuration. No connection is made yet.
    pub fn new(config: TargetConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        Ok(Self {
            config,
            ssl_mode,
            dialect: PostgresDialect::new(),
        })
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    fn pg_config(&self) -> PgConfig {
        let mut pg_config = PgConfig::new();
        pg_config.host(&self.config.host);
        pg_config.port(self.config.effective_port());
        pg_config.dbname(&self.config.database);
        pg_config.user(&self.config.user);
        pg_config.password(&self.config.password);
        pg_config.application_name("bulk-sync");

        // Connection options for reliability
        pg_config.keepalives(true);
        pg_config.keepalives_idle(KEEPALIVE_IDLE);
        pg_config.connect_timeout(self.config.connect_timeout());
        pg_config
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    type Dialect = PostgresDialect;
    type Session = PostgresSession;

    fn dialect(&self) -> &PostgresDialect {
        &self.dialect
    }

    async fn open(&self) -> Result<PostgresSession> {
        let pg_config = self.pg_config();

        let (client, connection) = match TlsBuilder::new(self.ssl_mode).build()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let (client, conn) = pg_config.connect(NoTls).await?;
                (client, tokio::spawn(drive(conn)))
            }
            Some(tls) => {
                let (client, conn) = pg_config.connect(tls).await?;
                (client, tokio::spawn(drive(conn)))
            }
        };

        debug!(
            "Connected to PostgreSQL: {}:{}/{}",
            self.config.host,
            self.config.effective_port(),
            self.config.database
        );

        Ok(PostgresSession { client, connection })
    }
}

/// Run the connection task until the client is dropped.
async fn drive<C>(connection: C)
where
    C: std::future::Future<Output = std::result::Result<(), tokio_postgres::Error>>,
{
    if let Err(e) = connection.await {
        warn!("PostgreSQL connection closed with error: {}", e);
    }
}

/// One PostgreSQL connection.
pub struct PostgresSession {
    client: Client,
    connection: JoinHandle<()>,
}

#[async_trait]
impl Session for PostgresSession {
    async fn begin(&mut self, statement_timeout: Option<Duration>) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        if let Some(timeout) = statement_timeout {
            // Scoped to this transaction
            self.client
                .batch_execute(&format!(
                    "SET LOCAL statement_timeout = {}",
                    timeout.as_millis()
                ))
                .await?;
        }
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        Ok(self.client.execute(sql, &[]).await?)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn copy_in(&mut self, request: &CopyRequest, rows: Vec<Row>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let col_list: Vec<String> = request.columns.iter().map(|c| quote_pg(c)).collect();
        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT BINARY)",
            request.table,
            col_list.join(", ")
        );

        let data = encode_copy_rows(&rows).freeze();

        let sink = self
            .client
            .copy_in(&copy_sql)
            .await
            .map_err(|e| BulkError::transfer_caused(&request.table, "COPY init", e.into()))?;
        tokio::pin!(sink);

        sink.send(data)
            .await
            .map_err(|e| BulkError::transfer_caused(&request.table, "COPY send", e.into()))?;

        let written = sink
            .finish()
            .await
            .map_err(|e| BulkError::transfer_caused(&request.table, "COPY finish", e.into()))?;

        debug!("COPY {} accepted {} rows", request.table, written);
        Ok(written)
    }

    async fn commit(&mut self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        let PostgresSession { client, connection } = self;
        drop(client);
        if let Err(e) = connection.await {
            info!("PostgreSQL connection task ended abnormally: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::Dialect;

    fn target(ssl_mode: &str) -> TargetConfig {
        TargetConfig {
            r#type: "postgres".into(),
            host: "db.internal".into(),
            port: None,
            database: "taverns".into(),
            user: "app".into(),
            password: "secret".into(),
            schema: None,
            ssl_mode: ssl_mode.into(),
            trust_server_cert: false,
            connect_timeout_secs: 5,
        }
    }

    #[test]
    fn test_backend_rejects_bad_ssl_mode() {
        assert!(PostgresBackend::new(target("maybe")).is_err());
        assert!(PostgresBackend::new(target("disable")).is_ok());
    }

    #[test]
    fn test_pg_config_from_target() {
        let backend = PostgresBackend::new(target("require")).unwrap();
        let pg = backend.pg_config();
        assert_eq!(pg.get_ports(), &[5432]);
        assert_eq!(pg.get_dbname(), Some("taverns"));
        assert_eq!(pg.get_user(), Some("app"));
        assert_eq!(pg.get_connect_timeout(), Some(&Duration::from_secs(5)));
        assert_eq!(backend.dialect().name(), "postgres");
    }
}
