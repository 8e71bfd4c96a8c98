//! MSSQL backend and session.
//!
//! One tiberius client per session over a tokio `TcpStream`. Transactions are
//! plain T-SQL batches; bulk rows travel through TDS `INSERT BULK`.
//!
//! `execute` goes through `sp_executesql`, so anything it creates is scoped to
//! that call. Staging DDL must use `batch_execute`.

use std::time::Duration;

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use crate::config::TargetConfig;
use crate::core::traits::{Backend, CopyDestination, CopyRequest, Session};
use crate::core::value::Row;
use crate::drivers::common::SslMode;
use crate::error::{BulkError, Result};

use super::dialect::MssqlDialect;
use super::encode::{column_order, token_row};

const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Insertable columns of a table in server order, as `INSERT BULK` expects them.
const INSERTABLE_COLUMNS_SQL: &str = "SELECT c.name FROM sys.columns c \
     WHERE c.object_id = OBJECT_ID(@P1) \
     AND c.is_identity = 0 AND c.is_computed = 0 AND c.system_type_id <> 189 \
     ORDER BY c.column_id";

/// A configured SQL Server database.
pub struct MssqlBackend {
    config: TargetConfig,
    ssl_mode: SslMode,
    dialect: MssqlDialect,
}

impl MssqlBackend {
    /// Create a backend from configuration. No connection is made yet.
    pub fn new(config: TargetConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        Ok(Self {
            config,
            ssl_mode,
            dialect: MssqlDialect::new(),
        })
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.effective_port());
        config.database(&self.config.database);
        config.application_name("bulk-sync");
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        config.encryption(self.ssl_mode.mssql_encryption());
        if self.ssl_mode.requires_tls()
            && (self.config.trust_server_cert || !self.ssl_mode.verifies_certificate())
        {
            config.trust_cert();
        }
        config
    }

    async fn connect_tcp(&self, config: &Config) -> Result<TcpStream> {
        let timeout = self.config.connect_timeout();
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(config.get_addr()))
            .await
            .map_err(|_| BulkError::Timeout {
                operation: format!("connect to {}", config.get_addr()),
                after: timeout,
            })??;

        tcp.set_nodelay(true).ok();

        let keepalive = socket2::TcpKeepalive::new()
            .with_time(TCP_KEEPALIVE_INTERVAL)
            .with_interval(TCP_KEEPALIVE_INTERVAL);
        if let Err(e) = socket2::SockRef::from(&tcp).set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
        }

        Ok(tcp)
    }
}

#[async_trait]
impl Backend for MssqlBackend {
    type Dialect = MssqlDialect;
    type Session = MssqlSession;

    fn dialect(&self) -> &MssqlDialect {
        &self.dialect
    }

    async fn open(&self) -> Result<MssqlSession> {
        if !self.ssl_mode.requires_tls() {
            warn!("MSSQL encryption is disabled. Credentials will be transmitted in plaintext.");
        }

        let config = self.build_config();
        let tcp = self.connect_tcp(&config).await?;
        let client = Client::connect(config, tcp.compat_write()).await?;

        debug!(
            "Connected to MSSQL: {}:{}/{}",
            self.config.host,
            self.config.effective_port(),
            self.config.database
        );

        Ok(MssqlSession { client })
    }
}

/// One SQL Server connection.
pub struct MssqlSession {
    client: Client<Compat<TcpStream>>,
}

impl MssqlSession {
    async fn simple(&mut self, sql: &str) -> Result<()> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    async fn insertable_columns(&mut self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(INSERTABLE_COLUMNS_SQL, &[&table])
            .await?
            .into_first_result()
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(name) = row.try_get::<&str, _>(0)? {
                columns.push(name.to_string());
            }
        }
        Ok(columns)
    }

    /// Reorder rows for a direct insert into the target table.
    async fn align_to_server(&mut self, request: &CopyRequest, rows: Vec<Row>) -> Result<Vec<Row>> {
        let server = self.insertable_columns(&request.table).await?;
        if server.is_empty() {
            return Err(BulkError::transfer(
                &request.table,
                "table not found or has no insertable columns",
            ));
        }

        let order = column_order(&request.columns, &server).map_err(|missing| {
            BulkError::transfer(
                &request.table,
                format!(
                    "columns not mapped by the record: {}; bulk insert needs every insertable column",
                    missing.join(", ")
                ),
            )
        })?;

        if !order.ignored.is_empty() {
            warn!(
                "{}: not insertable, values dropped: {}",
                request.table,
                order.ignored.join(", ")
            );
        }

        Ok(rows
            .into_iter()
            .map(|row| order.positions.iter().map(|&i| row[i].clone()).collect())
            .collect())
    }
}

#[async_trait]
impl Session for MssqlSession {
    /// Statement timeouts are enforced client-side only.
    async fn begin(&mut self, _statement_timeout: Option<Duration>) -> Result<()> {
        self.simple("SET XACT_ABORT ON; BEGIN TRANSACTION").await
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        Ok(self.client.execute(sql, &[]).await?.total())
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        self.simple(sql).await
    }

    async fn copy_in(&mut self, request: &CopyRequest, rows: Vec<Row>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let rows = match request.destination {
            // Staging was cloned in request order
            CopyDestination::Staging => rows,
            CopyDestination::Target => self.align_to_server(request, rows).await?,
        };

        let encoded = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                token_row(row).map_err(|reason| {
                    BulkError::transfer(&request.table, format!("row {}: {}", idx, reason))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut bulk_load = self
            .client
            .bulk_insert(&request.table)
            .await
            .map_err(|e| BulkError::transfer_caused(&request.table, "bulk insert init", e.into()))?;

        for row in encoded {
            bulk_load.send(row).await.map_err(|e| {
                BulkError::transfer_caused(&request.table, "bulk insert send", e.into())
            })?;
        }

        let result = bulk_load.finalize().await.map_err(|e| {
            BulkError::transfer_caused(&request.table, "bulk insert finalize", e.into())
        })?;

        let total = result.total();
        debug!("INSERT BULK {} accepted {} rows", request.table, total);
        Ok(total)
    }

    async fn commit(&mut self) -> Result<()> {
        self.simple("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<()> {
        // XACT_ABORT may already have rolled back
        self.simple("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }

    async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::Dialect;

    fn target(ssl_mode: &str) -> TargetConfig {
        TargetConfig {
            r#type: "mssql".into(),
            host: "sql.internal".into(),
            port: None,
            database: "taverns".into(),
            user: "sa".into(),
            password: "secret".into(),
            schema: None,
            ssl_mode: ssl_mode.into(),
            trust_server_cert: false,
            connect_timeout_secs: 10,
        }
    }

    #[test]
    fn test_build_config_address() {
        let backend = MssqlBackend::new(target("disable")).unwrap();
        let config = backend.build_config();
        assert_eq!(config.get_addr(), "sql.internal:1433");
        assert_eq!(backend.dialect().name(), "mssql");
    }

    #[test]
    fn test_backend_rejects_bad_ssl_mode() {
        assert!(MssqlBackend::new(target("sometimes")).is_err());
    }
}
