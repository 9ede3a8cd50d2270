//! SQL Server backend over `tiberius`.

pub mod catalog;

use std::sync::Arc;

use async_trait::async_trait;
use config::RetrofitOptions;
use errors::{RetrofitError, TenantError};
use space_core::{
    BackendKind, ConnectionHook, DataAccessLayer, Table, TenantContextAccessor,
};
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::backend::{DdlOperation, SchemaBackend};
use crate::catalog::{ForeignKeyColumnRow, UniqueColumnRow};
use crate::dialect::{DdlDialect, SqlServerDialect};
use crate::hook::HookRegistry;

pub type SqlServerClient = Client<Compat<TcpStream>>;

/// Opens a client from an ADO.NET style connection string.
pub async fn connect(connection_string: &str) -> Result<SqlServerClient, tiberius::error::Error> {
    let config = Config::from_ado_string(connection_string)?;
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Client::connect(config, tcp.compat_write()).await
}

pub struct SqlServerBackend {
    client: SqlServerClient,
    dialect: SqlServerDialect,
}

impl SqlServerBackend {
    pub async fn connect(connection_string: &str) -> Result<Self, RetrofitError> {
        let client = connect(connection_string)
            .await
            .map_err(|e| RetrofitError::connection("sqlserver", e))?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: SqlServerClient) -> Self {
        Self {
            client,
            dialect: SqlServerDialect,
        }
    }

    pub fn into_client(self) -> SqlServerClient {
        self.client
    }

    async fn run_batch(&mut self, step: &'static str, statement: &str) -> Result<(), RetrofitError> {
        self.client
            .simple_query(statement)
            .await
            .map_err(|e| RetrofitError::ddl(step, statement, e))?
            .into_results()
            .await
            .map_err(|e| RetrofitError::ddl(step, statement, e))?;
        Ok(())
    }

    async fn rollback(&mut self, step: &'static str) {
        if let Err(e) = self
            .run_batch(step, "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
            .await
        {
            tracing::warn!(step, error = %e, "Rollback after failed DDL failed");
        }
    }
}

#[async_trait]
impl SchemaBackend for SqlServerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SqlServer
    }

    async fn read_tables(&mut self) -> Result<Vec<Table>, RetrofitError> {
        catalog::read_tables(&mut self.client).await
    }

    async fn read_unique_columns(&mut self) -> Result<Vec<UniqueColumnRow>, RetrofitError> {
        catalog::read_unique_columns(&mut self.client).await
    }

    async fn read_foreign_key_columns(
        &mut self,
    ) -> Result<Vec<ForeignKeyColumnRow>, RetrofitError> {
        catalog::read_foreign_key_columns(&mut self.client).await
    }

    async fn execute_atomic(
        &mut self,
        operations: &[DdlOperation],
        options: &RetrofitOptions,
    ) -> Result<usize, RetrofitError> {
        let rendered: Vec<(&'static str, Vec<String>)> = operations
            .iter()
            .map(|operation| (operation.step(), self.dialect.render(operation, options)))
            .filter(|(_, statements)| !statements.is_empty())
            .collect();
        let Some((first_step, _)) = rendered.first() else {
            return Ok(0);
        };
        let first_step = *first_step;

        self.run_batch(first_step, "BEGIN TRANSACTION").await?;

        let mut executed = 0;
        for (step, statements) in &rendered {
            for statement in statements {
                tracing::debug!(step, statement = %statement, "Executing DDL statement");
                if let Err(e) = self.run_batch(*step, statement).await {
                    self.rollback(*step).await;
                    return Err(e);
                }
                metrics::counter!("ownspace_ddl_statements_total", "step" => *step).increment(1);
                executed += 1;
            }
        }

        let last_step = rendered.last().map_or(first_step, |(step, _)| *step);
        if let Err(e) = self.run_batch(last_step, "COMMIT TRANSACTION").await {
            self.rollback(last_step).await;
            return Err(e);
        }
        Ok(executed)
    }
}

/// Opens one physical connection per call and binds it to the caller's
/// tenant before returning it.
pub struct SqlServerConnector {
    connection_string: String,
    hooks: Arc<HookRegistry<SqlServerClient>>,
}

impl SqlServerConnector {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            hooks: Arc::new(HookRegistry::new()),
        }
    }

    pub async fn open(
        &self,
        tenant: &dyn TenantContextAccessor,
    ) -> Result<SqlServerClient, TenantError> {
        tenant.current_tenant()?;
        self.hooks.ensure_registered()?;

        let mut client = connect(&self.connection_string)
            .await
            .map_err(|e| TenantError::Acquire {
                source: Box::new(e),
            })?;
        self.hooks.run_all(&mut client, tenant).await?;
        Ok(client)
    }
}

impl DataAccessLayer for SqlServerConnector {
    type Connection = SqlServerClient;

    fn register_connection_hook(&self, hook: Arc<dyn ConnectionHook<SqlServerClient>>) {
        self.hooks.register(hook);
    }
}
