//! PostgreSQL backend over `sqlx`.

pub mod catalog;
pub mod pool;

use async_trait::async_trait;
use config::RetrofitOptions;
use errors::RetrofitError;
use space_core::{BackendKind, Table};
use sqlx::{AssertSqlSafe, Connection, PgConnection};

use crate::backend::{DdlOperation, SchemaBackend};
use crate::catalog::{ForeignKeyColumnRow, UniqueColumnRow};
use crate::dialect::{DdlDialect, PostgresDialect};

pub use pool::{TenantPool, UnitOfWork};

/// A single dedicated connection used for one retrofit run.
///
/// Each unit handed to [`SchemaBackend::execute_atomic`] runs in one
/// transaction, so a failing statement never leaves half of it applied.
pub struct PostgresBackend {
    conn: PgConnection,
    dialect: PostgresDialect,
}

impl PostgresBackend {
    pub async fn connect(connection_url: &str) -> Result<Self, RetrofitError> {
        let conn = PgConnection::connect(connection_url)
            .await
            .map_err(|e| RetrofitError::connection("postgres", e))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: PgConnection) -> Self {
        Self {
            conn,
            dialect: PostgresDialect,
        }
    }

    pub fn into_connection(self) -> PgConnection {
        self.conn
    }
}

#[async_trait]
impl SchemaBackend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn read_tables(&mut self) -> Result<Vec<Table>, RetrofitError> {
        catalog::read_tables(&mut self.conn).await
    }

    async fn read_unique_columns(&mut self) -> Result<Vec<UniqueColumnRow>, RetrofitError> {
        catalog::read_unique_columns(&mut self.conn).await
    }

    async fn read_foreign_key_columns(
        &mut self,
    ) -> Result<Vec<ForeignKeyColumnRow>, RetrofitError> {
        catalog::read_foreign_key_columns(&mut self.conn).await
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

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| RetrofitError::ddl(first_step, "BEGIN", e))?;

        if let Some(limit) = options.statement_timeout {
            let set_timeout = format!("SET LOCAL statement_timeout = {}", limit.as_millis());
            sqlx::query(AssertSqlSafe(set_timeout.as_str()))
                .execute(&mut *tx)
                .await
                .map_err(|e| RetrofitError::ddl(first_step, set_timeout.clone(), e))?;
        }

        // An error returns early and drops `tx`, which rolls the whole unit back.
        let mut executed = 0;
        for (step, statements) in &rendered {
            for statement in statements {
                tracing::debug!(step, statement = %statement, "Executing DDL statement");
                sqlx::query(AssertSqlSafe(statement.as_str()))
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| RetrofitError::ddl(*step, statement.clone(), e))?;
                metrics::counter!("ownspace_ddl_statements_total", "step" => *step).increment(1);
                executed += 1;
            }
        }

        let last_step = rendered.last().map_or(first_step, |(step, _)| *step);
        tx.commit()
            .await
            .map_err(|e| RetrofitError::ddl(last_step, "COMMIT", e))?;

        Ok(executed)
    }
}
