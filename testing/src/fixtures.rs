use std::sync::atomic::{AtomicU32, Ordering};

use sqlx::{AssertSqlSafe, Connection, PgConnection};
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

const USER: &str = "testuser";
const PASSWORD: &str = "testpass";

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Lower-case identifier unique within this test process and across
/// concurrently running test binaries.
pub fn unique_name(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}_{}_{}", prefix, std::process::id(), id).to_lowercase()
}

pub struct PostgresFixture {
    #[allow(dead_code)]
    container: ContainerAsync<Postgres>,
    host: String,
    port: u16,
}

impl PostgresFixture {
    /// Superuser URL of the default database.
    pub fn url(&self) -> String {
        self.url_for(USER, PASSWORD, "testdb")
    }

    pub fn url_for(&self, user: &str, password: &str, database: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            user, password, self.host, self.port, database
        )
    }

    /// Creates a fresh, empty database owned by the superuser.
    pub async fn create_database(&self, prefix: &str) -> anyhow::Result<TestDatabase> {
        let name = unique_name(prefix);
        let mut admin = PgConnection::connect(&self.url()).await?;
        let create = format!("CREATE DATABASE \"{}\"", name);
        sqlx::query(AssertSqlSafe(create.as_str()))
            .execute(&mut admin)
            .await?;
        admin.close().await?;

        tracing::info!("Created test database {}", name);
        Ok(TestDatabase {
            url: self.url_for(USER, PASSWORD, &name),
            name,
            host: self.host.clone(),
            port: self.port,
        })
    }
}

/// A database private to one test.
pub struct TestDatabase {
    name: String,
    url: String,
    host: String,
    port: u16,
}

impl TestDatabase {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Superuser URL; use it to run the retrofit and seed the schema.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL logging in as `role`, e.g. the `NOBYPASSRLS` application role.
    /// Superusers bypass row security, so isolation checks must use this.
    pub fn url_as(&self, role: &str, password: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            role, password, self.host, self.port, self.name
        )
    }

    pub async fn connect(&self) -> anyhow::Result<PgConnection> {
        Ok(PgConnection::connect(&self.url).await?)
    }

    /// Runs a `;`-separated script of plain statements as the superuser.
    pub async fn execute_script(&self, script: &str) -> anyhow::Result<()> {
        let mut conn = self.connect().await?;
        for statement in script.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(AssertSqlSafe(statement))
                .execute(&mut conn)
                .await?;
        }
        conn.close().await?;
        Ok(())
    }
}

static POSTGRES: OnceCell<Option<PostgresFixture>> = OnceCell::const_new();

pub async fn postgres() -> Option<&'static PostgresFixture> {
    POSTGRES
        .get_or_init(|| async {
            let container_result = Postgres::default()
                .with_db_name("testdb")
                .with_user(USER)
                .with_password(PASSWORD)
                .with_tag("16-alpine")
                .start()
                .await;

            match container_result {
                Ok(container) => {
                    let port = container.get_host_port_ipv4(5432).await.ok()?;
                    tracing::info!("PostgreSQL fixture started on port {}", port);
                    Some(PostgresFixture {
                        container,
                        host: "localhost".to_string(),
                        port,
                    })
                }
                Err(e) => {
                    tracing::warn!("Failed to start PostgreSQL container: {:?}", e);
                    None
                }
            }
        })
        .await
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_name_is_lowercase_and_unique() {
        let a = unique_name("Retrofit");
        let b = unique_name("Retrofit");
        assert_ne!(a, b);
        assert!(a.starts_with("retrofit_"));
        assert_eq!(a, a.to_lowercase());
    }
}
