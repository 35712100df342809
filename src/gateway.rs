//! Connection Gateway
//!
//! This module owns the connection lifecycle discipline for the provisioning
//! workflow. Each workflow step acquires its own handle, uses it, and
//! releases it before returning; handles are never held across steps because
//! each step may target a different database (the admin/bootstrap database
//! vs. the newly created one).
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - A mid-operation connection drop surfaces as an error on the awaited
//!   call, not as a detached callback
//! - `release` is idempotent; `Drop` covers the unwind path

use std::future::Future;
use std::time::Duration;

use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, warn};

use crate::error::{ProvisionError, Result};

/// Name of the pre-existing bootstrap database used for existence checks and
/// the creation statement.
pub const ADMIN_DATABASE: &str = "postgres";

/// Default connection timeout applied when the descriptor carries none.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Parameters needed to acquire a connection to one database on a server
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    /// Database server host name
    pub host: String,

    /// User name; must have database creation privileges for admin steps
    pub user: Option<String>,

    /// Password
    /// WARNING: Sensitive data, do not log or include in error messages
    pub password: Option<String>,

    /// Connection timeout; `DEFAULT_CONNECT_TIMEOUT_MS` when absent
    pub connect_timeout: Option<Duration>,

    /// Target database for this acquisition
    pub database: String,
}

impl ConnectionDescriptor {
    /// Create a descriptor for the given host and target database
    #[must_use]
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            password: None,
            connect_timeout: None,
            database: database.into(),
        }
    }

    /// Same server parameters, different target database
    #[must_use]
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self { database: database.into(), ..self.clone() }
    }

    /// Check the descriptor invariants: non-empty host, positive timeout
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ProvisionError::config("connectionParams.host is missing or invalid"));
        }
        if self.connect_timeout == Some(Duration::ZERO) {
            return Err(ProvisionError::config("connectTimeout must be a positive integer"));
        }
        Ok(())
    }
}

/// Acquires single-use handles to one database at a time
///
/// The provisioning orchestrator is generic over this trait so that the
/// sequencing and handle-accounting rules can be tested without a server.
pub trait Gateway {
    type Handle: GatewayHandle;

    /// Acquire a handle to the database named in the descriptor
    ///
    /// Fails with a connectivity error on protocol/network problems or when
    /// the connect timeout elapses. No retry is attempted.
    fn acquire(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> impl Future<Output = Result<Self::Handle>> + Send;
}

/// A single-use connection handle, exclusively owned by one workflow step
pub trait GatewayHandle: Send {
    /// Name of the database this handle is connected to
    fn database(&self) -> &str;

    /// Execute a statement that returns no rows (DDL, INSERT); returns the
    /// affected-row count
    fn execute(&self, statement: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Run a single-parameter catalog query, returning the first column of
    /// each returned row
    fn query_indicator(
        &self,
        statement: &str,
        param: &str,
    ) -> impl Future<Output = Result<Vec<Option<i32>>>> + Send;

    /// Release the handle; idempotent and safe to call more than once
    fn release(&mut self) -> impl Future<Output = ()> + Send;
}

/// `PostgreSQL` gateway backed by `tokio-postgres`
pub struct PgGateway;

impl Gateway for PgGateway {
    type Handle = PgHandle;

    async fn acquire(&self, descriptor: &ConnectionDescriptor) -> Result<PgHandle> {
        let pg_config = build_pg_config(descriptor);

        let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
            ProvisionError::connectivity(&descriptor.database, format!("failed to connect: {e}"))
        })?;

        // Drive the connection until the client is dropped. Errors also
        // surface on the awaited client call, so this task only logs.
        let database = descriptor.database.clone();
        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!(database = %database, "connection terminated: {err}");
            }
        });

        debug!(database = %descriptor.database, "connection acquired");
        Ok(PgHandle {
            client: Some(client),
            driver: Some(driver),
            database: descriptor.database.clone(),
        })
    }
}

/// Open connection to a single `PostgreSQL` database
pub struct PgHandle {
    client: Option<Client>,
    driver: Option<tokio::task::JoinHandle<()>>,
    database: String,
}

impl PgHandle {
    fn client(&self) -> Result<&Client> {
        self.client.as_ref().ok_or_else(|| {
            ProvisionError::connectivity(&self.database, "handle already released")
        })
    }
}

impl GatewayHandle for PgHandle {
    fn database(&self) -> &str {
        &self.database
    }

    async fn execute(&self, statement: &str) -> Result<u64> {
        self.client()?
            .execute(statement, &[])
            .await
            .map_err(|e| classify(&self.database, &e))
    }

    async fn query_indicator(&self, statement: &str, param: &str) -> Result<Vec<Option<i32>>> {
        let rows = self
            .client()?
            .query(statement, &[&param])
            .await
            .map_err(|e| classify(&self.database, &e))?;

        Ok(rows.iter().map(|row| row.try_get::<_, i32>(0).ok()).collect())
    }

    async fn release(&mut self) {
        if self.client.take().is_some() {
            debug!(database = %self.database, "connection released");
        }
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl Drop for PgHandle {
    fn drop(&mut self) {
        // Unwind path: the sockets still close when the client drops, the
        // driver task just has nothing left to do.
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Build `tokio-postgres` connection config from a descriptor
fn build_pg_config(descriptor: &ConnectionDescriptor) -> Config {
    let mut pg_config = Config::new();
    pg_config.host(&descriptor.host).dbname(&descriptor.database);

    if let Some(user) = &descriptor.user {
        pg_config.user(user);
    }
    if let Some(password) = &descriptor.password {
        pg_config.password(password);
    }

    let timeout = descriptor
        .connect_timeout
        .unwrap_or(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS));
    pg_config.connect_timeout(timeout);

    pg_config
}

/// Map a driver error to the taxonomy: statements rejected by the server are
/// DDL execution errors, everything else is connectivity
fn classify(database: &str, err: &tokio_postgres::Error) -> ProvisionError {
    if err.as_db_error().is_some() {
        ProvisionError::ddl_execution("statement", database, err.to_string())
    } else {
        ProvisionError::connectivity(database, err.to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_descriptor_with_database_keeps_server_params() {
        let mut descriptor = ConnectionDescriptor::new("db.example.com", ADMIN_DATABASE);
        descriptor.user = Some("owner".to_string());
        descriptor.password = Some("secret".to_string());
        descriptor.connect_timeout = Some(Duration::from_millis(10_000));

        let target = descriptor.with_database("events_demo");
        assert_eq!(target.host, "db.example.com");
        assert_eq!(target.user.as_deref(), Some("owner"));
        assert_eq!(target.password.as_deref(), Some("secret"));
        assert_eq!(target.connect_timeout, Some(Duration::from_millis(10_000)));
        assert_eq!(target.database, "events_demo");
    }

    #[test]
    fn test_descriptor_validation() {
        let descriptor = ConnectionDescriptor::new("localhost", ADMIN_DATABASE);
        assert!(descriptor.validate().is_ok());

        let empty_host = ConnectionDescriptor::new("  ", ADMIN_DATABASE);
        assert!(empty_host.validate().is_err());

        let mut zero_timeout = ConnectionDescriptor::new("localhost", ADMIN_DATABASE);
        zero_timeout.connect_timeout = Some(Duration::ZERO);
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_default_timeout_applied() {
        let descriptor = ConnectionDescriptor::new("localhost", "events_demo");
        let config = build_pg_config(&descriptor);
        assert_eq!(
            config.get_connect_timeout(),
            Some(&Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS))
        );
        assert_eq!(config.get_dbname(), Some("events_demo"));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        use super::testing::{MockGateway, Script};

        let script = Script::default();
        let gateway = MockGateway { script: script.clone() };
        let mut handle =
            gateway.acquire(&ConnectionDescriptor::new("localhost", ADMIN_DATABASE)).await.unwrap();

        handle.release().await;
        handle.release().await;
        drop(handle);

        assert_eq!(script.acquires(), 1);
        assert_eq!(script.releases(), 1);
        assert_eq!(script.dropped_unreleased(), 0);
    }
}
