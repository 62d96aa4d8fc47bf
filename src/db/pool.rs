//! Connection pool management.
//!
//! One process-wide pool, created on first use. SQL Server goes through a
//! `bb8` pool of `tiberius` clients; the other engines use their sqlx pools
//! directly so every column type decodes natively.

use crate::config::ConnectionSettings;
use crate::db::DatabaseType;
use crate::error::{ToolError, ToolResult};
use async_trait::async_trait;
use bb8::ManageConnection;
use sqlx::{
    Executor, MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions,
    mysql::MySqlPoolOptions, postgres::PgPoolOptions, sqlite::SqliteConnectOptions,
    sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// A SQL Server client plus the state the pool needs to decide whether it can
/// be handed out again.
pub struct TdsSession {
    client: bb8_tiberius::rt::Client,
    in_flight: bool,
}

impl TdsSession {
    /// Mark the session busy and return the client.
    ///
    /// Until `finish` is called the session counts as broken: if the caller is
    /// dropped part way (timeout, cancelled call, error) the pool closes the
    /// connection instead of reusing it, and the server rolls back whatever
    /// was left open on it.
    pub fn begin(&mut self) -> &mut bb8_tiberius::rt::Client {
        self.in_flight = true;
        &mut self.client
    }

    /// All results were read and no transaction is open.
    pub fn finish(&mut self) {
        self.in_flight = false;
    }
}

/// bb8 manager for `TdsSession`s; connecting and validation are delegated to
/// `bb8_tiberius`.
pub struct TdsManager(bb8_tiberius::ConnectionManager);

#[async_trait]
impl ManageConnection for TdsManager {
    type Connection = TdsSession;
    type Error = bb8_tiberius::Error;

    async fn connect(&self) -> Result<TdsSession, Self::Error> {
        let client = self.0.connect().await?;
        Ok(TdsSession {
            client,
            in_flight: false,
        })
    }

    async fn is_valid(&self, session: &mut TdsSession) -> Result<(), Self::Error> {
        self.0.is_valid(&mut session.client).await
    }

    fn has_broken(&self, session: &mut TdsSession) -> bool {
        session.in_flight
    }
}

/// Pool of SQL Server sessions.
#[derive(Clone)]
pub struct MssqlPool {
    inner: bb8::Pool<TdsManager>,
    acquire_timeout: Duration,
}

pub type MssqlConnection<'a> = bb8::PooledConnection<'a, TdsManager>;

impl MssqlPool {
    /// Check a session out of the pool.
    pub async fn get(&self) -> ToolResult<MssqlConnection<'_>> {
        self.inner.get().await.map_err(|e| match e {
            bb8::RunError::User(e) => ToolError::from(e),
            bb8::RunError::TimedOut => ToolError::pool_exhausted(self.acquire_timeout),
        })
    }

    /// Open a session outside the pool; dropping it closes the connection.
    pub async fn dedicated_connection(&self) -> ToolResult<TdsSession> {
        Ok(self.inner.dedicated_connection().await?)
    }
}

/// Database-specific connection pool.
#[derive(Clone)]
pub enum DbPool {
    Mssql(MssqlPool),
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl std::fmt::Debug for DbPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DbPool").field(&self.db_type()).finish()
    }
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            // bb8 closes its connections once the last pool handle drops.
            DbPool::Mssql(_) => {}
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::Mssql(_) => DatabaseType::Mssql,
            DbPool::MySql(_) => DatabaseType::MySql,
            DbPool::Postgres(_) => DatabaseType::Postgres,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// How long a caller waits for a free connection.
    pub fn acquire_timeout(&self) -> Duration {
        match self {
            DbPool::Mssql(pool) => pool.acquire_timeout,
            DbPool::MySql(pool) => pool.options().get_acquire_timeout(),
            DbPool::Postgres(pool) => pool.options().get_acquire_timeout(),
            DbPool::SQLite(pool) => pool.options().get_acquire_timeout(),
        }
    }

    /// Convert a sqlx error raised on this pool.
    pub fn sqlx_error(&self, err: sqlx::Error) -> ToolError {
        match err {
            sqlx::Error::PoolTimedOut => ToolError::pool_exhausted(self.acquire_timeout()),
            other => ToolError::from(other),
        }
    }
}

/// Owns the shared pool and creates it lazily.
///
/// `ensure_connected` is safe to call from concurrent tool calls: the first
/// caller builds the pool while the rest wait on the same initialization. A
/// failed attempt leaves the manager unconnected, so the next call retries.
#[derive(Debug)]
pub struct ConnectionManager {
    settings: ConnectionSettings,
    pool: OnceCell<DbPool>,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            pool: OnceCell::new(),
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.settings.db_type
    }

    /// Configured database name (file path for SQLite).
    pub fn database_name(&self) -> Option<&str> {
        self.settings.database.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.pool.initialized()
    }

    /// Return the live pool, creating and probing it on first use.
    pub async fn ensure_connected(&self) -> ToolResult<&DbPool> {
        self.pool
            .get_or_try_init(|| async {
                info!(
                    db_type = %self.settings.db_type,
                    host = ?self.settings.host,
                    database = ?self.settings.database,
                    "Connecting to database"
                );
                let pool = create_pool(&self.settings).await?;
                if let Err(e) = ping(&pool).await {
                    pool.close().await;
                    return Err(e);
                }
                let version = server_version(&pool).await;
                info!(server_version = ?version, "Connected successfully");
                Ok(pool)
            })
            .await
    }

    /// Close the pool if it was ever opened.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            info!("Closing connection pool");
            pool.close().await;
        }
    }
}

/// Create a connection pool for the given settings.
async fn create_pool(settings: &ConnectionSettings) -> ToolResult<DbPool> {
    let pool_opts = &settings.pool_options;
    let db_type = settings.db_type;
    let is_sqlite = db_type == DatabaseType::SQLite;
    let max_connections = pool_opts.max_connections_or_default(is_sqlite);
    let min_connections = pool_opts.min_connections_or_default().min(max_connections);
    let acquire_timeout = Duration::from_secs(pool_opts.acquire_timeout_or_default());
    let idle_timeout = Some(Duration::from_secs(pool_opts.idle_timeout_or_default()));
    let max_lifetime = Some(Duration::from_secs(pool_opts.recycle_or_default()));
    let test_before_acquire = pool_opts.test_before_acquire_or_default();

    match db_type {
        DatabaseType::Mssql => {
            let manager =
                TdsManager(bb8_tiberius::ConnectionManager::new(tiberius_config(settings)?));
            let acquire_timeout = settings.connect_timeout.max(acquire_timeout);
            let inner = bb8::Pool::builder()
                .max_size(max_connections)
                .min_idle(Some(min_connections))
                .idle_timeout(idle_timeout)
                .max_lifetime(max_lifetime)
                .connection_timeout(acquire_timeout)
                .test_on_check_out(test_before_acquire)
                .build(manager)
                .await
                .map_err(|e| connect_failed(db_type, e))?;
            Ok(DbPool::Mssql(MssqlPool {
                inner,
                acquire_timeout,
            }))
        }
        DatabaseType::MySql => {
            let url = settings
                .sqlx_url()
                .map_err(|e| ToolError::connection(e, "Check SQL_SERVER_HOST and credentials"))?;
            let options = MySqlConnectOptions::from_str(&url)
                .map_err(|e| {
                    ToolError::connection(
                        format!("Invalid MySQL connection settings: {}", e),
                        "Check SQL_SERVER_HOST, SQL_SERVER_PORT and SQL_SERVER_DATABASE",
                    )
                })?
                .charset("utf8mb4");

            let pool = MySqlPoolOptions::new()
                .min_connections(min_connections)
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .max_lifetime(max_lifetime)
                .test_before_acquire(test_before_acquire)
                .connect_with(options)
                .await
                .map_err(|e| connect_failed(db_type, e))?;
            Ok(DbPool::MySql(pool))
        }
        DatabaseType::Postgres => {
            let url = settings
                .sqlx_url()
                .map_err(|e| ToolError::connection(e, "Check SQL_SERVER_HOST and credentials"))?;
            let pool = PgPoolOptions::new()
                .min_connections(min_connections)
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .max_lifetime(max_lifetime)
                .test_before_acquire(test_before_acquire)
                .connect(&url)
                .await
                .map_err(|e| connect_failed(db_type, e))?;
            Ok(DbPool::Postgres(pool))
        }
        DatabaseType::SQLite => {
            let path = settings.database.as_deref().unwrap_or_default();
            let options = if path.starts_with("sqlite:") {
                SqliteConnectOptions::from_str(path).map_err(|e| {
                    ToolError::connection(
                        format!("Invalid SQLite connection string: {}", e),
                        "Use a file path or sqlite:path/to/db.sqlite",
                    )
                })?
            } else {
                SqliteConnectOptions::new().filename(path)
            };
            let options = options.create_if_missing(true);

            let pool = SqlitePoolOptions::new()
                .min_connections(min_connections)
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .max_lifetime(max_lifetime)
                .test_before_acquire(test_before_acquire)
                .connect_with(options)
                .await
                .map_err(|e| connect_failed(db_type, e))?;
            Ok(DbPool::SQLite(pool))
        }
    }
}

fn connect_failed(db_type: DatabaseType, e: impl std::fmt::Display) -> ToolError {
    let message = e.to_string();
    let suggestion = connection_suggestion(db_type, &message);
    ToolError::connection(format!("Failed to connect: {}", message), suggestion)
}

/// Build the tiberius client configuration.
fn tiberius_config(settings: &ConnectionSettings) -> ToolResult<tiberius::Config> {
    let mut config = tiberius::Config::new();
    config.host(settings.host.as_deref().unwrap_or("localhost"));
    config.port(settings.port_or_default().unwrap_or(crate::db::dialect::DEFAULT_SQL_SERVER_PORT));
    if let Some(database) = settings.database.as_deref() {
        config.database(database);
    }
    match (settings.username.as_deref(), settings.password.as_deref()) {
        (Some(user), password) => config.authentication(tiberius::AuthMethod::sql_server(
            user,
            password.unwrap_or_default(),
        )),
        (None, _) => {
            return Err(ToolError::connection(
                "No login configured",
                "Set SQL_SERVER_USERNAME and SQL_SERVER_PASSWORD",
            ));
        }
    }
    if settings.trust_server_certificate {
        config.trust_cert();
    }
    config.application_name(env!("CARGO_PKG_NAME"));
    Ok(config)
}

/// Run the trivial liveness statement.
async fn ping(pool: &DbPool) -> ToolResult<()> {
    const PING_SQL: &str = "SELECT 1";
    match pool {
        DbPool::Mssql(p) => {
            let mut session = p.get().await?;
            session
                .begin()
                .simple_query(PING_SQL)
                .await?
                .into_results()
                .await?;
            session.finish();
        }
        DbPool::MySql(p) => {
            p.execute(PING_SQL).await.map_err(|e| pool.sqlx_error(e))?;
        }
        DbPool::Postgres(p) => {
            p.execute(PING_SQL).await.map_err(|e| pool.sqlx_error(e))?;
        }
        DbPool::SQLite(p) => {
            p.execute(PING_SQL).await.map_err(|e| pool.sqlx_error(e))?;
        }
    }
    debug!("Connection check succeeded");
    Ok(())
}

/// Get the server version from the connected database.
pub async fn server_version(pool: &DbPool) -> Option<String> {
    let sql = pool.db_type().version_sql();
    let result: Result<Option<String>, ToolError> = match pool {
        DbPool::Mssql(p) => async {
            let mut session = p.get().await?;
            let row = session.begin().simple_query(sql).await?.into_row().await?;
            session.finish();
            Ok(row.and_then(|r| r.try_get::<&str, _>(0).ok().flatten().map(str::to_string)))
        }
        .await,
        DbPool::MySql(p) => sqlx::query_scalar::<_, String>(sql)
            .fetch_optional(p)
            .await
            .map_err(|e| pool.sqlx_error(e)),
        DbPool::Postgres(p) => sqlx::query_scalar::<_, String>(sql)
            .fetch_optional(p)
            .await
            .map_err(|e| pool.sqlx_error(e)),
        DbPool::SQLite(p) => sqlx::query_scalar::<_, String>(sql)
            .fetch_optional(p)
            .await
            .map_err(|e| pool.sqlx_error(e)),
    };

    match result {
        Ok(version) => {
            debug!(version = ?version, "Got server version");
            version
        }
        Err(e) => {
            warn!(error = %e, "Failed to get server version");
            None
        }
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &str) -> String {
    let error_str = error.to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("login failed")
        || error_str.contains("authentication")
        || error_str.contains("password")
    {
        return "Verify SQL_SERVER_USERNAME and SQL_SERVER_PASSWORD".to_string();
    }

    if error_str.contains("does not exist")
        || error_str.contains("unknown database")
        || error_str.contains("cannot open database")
    {
        return "Check that SQL_SERVER_DATABASE names an existing database".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") || error_str.contains("certificate")
    {
        return match db_type {
            DatabaseType::Mssql => {
                "Set SQL_SERVER_TRUST_CERT=true for self-signed certificates".to_string()
            }
            _ => "Check TLS/SSL configuration or try disabling it".to_string(),
        };
    }

    match db_type {
        DatabaseType::Mssql => {
            "Verify SQL_SERVER_HOST and SQL_SERVER_PORT (default 1433)".to_string()
        }
        DatabaseType::Postgres => "Verify SQL_SERVER_HOST and SQL_SERVER_PORT (default 5432)".to_string(),
        DatabaseType::MySql => "Verify SQL_SERVER_HOST and SQL_SERVER_PORT (default 3306)".to_string(),
        DatabaseType::SQLite => {
            "Verify the database file path exists and is accessible".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_manager_starts_unconnected() {
        let manager = ConnectionManager::new(ConnectionSettings::sqlite("unused.db"));
        assert!(!manager.is_connected());
        assert_eq!(manager.db_type(), DatabaseType::SQLite);
        assert_eq!(manager.database_name(), Some("unused.db"));
    }

    #[tokio::test]
    async fn test_ensure_connected_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let manager = ConnectionManager::new(ConnectionSettings::sqlite(path.to_string_lossy()));

        let first = manager.ensure_connected().await.unwrap().clone();
        let second = manager.ensure_connected().await.unwrap();
        assert!(manager.is_connected());
        assert_eq!(first.db_type(), second.db_type());
        assert!(server_version(second).await.is_some());
        manager.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let manager = Arc::new(ConnectionManager::new(ConnectionSettings::sqlite(
            path.to_string_lossy(),
        )));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    let pool = manager.ensure_connected().await.unwrap();
                    pool as *const DbPool as usize
                })
            })
            .collect();

        let mut addresses = Vec::new();
        for handle in handles {
            addresses.push(handle.await.unwrap());
        }
        addresses.dedup();
        assert_eq!(addresses.len(), 1);
        assert!(manager.is_connected());
        manager.close().await;
    }

    #[tokio::test]
    async fn test_failed_connect_stays_unconnected() {
        let settings = ConnectionSettings::sqlite("/nonexistent-dir/for/sure/db.sqlite");
        let manager = ConnectionManager::new(settings);
        let err = manager.ensure_connected().await.unwrap_err();
        assert_eq!(err.kind(), "ConnectionError");
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_missing_login_for_sql_server() {
        let settings = ConnectionSettings {
            db_type: DatabaseType::Mssql,
            host: Some("db".into()),
            ..ConnectionSettings::sqlite("unused")
        };
        let err = tiberius_config(&settings).unwrap_err();
        assert!(err.suggestion().unwrap().contains("SQL_SERVER_USERNAME"));
    }

    #[test]
    fn test_connection_suggestions() {
        assert!(connection_suggestion(DatabaseType::Mssql, "Connection refused (os error 111)")
            .contains("SQL Server"));
        assert!(connection_suggestion(DatabaseType::Mssql, "Login failed for user 'sa'")
            .contains("SQL_SERVER_PASSWORD"));
        assert!(connection_suggestion(DatabaseType::Mssql, "certificate verify failed")
            .contains("SQL_SERVER_TRUST_CERT"));
        assert!(connection_suggestion(DatabaseType::Postgres, "weird").contains("5432"));
    }
}
