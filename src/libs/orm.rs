use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::libs::config::DatabaseConfig;
use crate::libs::error::{OrmError, OrmResult};
use crate::libs::executor::{execute_on, PooledConnection, RowMap, StatementConnection};
use crate::libs::schema::ModelDescriptor;

/// Database flavor, picked from the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MySql,
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn from_url(url: &str) -> OrmResult<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "mysql" | "mariadb" => Ok(Backend::MySql),
            "sqlite" => Ok(Backend::Sqlite),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            other => Err(OrmError::Config(format!("unsupported database scheme: {other:?}"))),
        }
    }

    /// Rewrites `?` placeholders into the driver's positional form. MySQL and
    /// SQLite take `?` as is; PostgreSQL wants `$1, $2, ...`. Quoted text is
    /// left untouched.
    pub fn translate_placeholders<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        if *self != Backend::Postgres || !sql.contains('?') {
            return Cow::Borrowed(sql);
        }
        let mut out = String::with_capacity(sql.len() + 8);
        let mut quote: Option<char> = None;
        let mut n = 0;
        for c in sql.chars() {
            match (quote, c) {
                (Some(q), c) if c == q => {
                    quote = None;
                    out.push(c);
                }
                (Some(_), c) => out.push(c),
                (None, '\'' | '"' | '`') => {
                    quote = Some(c);
                    out.push(c);
                }
                (None, '?') => {
                    n += 1;
                    out.push_str(&format!("${n}"));
                }
                (None, c) => out.push(c),
            }
        }
        Cow::Owned(out)
    }
}

/// Handle to the connection pool. Cheap to clone; all clones share the pool.
///
/// ```ignore
/// let mut db = Database::new(DatabaseConfig::from_url("mysql://www-data@localhost/awesome"));
/// db.connect().await?;
/// let users = User::find_all(&db, FindAll::new().order_by("created_at desc")).await?;
/// db.close().await;
/// ```
#[derive(Clone)]
pub struct Database {
    config: Arc<DatabaseConfig>,
    pool: Option<AnyPool>,
    backend: Backend,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        let backend = Backend::from_url(&config.connection_url()).unwrap_or(Backend::MySql);
        Self {
            config: Arc::new(config),
            pool: None,
            backend,
        }
    }

    /// `new` followed by `connect`.
    pub async fn create_pool(config: DatabaseConfig) -> OrmResult<Self> {
        let mut db = Self::new(config);
        db.connect().await?;
        Ok(db)
    }

    /// Opens the pool. Calling it on a connected handle does nothing.
    pub async fn connect(&mut self) -> OrmResult<()> {
        if self.pool.is_some() {
            tracing::debug!("database pool already created");
            return Ok(());
        }

        let url = self.config.connection_url();
        self.backend = Backend::from_url(&url)?;
        tracing::info!(
            "create database connection pool ({:?}, min {}, max {})...",
            self.backend,
            self.config.min_size,
            self.config.max_size
        );

        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .min_connections(self.config.min_size)
            .max_connections(self.config.max_size)
            .acquire_timeout(self.config.acquire_timeout())
            .connect(&url)
            .await?;
        self.pool = Some(pool);
        Ok(())
    }

    /// Stops handing out connections and waits until every borrowed
    /// connection is returned and closed.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            tracing::info!("closing database connection pool...");
            pool.close().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.as_ref().is_none_or(AnyPool::is_closed)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Commit mode model writes use by default.
    pub fn autocommit(&self) -> bool {
        self.config.autocommit
    }

    fn pool(&self) -> OrmResult<&AnyPool> {
        let pool = self.pool.as_ref().ok_or(OrmError::NotConnected)?;
        if pool.is_closed() {
            return Err(OrmError::PoolClosed);
        }
        Ok(pool)
    }

    /// Borrows a connection; it goes back to the pool when dropped.
    pub async fn acquire(&self) -> OrmResult<PooledConnection> {
        let conn = self
            .pool()?
            .acquire()
            .await
            .map_err(|err| OrmError::from_acquire(err, self.config.acquire_timeout()))?;
        Ok(PooledConnection::new(conn))
    }

    async fn timed<T>(&self, fut: impl Future<Output = OrmResult<T>>) -> OrmResult<T> {
        match self.config.statement_timeout_duration() {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| OrmError::Timeout(limit))?,
            None => fut.await,
        }
    }

    /// Runs a read and returns the rows as column-name maps. With `size`, at
    /// most that many rows are fetched.
    pub async fn select(&self, sql: &str, args: &[Value], size: Option<usize>) -> OrmResult<Vec<RowMap>> {
        tracing::info!("SQL: {}", sql);
        tracing::debug!("args: {}", args.len());
        let sql = self.backend.translate_placeholders(sql);
        let mut conn = self.acquire().await?;
        let rows = self.timed(conn.fetch(&sql, args, size)).await?;
        tracing::info!("rows returned: {}", rows.len());
        Ok(rows)
    }

    /// Runs a write and returns the affected-row count. With `autocommit`
    /// off the statement runs inside its own transaction and is rolled back
    /// on failure, including a statement timeout.
    pub async fn execute(&self, sql: &str, args: &[Value], autocommit: bool) -> OrmResult<u64> {
        tracing::info!("SQL: {}", sql);
        tracing::debug!("args: {}", args.len());
        let sql = self.backend.translate_placeholders(sql);
        let mut conn = self.acquire().await?;
        match self.timed(execute_on(&mut conn, &sql, args, autocommit)).await {
            Err(OrmError::Timeout(limit)) if !autocommit => {
                tracing::warn!("statement timed out after {:?} inside a transaction, rolling back", limit);
                conn.abandon_transaction(self.config.acquire_timeout()).await;
                Err(OrmError::Timeout(limit))
            }
            outcome => outcome,
        }
    }

    /// Creates the tables of the given models if they do not exist yet.
    pub async fn create_tables(&self, descriptors: &[&ModelDescriptor]) -> OrmResult<()> {
        for descriptor in descriptors {
            self.execute(&descriptor.create_table_sql(), &[], true).await?;
        }
        Ok(())
    }
}
