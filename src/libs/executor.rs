use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Any, Column, Executor, Row};

use crate::libs::error::OrmResult;

/// A single result row: column name to value.
pub type RowMap = Map<String, Value>;

/// One borrowed database connection, as seen by statement execution.
#[async_trait]
pub trait StatementConnection: Send {
    async fn begin(&mut self) -> OrmResult<()>;
    async fn commit(&mut self) -> OrmResult<()>;
    async fn rollback(&mut self) -> OrmResult<()>;
    /// Runs a write and returns the affected-row count.
    async fn execute(&mut self, sql: &str, args: &[Value]) -> OrmResult<u64>;
    /// Runs a read, stopping after `size` rows when given.
    async fn fetch(&mut self, sql: &str, args: &[Value], size: Option<usize>) -> OrmResult<Vec<RowMap>>;
}

/// Runs a write on `conn`, wrapping it in a transaction when `autocommit` is
/// off. A failed statement (or commit) is rolled back before the original
/// error is returned.
pub async fn execute_on<C>(conn: &mut C, sql: &str, args: &[Value], autocommit: bool) -> OrmResult<u64>
where
    C: StatementConnection + ?Sized,
{
    if !autocommit {
        conn.begin().await?;
    }

    let outcome = match conn.execute(sql, args).await {
        Ok(affected) if !autocommit => conn.commit().await.map(|_| affected),
        other => other,
    };

    match outcome {
        Ok(affected) => Ok(affected),
        Err(err) => {
            if !autocommit {
                if let Err(rollback_err) = conn.rollback().await {
                    tracing::error!("rollback failed after statement error: {}", rollback_err);
                }
            }
            Err(err)
        }
    }
}

/// A pooled `sqlx` connection. Dropping it hands the connection back to the
/// pool.
pub struct PooledConnection {
    conn: PoolConnection<Any>,
}

impl PooledConnection {
    pub(crate) fn new(conn: PoolConnection<Any>) -> Self {
        Self { conn }
    }

    /// Cleans up after a transactional write whose future was dropped
    /// mid-flight. The rollback waits for the driver to finish the abandoned
    /// statement, up to `wait`; if it cannot complete, the connection is
    /// closed instead of going back to the pool inside an open transaction.
    pub(crate) async fn abandon_transaction(&mut self, wait: Duration) {
        match tokio::time::timeout(wait, self.rollback()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!("rollback after timeout failed, discarding connection: {}", err);
                self.conn.close_on_drop();
            }
            Err(_) => {
                tracing::error!("rollback after timeout did not finish in {:?}, discarding connection", wait);
                self.conn.close_on_drop();
            }
        }
    }
}

#[async_trait]
impl StatementConnection for PooledConnection {
    async fn begin(&mut self) -> OrmResult<()> {
        (&mut *self.conn).execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&mut self) -> OrmResult<()> {
        (&mut *self.conn).execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        (&mut *self.conn).execute("ROLLBACK").await?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> OrmResult<u64> {
        let result = bind_all(sqlx::query(sql), args)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn fetch(&mut self, sql: &str, args: &[Value], size: Option<usize>) -> OrmResult<Vec<RowMap>> {
        let query = bind_all(sqlx::query(sql), args);
        let rows = match size {
            Some(limit) => {
                let mut stream = query.fetch(&mut *self.conn);
                let mut rows = Vec::with_capacity(limit);
                while rows.len() < limit {
                    match stream.try_next().await? {
                        Some(row) => rows.push(row),
                        None => break,
                    }
                }
                rows
            }
            None => query.fetch_all(&mut *self.conn).await?,
        };
        Ok(rows.iter().map(row_to_map).collect())
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    args: &[Value],
) -> Query<'q, Any, AnyArguments<'q>> {
    for v in args {
        query = match v {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

fn row_to_map(r: &AnyRow) -> RowMap {
    let mut map = Map::new();
    for col in r.columns() {
        let col_name = col.name();
        let value = match r.try_get::<Option<i64>, _>(col_name) {
            Ok(Some(v)) => Value::from(v),
            Ok(None) => Value::Null,
            Err(_) => match r.try_get::<Option<f64>, _>(col_name) {
                Ok(Some(v)) => Value::from(v),
                Ok(None) => Value::Null,
                Err(_) => match r.try_get::<Option<bool>, _>(col_name) {
                    Ok(Some(v)) => Value::from(v),
                    Ok(None) => Value::Null,
                    Err(_) => match r.try_get::<Option<String>, _>(col_name) {
                        Ok(Some(v)) => Value::from(v),
                        Ok(None) => Value::Null,
                        Err(_) => Value::Null, // fallback
                    },
                },
            },
        };
        map.insert(col_name.to_string(), value);
    }
    map
}
