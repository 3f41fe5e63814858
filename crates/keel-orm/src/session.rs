//! Sessions: the executor contract shared by the database handle and
//! transactions, plus the sqlx-backed implementations.

use crate::dialect::{Dialect, SqliteDialect};
use crate::middleware::{apply, Handler, Middleware, QueryContext, QueryOutcome};
use crate::model::Registry;
use crate::{OrmError, Value};
use async_trait::async_trait;
use futures::future::FutureExt;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Row as _, TypeInfo as _, ValueRef as _};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;

/// An owned snapshot of one result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

/// Driver result of a mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: i64,
}

/// State shared by every builder hanging off a session: the model
/// registry, the dialect, and the middleware stack.
#[derive(Clone)]
pub struct Core {
    pub(crate) registry: Arc<Registry>,
    pub(crate) dialect: Arc<dyn Dialect>,
    pub(crate) middlewares: Vec<Middleware>,
}

/// An executor: the top-level [`Db`] and a [`Tx`] both satisfy it, so
/// builders run unchanged inside or outside a transaction.
#[async_trait]
pub trait Session: Send + Sync {
    fn core(&self) -> &Core;

    async fn query_rows(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, OrmError>;

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult, OrmError>;
}

/// Configures and opens a [`Db`].
pub struct DbBuilder {
    max_connections: u32,
    dialect: Arc<dyn Dialect>,
    middlewares: Vec<Middleware>,
}

impl DbBuilder {
    fn new() -> Self {
        Self {
            max_connections: 5,
            dialect: Arc::new(SqliteDialect),
            middlewares: Vec::new(),
        }
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// The dialect statements are generated in. The shipped driver is
    /// SQLite; other dialects are for SQL generation against compatible
    /// servers.
    pub fn dialect(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.dialect = dialect;
        self
    }

    /// Appends a middleware; the first appended wraps outermost.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub async fn connect(self, url: &str) -> Result<Db, OrmError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect(url)
            .await?;
        Ok(Db {
            pool,
            core: Arc::new(Core {
                registry: Arc::new(Registry::new()),
                dialect: self.dialect,
                middlewares: self.middlewares,
            }),
        })
    }
}

/// The database handle: a connection pool plus the shared [`Core`].
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
    core: Arc<Core>,
}

impl Db {
    pub fn builder() -> DbBuilder {
        DbBuilder::new()
    }

    /// Opens with defaults; `sqlite::memory:` works for tests.
    pub async fn open(url: &str) -> Result<Self, OrmError> {
        DbBuilder::new().connect(url).await
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.core.registry
    }

    pub async fn begin_tx(&self) -> Result<Tx, OrmError> {
        let tx = self.pool.begin().await?;
        Ok(Tx {
            inner: Arc::new(TxInner {
                tx: Mutex::new(Some(tx)),
            }),
            core: Arc::clone(&self.core),
        })
    }

    /// Runs `f` inside a transaction: commit on success, rollback on
    /// error, rollback on panic. A rollback failure is reported together
    /// with what triggered it.
    pub async fn in_tx<R, F, Fut>(&self, f: F) -> Result<R, OrmError>
    where
        F: FnOnce(Tx) -> Fut,
        Fut: std::future::Future<Output = Result<R, OrmError>>,
    {
        let tx = self.begin_tx().await?;
        let outcome = AssertUnwindSafe(f(tx.clone())).catch_unwind().await;
        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            Ok(Err(err)) => Err(rolled_back(&tx, err).await),
            Err(_) => Err(rolled_back(&tx, OrmError::TxPanic).await),
        }
    }
}

async fn rolled_back(tx: &Tx, source: OrmError) -> OrmError {
    match tx.rollback().await {
        Ok(()) => source,
        Err(rollback) => OrmError::RollbackFailed {
            source: Box::new(source),
            rollback: rollback.to_string(),
        },
    }
}

#[async_trait]
impl Session for Db {
    fn core(&self) -> &Core {
        &self.core
    }

    async fn query_rows(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, OrmError> {
        let rows = bind_args(sqlx::query(sql), args)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(convert_row).collect()
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult, OrmError> {
        let result = bind_args(sqlx::query(sql), args)
            .execute(&self.pool)
            .await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_rowid(),
        })
    }
}

struct TxInner {
    tx: Mutex<Option<sqlx::Transaction<'static, sqlx::Sqlite>>>,
}

/// A live transaction. Clones share the underlying transaction, so one
/// clone can be handed to `in_tx`'s closure while the original commits
/// or rolls back. Using a finished transaction reports
/// [`OrmError::TxFinished`].
#[derive(Clone)]
pub struct Tx {
    inner: Arc<TxInner>,
    core: Arc<Core>,
}

impl Tx {
    pub async fn commit(&self) -> Result<(), OrmError> {
        let mut guard = self.inner.tx.lock().await;
        let tx = guard.take().ok_or(OrmError::TxFinished)?;
        tx.commit().await.map_err(Into::into)
    }

    pub async fn rollback(&self) -> Result<(), OrmError> {
        let mut guard = self.inner.tx.lock().await;
        let tx = guard.take().ok_or(OrmError::TxFinished)?;
        tx.rollback().await.map_err(Into::into)
    }
}

#[async_trait]
impl Session for Tx {
    fn core(&self) -> &Core {
        &self.core
    }

    async fn query_rows(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, OrmError> {
        let mut guard = self.inner.tx.lock().await;
        let tx = guard.as_mut().ok_or(OrmError::TxFinished)?;
        let rows = bind_args(sqlx::query(sql), args)
            .fetch_all(&mut **tx)
            .await?;
        rows.iter().map(convert_row).collect()
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult, OrmError> {
        let mut guard = self.inner.tx.lock().await;
        let tx = guard.as_mut().ok_or(OrmError::TxFinished)?;
        let result = bind_args(sqlx::query(sql), args)
            .execute(&mut **tx)
            .await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_rowid(),
        })
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_args<'q>(mut query: SqliteQuery<'q>, args: &[Value]) -> SqliteQuery<'q> {
    for value in args {
        query = match value {
            Value::Null => query.bind(None::<i64>),
            Value::Bool(b) => query.bind(*b),
            Value::I64(i) => query.bind(*i),
            Value::F64(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
        };
    }
    query
}

/// Decodes a driver row into the owned [`Row`] snapshot by storage class.
fn convert_row(row: &SqliteRow) -> Result<Row, OrmError> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for column in row.columns() {
        let index = column.ordinal();
        columns.push(column.name().to_string());
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "BOOLEAN" => Value::Bool(row.try_get(index)?),
                "INTEGER" => Value::I64(row.try_get(index)?),
                "REAL" => Value::F64(row.try_get(index)?),
                "BLOB" => Value::Bytes(row.try_get(index)?),
                _ => Value::Text(row.try_get(index)?),
            }
        };
        values.push(value);
    }
    Ok(Row { columns, values })
}

fn base_rows_handler(sess: Arc<dyn Session>) -> Handler {
    Arc::new(move |qc: QueryContext| {
        let sess = Arc::clone(&sess);
        Box::pin(async move {
            tracing::debug!(sql = %qc.statement.sql, "executing query");
            let rows = sess
                .query_rows(&qc.statement.sql, &qc.statement.args)
                .await?;
            Ok(QueryOutcome::Rows(rows))
        })
    })
}

fn base_exec_handler(sess: Arc<dyn Session>) -> Handler {
    Arc::new(move |qc: QueryContext| {
        let sess = Arc::clone(&sess);
        Box::pin(async move {
            tracing::debug!(sql = %qc.statement.sql, "executing statement");
            let result = sess.execute(&qc.statement.sql, &qc.statement.args).await?;
            Ok(QueryOutcome::Exec(result))
        })
    })
}

/// Runs a row-producing context through the middleware stack.
pub(crate) async fn run_rows(
    sess: &Arc<dyn Session>,
    qc: QueryContext,
) -> Result<Vec<Row>, OrmError> {
    let handler = apply(&sess.core().middlewares, base_rows_handler(Arc::clone(sess)));
    match handler(qc).await? {
        QueryOutcome::Rows(rows) => Ok(rows),
        QueryOutcome::Exec(_) => Err(OrmError::OutcomeMismatch),
    }
}

/// Runs a mutating context through the middleware stack.
pub(crate) async fn run_exec(
    sess: &Arc<dyn Session>,
    qc: QueryContext,
) -> Result<ExecResult, OrmError> {
    let handler = apply(&sess.core().middlewares, base_exec_handler(Arc::clone(sess)));
    match handler(qc).await? {
        QueryOutcome::Exec(result) => Ok(result),
        QueryOutcome::Rows(_) => Err(OrmError::OutcomeMismatch),
    }
}
