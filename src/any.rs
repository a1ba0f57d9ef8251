//! sqlx backend.
//!
//! Serves postgres, mysql and sqlite through `sqlx::AnyPool`; the backend
//! is picked from the DSN's URL scheme. sqlx fixes pool options when a pool
//! is built, so retuning builds a fresh lazy pool with the new options,
//! swaps it in, and drains the old one in the background.
//!
//! Handles must be opened and retuned inside a tokio runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyQueryResult, AnyRow, AnyStatement};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column, Connection, Executor, Row as _, Statement, TypeInfo, ValueRef};

use crate::bind::normalize_driver;
use crate::driver::Driver;
use crate::redact::redact_dsn;
use crate::target::{Target, TargetStatement, TargetTx, TxOptions};
use crate::value::{ExecResult, Row, Value};

/// sqlx's own default for `max_connections`.
const DEFAULT_MAX_OPEN: u32 = 10;

/// The sqlx `Any` driver.
#[derive(Debug, Clone, Copy)]
pub struct AnyDriver;

impl AnyDriver {
    pub fn new() -> Self {
        sqlx::any::install_default_drivers();
        AnyDriver
    }
}

impl Default for AnyDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for AnyDriver {
    fn open(&self, driver_name: &str, dsn: &str) -> Result<Arc<dyn Target>, sqlx::Error> {
        Ok(Arc::new(AnyTarget::open(driver_name, dsn)?))
    }
}

/// Pool settings carried across retunes. `None` leaves sqlx's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct PoolTuning {
    max_open: Option<u32>,
    max_idle: Option<u32>,
    max_lifetime: Option<Duration>,
}

impl PoolTuning {
    fn options(&self) -> AnyPoolOptions {
        let mut options = AnyPoolOptions::new();
        if let Some(n) = self.max_open {
            options = options.max_connections(n);
        }
        // sqlx has no idle ceiling; the idle setting becomes the number of
        // connections kept warm.
        if let Some(n) = self.max_idle {
            options = options.min_connections(n.min(self.max_open.unwrap_or(DEFAULT_MAX_OPEN)));
        }
        if let Some(lifetime) = self.max_lifetime {
            options = options.max_lifetime(lifetime);
        }
        options
    }
}

struct PoolState {
    pool: AnyPool,
    tuning: PoolTuning,
}

/// A [`Target`] over one `AnyPool`.
pub struct AnyTarget {
    driver: String,
    dsn: String,
    state: ArcSwap<PoolState>,
    closed: AtomicBool,
}

impl AnyTarget {
    /// Build a lazy pool; nothing connects until first use.
    pub fn open(driver_name: &str, dsn: &str) -> Result<Self, sqlx::Error> {
        let tuning = PoolTuning::default();
        let pool = tuning.options().connect_lazy(dsn)?;
        Ok(Self {
            driver: driver_name.to_string(),
            dsn: dsn.to_string(),
            state: ArcSwap::from_pointee(PoolState { pool, tuning }),
            closed: AtomicBool::new(false),
        })
    }

    /// The pool currently serving requests.
    pub fn pool(&self) -> AnyPool {
        self.state.load().pool.clone()
    }

    fn is_postgres(&self) -> bool {
        matches!(normalize_driver(&self.driver), "postgres" | "postgresql")
    }

    fn retune(&self, apply: impl FnOnce(&mut PoolTuning)) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let current = self.state.load_full();
        let mut tuning = current.tuning;
        apply(&mut tuning);
        if tuning == current.tuning {
            return;
        }

        match tuning.options().connect_lazy(&self.dsn) {
            Ok(pool) => {
                let old = self.state.swap(Arc::new(PoolState { pool, tuning }));
                retire(old.pool.clone());
            }
            Err(e) => tracing::warn!(
                target: "sqldb",
                "failed to retune pool for {}: {}",
                redact_dsn(&self.dsn),
                e
            ),
        }
    }
}

/// Close a replaced pool once its checked-out connections come back.
fn retire(pool: AnyPool) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move { pool.close().await });
    }
}

fn bind_values<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    args: &[Value],
) -> Query<'q, Any, AnyArguments<'q>> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
            Value::Bytes(v) => query.bind(v.clone()),
        };
    }
    query
}

fn exec_result(result: &AnyQueryResult) -> ExecResult {
    ExecResult::new(result.rows_affected(), result.last_insert_id())
}

fn column<'r, T>(row: &'r AnyRow, index: usize) -> Result<Option<T>, sqlx::Error>
where
    T: sqlx::Decode<'r, Any> + sqlx::Type<Any>,
{
    row.try_get::<Option<T>, _>(index)
}

/// Convert an AnyRow to a Row.
///
/// Dispatch is on each value's own type, not the column's declared type:
/// sqlite reports expression columns such as `count(*)` as untyped.
fn convert_row(row: &AnyRow) -> Result<Row, sqlx::Error> {
    let mut columns = Vec::with_capacity(row.columns().len());
    let mut values = Vec::with_capacity(row.columns().len());

    for (i, col) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            None
        } else {
            match raw.type_info().name() {
                "NULL" => None,
                "BOOLEAN" => column::<bool>(row, i)?.map(Value::Bool),
                "SMALLINT" => column::<i16>(row, i)?.map(|v| Value::Int(v.into())),
                "INTEGER" => column::<i32>(row, i)?.map(|v| Value::Int(v.into())),
                "BIGINT" => column::<i64>(row, i)?.map(Value::Int),
                "REAL" => column::<f32>(row, i)?.map(|v| Value::Float(v.into())),
                "DOUBLE" => column::<f64>(row, i)?.map(Value::Float),
                "BLOB" => column::<Vec<u8>>(row, i)?.map(Value::Bytes),
                _ => column::<String>(row, i)?.map(Value::Text),
            }
        };
        columns.push(col.name().to_string());
        values.push(value.unwrap_or(Value::Null));
    }

    Ok(Row::new(columns, values))
}

fn convert_rows(rows: &[AnyRow]) -> Result<Vec<Row>, sqlx::Error> {
    rows.iter().map(convert_row).collect()
}

#[async_trait]
impl Target for AnyTarget {
    fn driver_name(&self) -> &str {
        &self.driver
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        conn.ping().await
    }

    async fn execute(&self, query: &str, args: &[Value]) -> Result<ExecResult, sqlx::Error> {
        let pool = self.pool();
        let result = bind_values(sqlx::query(query), args).execute(&pool).await?;
        Ok(exec_result(&result))
    }

    async fn fetch_all(&self, query: &str, args: &[Value]) -> Result<Vec<Row>, sqlx::Error> {
        let pool = self.pool();
        let rows = bind_values(sqlx::query(query), args).fetch_all(&pool).await?;
        convert_rows(&rows)
    }

    async fn fetch_optional(
        &self,
        query: &str,
        args: &[Value],
    ) -> Result<Option<Row>, sqlx::Error> {
        let pool = self.pool();
        let row = bind_values(sqlx::query(query), args)
            .fetch_optional(&pool)
            .await?;
        row.as_ref().map(convert_row).transpose()
    }

    async fn begin(&self, options: TxOptions) -> Result<Box<dyn TargetTx>, sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        if options.is_default() {
            return Ok(Box::new(AnyTx { tx }));
        }

        if !self.is_postgres() {
            tx.rollback().await?;
            return Err(sqlx::Error::Configuration(
                format!("transaction options are not supported by driver {}", self.driver).into(),
            ));
        }

        let mut modes = Vec::new();
        if let Some(level) = options.isolation {
            modes.push(format!("ISOLATION LEVEL {}", level));
        }
        if options.read_only {
            modes.push("READ ONLY".to_string());
        }
        let sql = format!("SET TRANSACTION {}", modes.join(", "));
        sqlx::query(&sql).execute(&mut *tx).await?;
        Ok(Box::new(AnyTx { tx }))
    }

    async fn prepare(&self, query: &str) -> Result<Box<dyn TargetStatement>, sqlx::Error> {
        let pool = self.pool();
        let prepared = pool.prepare(query).await?;
        let statement = Statement::to_owned(&prepared);
        Ok(Box::new(AnyPreparedStatement {
            pool,
            statement,
            closed: AtomicBool::new(false),
        }))
    }

    fn set_max_open_conns(&self, n: u32) {
        self.retune(|t| t.max_open = (n > 0).then_some(n));
    }

    fn set_max_idle_conns(&self, n: u32) {
        self.retune(|t| t.max_idle = (n > 0).then_some(n));
    }

    fn set_conn_max_lifetime(&self, lifetime: Duration) {
        self.retune(|t| t.max_lifetime = (!lifetime.is_zero()).then_some(lifetime));
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.pool().close().await;
    }
}

struct AnyPreparedStatement {
    pool: AnyPool,
    statement: AnyStatement<'static>,
    closed: AtomicBool,
}

impl AnyPreparedStatement {
    fn check_open(&self) -> Result<(), sqlx::Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(sqlx::Error::Protocol(format!(
                "statement is closed: {}",
                self.statement.sql()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetStatement for AnyPreparedStatement {
    fn sql(&self) -> &str {
        self.statement.sql()
    }

    async fn execute(&self, args: &[Value]) -> Result<ExecResult, sqlx::Error> {
        self.check_open()?;
        let result = bind_values(self.statement.query(), args)
            .execute(&self.pool)
            .await?;
        Ok(exec_result(&result))
    }

    async fn fetch_all(&self, args: &[Value]) -> Result<Vec<Row>, sqlx::Error> {
        self.check_open()?;
        let rows = bind_values(self.statement.query(), args)
            .fetch_all(&self.pool)
            .await?;
        convert_rows(&rows)
    }

    async fn fetch_optional(&self, args: &[Value]) -> Result<Option<Row>, sqlx::Error> {
        self.check_open()?;
        let row = bind_values(self.statement.query(), args)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(convert_row).transpose()
    }

    async fn close(&self) -> Result<(), sqlx::Error> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct AnyTx {
    tx: sqlx::Transaction<'static, Any>,
}

#[async_trait]
impl TargetTx for AnyTx {
    async fn execute(&mut self, query: &str, args: &[Value]) -> Result<ExecResult, sqlx::Error> {
        let result = bind_values(sqlx::query(query), args)
            .execute(&mut *self.tx)
            .await?;
        Ok(exec_result(&result))
    }

    async fn fetch_all(&mut self, query: &str, args: &[Value]) -> Result<Vec<Row>, sqlx::Error> {
        let rows = bind_values(sqlx::query(query), args)
            .fetch_all(&mut *self.tx)
            .await?;
        convert_rows(&rows)
    }

    async fn fetch_optional(
        &mut self,
        query: &str,
        args: &[Value],
    ) -> Result<Option<Row>, sqlx::Error> {
        let row = bind_values(sqlx::query(query), args)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(convert_row).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}
