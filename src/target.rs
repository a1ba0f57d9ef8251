//! Target handles: one physical connection pool each.
//!
//! [`Target`] is the driver capability the router depends on. The sqlx
//! backend in [`crate::any`] implements it for real databases; tests plug in
//! instrumented fakes.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::value::{ExecResult, Row, Value};

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        })
    }
}

/// Options for [`Target::begin`]. The default is the driver's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
}

impl TxOptions {
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn is_default(&self) -> bool {
        *self == TxOptions::default()
    }
}

/// One connection pool bound to one database endpoint.
///
/// Pool tuning takes effect for connections opened afterwards and never fails.
#[async_trait]
pub trait Target: Send + Sync {
    /// Driver identifier this handle was opened with.
    fn driver_name(&self) -> &str;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), sqlx::Error>;

    async fn execute(&self, query: &str, args: &[Value]) -> Result<ExecResult, sqlx::Error>;

    async fn fetch_all(&self, query: &str, args: &[Value]) -> Result<Vec<Row>, sqlx::Error>;

    async fn fetch_optional(&self, query: &str, args: &[Value]) -> Result<Option<Row>, sqlx::Error>;

    async fn begin(&self, options: TxOptions) -> Result<Box<dyn TargetTx>, sqlx::Error>;

    async fn prepare(&self, query: &str) -> Result<Box<dyn TargetStatement>, sqlx::Error>;

    fn set_max_open_conns(&self, n: u32);

    fn set_max_idle_conns(&self, n: u32);

    fn set_conn_max_lifetime(&self, lifetime: Duration);

    /// Close every connection. Later calls fail with `PoolClosed`.
    async fn close(&self);
}

/// A prepared statement bound to one target.
#[async_trait]
pub trait TargetStatement: Send + Sync {
    fn sql(&self) -> &str;

    async fn execute(&self, args: &[Value]) -> Result<ExecResult, sqlx::Error>;

    async fn fetch_all(&self, args: &[Value]) -> Result<Vec<Row>, sqlx::Error>;

    async fn fetch_optional(&self, args: &[Value]) -> Result<Option<Row>, sqlx::Error>;

    /// Release the statement.
    async fn close(&self) -> Result<(), sqlx::Error>;
}

/// An open transaction on one target.
#[async_trait]
pub trait TargetTx: Send {
    async fn execute(&mut self, query: &str, args: &[Value]) -> Result<ExecResult, sqlx::Error>;

    async fn fetch_all(&mut self, query: &str, args: &[Value]) -> Result<Vec<Row>, sqlx::Error>;

    async fn fetch_optional(
        &mut self,
        query: &str,
        args: &[Value],
    ) -> Result<Option<Row>, sqlx::Error>;

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error>;

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error>;
}
