//! The routed database.
//!
//! [`Db`] owns two target handles. Writes, transactions and write
//! statements go to the master; reads and read statements go to the
//! follower. Without a follower DSN the follower *is* the master handle.
//! Pool settings always apply to both.
//!
//! ```rust,ignore
//! let ctx = Context::background();
//! let db = Db::connect(&ctx, &DbConfig::new("postgres", primary).with_follower(replica)).await?;
//!
//! db.exec("UPDATE users SET active = ? WHERE id = ?", args![true, 7]).await?;
//! let user: User = db.get("SELECT * FROM users WHERE id = ?", args![7]).await?;
//! ```

mod follower;
mod master;
mod statement;
mod tx;

pub use follower::Follower;
pub use master::Master;
pub use statement::{ReadStatement, WriteStatement};
pub use tx::Tx;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::bind::{self, BindType, normalize_driver};
use crate::config::DbConfig;
use crate::connector::Connector;
use crate::context::Context;
use crate::error::{Role, SqlDbError, SqlDbResult};
use crate::target::{Target, TxOptions};
use crate::value::{ExecResult, Row, Value};

/// Default bound for [`Db::ping`].
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(3);

pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> SqlDbResult<Vec<T>> {
    rows.iter().map(Row::decode).collect()
}

pub(crate) fn decode_one<T: DeserializeOwned>(row: Option<Row>) -> SqlDbResult<T> {
    match row {
        Some(row) => row.decode(),
        None => Err(SqlDbError::Query(sqlx::Error::RowNotFound)),
    }
}

/// A master/follower pair behind one handle.
#[derive(Clone)]
pub struct Db {
    master: Master,
    follower: Follower,
    driver: String,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("driver", &self.driver)
            .field("follower_is_master", &self.follower_is_master())
            .finish()
    }
}

impl Db {
    /// Assemble from open handles. `None` routes reads to `master`.
    pub fn new(master: Arc<dyn Target>, follower: Option<Arc<dyn Target>>, driver: &str) -> Self {
        let driver = normalize_driver(driver).to_string();
        let bind = BindType::for_driver(&driver);
        let follower = follower.unwrap_or_else(|| Arc::clone(&master));
        Self {
            master: Master::new(master, bind),
            follower: Follower::new(follower, bind),
            driver,
        }
    }

    /// Connect with the sqlx drivers, logging through `tracing`.
    pub async fn connect(ctx: &Context, config: &DbConfig) -> SqlDbResult<Self> {
        Self::connect_with(ctx, config, &Connector::default()).await
    }

    /// Connect master, then follower, then apply pool settings.
    ///
    /// If the follower cannot be reached the master is closed again.
    pub async fn connect_with(
        ctx: &Context,
        config: &DbConfig,
        connector: &Connector,
    ) -> SqlDbResult<Self> {
        config.validate()?;
        let retry = config.effective_retry();

        let master = connector
            .establish(ctx, &config.driver, &config.master, retry, config.no_ping_on_open)
            .await?;

        let follower = match config.follower_dsn() {
            Some(dsn) => match connector
                .establish(ctx, &config.driver, dsn, retry, config.no_ping_on_open)
                .await
            {
                Ok(target) => Some(target),
                Err(err) => {
                    master.close().await;
                    return Err(err);
                }
            },
            None => None,
        };

        let db = Self::new(master, follower, &config.driver);
        if let Some(n) = config.max_idle() {
            db.set_max_idle_conns(n);
        }
        if let Some(n) = config.max_open() {
            db.set_max_open_conns(n);
        }
        if let Some(lifetime) = config.max_lifetime() {
            db.set_conn_max_lifetime(lifetime);
        }

        tracing::debug!(
            target: "sqldb",
            driver = %db.driver,
            follower = config.follower_dsn().is_some(),
            "database connected"
        );
        Ok(db)
    }

    /// Normalized driver name.
    pub fn driver_name(&self) -> &str {
        &self.driver
    }

    pub fn bind_type(&self) -> BindType {
        BindType::for_driver(&self.driver)
    }

    pub fn master(&self) -> &Master {
        &self.master
    }

    pub fn follower(&self) -> &Follower {
        &self.follower
    }

    pub fn master_target(&self) -> &Arc<dyn Target> {
        self.master.target()
    }

    pub fn follower_target(&self) -> &Arc<dyn Target> {
        self.follower.target()
    }

    /// True when reads share the master handle.
    pub fn follower_is_master(&self) -> bool {
        Arc::ptr_eq(self.master.target(), self.follower.target())
    }

    /// Rewrite `?` placeholders for this driver.
    pub fn rebind(&self, query: &str) -> String {
        bind::rebind(self.bind_type(), query)
    }

    /// Compile `:name` parameters for this driver and collect their values.
    pub fn bind_named<A: Serialize + ?Sized>(
        &self,
        query: &str,
        arg: &A,
    ) -> SqlDbResult<(String, Vec<Value>)> {
        bind::bind_named(self.bind_type(), query, arg)
    }

    /// Probe both handles with [`DEFAULT_PING_TIMEOUT`].
    pub async fn ping(&self) -> SqlDbResult<()> {
        let ctx = Context::background().with_timeout(DEFAULT_PING_TIMEOUT);
        self.ping_context(&ctx).await
    }

    /// Probe master and follower concurrently.
    ///
    /// Master's failure is reported first when both fail.
    pub async fn ping_context(&self, ctx: &Context) -> SqlDbResult<()> {
        let (master, follower) = tokio::join!(
            ctx.run(self.master.target().ping()),
            ctx.run(self.follower.target().ping()),
        );
        health(Role::Master, master)?;
        health(Role::Follower, follower)
    }

    pub fn set_max_idle_conns(&self, n: u32) {
        self.master.target().set_max_idle_conns(n);
        self.follower.target().set_max_idle_conns(n);
    }

    pub fn set_max_open_conns(&self, n: u32) {
        self.master.target().set_max_open_conns(n);
        self.follower.target().set_max_open_conns(n);
    }

    pub fn set_conn_max_lifetime(&self, lifetime: Duration) {
        self.master.target().set_conn_max_lifetime(lifetime);
        self.follower.target().set_conn_max_lifetime(lifetime);
    }

    /// Close the master and, when it is a separate handle, the follower.
    pub async fn close(&self) {
        self.master.target().close().await;
        if !self.follower_is_master() {
            self.follower.target().close().await;
        }
    }

    // Reads, routed to the follower.

    pub async fn get<T: DeserializeOwned>(&self, query: &str, args: &[Value]) -> SqlDbResult<T> {
        self.follower.get(query, args).await
    }

    pub async fn get_context<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<T> {
        self.follower.get_context(ctx, query, args).await
    }

    pub async fn select<T: DeserializeOwned>(
        &self,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<Vec<T>> {
        self.follower.select(query, args).await
    }

    pub async fn select_context<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<Vec<T>> {
        self.follower.select_context(ctx, query, args).await
    }

    pub async fn query(&self, query: &str, args: &[Value]) -> SqlDbResult<Vec<Row>> {
        self.follower.query(query, args).await
    }

    pub async fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<Vec<Row>> {
        self.follower.query_context(ctx, query, args).await
    }

    pub async fn query_row(&self, query: &str, args: &[Value]) -> SqlDbResult<Option<Row>> {
        self.follower.query_row(query, args).await
    }

    pub async fn query_row_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<Option<Row>> {
        self.follower.query_row_context(ctx, query, args).await
    }

    pub async fn named_query<A: Serialize + ?Sized>(
        &self,
        query: &str,
        arg: &A,
    ) -> SqlDbResult<Vec<Row>> {
        self.follower.named_query(query, arg).await
    }

    pub async fn named_query_context<A: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        query: &str,
        arg: &A,
    ) -> SqlDbResult<Vec<Row>> {
        self.follower.named_query_context(ctx, query, arg).await
    }

    // Writes, routed to the master.

    pub async fn exec(&self, query: &str, args: &[Value]) -> SqlDbResult<ExecResult> {
        self.master.exec(query, args).await
    }

    pub async fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<ExecResult> {
        self.master.exec_context(ctx, query, args).await
    }

    pub async fn begin(&self) -> SqlDbResult<Tx> {
        self.master.begin().await
    }

    pub async fn begin_tx(&self, ctx: &Context, options: TxOptions) -> SqlDbResult<Tx> {
        self.master.begin_tx(ctx, options).await
    }

    pub async fn named_exec<A: Serialize + ?Sized>(
        &self,
        query: &str,
        arg: &A,
    ) -> SqlDbResult<ExecResult> {
        self.master.named_exec(query, arg).await
    }

    pub async fn named_exec_context<A: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        query: &str,
        arg: &A,
    ) -> SqlDbResult<ExecResult> {
        self.master.named_exec_context(ctx, query, arg).await
    }

    // Prepared statements keep the routing of the side they were prepared on.

    pub async fn prepare_write(&self, ctx: &Context, query: &str) -> SqlDbResult<WriteStatement> {
        self.master.prepare(ctx, query).await
    }

    pub async fn prepare_read(&self, ctx: &Context, query: &str) -> SqlDbResult<ReadStatement> {
        self.follower.prepare(ctx, query).await
    }
}

fn health(role: Role, probe: SqlDbResult<Result<(), sqlx::Error>>) -> SqlDbResult<()> {
    let source = match probe {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => err,
        Err(SqlDbError::Cancelled) => {
            io::Error::new(io::ErrorKind::Interrupted, "context cancelled").into()
        }
        Err(ctx_err) => io::Error::new(io::ErrorKind::TimedOut, ctx_err.to_string()).into(),
    };
    Err(SqlDbError::HealthCheck { role, source })
}
