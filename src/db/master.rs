//! Write capability, bound to the master handle.

use std::sync::Arc;

use serde::Serialize;

use super::statement::WriteStatement;
use super::tx::Tx;
use crate::bind::{BindType, bind_named};
use crate::context::Context;
use crate::error::SqlDbResult;
use crate::target::{Target, TxOptions};
use crate::value::{ExecResult, Value};

/// Writes and transactions. Every call goes to the master handle.
#[derive(Clone)]
pub struct Master {
    target: Arc<dyn Target>,
    bind: BindType,
}

impl Master {
    pub(crate) fn new(target: Arc<dyn Target>, bind: BindType) -> Self {
        Self { target, bind }
    }

    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    pub async fn exec(&self, query: &str, args: &[Value]) -> SqlDbResult<ExecResult> {
        Ok(self.target.execute(query, args).await?)
    }

    pub async fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<ExecResult> {
        ctx.run(self.exec(query, args)).await?
    }

    /// Start a transaction with the driver's default options.
    pub async fn begin(&self) -> SqlDbResult<Tx> {
        Ok(Tx::new(self.target.begin(TxOptions::default()).await?))
    }

    pub async fn begin_tx(&self, ctx: &Context, options: TxOptions) -> SqlDbResult<Tx> {
        let inner = ctx.run(self.target.begin(options)).await??;
        Ok(Tx::new(inner))
    }

    /// Exec with `:name` parameters taken from `arg`.
    pub async fn named_exec<A: Serialize + ?Sized>(
        &self,
        query: &str,
        arg: &A,
    ) -> SqlDbResult<ExecResult> {
        let (sql, values) = bind_named(self.bind, query, arg)?;
        self.exec(&sql, &values).await
    }

    pub async fn named_exec_context<A: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        query: &str,
        arg: &A,
    ) -> SqlDbResult<ExecResult> {
        let (sql, values) = bind_named(self.bind, query, arg)?;
        self.exec_context(ctx, &sql, &values).await
    }

    /// Prepare `query` on the master.
    pub async fn prepare(&self, ctx: &Context, query: &str) -> SqlDbResult<WriteStatement> {
        let inner = ctx.run(self.target.prepare(query)).await??;
        Ok(WriteStatement::new(inner))
    }
}
