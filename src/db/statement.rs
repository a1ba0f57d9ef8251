//! Prepared statements that keep their routing.
//!
//! A [`WriteStatement`] is prepared on and executes against the master
//! only; a [`ReadStatement`] the follower only. Neither has a way to reach
//! the other side.

use serde::de::DeserializeOwned;

use super::{decode_one, decode_rows};
use crate::context::Context;
use crate::error::SqlDbResult;
use crate::target::TargetStatement;
use crate::value::{ExecResult, Row, Value};

/// Statement prepared on the master.
pub struct WriteStatement {
    inner: Box<dyn TargetStatement>,
}

impl WriteStatement {
    pub(crate) fn new(inner: Box<dyn TargetStatement>) -> Self {
        Self { inner }
    }

    pub fn sql(&self) -> &str {
        self.inner.sql()
    }

    pub async fn exec_context(&self, ctx: &Context, args: &[Value]) -> SqlDbResult<ExecResult> {
        Ok(ctx.run(self.inner.execute(args)).await??)
    }

    pub async fn close(self) -> SqlDbResult<()> {
        Ok(self.inner.close().await?)
    }
}

/// Statement prepared on the follower.
pub struct ReadStatement {
    inner: Box<dyn TargetStatement>,
}

impl ReadStatement {
    pub(crate) fn new(inner: Box<dyn TargetStatement>) -> Self {
        Self { inner }
    }

    pub fn sql(&self) -> &str {
        self.inner.sql()
    }

    pub async fn get_context<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        args: &[Value],
    ) -> SqlDbResult<T> {
        decode_one(ctx.run(self.inner.fetch_optional(args)).await??)
    }

    pub async fn select_context<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        args: &[Value],
    ) -> SqlDbResult<Vec<T>> {
        decode_rows(ctx.run(self.inner.fetch_all(args)).await??)
    }

    pub async fn query_context(&self, ctx: &Context, args: &[Value]) -> SqlDbResult<Vec<Row>> {
        Ok(ctx.run(self.inner.fetch_all(args)).await??)
    }

    pub async fn query_row_context(
        &self,
        ctx: &Context,
        args: &[Value],
    ) -> SqlDbResult<Option<Row>> {
        Ok(ctx.run(self.inner.fetch_optional(args)).await??)
    }

    pub async fn close(self) -> SqlDbResult<()> {
        Ok(self.inner.close().await?)
    }
}
