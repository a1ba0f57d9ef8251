//! Transactions on the master handle.

use serde::de::DeserializeOwned;

use super::{decode_one, decode_rows};
use crate::context::Context;
use crate::error::SqlDbResult;
use crate::target::TargetTx;
use crate::value::{ExecResult, Row, Value};

/// An open transaction. Dropping it without `commit` rolls it back.
pub struct Tx {
    inner: Box<dyn TargetTx>,
}

impl Tx {
    pub(crate) fn new(inner: Box<dyn TargetTx>) -> Self {
        Self { inner }
    }

    pub async fn exec(&mut self, query: &str, args: &[Value]) -> SqlDbResult<ExecResult> {
        Ok(self.inner.execute(query, args).await?)
    }

    pub async fn exec_context(
        &mut self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<ExecResult> {
        ctx.run(self.exec(query, args)).await?
    }

    pub async fn get<T: DeserializeOwned>(
        &mut self,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<T> {
        decode_one(self.inner.fetch_optional(query, args).await?)
    }

    pub async fn select<T: DeserializeOwned>(
        &mut self,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<Vec<T>> {
        decode_rows(self.inner.fetch_all(query, args).await?)
    }

    pub async fn query(&mut self, query: &str, args: &[Value]) -> SqlDbResult<Vec<Row>> {
        Ok(self.inner.fetch_all(query, args).await?)
    }

    pub async fn query_row(&mut self, query: &str, args: &[Value]) -> SqlDbResult<Option<Row>> {
        Ok(self.inner.fetch_optional(query, args).await?)
    }

    pub async fn commit(self) -> SqlDbResult<()> {
        Ok(self.inner.commit().await?)
    }

    pub async fn rollback(self) -> SqlDbResult<()> {
        Ok(self.inner.rollback().await?)
    }
}
