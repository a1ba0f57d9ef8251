//! Read capability, bound to the follower handle.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::statement::ReadStatement;
use super::{decode_one, decode_rows};
use crate::bind::{BindType, bind_named};
use crate::context::Context;
use crate::error::SqlDbResult;
use crate::target::Target;
use crate::value::{Row, Value};

/// Reads. Every call goes to the follower handle.
#[derive(Clone)]
pub struct Follower {
    target: Arc<dyn Target>,
    bind: BindType,
}

impl Follower {
    pub(crate) fn new(target: Arc<dyn Target>, bind: BindType) -> Self {
        Self { target, bind }
    }

    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    /// First row decoded into `T`. No row is `RowNotFound`.
    pub async fn get<T: DeserializeOwned>(&self, query: &str, args: &[Value]) -> SqlDbResult<T> {
        decode_one(self.target.fetch_optional(query, args).await?)
    }

    pub async fn get_context<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<T> {
        ctx.run(self.get(query, args)).await?
    }

    /// Every row decoded into `T`.
    pub async fn select<T: DeserializeOwned>(
        &self,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<Vec<T>> {
        decode_rows(self.target.fetch_all(query, args).await?)
    }

    pub async fn select_context<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<Vec<T>> {
        ctx.run(self.select(query, args)).await?
    }

    /// Raw rows.
    pub async fn query(&self, query: &str, args: &[Value]) -> SqlDbResult<Vec<Row>> {
        Ok(self.target.fetch_all(query, args).await?)
    }

    pub async fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<Vec<Row>> {
        ctx.run(self.query(query, args)).await?
    }

    /// At most one raw row.
    pub async fn query_row(&self, query: &str, args: &[Value]) -> SqlDbResult<Option<Row>> {
        Ok(self.target.fetch_optional(query, args).await?)
    }

    pub async fn query_row_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> SqlDbResult<Option<Row>> {
        ctx.run(self.query_row(query, args)).await?
    }

    /// Query with `:name` parameters taken from `arg`.
    pub async fn named_query<A: Serialize + ?Sized>(
        &self,
        query: &str,
        arg: &A,
    ) -> SqlDbResult<Vec<Row>> {
        let (sql, values) = bind_named(self.bind, query, arg)?;
        self.query(&sql, &values).await
    }

    pub async fn named_query_context<A: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        query: &str,
        arg: &A,
    ) -> SqlDbResult<Vec<Row>> {
        let (sql, values) = bind_named(self.bind, query, arg)?;
        self.query_context(ctx, &sql, &values).await
    }

    /// Prepare `query` on the follower.
    pub async fn prepare(&self, ctx: &Context, query: &str) -> SqlDbResult<ReadStatement> {
        let inner = ctx.run(self.target.prepare(query)).await??;
        Ok(ReadStatement::new(inner))
    }
}
