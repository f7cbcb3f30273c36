//! # Find Executor
//!
//! Runs compiled find queries against PostgreSQL.
//!
//! Queries are emitted with `$n::type` placeholders so that JSON-typed
//! bindings (strings for timestamps, numbers for ids) are cast by the server.
//! Unless the caller paginates below it, every query is capped at
//! `max_rows`; hitting the cap is an error rather than a silently truncated
//! result.

use crate::config::FinderConfig;
use crate::error::{FindError, Result};
use crate::metadata::MetadataRegistry;
use crate::query_builder::{
    CompileOptions, Dialect, EmitOptions, EmittedSql, FindQueryCompiler, Pagination, SqlEmitter,
};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{Encode, FromRow, PgPool, Postgres, Type};
use std::sync::Arc;
use tracing::debug;

/// A compiled statement with the row ceiling it was emitted under.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFind {
    pub entity: String,
    pub emitted: EmittedSql,
    /// Set when the `LIMIT` is the configured ceiling rather than caller pagination.
    pub row_ceiling: Option<u32>,
}

pub struct FindExecutor {
    pool: PgPool,
    compiler: FindQueryCompiler,
    config: FinderConfig,
    emitter: SqlEmitter,
}

impl FindExecutor {
    pub fn new(pool: PgPool, registry: Arc<MetadataRegistry>, config: FinderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool,
            compiler: FindQueryCompiler::new(registry),
            config,
            emitter: SqlEmitter::new(Dialect::Postgres),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Options seeded from the executor's configuration.
    pub fn default_options(&self) -> CompileOptions {
        CompileOptions::from(&self.config)
    }

    /// Compile and emit without touching the database.
    pub fn prepare(
        &self,
        entity: &str,
        filter: &Value,
        options: &CompileOptions,
        pagination: Pagination,
    ) -> Result<PreparedFind> {
        let query = self.compiler.compile(entity, filter, options)?;
        let max_rows = self.config.max_rows;
        let row_ceiling = match pagination.limit {
            Some(limit) if limit < max_rows => None,
            _ => Some(max_rows),
        };
        let emitted = self
            .emitter
            .emit(&query, &EmitOptions::from(&pagination.clamped(max_rows)));
        Ok(PreparedFind {
            entity: entity.to_string(),
            emitted,
            row_ceiling,
        })
    }

    /// Run a find and return the raw rows.
    pub async fn find_rows(
        &self,
        entity: &str,
        filter: &Value,
        options: &CompileOptions,
        pagination: Pagination,
    ) -> Result<Vec<PgRow>> {
        let prepared = self.prepare(entity, filter, options, pagination)?;
        debug!(entity, sql = %prepared.emitted.sql, "Executing find query");
        let query = prepared
            .emitted
            .bindings
            .iter()
            .fold(sqlx::query(&prepared.emitted.sql), bind_value);
        let rows = query.fetch_all(&self.pool).await?;
        check_row_ceiling(&prepared, rows.len())?;
        Ok(rows)
    }

    /// Run a find and map each row with `FromRow`.
    pub async fn find_as<T>(
        &self,
        entity: &str,
        filter: &Value,
        options: &CompileOptions,
        pagination: Pagination,
    ) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let prepared = self.prepare(entity, filter, options, pagination)?;
        debug!(entity, sql = %prepared.emitted.sql, "Executing find query");
        let query = prepared
            .emitted
            .bindings
            .iter()
            .fold(sqlx::query_as::<_, T>(&prepared.emitted.sql), bind_value);
        let rows = query.fetch_all(&self.pool).await?;
        check_row_ceiling(&prepared, rows.len())?;
        Ok(rows)
    }
}

fn check_row_ceiling(prepared: &PreparedFind, rows: usize) -> Result<()> {
    match prepared.row_ceiling {
        Some(limit) if rows >= limit as usize => Err(FindError::TooManyRows {
            entity: prepared.entity.clone(),
            limit: limit as usize,
        }),
        _ => Ok(()),
    }
}

/// Owned, driver-typed form of a JSON binding.
enum Binding {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Texts(Vec<String>),
    Bools(Vec<bool>),
    Json(Value),
}

impl From<&Value> for Binding {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Binding::Null,
            Value::Bool(b) => Binding::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Binding::Int(i),
                None => Binding::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Binding::Text(s.clone()),
            Value::Array(items) => {
                if let Some(ints) = items.iter().map(Value::as_i64).collect::<Option<Vec<_>>>() {
                    Binding::Ints(ints)
                } else if let Some(floats) = items.iter().map(Value::as_f64).collect::<Option<Vec<_>>>() {
                    Binding::Floats(floats)
                } else if let Some(texts) = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                {
                    Binding::Texts(texts)
                } else if let Some(bools) = items.iter().map(Value::as_bool).collect::<Option<Vec<_>>>() {
                    Binding::Bools(bools)
                } else {
                    Binding::Json(value.clone())
                }
            }
            Value::Object(_) => Binding::Json(value.clone()),
        }
    }
}

/// The `bind` that `Query` and `QueryAs` both have, so one fold serves either.
trait BindArgument<'q>: Sized {
    fn bind_argument<T>(self, value: T) -> Self
    where
        T: 'q + Send + Encode<'q, Postgres> + Type<Postgres>;
}

impl<'q> BindArgument<'q> for Query<'q, Postgres, PgArguments> {
    fn bind_argument<T>(self, value: T) -> Self
    where
        T: 'q + Send + Encode<'q, Postgres> + Type<Postgres>,
    {
        self.bind(value)
    }
}

impl<'q, O> BindArgument<'q> for QueryAs<'q, Postgres, O, PgArguments> {
    fn bind_argument<T>(self, value: T) -> Self
    where
        T: 'q + Send + Encode<'q, Postgres> + Type<Postgres>,
    {
        self.bind(value)
    }
}

fn bind_value<'q, Q: BindArgument<'q>>(query: Q, value: &Value) -> Q {
    match Binding::from(value) {
        Binding::Null => query.bind_argument(None::<String>),
        Binding::Bool(b) => query.bind_argument(b),
        Binding::Int(i) => query.bind_argument(i),
        Binding::Float(f) => query.bind_argument(f),
        Binding::Text(s) => query.bind_argument(s),
        Binding::Ints(v) => query.bind_argument(v),
        Binding::Floats(v) => query.bind_argument(v),
        Binding::Texts(v) => query.bind_argument(v),
        Binding::Bools(v) => query.bind_argument(v),
        Binding::Json(v) => query.bind_argument(sqlx::types::Json(v)),
    }
}
