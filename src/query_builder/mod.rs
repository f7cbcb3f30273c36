//! # Find Query Compiler
//!
//! Turns a graph-shaped entity filter into a pruned, parameterized SQL statement.
//!
//! ## Pipeline
//!
//! 1. [`builder`] walks the filter against entity metadata and builds a
//!    [`ParsedFindQuery`], deciding per relation whether a join is needed or
//!    whether the condition can sit on a foreign-key column.
//! 2. [`pruning`] removes joins nothing reads, along with their pruneable guards.
//! 3. [`rewriter`] moves conditions that only touch a lateral or CTE scope into
//!    that scope (`$count` conditions become `HAVING`).
//! 4. [`emitter`] renders the IR as SQL text plus positional bindings.
//!
//! ## Key Components
//!
//! - [`aliases`] - Collision-free table aliases (`b`, `b1`, `br`, ...)
//! - [`filters`] - Filter normalization into [`ParsedValueFilter`] / [`ParsedEntityFilter`]
//! - [`conditions`] - AND/OR condition trees and the [`ConditionBuilder`]
//! - [`joins`] - Table kinds: primary, inner/outer join, lateral, CTE, cross
//! - [`alias`] - [`EntityAlias`] handles for caller-written conditions
//! - [`pagination`] - `LIMIT` / `OFFSET`
//!
//! ## Example Usage
//!
//! ```rust
//! use orm_find::metadata::{EntityMetadata, MetadataRegistry};
//! use orm_find::query_builder::{CompileOptions, EmitOptions, FindQueryCompiler, SqlEmitter};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> orm_find::error::Result<()> {
//! let registry = MetadataRegistry::builder()
//!     .entity(EntityMetadata::new("Author", "a", "authors").primitive("lastName", "last_name", "varchar"))
//!     .entity(EntityMetadata::new("Book", "b", "books").many_to_one("author", "author_id", "Author"))
//!     .build()?;
//! let compiler = FindQueryCompiler::new(Arc::new(registry));
//!
//! // Filtering by id never joins `authors`.
//! let query = compiler.compile("Book", &json!({"author": "a:1"}), &CompileOptions::default())?;
//! let sql = SqlEmitter::default().emit(&query, &EmitOptions::default());
//! assert_eq!(
//!     sql.sql,
//!     "SELECT b.* FROM books AS b WHERE b.author_id = ? ORDER BY b.id ASC"
//! );
//! # Ok(())
//! # }
//! ```

pub mod alias;
pub mod aliases;
pub mod builder;
pub mod conditions;
pub mod emitter;
pub mod filters;
pub mod joins;
pub mod pagination;
pub mod parsed;
pub mod pruning;
pub mod rewriter;

pub use alias::{AliasCondition, AliasExpression, EntityAlias};
pub use aliases::AliasAssigner;
pub use builder::{CompileOptions, FindQueryCompiler};
pub use conditions::{
    ColumnCondition, ConditionBuilder, ExpressionOp, ParsedExpressionCondition,
    ParsedExpressionFilter, RawCondition,
};
pub use emitter::{Dialect, EmitOptions, EmittedSql, SqlEmitter};
pub use filters::{
    parse_entity_filter, parse_value_filter, EntityRef, ParsedEntityFilter, ParsedValueFilter,
};
pub use joins::{ColumnRef, JoinKind, ParsedTable};
pub use pagination::Pagination;
pub use parsed::{OrderDirection, ParsedFindQuery, ParsedOrderBy, ParsedSelect, RawCte};
pub use pruning::JoinPruner;
pub use rewriter::ConditionRewriter;
