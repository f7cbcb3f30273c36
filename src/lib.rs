#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # ORM Find
//!
//! Find-query compiler for an object-relational persistence layer.
//!
//! ## Overview
//!
//! Callers describe the rows they want as a graph-shaped entity filter:
//! nested many-to-one, one-to-one, one-to-many, many-to-many and polymorphic
//! conditions, plus conditions written against [`query_builder::EntityAlias`]
//! handles. The compiler turns that filter into a single parameterized SQL
//! statement with as few joins as the filter allows.
//!
//! ## Key Features
//!
//! - **Foreign-key short-circuit**: `{author: "a:1"}` filters `books.author_id` without a join
//! - **Inheritance**: class-table (base/sub-type tables) and single-table hierarchies
//! - **Dead-join elimination**: joins nothing reads are pruned with their guards
//! - **Condition push-down**: conditions on lateral/CTE scopes move into those scopes
//! - **Soft deletes**: pruneable `deleted_at IS NULL` guards per joined entity
//!
//! ## Module Organization
//!
//! - [`metadata`] - Entity metadata registry and value codecs
//! - [`query_builder`] - Compiler, IR, pruner, rewriter and SQL emitter
//! - [`database`] - Query execution over an SQLx pool
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust
//! use orm_find::metadata::{EntityMetadata, MetadataRegistry};
//! use orm_find::query_builder::{CompileOptions, EmitOptions, FindQueryCompiler, SqlEmitter};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = MetadataRegistry::builder()
//!     .entity(EntityMetadata::new("Author", "a", "authors").primitive("lastName", "last_name", "varchar"))
//!     .entity(EntityMetadata::new("Book", "b", "books").many_to_one("author", "author_id", "Author"))
//!     .build()?;
//! let compiler = FindQueryCompiler::new(Arc::new(registry));
//!
//! let query = compiler.compile(
//!     "Book",
//!     &json!({"author": {"lastName": "Tolstoy"}}),
//!     &CompileOptions::default(),
//! )?;
//! let emitted = SqlEmitter::default().emit(&query, &EmitOptions::default());
//! assert_eq!(
//!     emitted.sql,
//!     "SELECT b.* FROM books AS b JOIN authors AS a ON b.author_id = a.id \
//!      WHERE a.last_name = ? ORDER BY b.id ASC"
//! );
//! assert_eq!(emitted.bindings, vec![json!("Tolstoy")]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests, including tests/lib.rs and the proptest suite
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod query_builder;

pub use config::FinderConfig;
pub use constants::{CollectionJoins, SoftDeletes};
pub use database::FindExecutor;
pub use error::{FindError, Result};
pub use metadata::{EntityMetadata, MetadataRegistry};
pub use query_builder::{
    CompileOptions, Dialect, EmitOptions, EmittedSql, EntityAlias, EntityRef, FindQueryCompiler,
    ParsedFindQuery, SqlEmitter,
};
