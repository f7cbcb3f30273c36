//! # Database Operations
//!
//! Execution of compiled find queries over an SQLx PostgreSQL pool.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use orm_find::config::FinderConfig;
//! use orm_find::database::FindExecutor;
//! use orm_find::metadata::{EntityMetadata, MetadataRegistry};
//! use orm_find::query_builder::Pagination;
//! use serde_json::json;
//! use sqlx::PgPool;
//! use std::sync::Arc;
//!
//! # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = MetadataRegistry::builder()
//!     .entity(EntityMetadata::new("Author", "a", "authors").primitive("lastName", "last_name", "varchar"))
//!     .build()?;
//! let executor = FindExecutor::new(pool, Arc::new(registry), FinderConfig::from_env()?)?;
//! let rows = executor
//!     .find_rows("Author", &json!({"lastName": "Tolstoy"}), &executor.default_options(), Pagination::default())
//!     .await?;
//! println!("found {} authors", rows.len());
//! # Ok(())
//! # }
//! ```

pub mod executor;

pub use executor::{FindExecutor, PreparedFind};
