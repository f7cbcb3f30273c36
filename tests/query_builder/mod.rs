//! Query Builder Tests Module
//!
//! End-to-end compiler scenarios, grouped by the relation or pass they exercise.

pub mod aliases;
pub mod emitter;
pub mod many_to_one;
pub mod pagination;
pub mod pruning;
pub mod uuid_ids;
