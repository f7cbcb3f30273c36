//! # Compiler Constants
//!
//! Marker keys, sentinel values and alias conventions shared by the compiler
//! passes.

use serde::{Deserialize, Serialize};

/// Id used when filtering by an entity that has not been saved yet. No row has it.
pub const UNSAVED_ENTITY_ID: i64 = -1;

/// Name of the primary key field and column on every entity.
pub const ID_FIELD: &str = "id";
pub const ID_COLUMN: &str = "id";

/// Filter object key that marks an entity reference (`{"$entity": "Author", "id": "a:1"}`).
pub const ENTITY_MARKER: &str = "$entity";

/// Filter object key that binds an [`crate::query_builder::EntityAlias`] to a relation.
pub const ALIAS_MARKER: &str = "$alias";

/// Pseudo-column for counting the rows of a lateral collection sub-query.
pub const COUNT_PSEUDO_COLUMN: &str = "$count";

/// Column projected by lateral collection sub-queries holding `count(*)`.
pub const LATERAL_COUNT_COLUMN: &str = "_";

/// Select alias prefix for sort keys projected under `SELECT DISTINCT`.
pub const ORDER_KEY_PREFIX: &str = "__order_";

/// Select alias for the class-tag expression of inheritance hierarchies.
pub const CLASS_TAG_COLUMN: &str = "__class";

/// Inheritance alias markers: `p_b0` is the first base table of `p`, `p_s1` its second sub-type.
pub mod inheritance {
    pub const BASE_MARKER: &str = "_b";
    pub const SUB_MARKER: &str = "_s";

    pub fn base_alias(alias: &str, index: usize) -> String {
        format!("{alias}{BASE_MARKER}{index}")
    }

    pub fn sub_alias(alias: &str, index: usize) -> String {
        format!("{alias}{SUB_MARKER}{index}")
    }

    /// True for aliases minted by [`base_alias`] or [`sub_alias`].
    pub fn is_inheritance_alias(alias: &str) -> bool {
        [BASE_MARKER, SUB_MARKER].iter().any(|marker| {
            alias
                .rfind(marker)
                .map(|pos| {
                    let suffix = &alias[pos + marker.len()..];
                    pos > 0 && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit())
                })
                .unwrap_or(false)
        })
    }
}

/// Whether soft-deleted rows are visible to a find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftDeletes {
    Include,
    #[default]
    Exclude,
}

/// How one-to-many and many-to-many sub-filters are compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionJoins {
    /// `LEFT OUTER JOIN` into the child table.
    #[default]
    Outer,
    /// `CROSS JOIN LATERAL` counting sub-query per parent row.
    Lateral,
}
