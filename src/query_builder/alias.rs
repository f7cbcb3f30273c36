//! # Entity Aliases
//!
//! Caller-side handles for writing conditions against a table before the
//! compiler has decided which SQL alias that table gets.
//!
//! ```rust
//! use orm_find::query_builder::{AliasExpression, EntityAlias};
//! use serde_json::json;
//!
//! let a = EntityAlias::new("Author");
//! // Bind the handle to the book's author join...
//! let filter = json!({ "author": a.marker() });
//! // ...and reference it from a free-form condition.
//! let conditions = AliasExpression::or(vec![
//!     a.primitive("lastName").eq("Tolstoy"),
//!     a.primitive("firstName").is_null(),
//! ]);
//! # let _ = (filter, conditions);
//! ```
//!
//! The compiler records `handle -> alias` when it walks a `{"$alias": handle}`
//! marker and resolves every [`AliasCondition`] through that map afterwards;
//! a condition whose handle was never bound fails with
//! [`crate::error::FindError::UnboundAlias`].

use super::filters::ParsedValueFilter;
use crate::constants::ALIAS_MARKER;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_HANDLE: AtomicUsize = AtomicUsize::new(1);

/// A not-yet-bound reference to one occurrence of an entity's table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityAlias {
    entity: String,
    handle: String,
}

impl EntityAlias {
    pub fn new(entity: &str) -> Self {
        let n = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        Self {
            entity: entity.to_string(),
            handle: format!("{entity}#{n}"),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Filter value binding this alias to the relation (or root entity) it is placed under.
    pub fn marker(&self) -> Value {
        let mut map = Map::new();
        map.insert(ALIAS_MARKER.to_string(), Value::String(self.handle.clone()));
        Value::Object(map)
    }

    pub fn primitive(&self, field: &str) -> PrimitiveAlias<'_> {
        PrimitiveAlias { alias: self, field: field.to_string() }
    }

    pub fn many_to_one(&self, field: &str) -> ManyToOneAlias<'_> {
        ManyToOneAlias { alias: self, field: field.to_string() }
    }

    pub fn polymorphic(&self, field: &str) -> PolymorphicAlias<'_> {
        PolymorphicAlias { alias: self, field: field.to_string() }
    }

    fn condition(&self, field: &str, filter: ParsedValueFilter<Value>) -> AliasExpression {
        AliasExpression::Condition(AliasCondition {
            handle: self.handle.clone(),
            field: field.to_string(),
            filter,
        })
    }
}

/// A single condition against a field reached through an [`EntityAlias`].
#[derive(Debug, Clone, PartialEq)]
pub struct AliasCondition {
    pub handle: String,
    pub field: String,
    pub filter: ParsedValueFilter<Value>,
}

/// AND/OR tree of alias conditions, passed as `CompileOptions::conditions`.
#[derive(Debug, Clone, PartialEq)]
pub enum AliasExpression {
    Condition(AliasCondition),
    And(Vec<AliasExpression>),
    Or(Vec<AliasExpression>),
}

impl AliasExpression {
    pub fn and(conditions: Vec<AliasExpression>) -> Self {
        AliasExpression::And(conditions)
    }

    pub fn or(conditions: Vec<AliasExpression>) -> Self {
        AliasExpression::Or(conditions)
    }
}

fn eq_or_null(value: Value) -> ParsedValueFilter<Value> {
    if value.is_null() {
        ParsedValueFilter::IsNull
    } else {
        ParsedValueFilter::Eq(value)
    }
}

fn ne_or_not_null(value: Value) -> ParsedValueFilter<Value> {
    if value.is_null() {
        ParsedValueFilter::NotNull
    } else {
        ParsedValueFilter::Ne(value)
    }
}

fn values<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Vec<Value> {
    values.into_iter().map(Into::into).collect()
}

/// Conditions on a primitive, enum or primary key field.
#[derive(Debug, Clone)]
pub struct PrimitiveAlias<'a> {
    alias: &'a EntityAlias,
    field: String,
}

impl PrimitiveAlias<'_> {
    fn cond(&self, filter: ParsedValueFilter<Value>) -> AliasExpression {
        self.alias.condition(&self.field, filter)
    }

    pub fn eq(&self, value: impl Into<Value>) -> AliasExpression {
        self.cond(eq_or_null(value.into()))
    }

    pub fn ne(&self, value: impl Into<Value>) -> AliasExpression {
        self.cond(ne_or_not_null(value.into()))
    }

    pub fn gt(&self, value: impl Into<Value>) -> AliasExpression {
        self.cond(ParsedValueFilter::Gt(value.into()))
    }

    pub fn gte(&self, value: impl Into<Value>) -> AliasExpression {
        self.cond(ParsedValueFilter::Gte(value.into()))
    }

    pub fn lt(&self, value: impl Into<Value>) -> AliasExpression {
        self.cond(ParsedValueFilter::Lt(value.into()))
    }

    pub fn lte(&self, value: impl Into<Value>) -> AliasExpression {
        self.cond(ParsedValueFilter::Lte(value.into()))
    }

    pub fn like(&self, pattern: &str) -> AliasExpression {
        self.cond(ParsedValueFilter::Like(pattern.into()))
    }

    pub fn ilike(&self, pattern: &str) -> AliasExpression {
        self.cond(ParsedValueFilter::Ilike(pattern.into()))
    }

    pub fn is_in<V: Into<Value>>(&self, list: impl IntoIterator<Item = V>) -> AliasExpression {
        self.cond(ParsedValueFilter::In(values(list)))
    }

    pub fn nin<V: Into<Value>>(&self, list: impl IntoIterator<Item = V>) -> AliasExpression {
        self.cond(ParsedValueFilter::Nin(values(list)))
    }

    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> AliasExpression {
        self.cond(ParsedValueFilter::Between(low.into(), high.into()))
    }

    pub fn is_null(&self) -> AliasExpression {
        self.cond(ParsedValueFilter::IsNull)
    }

    pub fn not_null(&self) -> AliasExpression {
        self.cond(ParsedValueFilter::NotNull)
    }

    pub fn contains<V: Into<Value>>(&self, list: impl IntoIterator<Item = V>) -> AliasExpression {
        self.cond(ParsedValueFilter::Contains(Value::Array(values(list))))
    }

    pub fn overlaps<V: Into<Value>>(&self, list: impl IntoIterator<Item = V>) -> AliasExpression {
        self.cond(ParsedValueFilter::Overlaps(Value::Array(values(list))))
    }

    pub fn contained_by<V: Into<Value>>(
        &self,
        list: impl IntoIterator<Item = V>,
    ) -> AliasExpression {
        self.cond(ParsedValueFilter::ContainedBy(Value::Array(values(list))))
    }
}

/// Conditions on a foreign key, compared by the related entity's id.
#[derive(Debug, Clone)]
pub struct ManyToOneAlias<'a> {
    alias: &'a EntityAlias,
    field: String,
}

impl ManyToOneAlias<'_> {
    fn cond(&self, filter: ParsedValueFilter<Value>) -> AliasExpression {
        self.alias.condition(&self.field, filter)
    }

    /// Accepts tagged ids, raw ids or an [`super::EntityRef`] in filter form.
    pub fn eq(&self, id: impl Into<Value>) -> AliasExpression {
        self.cond(eq_or_null(id.into()))
    }

    pub fn ne(&self, id: impl Into<Value>) -> AliasExpression {
        self.cond(ne_or_not_null(id.into()))
    }

    pub fn is_in<V: Into<Value>>(&self, ids: impl IntoIterator<Item = V>) -> AliasExpression {
        self.cond(ParsedValueFilter::In(values(ids)))
    }

    pub fn nin<V: Into<Value>>(&self, ids: impl IntoIterator<Item = V>) -> AliasExpression {
        self.cond(ParsedValueFilter::Nin(values(ids)))
    }

    pub fn is_null(&self) -> AliasExpression {
        self.cond(ParsedValueFilter::IsNull)
    }

    pub fn not_null(&self) -> AliasExpression {
        self.cond(ParsedValueFilter::NotNull)
    }
}

/// Conditions on a polymorphic reference; the column is picked from each id's tag.
#[derive(Debug, Clone)]
pub struct PolymorphicAlias<'a> {
    alias: &'a EntityAlias,
    field: String,
}

impl PolymorphicAlias<'_> {
    fn cond(&self, filter: ParsedValueFilter<Value>) -> AliasExpression {
        self.alias.condition(&self.field, filter)
    }

    pub fn eq(&self, id: impl Into<Value>) -> AliasExpression {
        self.cond(eq_or_null(id.into()))
    }

    pub fn ne(&self, id: impl Into<Value>) -> AliasExpression {
        self.cond(ne_or_not_null(id.into()))
    }

    pub fn is_in<V: Into<Value>>(&self, ids: impl IntoIterator<Item = V>) -> AliasExpression {
        self.cond(ParsedValueFilter::In(values(ids)))
    }

    pub fn is_null(&self) -> AliasExpression {
        self.cond(ParsedValueFilter::IsNull)
    }

    pub fn not_null(&self) -> AliasExpression {
        self.cond(ParsedValueFilter::NotNull)
    }
}
