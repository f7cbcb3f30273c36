//! # Filter Normalizer
//!
//! Converts the ergonomic shapes a caller may pass for one column or relation
//! (bare values, arrays, operator objects, entity references) into a closed set
//! of value-filter variants. Pure: no joins, no persistence.

use crate::constants::{ALIAS_MARKER, ENTITY_MARKER, ID_FIELD, UNSAVED_ENTITY_ID};
use crate::error::{FindError, Result};
use serde_json::{Map, Value};

/// Normalized comparison against one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValueFilter<V> {
    Eq(V),
    Ne(V),
    In(Vec<V>),
    Nin(Vec<V>),
    Gt(V),
    Gte(V),
    Lt(V),
    Lte(V),
    Like(V),
    Ilike(V),
    Nlike(V),
    Nilike(V),
    Contains(V),
    Overlaps(V),
    ContainedBy(V),
    Ncontains(V),
    Noverlaps(V),
    NcontainedBy(V),
    Between(V, V),
    IsNull,
    NotNull,
}

impl<V> ParsedValueFilter<V> {
    /// Operator name as accepted by the normalizer (`"is-null"` for `IsNull`).
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedValueFilter::Eq(_) => "eq",
            ParsedValueFilter::Ne(_) => "ne",
            ParsedValueFilter::In(_) => "in",
            ParsedValueFilter::Nin(_) => "nin",
            ParsedValueFilter::Gt(_) => "gt",
            ParsedValueFilter::Gte(_) => "gte",
            ParsedValueFilter::Lt(_) => "lt",
            ParsedValueFilter::Lte(_) => "lte",
            ParsedValueFilter::Like(_) => "like",
            ParsedValueFilter::Ilike(_) => "ilike",
            ParsedValueFilter::Nlike(_) => "nlike",
            ParsedValueFilter::Nilike(_) => "nilike",
            ParsedValueFilter::Contains(_) => "contains",
            ParsedValueFilter::Overlaps(_) => "overlaps",
            ParsedValueFilter::ContainedBy(_) => "containedBy",
            ParsedValueFilter::Ncontains(_) => "ncontains",
            ParsedValueFilter::Noverlaps(_) => "noverlaps",
            ParsedValueFilter::NcontainedBy(_) => "ncontainedBy",
            ParsedValueFilter::Between(_, _) => "between",
            ParsedValueFilter::IsNull => "is-null",
            ParsedValueFilter::NotNull => "not-null",
        }
    }

    /// Array operators only make sense against array columns.
    pub fn is_array_operator(&self) -> bool {
        matches!(
            self,
            ParsedValueFilter::Contains(_)
                | ParsedValueFilter::Overlaps(_)
                | ParsedValueFilter::ContainedBy(_)
                | ParsedValueFilter::Ncontains(_)
                | ParsedValueFilter::Noverlaps(_)
                | ParsedValueFilter::NcontainedBy(_)
        )
    }

    /// Map every held value, failing on the first error.
    pub fn try_map<W, F>(self, mut f: F) -> Result<ParsedValueFilter<W>>
    where
        F: FnMut(V) -> Result<W>,
    {
        use ParsedValueFilter::*;
        Ok(match self {
            Eq(v) => Eq(f(v)?),
            Ne(v) => Ne(f(v)?),
            In(vs) => In(vs.into_iter().map(&mut f).collect::<Result<_>>()?),
            Nin(vs) => Nin(vs.into_iter().map(&mut f).collect::<Result<_>>()?),
            Gt(v) => Gt(f(v)?),
            Gte(v) => Gte(f(v)?),
            Lt(v) => Lt(f(v)?),
            Lte(v) => Lte(f(v)?),
            Like(v) => Like(f(v)?),
            Ilike(v) => Ilike(f(v)?),
            Nlike(v) => Nlike(f(v)?),
            Nilike(v) => Nilike(f(v)?),
            Contains(v) => Contains(f(v)?),
            Overlaps(v) => Overlaps(f(v)?),
            ContainedBy(v) => ContainedBy(f(v)?),
            Ncontains(v) => Ncontains(f(v)?),
            Noverlaps(v) => Noverlaps(f(v)?),
            NcontainedBy(v) => NcontainedBy(f(v)?),
            Between(a, b) => Between(f(a)?, f(b)?),
            IsNull => IsNull,
            NotNull => NotNull,
        })
    }
}

/// Build one filter from an operator name and its value.
fn operator_filter(op: &str, value: Value) -> Result<ParsedValueFilter<Value>> {
    use ParsedValueFilter::*;
    Ok(match (op, value) {
        ("eq", Value::Null) => IsNull,
        ("ne", Value::Null) => NotNull,
        ("eq", v) => Eq(v),
        ("ne", v) => Ne(v),
        ("in", Value::Array(vs)) => In(vs),
        ("nin", Value::Array(vs)) => Nin(vs),
        ("in" | "nin", other) => {
            return Err(FindError::UnsupportedOperator(format!(
                "{op} expects an array, got {other}"
            )))
        }
        ("gt", v) => Gt(v),
        ("gte", v) => Gte(v),
        ("lt", v) => Lt(v),
        ("lte", v) => Lte(v),
        ("like", v) => Like(v),
        ("ilike", v) => Ilike(v),
        ("nlike", v) => Nlike(v),
        ("nilike", v) => Nilike(v),
        ("contains", v) => Contains(v),
        ("overlaps", v) => Overlaps(v),
        ("containedBy", v) => ContainedBy(v),
        ("ncontains", v) => Ncontains(v),
        ("noverlaps", v) => Noverlaps(v),
        ("ncontainedBy", v) => NcontainedBy(v),
        ("between", Value::Array(mut vs)) if vs.len() == 2 => {
            let hi = vs.pop().unwrap_or(Value::Null);
            let lo = vs.pop().unwrap_or(Value::Null);
            Between(lo, hi)
        }
        ("between", other) => {
            return Err(FindError::UnsupportedOperator(format!(
                "between expects a two-element array, got {other}"
            )))
        }
        (op, _) => return Err(FindError::UnsupportedOperator(op.to_string())),
    })
}

/// Normalize a caller-supplied column filter into zero or more value filters.
///
/// Shapes, in priority order: `null`, array, `{gte, lte}`, `{op, value}`,
/// operator object, bare scalar. An operator object with no keys, or an
/// `{op}` object without a value, means "ignore this field". Entity
/// references are replaced by their ids wherever a value is expected.
pub fn parse_value_filter(filter: &Value) -> Result<Vec<ParsedValueFilter<Value>>> {
    parse_value_shape(filter)?
        .into_iter()
        .map(|parsed| parsed.try_map(|v| Ok(entity_value(&v))))
        .collect()
}

fn parse_value_shape(filter: &Value) -> Result<Vec<ParsedValueFilter<Value>>> {
    match filter {
        Value::Null => Ok(vec![ParsedValueFilter::IsNull]),
        Value::Object(map) if map.contains_key(ENTITY_MARKER) => {
            Ok(vec![ParsedValueFilter::Eq(filter.clone())])
        }
        Value::Array(values) => Ok(vec![ParsedValueFilter::In(values.clone())]),
        Value::Object(map) if map.len() == 2 && map.contains_key("gte") && map.contains_key("lte") => {
            Ok(vec![ParsedValueFilter::Between(map["gte"].clone(), map["lte"].clone())])
        }
        Value::Object(map) if map.contains_key("op") => {
            let op = map["op"].as_str().ok_or_else(|| {
                FindError::UnsupportedOperator(format!("op must be a string, got {}", map["op"]))
            })?;
            match map.get("value") {
                None => Ok(vec![]),
                Some(value) => Ok(vec![operator_filter(op, value.clone())?]),
            }
        }
        Value::Object(map) => map
            .iter()
            .map(|(op, value)| operator_filter(op, value.clone()))
            .collect(),
        scalar => Ok(vec![ParsedValueFilter::Eq(scalar.clone())]),
    }
}

/// A relation sub-filter, probed to decide whether a join is needed.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEntityFilter {
    /// Just an id / id-list / null comparison; satisfiable against a foreign key.
    Ids(ParsedValueFilter<Value>),
    /// Nested field conditions on the related entity; needs a join.
    Join(Map<String, Value>),
    /// An [`crate::query_builder::EntityAlias`] bound to this relation; forces a join.
    Alias(String),
}

/// Entity reference in filter form, e.g. `{"$entity": "Author", "id": "a:1"}`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRef {
    pub entity: String,
    pub id: Option<Value>,
}

impl EntityRef {
    pub fn new(entity: &str, id: impl Into<Value>) -> Self {
        Self {
            entity: entity.to_string(),
            id: Some(id.into()),
        }
    }

    /// A not-yet-persisted entity; filtering by it matches nothing.
    pub fn unsaved(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            id: None,
        }
    }

    pub fn to_filter(&self) -> Value {
        let mut map = Map::new();
        map.insert(ENTITY_MARKER.to_string(), Value::String(self.entity.clone()));
        map.insert(ID_FIELD.to_string(), self.id.clone().unwrap_or(Value::Null));
        Value::Object(map)
    }

    /// Recognize the filter form produced by [`EntityRef::to_filter`].
    pub fn from_filter(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let entity = map.get(ENTITY_MARKER)?.as_str()?;
        let id = map.get(ID_FIELD).filter(|id| !id.is_null()).cloned();
        Some(Self {
            entity: entity.to_string(),
            id,
        })
    }

    /// The id to filter by; unsaved entities use an id no row has.
    pub fn id_or_sentinel(&self) -> Value {
        match &self.id {
            Some(id) => id.clone(),
            None => {
                tracing::warn!(
                    entity = %self.entity,
                    "Filtering by an unsaved entity; the condition will match nothing"
                );
                Value::from(UNSAVED_ENTITY_ID)
            }
        }
    }
}

/// Replace entity references by their ids.
pub(crate) fn entity_value(value: &Value) -> Value {
    match EntityRef::from_filter(value) {
        Some(entity) => entity.id_or_sentinel(),
        None => value.clone(),
    }
}

/// Probe a relation sub-filter. `None` means the sub-filter is a no-op.
pub fn parse_entity_filter(filter: &Value) -> Result<Option<ParsedEntityFilter>> {
    use ParsedValueFilter::*;
    match filter {
        Value::Null => Ok(Some(ParsedEntityFilter::Ids(IsNull))),
        Value::String(_) | Value::Number(_) => Ok(Some(ParsedEntityFilter::Ids(Eq(filter.clone())))),
        Value::Bool(_) => Err(FindError::UnsupportedOperator(format!(
            "cannot filter a relation by {filter}"
        ))),
        Value::Array(values) => Ok(Some(ParsedEntityFilter::Ids(In(
            values.iter().map(entity_value).collect(),
        )))),
        Value::Object(map) => {
            if let Some(entity) = EntityRef::from_filter(filter) {
                return Ok(Some(ParsedEntityFilter::Ids(Eq(entity.id_or_sentinel()))));
            }
            if let Some(handle) = map.get(ALIAS_MARKER).and_then(Value::as_str) {
                if map.len() == 1 {
                    return Ok(Some(ParsedEntityFilter::Alias(handle.to_string())));
                }
                return Ok(Some(ParsedEntityFilter::Join(map.clone())));
            }
            if map.is_empty() {
                return Ok(None);
            }
            if map.len() == 1 {
                if let Some(value) = map.get("ne") {
                    return Ok(Some(ParsedEntityFilter::Ids(match value {
                        Value::Null => NotNull,
                        other => Ne(entity_value(other)),
                    })));
                }
                if let Some(value) = map.get(ID_FIELD) {
                    return parse_id_filter(value);
                }
            }
            Ok(Some(ParsedEntityFilter::Join(map.clone())))
        }
    }
}

/// `{id: ...}` reduces to a single id comparison.
fn parse_id_filter(value: &Value) -> Result<Option<ParsedEntityFilter>> {
    let mut filters = parse_value_filter(value)?;
    match filters.len() {
        0 => Ok(None),
        1 => Ok(Some(ParsedEntityFilter::Ids(filters.remove(0)))),
        _ => {
            let mut map = Map::new();
            map.insert(ID_FIELD.to_string(), value.clone());
            Ok(Some(ParsedEntityFilter::Join(map)))
        }
    }
}
