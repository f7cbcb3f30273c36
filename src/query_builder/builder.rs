//! # Find Query Compiler
//!
//! Walks a graph-shaped filter against entity metadata and produces a
//! [`ParsedFindQuery`], then runs the pruning and rewriting passes over it.
//!
//! Relations are dispatched on [`FieldKind`], one handler per kind. The key
//! property is the many-to-one short-circuit: `{author: "a:1"}` or
//! `{author: {id: "a:1"}}` filters `books.author_id` directly and never joins
//! `authors`.

use super::alias::{AliasCondition, AliasExpression};
use super::aliases::AliasAssigner;
use super::conditions::{
    ColumnCondition, ConditionBuilder, ParsedExpressionCondition, ParsedExpressionFilter,
    RawCondition,
};
use super::filters::{
    entity_value, parse_entity_filter, parse_value_filter, ParsedEntityFilter, ParsedValueFilter,
};
use super::joins::{ColumnRef, JoinKind, ParsedTable};
use super::parsed::{OrderDirection, ParsedFindQuery, ParsedOrderBy, ParsedSelect};
use super::pruning::JoinPruner;
use super::rewriter::ConditionRewriter;
use crate::config::FinderConfig;
use crate::constants::{
    inheritance, CollectionJoins, SoftDeletes, ALIAS_MARKER, CLASS_TAG_COLUMN,
    COUNT_PSEUDO_COLUMN, ID_COLUMN, LATERAL_COUNT_COLUMN, UNSAVED_ENTITY_ID,
};
use crate::error::{FindError, Result};
use crate::metadata::{Column, EntityMetadata, FieldKind, Inheritance, MetadataRegistry, PolyComponent};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Per-call compiler options.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Extra conditions written against [`super::EntityAlias`] handles, ANDed with the filter.
    pub conditions: Option<AliasExpression>,
    /// Order-by hint; falls back to the entity's default order.
    pub order_by: Option<Value>,
    pub prune_joins: bool,
    /// Aliases the caller references from SQL the pruner cannot see.
    pub keep_aliases: Vec<String>,
    pub soft_deletes: SoftDeletes,
    pub collection_joins: CollectionJoins,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            conditions: None,
            order_by: None,
            prune_joins: true,
            keep_aliases: Vec::new(),
            soft_deletes: SoftDeletes::default(),
            collection_joins: CollectionJoins::default(),
        }
    }
}

impl From<&FinderConfig> for CompileOptions {
    fn from(config: &FinderConfig) -> Self {
        Self {
            prune_joins: config.prune_joins,
            soft_deletes: config.soft_deletes,
            collection_joins: config.collection_joins,
            ..Default::default()
        }
    }
}

impl CompileOptions {
    pub fn with_conditions(mut self, conditions: AliasExpression) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn with_order_by(mut self, order_by: Value) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn keep_alias(mut self, alias: &str) -> Self {
        self.keep_aliases.push(alias.to_string());
        self
    }

    pub fn with_soft_deletes(mut self, soft_deletes: SoftDeletes) -> Self {
        self.soft_deletes = soft_deletes;
        self
    }

    pub fn with_collection_joins(mut self, collection_joins: CollectionJoins) -> Self {
        self.collection_joins = collection_joins;
        self
    }

    pub fn without_pruning(mut self) -> Self {
        self.prune_joins = false;
        self
    }
}

/// Compiles entity filters into [`ParsedFindQuery`]s.
///
/// Holds only the read-only registry, so one compiler can be shared across
/// threads; every call gets its own alias assigner and pruner.
#[derive(Debug, Clone)]
pub struct FindQueryCompiler {
    registry: Arc<MetadataRegistry>,
}

impl FindQueryCompiler {
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    /// Compile, prune (unless disabled), push conditions into nested scopes, then add the id tiebreaker.
    pub fn compile(
        &self,
        entity: &str,
        filter: &Value,
        options: &CompileOptions,
    ) -> Result<ParsedFindQuery> {
        let meta = self.registry.entity(entity)?;
        let mut query = Compilation::new(&self.registry, options).build(meta, filter)?;
        if options.prune_joins {
            JoinPruner::prune(&mut query, &options.keep_aliases);
        }
        ConditionRewriter::rewrite(&mut query)?;
        append_tiebreaker(&mut query, meta)?;
        debug!(
            entity,
            tables = query.tables.len(),
            distinct = query.fans_out(),
            order_bys = query.order_bys.len(),
            "Compiled find query"
        );
        Ok(query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableRole {
    /// The root primary table: sub-type joins, class-tag select, unconditional discriminator.
    Root,
    /// Any other table: guards are pruneable.
    Joined,
    /// Joined for ordering only: no guards at all.
    OrderBy,
}

/// The row source of a collection relation.
#[derive(Debug, Clone, Copy)]
enum Collection<'a> {
    OneToMany {
        other: &'a EntityMetadata,
        other_column: &'a str,
    },
    ManyToMany {
        other: &'a EntityMetadata,
        join_table: &'a str,
        column: &'a str,
        other_column: &'a str,
    },
}

impl Collection<'_> {
    /// Table holding one row per collection member, and its column pointing back at the owner.
    fn rows(&self) -> (&str, &str) {
        match *self {
            Collection::OneToMany {
                other,
                other_column,
            } => (&other.table_name, other_column),
            Collection::ManyToMany {
                join_table, column, ..
            } => (join_table, column),
        }
    }

    /// Column on the rows table holding the member's id.
    fn member_id_column(&self) -> Result<Column> {
        match *self {
            Collection::OneToMany { other, .. } => Ok(other.id_column()?.clone()),
            Collection::ManyToMany {
                other,
                other_column,
                ..
            } => {
                let id = other.id_column()?;
                Ok(Column {
                    codec: id.codec.clone(),
                    ..Column::new(other_column, &id.db_type)
                })
            }
        }
    }
}

/// State of a single compilation.
struct Compilation<'a> {
    registry: &'a MetadataRegistry,
    options: &'a CompileOptions,
    assigner: AliasAssigner,
    conditions: ConditionBuilder,
    /// Alias handle to the entity and table alias it was bound to.
    bound: HashMap<String, (&'a EntityMetadata, String)>,
    /// `(alias, field)` to the alias joined for it, reused by ordering.
    joined: HashMap<(String, String), String>,
    /// Laterals whose member count is not already constrained, with every alias inside them.
    laterals: Vec<(String, BTreeSet<String>)>,
}

impl<'a> Compilation<'a> {
    fn new(registry: &'a MetadataRegistry, options: &'a CompileOptions) -> Self {
        Self {
            registry,
            options,
            assigner: AliasAssigner::new(),
            conditions: ConditionBuilder::new(),
            bound: HashMap::new(),
            joined: HashMap::new(),
            laterals: Vec::new(),
        }
    }

    fn build(mut self, meta: &'a EntityMetadata, filter: &Value) -> Result<ParsedFindQuery> {
        let alias = self.assigner.get_alias(&meta.table_name);
        let mut query = ParsedFindQuery::new(&alias, &meta.table_name);
        query.selects.push(ParsedSelect::column(&alias, "*"));
        self.add_entity_tables(&mut query, meta, &alias, TableRole::Root)?;

        match filter {
            Value::Object(map) => self.add_entity_filter(&mut query, meta, &alias, map)?,
            Value::Null => {}
            other => {
                return Err(FindError::unsupported(
                    &meta.name,
                    format!("filter must be an object, got {other}"),
                ))
            }
        }

        if let Some(expression) = &self.options.conditions {
            let expression = self.alias_expression(expression)?;
            self.conditions.add_expression(expression);
        }
        self.add_lateral_guards();

        let default_order = meta.default_order.as_ref().map(|field| {
            let mut map = Map::new();
            map.insert(field.clone(), Value::String("ASC".to_string()));
            Value::Object(map)
        });
        if let Some(hint) = self.options.order_by.as_ref().or(default_order.as_ref()) {
            self.add_order_bys(&mut query, meta, &alias, hint)?;
        }

        query.condition = self.conditions.to_expression_filter();
        Ok(query)
    }

    /// Inheritance joins and guards for a table just added as `alias`.
    fn add_entity_tables(
        &mut self,
        query: &mut ParsedFindQuery,
        meta: &'a EntityMetadata,
        alias: &str,
        role: TableRole,
    ) -> Result<()> {
        let registry = self.registry;
        for (i, base) in registry.base_tables(meta).into_iter().enumerate() {
            let base_alias = inheritance::base_alias(alias, i);
            query.tables.push(ParsedTable::outer(
                &base_alias,
                &base.table_name,
                ColumnRef::new(alias, ID_COLUMN),
                ColumnRef::new(&base_alias, ID_COLUMN),
            ));
            if role == TableRole::Root {
                query.selects.push(ParsedSelect::column(&base_alias, "*"));
            }
        }
        if role == TableRole::Root {
            self.add_sub_types(query, meta, alias);
        }
        if role == TableRole::OrderBy {
            return Ok(());
        }

        if let Inheritance::SingleTable {
            discriminator,
            value,
        } = &meta.inheritance
        {
            let mut values = vec![value.clone()];
            for sub in registry.sub_types(meta) {
                if let Inheritance::SingleTable { value, .. } = &sub.inheritance {
                    values.push(value.clone());
                }
            }
            let filter = if values.len() == 1 {
                ParsedValueFilter::Eq(values.remove(0))
            } else {
                ParsedValueFilter::In(values)
            };
            let column = Column::new(discriminator, "text");
            if role == TableRole::Root {
                self.conditions.add_value_filter(alias, &column, filter)?;
            } else {
                self.conditions
                    .add_pruneable_value_filter(alias, &column, filter)?;
            }
        }

        if self.options.soft_deletes == SoftDeletes::Exclude {
            if let Some((base_index, column)) = registry.soft_delete_column(meta) {
                let table_alias = match base_index {
                    Some(i) => inheritance::base_alias(alias, i),
                    None => alias.to_string(),
                };
                self.conditions.add_condition(ParsedExpressionCondition::Column(
                    ColumnCondition::new(&table_alias, column, "timestamptz", ParsedValueFilter::IsNull)
                        .pruneable(),
                ));
            }
        }
        Ok(())
    }

    /// Sub-type joins plus a `CASE` select naming each row's concrete type.
    fn add_sub_types(&mut self, query: &mut ParsedFindQuery, meta: &'a EntityMetadata, alias: &str) {
        let mut cases = Vec::new();
        let mut bindings = Vec::new();
        let mut aliases = vec![alias.to_string()];
        let mut sub_index = 0;
        for sub in self.registry.sub_types(meta) {
            match &sub.inheritance {
                Inheritance::ClassTable => {
                    let sub_alias = inheritance::sub_alias(alias, sub_index);
                    sub_index += 1;
                    query.tables.push(ParsedTable::outer(
                        &sub_alias,
                        &sub.table_name,
                        ColumnRef::new(alias, ID_COLUMN),
                        ColumnRef::new(&sub_alias, ID_COLUMN),
                    ));
                    query.selects.push(ParsedSelect::column(&sub_alias, "*"));
                    cases.push(format!("WHEN {sub_alias}.{ID_COLUMN} IS NOT NULL THEN '{}'", sub.name));
                    aliases.push(sub_alias);
                }
                Inheritance::SingleTable {
                    discriminator,
                    value,
                } => {
                    cases.push(format!("WHEN {alias}.{discriminator} = ? THEN '{}'", sub.name));
                    bindings.push(value.clone());
                }
                Inheritance::None => {}
            }
        }
        if cases.is_empty() {
            return;
        }
        query.selects.push(ParsedSelect::Sql {
            sql: format!(
                "CASE {} ELSE '{}' END AS {CLASS_TAG_COLUMN}",
                cases.join(" "),
                meta.name
            ),
            bindings,
            aliases,
        });
    }

    fn add_entity_filter(
        &mut self,
        query: &mut ParsedFindQuery,
        meta: &'a EntityMetadata,
        alias: &str,
        filter: &Map<String, Value>,
    ) -> Result<()> {
        let registry = self.registry;
        for (key, value) in filter {
            if key == ALIAS_MARKER {
                self.bind_alias(meta, alias, value)?;
                continue;
            }
            let resolved = registry.resolve_field(meta, key)?;
            let table_alias = resolved.table_alias(alias);
            match &resolved.field.kind {
                FieldKind::PrimaryKey(column)
                | FieldKind::Primitive(column)
                | FieldKind::Enum(column) => {
                    for filter in parse_value_filter(value)? {
                        self.conditions.add_value_filter(&table_alias, column, filter)?;
                    }
                }
                FieldKind::ManyToOne { column, other } => {
                    let other = registry.entity(other)?;
                    self.add_many_to_one(query, alias, key, &table_alias, column, other, value)?;
                }
                FieldKind::OneToOne {
                    other,
                    other_column,
                } => {
                    let other = registry.entity(other)?;
                    self.add_one_to_one(query, alias, key, other, other_column, value)?;
                }
                FieldKind::OneToMany {
                    other,
                    other_column,
                } => {
                    let collection = Collection::OneToMany {
                        other: registry.entity(other)?,
                        other_column,
                    };
                    self.add_collection(query, alias, key, collection, value)?;
                }
                FieldKind::ManyToMany {
                    join_table,
                    column,
                    other_column,
                    other,
                } => {
                    let collection = Collection::ManyToMany {
                        other: registry.entity(other)?,
                        join_table,
                        column,
                        other_column,
                    };
                    self.add_collection(query, alias, key, collection, value)?;
                }
                FieldKind::Polymorphic { components } => {
                    match parse_entity_filter(value)? {
                        None => {}
                        Some(ParsedEntityFilter::Ids(filter)) => {
                            let condition =
                                self.polymorphic_condition(&table_alias, key, components, filter)?;
                            self.conditions.add_condition(condition);
                        }
                        Some(_) => {
                            return Err(FindError::unsupported(
                                &format!("{alias}.{key}"),
                                "polymorphic references can only be filtered by id",
                            ))
                        }
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn add_many_to_one(
        &mut self,
        query: &mut ParsedFindQuery,
        alias: &str,
        field: &str,
        table_alias: &str,
        column: &Column,
        other: &'a EntityMetadata,
        value: &Value,
    ) -> Result<()> {
        let needs_guard = self.options.soft_deletes == SoftDeletes::Exclude
            && self.registry.soft_delete_column(other).is_some();
        let col1 = ColumnRef::new(table_alias, &column.name);
        let other_id = &other.id_column()?.name;

        match parse_entity_filter(value)? {
            None => {}
            Some(ParsedEntityFilter::Ids(filter)) => {
                let is_null = filter == ParsedValueFilter::IsNull;
                self.conditions.add_value_filter(table_alias, column, filter)?;
                // The join only carries the soft-delete guard; pruning drops both unless used.
                if needs_guard && !is_null {
                    self.join_entity(query, alias, field, col1, other, other_id, JoinKind::Inner, TableRole::Joined)?;
                }
            }
            Some(ParsedEntityFilter::Join(_) | ParsedEntityFilter::Alias(_)) => {
                let other_alias = self.join_entity(
                    query,
                    alias,
                    field,
                    col1,
                    other,
                    other_id,
                    JoinKind::Inner,
                    TableRole::Joined,
                )?;
                self.add_entity_filter(query, other, &other_alias, as_object(field, value)?)?;
            }
        }
        Ok(())
    }

    fn add_one_to_one(
        &mut self,
        query: &mut ParsedFindQuery,
        alias: &str,
        field: &str,
        other: &'a EntityMetadata,
        other_column: &str,
        value: &Value,
    ) -> Result<()> {
        let other_alias = self.join_entity(
            query,
            alias,
            field,
            ColumnRef::new(alias, ID_COLUMN),
            other,
            other_column,
            JoinKind::Outer,
            TableRole::Joined,
        )?;
        match parse_entity_filter(value)? {
            None => {}
            Some(ParsedEntityFilter::Ids(filter)) => {
                self.conditions
                    .add_value_filter(&other_alias, other.id_column()?, filter)?;
            }
            Some(ParsedEntityFilter::Join(_) | ParsedEntityFilter::Alias(_)) => {
                self.add_entity_filter(query, other, &other_alias, as_object(field, value)?)?;
            }
        }
        Ok(())
    }

    /// One-to-many and many-to-many relations, as an outer join or a counting lateral sub-query.
    fn add_collection(
        &mut self,
        query: &mut ParsedFindQuery,
        alias: &str,
        field: &str,
        collection: Collection<'a>,
        value: &Value,
    ) -> Result<()> {
        let lateral = self.options.collection_joins == CollectionJoins::Lateral;
        let (value, counts) = split_count(value)?;
        if !counts.is_empty() && !lateral {
            return Err(FindError::unsupported(
                &format!("{alias}.{field}"),
                "$count requires lateral collection joins",
            ));
        }
        let probe = parse_entity_filter(&value)?;
        let (rows_table, back_column) = collection.rows();
        let rows_alias = self.assigner.get_alias(rows_table);

        if !lateral {
            query.tables.push(ParsedTable::outer_many(
                &rows_alias,
                rows_table,
                ColumnRef::new(alias, ID_COLUMN),
                ColumnRef::new(&rows_alias, back_column),
            ));
            if let Collection::OneToMany { other, .. } = collection {
                self.add_entity_tables(query, other, &rows_alias, TableRole::Joined)?;
            }
            self.add_collection_probe(query, &rows_alias, collection, probe, &value, false)?;
            return Ok(());
        }

        let lateral_alias = format!("_{rows_alias}");
        let mut inner = ParsedFindQuery::new(&rows_alias, rows_table);
        inner.selects.push(ParsedSelect::sql(
            &format!("count(*) AS {LATERAL_COUNT_COLUMN}"),
            &[],
        ));
        inner.add_condition(ParsedExpressionCondition::Raw(RawCondition::new(
            &[&rows_alias, alias],
            &format!("{rows_alias}.{back_column} = {alias}.{ID_COLUMN}"),
            vec![],
        )));
        if let Collection::OneToMany { other, .. } = collection {
            self.add_entity_tables(&mut inner, other, &rows_alias, TableRole::Joined)?;
        }

        let mut counted = !counts.is_empty();
        for filter in counts {
            self.add_count_condition(&rows_alias, filter);
        }
        counted |=
            !self.add_collection_probe(&mut inner, &rows_alias, collection, probe, &value, true)?;
        if !counted {
            let aliases = inner.alias_scopes().into_keys().collect();
            self.laterals.push((lateral_alias.clone(), aliases));
        }

        query.tables.push(ParsedTable::Lateral {
            alias: lateral_alias,
            from_alias: alias.to_string(),
            query: Box::new(inner),
        });
        Ok(())
    }

    /// Apply a collection sub-filter inside `scope`. Returns false when the
    /// sub-filter already decides the member count, so no existence guard is needed.
    fn add_collection_probe(
        &mut self,
        scope: &mut ParsedFindQuery,
        rows_alias: &str,
        collection: Collection<'a>,
        probe: Option<ParsedEntityFilter>,
        value: &Value,
        lateral: bool,
    ) -> Result<bool> {
        match probe {
            None => {}
            Some(ParsedEntityFilter::Ids(ParsedValueFilter::IsNull)) if lateral => {
                self.add_count_condition(rows_alias, ParsedValueFilter::Eq(Value::from(0)));
                return Ok(false);
            }
            Some(ParsedEntityFilter::Ids(filter)) => {
                self.conditions.add_value_filter(
                    rows_alias,
                    &collection.member_id_column()?,
                    filter,
                )?;
            }
            Some(ParsedEntityFilter::Join(_) | ParsedEntityFilter::Alias(_)) => {
                let map = as_object(rows_alias, value)?;
                match collection {
                    Collection::OneToMany { other, .. } => {
                        self.add_entity_filter(scope, other, rows_alias, map)?;
                    }
                    Collection::ManyToMany {
                        other,
                        other_column,
                        ..
                    } => {
                        let other_alias = self.assigner.get_alias(&other.table_name);
                        scope.tables.push(ParsedTable::outer(
                            &other_alias,
                            &other.table_name,
                            ColumnRef::new(rows_alias, other_column),
                            ColumnRef::new(&other_alias, &other.id_column()?.name),
                        ));
                        self.add_entity_tables(scope, other, &other_alias, TableRole::Joined)?;
                        self.add_entity_filter(scope, other, &other_alias, map)?;
                    }
                }
            }
        }
        Ok(true)
    }

    /// Existence check for each lateral whose rows some condition reads on its own, as the
    /// outer join's `WHERE` would. Pruneable, so it goes with an otherwise unused lateral.
    fn add_lateral_guards(&mut self) {
        for (lateral_alias, aliases) in std::mem::take(&mut self.laterals) {
            if !self.conditions.has_condition_within(&aliases) {
                continue;
            }
            self.conditions.add_condition(ParsedExpressionCondition::Column(
                ColumnCondition::new(
                    &lateral_alias,
                    LATERAL_COUNT_COLUMN,
                    "int",
                    ParsedValueFilter::Gt(Value::from(0)),
                )
                .pruneable(),
            ));
        }
    }

    fn add_count_condition(&mut self, rows_alias: &str, filter: ParsedValueFilter<Value>) {
        self.conditions
            .add_condition(ParsedExpressionCondition::Column(ColumnCondition::new(
                rows_alias,
                COUNT_PSEUDO_COLUMN,
                "int",
                filter,
            )));
    }

    /// Join `other` once per `(from_alias, field)`; later requests reuse the first join.
    #[allow(clippy::too_many_arguments)]
    fn join_entity(
        &mut self,
        query: &mut ParsedFindQuery,
        from_alias: &str,
        field: &str,
        col1: ColumnRef,
        other: &'a EntityMetadata,
        other_column: &str,
        kind: JoinKind,
        role: TableRole,
    ) -> Result<String> {
        let key = (from_alias.to_string(), field.to_string());
        if let Some(existing) = self.joined.get(&key) {
            return Ok(existing.clone());
        }
        let other_alias = self.assigner.get_alias(&other.table_name);
        query.tables.push(ParsedTable::Join {
            kind,
            alias: other_alias.clone(),
            table: other.table_name.clone(),
            col1,
            col2: ColumnRef::new(&other_alias, other_column),
        });
        self.add_entity_tables(query, other, &other_alias, role)?;
        self.joined.insert(key, other_alias.clone());
        Ok(other_alias)
    }

    fn bind_alias(&mut self, meta: &'a EntityMetadata, alias: &str, handle: &Value) -> Result<()> {
        let handle = handle
            .as_str()
            .ok_or_else(|| FindError::unsupported(ALIAS_MARKER, "alias handle must be a string"))?;
        if let Some((_, existing)) = self.bound.get(handle) {
            if existing != alias {
                return Err(FindError::unsupported(
                    ALIAS_MARKER,
                    format!("{handle} is bound to both {existing} and {alias}"),
                ));
            }
        }
        self.bound
            .insert(handle.to_string(), (meta, alias.to_string()));
        Ok(())
    }

    /// Conditions on a polymorphic reference, one column per candidate type.
    fn polymorphic_condition(
        &self,
        table_alias: &str,
        field: &str,
        components: &[PolyComponent],
        filter: ParsedValueFilter<Value>,
    ) -> Result<ParsedExpressionCondition> {
        use ParsedValueFilter::*;
        let qualified = format!("{table_alias}.{field}");
        let leaf = |component: &PolyComponent, filter: ParsedValueFilter<Value>| {
            ParsedExpressionCondition::Column(ColumnCondition::new(
                table_alias,
                &component.column.name,
                &component.column.db_type,
                filter,
            ))
        };
        let first = components.first().ok_or_else(|| {
            FindError::InvalidMetadata(format!("{qualified} has no polymorphic components"))
        })?;

        Ok(match filter {
            // Null only when every candidate column is null.
            IsNull => ParsedExpressionCondition::Expression(ParsedExpressionFilter::and(
                components.iter().map(|c| leaf(c, IsNull)).collect(),
            )),
            NotNull => ParsedExpressionCondition::Expression(ParsedExpressionFilter::or(
                components.iter().map(|c| leaf(c, NotNull)).collect(),
            )),
            Eq(value) => {
                let (index, id) = self.polymorphic_component(components, &qualified, &value)?;
                leaf(&components[index], Eq(id))
            }
            Ne(value) => {
                let (index, id) = self.polymorphic_component(components, &qualified, &value)?;
                ParsedExpressionCondition::Expression(ParsedExpressionFilter::or(vec![
                    leaf(&components[index], IsNull),
                    leaf(&components[index], Ne(id)),
                ]))
            }
            In(values) if values.is_empty() => leaf(first, In(values)),
            Nin(values) if values.is_empty() => leaf(first, Nin(values)),
            In(values) => {
                let mut groups = self.group_by_component(components, &qualified, values)?;
                if groups.len() == 1 {
                    let (index, ids) = groups.remove(0);
                    leaf(&components[index], In(ids))
                } else {
                    ParsedExpressionCondition::Expression(ParsedExpressionFilter::or(
                        groups
                            .into_iter()
                            .map(|(index, ids)| leaf(&components[index], In(ids)))
                            .collect(),
                    ))
                }
            }
            Nin(values) => {
                let groups = self.group_by_component(components, &qualified, values)?;
                ParsedExpressionCondition::Expression(ParsedExpressionFilter::and(
                    groups
                        .into_iter()
                        .map(|(index, ids)| {
                            ParsedExpressionCondition::Expression(ParsedExpressionFilter::or(vec![
                                leaf(&components[index], IsNull),
                                leaf(&components[index], Nin(ids)),
                            ]))
                        })
                        .collect(),
                ))
            }
            other => {
                return Err(FindError::unsupported(
                    &qualified,
                    format!("{} is not supported on polymorphic references", other.kind()),
                ))
            }
        })
    }

    /// Ids grouped by candidate column, in component declaration order.
    fn group_by_component(
        &self,
        components: &[PolyComponent],
        qualified: &str,
        values: Vec<Value>,
    ) -> Result<Vec<(usize, Vec<Value>)>> {
        let mut groups: Vec<(usize, Vec<Value>)> = Vec::new();
        for value in values {
            let (index, id) = self.polymorphic_component(components, qualified, &value)?;
            match groups.iter_mut().find(|(i, _)| *i == index) {
                Some((_, ids)) => ids.push(id),
                None => groups.push((index, vec![id])),
            }
        }
        groups.sort_by_key(|(index, _)| *index);
        Ok(groups)
    }

    /// Candidate column for a tagged id, and the id's database value.
    fn polymorphic_component(
        &self,
        components: &[PolyComponent],
        qualified: &str,
        value: &Value,
    ) -> Result<(usize, Value)> {
        let value = entity_value(value);
        if value == Value::from(UNSAVED_ENTITY_ID) {
            let first = components.first().ok_or_else(|| {
                FindError::InvalidMetadata(format!("{qualified} has no polymorphic components"))
            })?;
            return Ok((0, first.column.codec.to_db(qualified, &value)?));
        }
        let tag = value
            .as_str()
            .and_then(|s| s.split_once(':'))
            .map(|(tag, _)| tag)
            .ok_or_else(|| FindError::invalid_id(qualified, &value))?;
        let target = self
            .registry
            .entity_by_tag(tag)
            .ok_or_else(|| FindError::invalid_id(qualified, &value))?;
        let index = components
            .iter()
            .position(|c| {
                self.registry.is_a(&c.other, &target.name) || self.registry.is_a(&target.name, &c.other)
            })
            .ok_or_else(|| FindError::invalid_id(qualified, &value))?;
        let id = self
            .registry
            .entity(&components[index].other)?
            .id_to_db(&value)?;
        Ok((index, id))
    }

    fn alias_expression(&self, expression: &AliasExpression) -> Result<ParsedExpressionFilter> {
        match expression {
            AliasExpression::And(children) => Ok(ParsedExpressionFilter::and(
                children
                    .iter()
                    .map(|c| self.alias_node(c))
                    .collect::<Result<_>>()?,
            )),
            AliasExpression::Or(children) => Ok(ParsedExpressionFilter::or(
                children
                    .iter()
                    .map(|c| self.alias_node(c))
                    .collect::<Result<_>>()?,
            )),
            AliasExpression::Condition(condition) => Ok(ParsedExpressionFilter::and(vec![
                self.alias_condition(condition)?,
            ])),
        }
    }

    fn alias_node(&self, expression: &AliasExpression) -> Result<ParsedExpressionCondition> {
        match expression {
            AliasExpression::Condition(condition) => self.alias_condition(condition),
            nested => Ok(ParsedExpressionCondition::Expression(
                self.alias_expression(nested)?,
            )),
        }
    }

    fn alias_condition(&self, condition: &AliasCondition) -> Result<ParsedExpressionCondition> {
        let (meta, alias) = self
            .bound
            .get(&condition.handle)
            .ok_or_else(|| FindError::UnboundAlias(condition.handle.clone()))?;
        let resolved = self.registry.resolve_field(meta, &condition.field)?;
        let table_alias = resolved.table_alias(alias);
        let filter = condition.filter.clone();
        let column_condition = match &resolved.field.kind {
            FieldKind::PrimaryKey(column) => self.conditions.column_condition(
                &table_alias,
                column,
                filter.try_map(|v| Ok(entity_value(&v)))?,
            )?,
            FieldKind::Primitive(column) | FieldKind::Enum(column) => {
                self.conditions.column_condition(&table_alias, column, filter)?
            }
            FieldKind::ManyToOne { column, .. } => self.conditions.column_condition(
                &table_alias,
                column,
                filter.try_map(|v| Ok(entity_value(&v)))?,
            )?,
            FieldKind::Polymorphic { components } => {
                return self.polymorphic_condition(&table_alias, &condition.field, components, filter)
            }
            _ => {
                return Err(FindError::unsupported(
                    &format!("{alias}.{}", condition.field),
                    "alias conditions support primitive, many-to-one and polymorphic fields",
                ))
            }
        };
        Ok(ParsedExpressionCondition::Column(column_condition))
    }

    fn add_order_bys(
        &mut self,
        query: &mut ParsedFindQuery,
        meta: &'a EntityMetadata,
        alias: &str,
        hint: &Value,
    ) -> Result<()> {
        match hint {
            Value::Object(map) => self.add_order_by_map(query, meta, alias, map),
            Value::Array(items) => {
                for item in items {
                    self.add_order_bys(query, meta, alias, item)?;
                }
                Ok(())
            }
            other => Err(FindError::unsupported(
                "orderBy",
                format!("expected an object or an array of objects, got {other}"),
            )),
        }
    }

    fn add_order_by_map(
        &mut self,
        query: &mut ParsedFindQuery,
        meta: &'a EntityMetadata,
        alias: &str,
        hint: &Map<String, Value>,
    ) -> Result<()> {
        let registry = self.registry;
        for (key, value) in hint {
            let resolved = registry.resolve_field(meta, key)?;
            let table_alias = resolved.table_alias(alias);
            match (&resolved.field.kind, value) {
                (
                    FieldKind::PrimaryKey(column)
                    | FieldKind::Primitive(column)
                    | FieldKind::Enum(column)
                    | FieldKind::ManyToOne { column, .. },
                    Value::String(direction),
                ) => {
                    query.order_bys.push(ParsedOrderBy::new(
                        &table_alias,
                        &column.name,
                        OrderDirection::parse(direction)?,
                    ));
                }
                (FieldKind::ManyToOne { column, other }, Value::Object(nested)) => {
                    let other = registry.entity(other)?;
                    let other_alias = self.join_entity(
                        query,
                        alias,
                        key,
                        ColumnRef::new(&table_alias, &column.name),
                        other,
                        &other.id_column()?.name,
                        JoinKind::Outer,
                        TableRole::OrderBy,
                    )?;
                    self.add_order_by_map(query, other, &other_alias, nested)?;
                }
                (
                    FieldKind::OneToOne {
                        other,
                        other_column,
                    },
                    Value::Object(nested),
                ) => {
                    let other = registry.entity(other)?;
                    let other_alias = self.join_entity(
                        query,
                        alias,
                        key,
                        ColumnRef::new(alias, ID_COLUMN),
                        other,
                        other_column,
                        JoinKind::Outer,
                        TableRole::OrderBy,
                    )?;
                    self.add_order_by_map(query, other, &other_alias, nested)?;
                }
                _ => {
                    return Err(FindError::unsupported(
                        &format!("{alias}.{key}"),
                        "cannot order by this field",
                    ))
                }
            }
        }
        Ok(())
    }
}

/// Split a `$count` key off a collection sub-filter.
fn split_count(value: &Value) -> Result<(Value, Vec<ParsedValueFilter<Value>>)> {
    match value {
        Value::Object(map) if map.contains_key(COUNT_PSEUDO_COLUMN) => {
            let mut rest = map.clone();
            let count = rest.remove(COUNT_PSEUDO_COLUMN).unwrap_or(Value::Null);
            Ok((Value::Object(rest), parse_value_filter(&count)?))
        }
        other => Ok((other.clone(), Vec::new())),
    }
}

fn as_object<'v>(field: &str, value: &'v Value) -> Result<&'v Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| FindError::unsupported(field, format!("expected a nested filter, got {value}")))
}

/// Order by the primary id last so pagination is deterministic.
fn append_tiebreaker(query: &mut ParsedFindQuery, meta: &EntityMetadata) -> Result<()> {
    let Some(alias) = query.primary_alias().map(str::to_string) else {
        return Ok(());
    };
    let id = &meta.id_column()?.name;
    if !query
        .order_bys
        .iter()
        .any(|o| o.alias == alias && &o.column == id)
    {
        query
            .order_bys
            .push(ParsedOrderBy::new(&alias, id, OrderDirection::Asc));
    }
    Ok(())
}
