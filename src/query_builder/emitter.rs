//! # SQL Emitter
//!
//! Renders a finished [`ParsedFindQuery`] into SQL text and the positional
//! bindings for its placeholders.
//!
//! Bindings are pushed while the text is written, so their order always
//! matches the order of the placeholders, including those inside hoisted
//! CTEs, lateral sub-queries and raw SQL fragments.

use super::conditions::{ColumnCondition, ExpressionOp, ParsedExpressionCondition, ParsedExpressionFilter};
use super::filters::ParsedValueFilter;
use super::joins::ParsedTable;
use super::pagination::Pagination;
use super::parsed::{ParsedFindQuery, ParsedSelect, RawCte};
use crate::constants::ORDER_KEY_PREFIX;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Write;

/// Placeholder style of the emitted SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `?` placeholders, no casts.
    #[default]
    Question,
    /// `$1..$n` placeholders, cast to the column's database type.
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOptions {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// Only the outermost query writes the `WITH` clause.
    pub is_top_level: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            limit: None,
            offset: None,
            is_top_level: true,
        }
    }
}

impl From<&Pagination> for EmitOptions {
    fn from(pagination: &Pagination) -> Self {
        Self {
            limit: pagination.limit,
            offset: pagination.offset,
            is_top_level: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmittedSql {
    pub sql: String,
    pub bindings: Vec<Value>,
}

/// Stateless renderer; one instance can emit any number of queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlEmitter {
    dialect: Dialect,
}

enum CteDefinition<'q> {
    Raw(&'q RawCte),
    Query { name: &'q str, query: &'q ParsedFindQuery },
}

struct SqlWriter {
    dialect: Dialect,
    sql: String,
    bindings: Vec<Value>,
}

impl SqlWriter {
    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Bind one value; `cast` is only used by the Postgres dialect.
    fn bind(&mut self, value: Value, cast: Option<&str>) {
        self.bindings.push(value);
        match self.dialect {
            Dialect::Question => self.sql.push('?'),
            Dialect::Postgres => {
                let _ = write!(self.sql, "${}", self.bindings.len());
                if let Some(cast) = cast.filter(|c| !c.is_empty()) {
                    let _ = write!(self.sql, "::{cast}");
                }
            }
        }
    }

    /// Append caller SQL written with `?` placeholders. A `?` inside a quoted
    /// literal or identifier is left alone; the jsonb `?` operators are not supported.
    fn push_raw(&mut self, sql: &str, bindings: &[Value]) {
        match self.dialect {
            Dialect::Question => self.sql.push_str(sql),
            Dialect::Postgres => {
                let mut n = self.bindings.len();
                let mut quote: Option<char> = None;
                for ch in sql.chars() {
                    match (quote, ch) {
                        (None, '\'' | '"') => quote = Some(ch),
                        (Some(open), _) if open == ch => quote = None,
                        (None, '?') => {
                            n += 1;
                            let _ = write!(self.sql, "${n}");
                            continue;
                        }
                        _ => {}
                    }
                    self.sql.push(ch);
                }
            }
        }
        self.bindings.extend(bindings.iter().cloned());
    }
}

impl SqlEmitter {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn emit(&self, query: &ParsedFindQuery, options: &EmitOptions) -> EmittedSql {
        let mut w = SqlWriter {
            dialect: self.dialect,
            sql: String::new(),
            bindings: Vec::new(),
        };
        if options.is_top_level {
            self.write_with(&mut w, query);
        }
        self.write_query(&mut w, query);
        let pagination = Pagination {
            limit: options.limit,
            offset: options.offset,
        };
        w.push(&pagination.to_sql());
        EmittedSql {
            sql: w.sql,
            bindings: w.bindings,
        }
    }

    fn write_with(&self, w: &mut SqlWriter, query: &ParsedFindQuery) {
        let mut definitions = Vec::new();
        collect_ctes(query, &mut definitions);
        if definitions.is_empty() {
            return;
        }
        let recursive = definitions
            .iter()
            .any(|d| matches!(d, CteDefinition::Raw(raw) if raw.recursive));
        w.push(if recursive { "WITH RECURSIVE " } else { "WITH " });
        for (i, definition) in definitions.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match definition {
                CteDefinition::Raw(raw) => {
                    w.push(&raw.name);
                    if !raw.columns.is_empty() {
                        w.push(&format!(" ({})", raw.columns.join(", ")));
                    }
                    w.push(" AS (");
                    w.push_raw(&raw.sql, &raw.bindings);
                    w.push(")");
                }
                CteDefinition::Query { name, query } => {
                    w.push(name);
                    w.push(" AS (");
                    self.write_query(w, query);
                    w.push(")");
                }
            }
        }
        w.push(" ");
    }

    fn write_query(&self, w: &mut SqlWriter, query: &ParsedFindQuery) {
        // Collection joins repeat rows; DISTINCT needs every sort key in the select list.
        let distinct = query.fans_out();
        w.push(if distinct { "SELECT DISTINCT " } else { "SELECT " });
        if query.selects.is_empty() {
            w.push("*");
        }
        for (i, select) in query.selects.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            self.write_select(w, select);
        }
        if distinct {
            for key in unselected_sort_keys(query) {
                w.push(&format!(", {key}"));
            }
        }

        if let Some(primary) = query.tables.iter().find(|t| t.is_primary()) {
            w.push(" FROM ");
            w.push(&table_as(primary.table().unwrap_or_default(), primary.alias()));
        }
        for table in query.tables.iter().filter(|t| !t.is_primary()) {
            w.push(" ");
            self.write_join(w, table);
        }

        if let Some(condition) = query.condition.as_ref().filter(|c| !c.is_empty()) {
            w.push(" WHERE ");
            self.write_expression(w, condition, false);
        }
        if !query.group_bys.is_empty() {
            let columns: Vec<String> = query.group_bys.iter().map(|c| c.to_string()).collect();
            w.push(&format!(" GROUP BY {}", columns.join(", ")));
        }
        if let Some(having) = query.having.as_ref().filter(|c| !c.is_empty()) {
            w.push(" HAVING ");
            self.write_expression(w, having, false);
        }
        if !query.order_bys.is_empty() {
            let keys: Vec<String> = query
                .order_bys
                .iter()
                .map(|o| format!("{}.{} {}", o.alias, o.column, o.order.to_sql()))
                .collect();
            w.push(&format!(" ORDER BY {}", keys.join(", ")));
        }
    }

    fn write_select(&self, w: &mut SqlWriter, select: &ParsedSelect) {
        match select {
            ParsedSelect::Column(column) => w.push(&column.to_string()),
            ParsedSelect::Sql { sql, bindings, .. } => w.push_raw(sql, bindings),
            ParsedSelect::BoolOr { condition, name } => {
                w.push("BOOL_OR(");
                self.write_condition(w, condition);
                w.push(&format!(") AS {name}"));
            }
        }
    }

    fn write_join(&self, w: &mut SqlWriter, table: &ParsedTable) {
        match table {
            ParsedTable::Primary { .. } => {}
            ParsedTable::Join {
                kind,
                alias,
                table,
                col1,
                col2,
            } => {
                w.push(&format!(
                    "{} {} ON {col1} = {col2}",
                    kind.to_sql(),
                    table_as(table, alias)
                ));
            }
            ParsedTable::Lateral { alias, query, .. } => {
                w.push("CROSS JOIN LATERAL (");
                self.write_query(w, query);
                w.push(&format!(") AS {alias}"));
            }
            ParsedTable::Cte {
                alias, on, outer, ..
            } => match on {
                Some((col1, col2)) => {
                    let join = if *outer { "LEFT OUTER JOIN" } else { "JOIN" };
                    w.push(&format!("{join} {alias} ON {col1} = {col2}"));
                }
                None => w.push(&format!("CROSS JOIN {alias}")),
            },
            ParsedTable::Cross { alias, table } => {
                w.push(&format!("CROSS JOIN {}", table_as(table, alias)));
            }
        }
    }

    fn write_expression(&self, w: &mut SqlWriter, expr: &ParsedExpressionFilter, nested: bool) {
        if expr.conditions.is_empty() {
            w.push(match expr.op {
                ExpressionOp::And => "TRUE",
                ExpressionOp::Or => "FALSE",
            });
            return;
        }
        let wrap = nested && expr.conditions.len() > 1;
        if wrap {
            w.push("(");
        }
        for (i, condition) in expr.conditions.iter().enumerate() {
            if i > 0 {
                w.push(expr.op.to_sql());
            }
            self.write_condition(w, condition);
        }
        if wrap {
            w.push(")");
        }
    }

    fn write_condition(&self, w: &mut SqlWriter, condition: &ParsedExpressionCondition) {
        match condition {
            ParsedExpressionCondition::Expression(expr) => self.write_expression(w, expr, true),
            ParsedExpressionCondition::Column(column) => self.write_column_condition(w, column),
            ParsedExpressionCondition::Raw(raw) => w.push_raw(&raw.condition, &raw.bindings),
        }
    }

    fn write_column_condition(&self, w: &mut SqlWriter, c: &ColumnCondition) {
        use ParsedValueFilter::*;
        let column = if c.is_count() {
            "count(*)".to_string()
        } else {
            format!("{}.{}", c.alias, c.column)
        };
        let cast = Some(c.db_type.as_str());
        let array_cast = format!("{}[]", c.db_type);

        let binary = |w: &mut SqlWriter, op: &str, value: &Value| {
            w.push(&format!("{column} {op} "));
            w.bind(value.clone(), cast);
        };
        let negated = |w: &mut SqlWriter, op: &str, value: &Value| {
            w.push(&format!("NOT ({column} {op} "));
            w.bind(value.clone(), cast);
            w.push(")");
        };

        match &c.cond {
            Eq(v) => binary(w, "=", v),
            Ne(v) => binary(w, "!=", v),
            Gt(v) => binary(w, ">", v),
            Gte(v) => binary(w, ">=", v),
            Lt(v) => binary(w, "<", v),
            Lte(v) => binary(w, "<=", v),
            Like(v) => binary(w, "LIKE", v),
            Ilike(v) => binary(w, "ILIKE", v),
            Nlike(v) => binary(w, "NOT LIKE", v),
            Nilike(v) => binary(w, "NOT ILIKE", v),
            Contains(v) => binary(w, "@>", v),
            Overlaps(v) => binary(w, "&&", v),
            ContainedBy(v) => binary(w, "<@", v),
            Ncontains(v) => negated(w, "@>", v),
            Noverlaps(v) => negated(w, "&&", v),
            NcontainedBy(v) => negated(w, "<@", v),
            In(values) if values.is_empty() => w.push("FALSE"),
            Nin(values) if values.is_empty() => w.push("TRUE"),
            In(values) => {
                w.push(&format!("{column} = ANY("));
                w.bind(Value::Array(values.clone()), Some(&array_cast));
                w.push(")");
            }
            Nin(values) => {
                w.push(&format!("{column} != ALL("));
                w.bind(Value::Array(values.clone()), Some(&array_cast));
                w.push(")");
            }
            Between(low, high) => {
                w.push(&format!("{column} BETWEEN "));
                w.bind(low.clone(), cast);
                w.push(" AND ");
                w.bind(high.clone(), cast);
            }
            IsNull => w.push(&format!("{column} IS NULL")),
            NotNull => w.push(&format!("{column} IS NOT NULL")),
        }
    }
}

/// `alias.column AS __order_{i}` for each sort key whose table is not selected with `*`.
fn unselected_sort_keys(query: &ParsedFindQuery) -> Vec<String> {
    let starred: HashSet<&str> = query
        .selects
        .iter()
        .filter_map(|select| match select {
            ParsedSelect::Column(column) if column.column == "*" => Some(column.alias.as_str()),
            _ => None,
        })
        .collect();
    query
        .order_bys
        .iter()
        .enumerate()
        .filter(|(_, o)| !starred.contains(o.alias.as_str()))
        .map(|(i, o)| format!("{}.{} AS {ORDER_KEY_PREFIX}{i}", o.alias, o.column))
        .collect()
}

fn table_as(table: &str, alias: &str) -> String {
    if table == alias {
        table.to_string()
    } else {
        format!("{table} AS {alias}")
    }
}

/// Raw CTEs and CTE tables from every scope, innermost definitions first.
fn collect_ctes<'q>(query: &'q ParsedFindQuery, into: &mut Vec<CteDefinition<'q>>) {
    into.extend(query.ctes.iter().map(CteDefinition::Raw));
    for table in &query.tables {
        if let Some(nested) = table.nested_query() {
            collect_ctes(nested, into);
        }
        if let ParsedTable::Cte { alias, query, .. } = table {
            into.push(CteDefinition::Query { name: alias, query });
        }
    }
}
