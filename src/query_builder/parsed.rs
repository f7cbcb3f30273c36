//! # Find Query IR
//!
//! `ParsedFindQuery` is what the compiler produces and what the pruner,
//! rewriter and emitter consume. It is owned by a single compilation and
//! mutated in place by each pass.

use super::conditions::{ExpressionOp, ParsedExpressionCondition, ParsedExpressionFilter};
use super::emitter::{Dialect, EmitOptions, SqlEmitter};
use super::joins::{ColumnRef, ParsedTable};
use crate::error::{FindError, Result};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Sort direction, including explicit null placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
    AscNullsFirst,
    AscNullsLast,
    DescNullsFirst,
    DescNullsLast,
}

impl OrderDirection {
    /// Parse `ASC`, `DESC` and their `NULLS FIRST`/`NULLS LAST` forms, case-insensitively.
    pub fn parse(direction: &str) -> Result<Self> {
        let normalized = direction
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        match normalized.as_str() {
            "ASC" => Ok(OrderDirection::Asc),
            "DESC" => Ok(OrderDirection::Desc),
            "ASC NULLS FIRST" => Ok(OrderDirection::AscNullsFirst),
            "ASC NULLS LAST" => Ok(OrderDirection::AscNullsLast),
            "DESC NULLS FIRST" => Ok(OrderDirection::DescNullsFirst),
            "DESC NULLS LAST" => Ok(OrderDirection::DescNullsLast),
            _ => Err(FindError::UnsupportedOperator(format!(
                "invalid order direction '{direction}'"
            ))),
        }
    }

    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
            OrderDirection::AscNullsFirst => "ASC NULLS FIRST",
            OrderDirection::AscNullsLast => "ASC NULLS LAST",
            OrderDirection::DescNullsFirst => "DESC NULLS FIRST",
            OrderDirection::DescNullsLast => "DESC NULLS LAST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOrderBy {
    pub alias: String,
    pub column: String,
    pub order: OrderDirection,
}

impl ParsedOrderBy {
    pub fn new(alias: &str, column: &str, order: OrderDirection) -> Self {
        Self {
            alias: alias.to_string(),
            column: column.to_string(),
            order,
        }
    }
}

/// One entry of the select list.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedSelect {
    /// `alias.column`; the column may be `*`.
    Column(ColumnRef),
    /// Computed expression with `?` placeholders, e.g. a class-tag `CASE`.
    Sql {
        sql: String,
        bindings: Vec<Value>,
        aliases: Vec<String>,
    },
    /// `BOOL_OR(condition) AS name`, exposing a nested condition to an outer scope.
    BoolOr {
        condition: Box<ParsedExpressionCondition>,
        name: String,
    },
}

impl ParsedSelect {
    pub fn column(alias: &str, column: &str) -> Self {
        ParsedSelect::Column(ColumnRef::new(alias, column))
    }

    pub fn sql(sql: &str, aliases: &[&str]) -> Self {
        ParsedSelect::Sql {
            sql: sql.to_string(),
            bindings: Vec::new(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn collect_aliases(&self, into: &mut BTreeSet<String>) {
        match self {
            ParsedSelect::Column(column) => {
                into.insert(column.alias.clone());
            }
            ParsedSelect::Sql { aliases, .. } => into.extend(aliases.iter().cloned()),
            ParsedSelect::BoolOr { condition, .. } => condition.collect_aliases(into),
        }
    }
}

/// A named sub-query supplied by the caller and emitted in the `WITH` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCte {
    pub name: String,
    pub columns: Vec<String>,
    pub sql: String,
    pub bindings: Vec<Value>,
    pub recursive: bool,
}

/// The compiled form of one find, before SQL text is produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedFindQuery {
    pub selects: Vec<ParsedSelect>,
    pub tables: Vec<ParsedTable>,
    pub condition: Option<ParsedExpressionFilter>,
    pub group_bys: Vec<ColumnRef>,
    pub having: Option<ParsedExpressionFilter>,
    pub order_bys: Vec<ParsedOrderBy>,
    pub ctes: Vec<RawCte>,
}

impl ParsedFindQuery {
    /// A query over `table AS alias` with no selects yet.
    pub fn new(alias: &str, table: &str) -> Self {
        Self {
            tables: vec![ParsedTable::primary(alias, table)],
            ..Default::default()
        }
    }

    pub fn primary_alias(&self) -> Option<&str> {
        self.tables
            .iter()
            .find(|t| t.is_primary())
            .map(ParsedTable::alias)
    }

    pub fn table(&self, alias: &str) -> Option<&ParsedTable> {
        self.tables.iter().find(|t| t.alias() == alias)
    }

    /// True when a join into a collection can repeat this scope's rows.
    pub fn fans_out(&self) -> bool {
        self.tables.iter().any(ParsedTable::fans_out)
    }

    /// True when any table is a lateral or CTE sub-query.
    pub fn has_nested_scopes(&self) -> bool {
        self.tables.iter().any(|t| t.nested_query().is_some())
    }

    /// AND a condition into this scope's `WHERE`.
    pub fn add_condition(&mut self, condition: ParsedExpressionCondition) {
        push_and(&mut self.condition, condition);
    }

    /// AND a condition into this scope's `HAVING`.
    pub fn add_having(&mut self, condition: ParsedExpressionCondition) {
        push_and(&mut self.having, condition);
    }

    /// Every table alias in this query and its nested scopes, mapped to the
    /// aliases of the lateral/CTE entries enclosing it (empty for the root scope).
    pub fn alias_scopes(&self) -> HashMap<String, Vec<String>> {
        let mut scopes = HashMap::new();
        collect_scopes(self, &mut Vec::new(), &mut scopes);
        scopes
    }

    /// The nested query reached by following `path` from this scope.
    pub fn scope_mut(&mut self, path: &[String]) -> Option<&mut ParsedFindQuery> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        self.tables
            .iter_mut()
            .find(|t| t.alias() == first)
            .and_then(ParsedTable::nested_query_mut)
            .and_then(|nested| nested.scope_mut(rest))
    }

    /// Aliases read by this scope's own selects, conditions, groupings and ordering.
    /// Pruneable conditions are skipped, since they never keep a join alive.
    pub fn referenced_aliases(&self) -> BTreeSet<String> {
        let mut aliases = BTreeSet::new();
        for select in &self.selects {
            select.collect_aliases(&mut aliases);
        }
        for expr in self.condition.iter().chain(self.having.iter()) {
            for c in &expr.conditions {
                c.collect_required_aliases(&mut aliases);
            }
        }
        aliases.extend(self.group_bys.iter().map(|c| c.alias.clone()));
        aliases.extend(self.order_bys.iter().map(|o| o.alias.clone()));
        aliases
    }

    /// Cache key that keeps the query's structure but none of its bound values.
    ///
    /// Two queries with the same key differ only in the values they bind, so a
    /// batching layer can merge them into one statement.
    pub fn shape_key(&self) -> String {
        let emitted = SqlEmitter::new(Dialect::Question).emit(self, &EmitOptions::default());
        let types: Vec<&str> = emitted.bindings.iter().map(json_type_name).collect();
        format!("{} -- [{}]", emitted.sql, types.join(", "))
    }
}

fn push_and(target: &mut Option<ParsedExpressionFilter>, condition: ParsedExpressionCondition) {
    match target {
        Some(expr) if expr.op == ExpressionOp::And => {
            expr.conditions.push(condition)
        }
        Some(expr) => {
            let existing = ParsedExpressionCondition::Expression(expr.clone());
            *target = Some(ParsedExpressionFilter::and(vec![existing, condition]));
        }
        None => *target = Some(ParsedExpressionFilter::and(vec![condition])),
    }
}

fn collect_scopes(
    query: &ParsedFindQuery,
    path: &mut Vec<String>,
    into: &mut HashMap<String, Vec<String>>,
) {
    for table in &query.tables {
        into.insert(table.alias().to_string(), path.clone());
        if let Some(nested) = table.nested_query() {
            path.push(table.alias().to_string());
            collect_scopes(nested, path, into);
            path.pop();
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
