use super::filters::ParsedValueFilter;
use crate::constants::COUNT_PSEUDO_COLUMN;
use crate::error::{FindError, Result};
use crate::metadata::Column;
use serde_json::Value;
use std::collections::BTreeSet;

/// How the children of an expression node are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionOp {
    And,
    Or,
}

impl ExpressionOp {
    pub fn to_sql(&self) -> &'static str {
        match self {
            ExpressionOp::And => " AND ",
            ExpressionOp::Or => " OR ",
        }
    }
}

/// `alias.column <cond>`, with values already in their database form.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnCondition {
    pub alias: String,
    pub column: String,
    pub db_type: String,
    pub cond: ParsedValueFilter<Value>,
    /// Auto-injected guards (soft deletes, existence checks) that may go with their join.
    pub pruneable: bool,
}

impl ColumnCondition {
    pub fn new(alias: &str, column: &str, db_type: &str, cond: ParsedValueFilter<Value>) -> Self {
        Self {
            alias: alias.to_string(),
            column: column.to_string(),
            db_type: db_type.to_string(),
            cond,
            pruneable: false,
        }
    }

    pub fn pruneable(mut self) -> Self {
        self.pruneable = true;
        self
    }

    /// Condition on the `$count` pseudo-column of a lateral collection sub-query.
    pub fn is_count(&self) -> bool {
        self.column == COUNT_PSEUDO_COLUMN
    }
}

/// Literal SQL with `?` placeholders and the aliases it reads.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCondition {
    pub aliases: Vec<String>,
    pub condition: String,
    pub bindings: Vec<Value>,
    pub pruneable: bool,
}

impl RawCondition {
    pub fn new(aliases: &[&str], condition: &str, bindings: Vec<Value>) -> Self {
        Self {
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            condition: condition.to_string(),
            bindings,
            pruneable: false,
        }
    }
}

/// A node in the condition tree
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedExpressionCondition {
    Expression(ParsedExpressionFilter),
    Column(ColumnCondition),
    Raw(RawCondition),
}

impl ParsedExpressionCondition {
    /// Every alias read anywhere under this node.
    pub fn aliases(&self) -> BTreeSet<String> {
        let mut aliases = BTreeSet::new();
        self.collect_aliases(&mut aliases);
        aliases
    }

    pub fn collect_aliases(&self, into: &mut BTreeSet<String>) {
        match self {
            ParsedExpressionCondition::Expression(expr) => expr.collect_aliases(into),
            ParsedExpressionCondition::Column(c) => {
                into.insert(c.alias.clone());
            }
            ParsedExpressionCondition::Raw(r) => into.extend(r.aliases.iter().cloned()),
        }
    }

    /// Aliases of conditions that must keep their joins alive.
    pub fn collect_required_aliases(&self, into: &mut BTreeSet<String>) {
        match self {
            ParsedExpressionCondition::Expression(expr) => {
                for c in &expr.conditions {
                    c.collect_required_aliases(into);
                }
            }
            ParsedExpressionCondition::Column(c) if !c.pruneable => {
                into.insert(c.alias.clone());
            }
            ParsedExpressionCondition::Raw(r) if !r.pruneable => {
                into.extend(r.aliases.iter().cloned())
            }
            _ => {}
        }
    }

    fn is_pruneable(&self) -> bool {
        match self {
            ParsedExpressionCondition::Column(c) => c.pruneable,
            ParsedExpressionCondition::Raw(r) => r.pruneable,
            ParsedExpressionCondition::Expression(_) => false,
        }
    }
}

/// An AND/OR tree of conditions
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpressionFilter {
    pub op: ExpressionOp,
    pub conditions: Vec<ParsedExpressionCondition>,
}

impl ParsedExpressionFilter {
    /// Combine multiple conditions with AND
    pub fn and(conditions: Vec<ParsedExpressionCondition>) -> Self {
        Self {
            op: ExpressionOp::And,
            conditions,
        }
    }

    /// Combine multiple conditions with OR
    pub fn or(conditions: Vec<ParsedExpressionCondition>) -> Self {
        Self {
            op: ExpressionOp::Or,
            conditions,
        }
    }

    pub fn collect_aliases(&self, into: &mut BTreeSet<String>) {
        for c in &self.conditions {
            c.collect_aliases(into);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Drop pruneable leaves whose aliases fail `keep`, then collapse emptied nodes.
    pub fn remove_pruneable(&mut self, keep: &dyn Fn(&str) -> bool) -> usize {
        let mut removed = 0;
        self.conditions.retain_mut(|c| {
            if let ParsedExpressionCondition::Expression(expr) = c {
                removed += expr.remove_pruneable(keep);
                return !expr.is_empty();
            }
            let drop = c.is_pruneable() && c.aliases().iter().any(|a| !keep(a));
            if drop {
                removed += 1;
            }
            !drop
        });
        removed
    }
}

/// Accumulates conditions while the compiler walks a filter.
#[derive(Debug, Default)]
pub struct ConditionBuilder {
    conditions: Vec<ParsedExpressionCondition>,
}

impl ConditionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a normalized filter against `alias.column`, mapping values through the column codec.
    pub fn add_value_filter(
        &mut self,
        alias: &str,
        column: &Column,
        filter: ParsedValueFilter<Value>,
    ) -> Result<()> {
        let condition = self.column_condition(alias, column, filter)?;
        self.conditions.push(ParsedExpressionCondition::Column(condition));
        Ok(())
    }

    /// Same as [`Self::add_value_filter`], but the condition may be pruned with its join.
    pub fn add_pruneable_value_filter(
        &mut self,
        alias: &str,
        column: &Column,
        filter: ParsedValueFilter<Value>,
    ) -> Result<()> {
        let condition = self.column_condition(alias, column, filter)?.pruneable();
        self.conditions.push(ParsedExpressionCondition::Column(condition));
        Ok(())
    }

    pub fn column_condition(
        &self,
        alias: &str,
        column: &Column,
        filter: ParsedValueFilter<Value>,
    ) -> Result<ColumnCondition> {
        let qualified = format!("{alias}.{}", column.name);
        let is_array = column.codec.is_array();
        if filter.is_array_operator() && !is_array {
            return Err(FindError::unsupported(
                &qualified,
                format!("{} requires an array column", filter.kind()),
            ));
        }
        let filter = match filter {
            // A bare array against an array column means "contains these".
            ParsedValueFilter::In(values) if is_array => ParsedValueFilter::Contains(Value::Array(values)),
            ParsedValueFilter::Nin(values) if is_array => {
                ParsedValueFilter::Ncontains(Value::Array(values))
            }
            other => other,
        };
        let cond = filter.try_map(|v| column.codec.to_db(&qualified, &v))?;
        Ok(ColumnCondition::new(alias, &column.name, &column.db_type, cond))
    }

    pub fn add_condition(&mut self, condition: ParsedExpressionCondition) {
        self.conditions.push(condition);
    }

    /// AND in a caller expression; a top-level AND is flattened so its children can be pushed down.
    pub fn add_expression(&mut self, expression: ParsedExpressionFilter) {
        match expression.op {
            ExpressionOp::And => self.conditions.extend(expression.conditions),
            ExpressionOp::Or if expression.is_empty() => {}
            ExpressionOp::Or => self
                .conditions
                .push(ParsedExpressionCondition::Expression(expression)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// True when some non-pruneable top-level condition reads only `aliases`.
    pub fn has_condition_within(&self, aliases: &BTreeSet<String>) -> bool {
        self.conditions.iter().any(|c| {
            let read = c.aliases();
            !c.is_pruneable() && !read.is_empty() && read.is_subset(aliases)
        })
    }

    pub fn to_expression_filter(self) -> Option<ParsedExpressionFilter> {
        if self.conditions.is_empty() {
            None
        } else {
            Some(ParsedExpressionFilter::and(self.conditions))
        }
    }
}
