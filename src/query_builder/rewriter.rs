//! # Condition Rewriter
//!
//! Pushes top-level AND-ed conditions down into the lateral/CTE sub-queries
//! that own the aliases they read. Runs after pruning.
//!
//! - A condition that only reads root aliases stays where it is.
//! - A condition reading one nested scope (plus, possibly, correlated outer
//!   aliases) moves into that scope. `$count` conditions move into its `HAVING`.
//! - A condition reading several nested scopes moves into their deepest
//!   common scope; each leaf living deeper than that is replaced by a
//!   `BOOL_OR(..)` projection bubbled up one scope at a time. When the only
//!   common scope is the root, the condition stays at the root in the same
//!   rewritten form.
//! - An AND/OR node with a leaf reading only root aliases stays at the root,
//!   with its nested leaves bubbled the same way.

use super::conditions::{ColumnCondition, ExpressionOp, ParsedExpressionCondition, ParsedExpressionFilter};
use super::filters::ParsedValueFilter;
use super::parsed::{ParsedFindQuery, ParsedSelect};
use crate::error::{FindError, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub struct ConditionRewriter {
    scopes: HashMap<String, Vec<String>>,
}

impl ConditionRewriter {
    pub fn rewrite(query: &mut ParsedFindQuery) -> Result<()> {
        if !query.has_nested_scopes() {
            return Ok(());
        }
        let Some(condition) = query.condition.take() else {
            return Ok(());
        };
        let rewriter = Self {
            scopes: query.alias_scopes(),
        };

        if condition.op == ExpressionOp::Or {
            rewriter.log_groups(&condition);
            query.condition = Some(condition);
            return Ok(());
        }

        let mut kept = Vec::new();
        let mut moved = 0;
        for child in condition.conditions {
            match rewriter.place(query, child)? {
                Some(child) => kept.push(child),
                None => moved += 1,
            }
        }
        debug!(moved, kept = kept.len(), "Pushed conditions into nested scopes");
        query.condition = (!kept.is_empty()).then(|| ParsedExpressionFilter::and(kept));
        Ok(())
    }

    /// Move `condition` into the scope it belongs to; returns it back when it stays at the root.
    fn place(
        &self,
        query: &mut ParsedFindQuery,
        condition: ParsedExpressionCondition,
    ) -> Result<Option<ParsedExpressionCondition>> {
        let nested: Vec<&Vec<String>> = self
            .paths(&condition)?
            .into_iter()
            .filter(|path| !path.is_empty())
            .collect();
        if nested.is_empty() {
            return Ok(Some(condition));
        }

        if let ParsedExpressionCondition::Column(column) = &condition {
            if column.is_count() {
                let path = self.leaf_path(&condition)?;
                scope(query, &path)?.add_having(condition);
                return Ok(None);
            }
        }

        let target = if self.has_root_leaf(&condition)? {
            Vec::new()
        } else {
            common_prefix(&nested)
        };
        let rewritten = self.bubble_leaves(query, condition, target.len())?;
        if target.is_empty() {
            Ok(Some(rewritten))
        } else {
            scope(query, &target)?.add_condition(rewritten);
            Ok(None)
        }
    }

    fn has_root_leaf(&self, condition: &ParsedExpressionCondition) -> Result<bool> {
        match condition {
            ParsedExpressionCondition::Expression(expr) => {
                for child in &expr.conditions {
                    if self.has_root_leaf(child)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            leaf => Ok(self.leaf_path(leaf)?.is_empty()),
        }
    }

    /// Scope path of every alias the condition reads.
    fn paths(&self, condition: &ParsedExpressionCondition) -> Result<Vec<&Vec<String>>> {
        condition
            .aliases()
            .iter()
            .map(|alias| {
                self.scopes.get(alias).ok_or_else(|| {
                    FindError::NotImplemented(format!(
                        "condition references alias {alias}, which is not in any scope"
                    ))
                })
            })
            .collect()
    }

    /// The scope a leaf lives in: the deepest scope it reads, which must nest all the others.
    fn leaf_path(&self, leaf: &ParsedExpressionCondition) -> Result<Vec<String>> {
        let mut paths = self.paths(leaf)?;
        paths.sort_by_key(|p| p.len());
        let Some(deepest) = paths.last() else {
            return Ok(Vec::new());
        };
        if paths.iter().any(|p| !deepest.starts_with(p)) {
            return Err(FindError::NotImplemented(
                "a single condition reading sibling lateral scopes".to_string(),
            ));
        }
        Ok((*deepest).clone())
    }

    fn bubble_leaves(
        &self,
        query: &mut ParsedFindQuery,
        condition: ParsedExpressionCondition,
        depth: usize,
    ) -> Result<ParsedExpressionCondition> {
        match condition {
            ParsedExpressionCondition::Expression(expr) => {
                let conditions = expr
                    .conditions
                    .into_iter()
                    .map(|c| self.bubble_leaves(query, c, depth))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ParsedExpressionCondition::Expression(ParsedExpressionFilter {
                    op: expr.op,
                    conditions,
                }))
            }
            leaf => {
                let path = self.leaf_path(&leaf)?;
                if path.len() <= depth {
                    return Ok(leaf);
                }
                if matches!(&leaf, ParsedExpressionCondition::Column(c) if c.is_count()) {
                    return Err(FindError::NotImplemented(
                        "$count combined with conditions on other scopes".to_string(),
                    ));
                }
                bubble(query, leaf, &path, depth)
            }
        }
    }

    fn log_groups(&self, condition: &ParsedExpressionFilter) {
        let mut groups: BTreeMap<String, usize> = BTreeMap::new();
        for child in &condition.conditions {
            let mut scopes: Vec<String> = child
                .aliases()
                .iter()
                .filter_map(|a| self.scopes.get(a))
                .filter(|p| !p.is_empty())
                .map(|p| p.join("/"))
                .collect();
            scopes.sort();
            scopes.dedup();
            *groups.entry(scopes.join(",")).or_default() += 1;
        }
        debug!(?groups, "Top-level OR is not pushed into nested scopes");
    }
}

/// Replace `leaf` by a chain of `BOOL_OR` projections from its own scope up to `depth`.
fn bubble(
    query: &mut ParsedFindQuery,
    leaf: ParsedExpressionCondition,
    path: &[String],
    depth: usize,
) -> Result<ParsedExpressionCondition> {
    let mut current = leaf;
    for k in (depth + 1..=path.len()).rev() {
        let owner = &path[k - 1];
        let inner = scope(query, &path[..k])?;
        let n = inner
            .selects
            .iter()
            .filter(|s| matches!(s, ParsedSelect::BoolOr { .. }))
            .count();
        let name = format!("{owner}_{n}");
        inner.selects.push(ParsedSelect::BoolOr {
            condition: Box::new(current),
            name: name.clone(),
        });
        current = ParsedExpressionCondition::Column(ColumnCondition::new(
            owner,
            &name,
            "boolean",
            ParsedValueFilter::Eq(Value::Bool(true)),
        ));
    }
    Ok(current)
}

fn scope<'q>(query: &'q mut ParsedFindQuery, path: &[String]) -> Result<&'q mut ParsedFindQuery> {
    query
        .scope_mut(path)
        .ok_or_else(|| FindError::NotImplemented(format!("no nested scope at {}", path.join("/"))))
}

fn common_prefix(paths: &[&Vec<String>]) -> Vec<String> {
    let Some((first, rest)) = paths.split_first() else {
        return Vec::new();
    };
    let len = rest.iter().fold(first.len(), |len, path| {
        first
            .iter()
            .zip(path.iter())
            .take(len)
            .take_while(|(a, b)| a == b)
            .count()
    });
    first[..len].to_vec()
}
