//! # Join Pruner
//!
//! Mark-and-sweep over table aliases. Marking starts from what the root query
//! reads (selects, non-pruneable conditions, groupings, ordering, caller keep
//! aliases) and follows join dependencies until nothing new is reached; a
//! lateral or CTE entry that gets marked also marks what its own nested query
//! reads. Sweeping drops unmarked tables and the pruneable guards that
//! pointed at them.

use super::conditions::ParsedExpressionFilter;
use super::parsed::ParsedFindQuery;
use crate::constants::inheritance;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
struct AliasNode {
    /// Aliases that must stay if this one stays.
    requires: Vec<String>,
}

/// Removes joins nothing refers to.
#[derive(Debug, Default)]
pub struct JoinPruner {
    nodes: HashMap<String, AliasNode>,
    required: HashSet<String>,
}

impl JoinPruner {
    /// Prune `query` in place, keeping `keep_aliases` regardless. Returns the number of tables removed.
    pub fn prune(query: &mut ParsedFindQuery, keep_aliases: &[String]) -> usize {
        let mut pruner = Self::default();
        pruner.index(query, None);

        let mut seeds = query.referenced_aliases();
        seeds.extend(keep_aliases.iter().cloned());
        seeds.extend(query.primary_alias().map(str::to_string));
        pruner.mark(seeds);

        let removed = pruner.sweep_tables(query);
        let mut surviving = HashSet::new();
        collect_surviving(query, &mut surviving);
        let guards = sweep_guards(query, &surviving);
        debug!(
            tables_removed = removed,
            guards_removed = guards,
            "Pruned unused joins"
        );
        removed
    }

    fn index(&mut self, query: &ParsedFindQuery, owner: Option<&str>) {
        let aliases: HashSet<&str> = query.tables.iter().map(|t| t.alias()).collect();
        for table in &query.tables {
            let alias = table.alias();
            let mut requires: Vec<String> =
                table.dependencies().into_iter().map(str::to_string).collect();
            requires.extend(owner.map(str::to_string));
            // Class-table bases complete the entity's row, so they live as long as it does.
            requires.extend(
                (0..)
                    .map(|i| inheritance::base_alias(alias, i))
                    .take_while(|base| aliases.contains(base.as_str())),
            );
            if let Some(nested) = table.nested_query() {
                requires.extend(nested.referenced_aliases());
                requires.extend(nested.primary_alias().map(str::to_string));
                self.index(nested, Some(alias));
            }
            self.nodes.insert(alias.to_string(), AliasNode { requires });
        }
    }

    fn mark(&mut self, seeds: BTreeSet<String>) {
        let mut pending: Vec<String> = seeds.into_iter().collect();
        while let Some(alias) = pending.pop() {
            if !self.required.insert(alias.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&alias) {
                pending.extend(
                    node.requires
                        .iter()
                        .filter(|a| !self.required.contains(*a))
                        .cloned(),
                );
            }
        }
    }

    fn sweep_tables(&self, query: &mut ParsedFindQuery) -> usize {
        let before = query.tables.len();
        query
            .tables
            .retain(|t| t.is_primary() || self.required.contains(t.alias()));
        let mut removed = before - query.tables.len();
        for table in &mut query.tables {
            if let Some(nested) = table.nested_query_mut() {
                removed += self.sweep_tables(nested);
            }
        }
        removed
    }
}

fn collect_surviving(query: &ParsedFindQuery, into: &mut HashSet<String>) {
    for table in &query.tables {
        into.insert(table.alias().to_string());
        if let Some(nested) = table.nested_query() {
            collect_surviving(nested, into);
        }
    }
}

/// Drop pruneable conditions that read a removed alias, in every scope.
fn sweep_guards(query: &mut ParsedFindQuery, surviving: &HashSet<String>) -> usize {
    let keep = |alias: &str| surviving.contains(alias);
    let mut removed = sweep_expression(&mut query.condition, &keep);
    removed += sweep_expression(&mut query.having, &keep);
    for table in &mut query.tables {
        if let Some(nested) = table.nested_query_mut() {
            removed += sweep_guards(nested, surviving);
        }
    }
    removed
}

fn sweep_expression(
    expression: &mut Option<ParsedExpressionFilter>,
    keep: &dyn Fn(&str) -> bool,
) -> usize {
    let Some(expr) = expression else {
        return 0;
    };
    let removed = expr.remove_pruneable(keep);
    if expr.is_empty() {
        *expression = None;
    }
    removed
}
