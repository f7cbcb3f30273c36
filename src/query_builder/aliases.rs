use super::parsed::ParsedFindQuery;
use crate::constants::inheritance;
use std::collections::{HashMap, HashSet};

/// Hands out short, unique table aliases for one compilation.
///
/// `book_reviews` abbreviates to `br`; repeated abbreviations get a numeric
/// suffix (`br`, `br1`, `br2`, ...).
#[derive(Debug, Clone, Default)]
pub struct AliasAssigner {
    next_index: HashMap<String, usize>,
    used: HashSet<String>,
}

impl AliasAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume numbering after the aliases already present in `query`, including nested scopes.
    pub fn from_query(query: &ParsedFindQuery) -> Self {
        let mut assigner = Self::new();
        assigner.seed(query);
        assigner
    }

    fn seed(&mut self, query: &ParsedFindQuery) {
        for table in &query.tables {
            let alias = table.alias();
            self.used.insert(alias.to_string());
            if let Some(nested) = table.nested_query() {
                self.seed(nested);
            }
            if inheritance::is_inheritance_alias(alias) || alias.starts_with('_') {
                continue;
            }
            let prefix = alias.trim_end_matches(|c: char| c.is_ascii_digit());
            let index = alias[prefix.len()..].parse::<usize>().unwrap_or(0);
            let next = self.next_index.entry(prefix.to_string()).or_insert(0);
            *next = (*next).max(index + 1);
        }
    }

    pub fn get_alias(&mut self, table_name: &str) -> String {
        let abbreviation = abbreviate(table_name);
        loop {
            let next = self.next_index.entry(abbreviation.clone()).or_insert(0);
            let index = *next;
            *next += 1;
            let alias = if index == 0 {
                abbreviation.clone()
            } else {
                format!("{abbreviation}{index}")
            };
            if self.used.insert(alias.clone()) {
                return alias;
            }
        }
    }
}

/// First letter of each underscore-separated word, lower-cased.
pub fn abbreviate(table_name: &str) -> String {
    let abbreviation: String = table_name
        .split('_')
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_lowercase)
        .collect();
    if abbreviation.is_empty() {
        "t".to_string()
    } else {
        abbreviation
    }
}
