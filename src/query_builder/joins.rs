use super::parsed::ParsedFindQuery;
use std::fmt;

/// A qualified column reference, `alias.column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: &str, column: &str) -> Self {
        Self {
            alias: alias.to_string(),
            column: column.to_string(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.column)
    }
}

/// Equi-join flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Outer,
    /// Outer join into a collection; may repeat the row it joins from.
    OuterMany,
}

impl JoinKind {
    pub fn to_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Outer | JoinKind::OuterMany => "LEFT OUTER JOIN",
        }
    }
}

/// One table occurrence in a find query.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedTable {
    /// The root table; has no join condition.
    Primary { alias: String, table: String },
    /// `kind JOIN table AS alias ON col1 = col2`, where `col1` is the already-present side.
    Join {
        kind: JoinKind,
        alias: String,
        table: String,
        col1: ColumnRef,
        col2: ColumnRef,
    },
    /// `CROSS JOIN LATERAL (query) AS alias`, correlated to `from_alias`.
    Lateral {
        alias: String,
        from_alias: String,
        query: Box<ParsedFindQuery>,
    },
    /// A sub-query hoisted into the `WITH` clause and joined by name.
    Cte {
        alias: String,
        query: Box<ParsedFindQuery>,
        on: Option<(ColumnRef, ColumnRef)>,
        outer: bool,
    },
    /// `CROSS JOIN table AS alias`, e.g. a raw CTE or an unnest.
    Cross { alias: String, table: String },
}

impl ParsedTable {
    pub fn primary(alias: &str, table: &str) -> Self {
        ParsedTable::Primary {
            alias: alias.to_string(),
            table: table.to_string(),
        }
    }

    /// Create an INNER JOIN
    pub fn inner(alias: &str, table: &str, col1: ColumnRef, col2: ColumnRef) -> Self {
        ParsedTable::Join {
            kind: JoinKind::Inner,
            alias: alias.to_string(),
            table: table.to_string(),
            col1,
            col2,
        }
    }

    /// Create a LEFT OUTER JOIN
    pub fn outer(alias: &str, table: &str, col1: ColumnRef, col2: ColumnRef) -> Self {
        ParsedTable::Join {
            kind: JoinKind::Outer,
            alias: alias.to_string(),
            table: table.to_string(),
            col1,
            col2,
        }
    }

    /// Create a LEFT OUTER JOIN into a collection's rows
    pub fn outer_many(alias: &str, table: &str, col1: ColumnRef, col2: ColumnRef) -> Self {
        ParsedTable::Join {
            kind: JoinKind::OuterMany,
            alias: alias.to_string(),
            table: table.to_string(),
            col1,
            col2,
        }
    }

    /// Create a CROSS JOIN
    pub fn cross(alias: &str, table: &str) -> Self {
        ParsedTable::Cross {
            alias: alias.to_string(),
            table: table.to_string(),
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            ParsedTable::Primary { alias, .. }
            | ParsedTable::Join { alias, .. }
            | ParsedTable::Lateral { alias, .. }
            | ParsedTable::Cte { alias, .. }
            | ParsedTable::Cross { alias, .. } => alias,
        }
    }

    /// Physical table name, if this entry reads from one.
    pub fn table(&self) -> Option<&str> {
        match self {
            ParsedTable::Primary { table, .. }
            | ParsedTable::Join { table, .. }
            | ParsedTable::Cross { table, .. } => Some(table.as_str()),
            ParsedTable::Lateral { .. } | ParsedTable::Cte { .. } => None,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, ParsedTable::Primary { .. })
    }

    /// True for joins that can repeat rows of the tables before them.
    pub fn fans_out(&self) -> bool {
        matches!(
            self,
            ParsedTable::Join {
                kind: JoinKind::OuterMany,
                ..
            }
        )
    }

    /// Aliases this entry's join condition reads from; they must stay if this entry stays.
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            ParsedTable::Join { col1, .. } => vec![col1.alias.as_str()],
            ParsedTable::Lateral { from_alias, .. } => vec![from_alias.as_str()],
            ParsedTable::Cte { on: Some((col1, _)), .. } => vec![col1.alias.as_str()],
            _ => vec![],
        }
    }

    /// Nested query owned by a lateral or CTE entry.
    pub fn nested_query(&self) -> Option<&ParsedFindQuery> {
        match self {
            ParsedTable::Lateral { query, .. } | ParsedTable::Cte { query, .. } => Some(&**query),
            _ => None,
        }
    }

    pub fn nested_query_mut(&mut self) -> Option<&mut ParsedFindQuery> {
        match self {
            ParsedTable::Lateral { query, .. } | ParsedTable::Cte { query, .. } => {
                Some(&mut **query)
            }
            _ => None,
        }
    }
}
