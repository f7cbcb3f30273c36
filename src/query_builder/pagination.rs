use serde::{Deserialize, Serialize};

/// `LIMIT` / `OFFSET` of a top-level find query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Pagination {
    /// Page-based pagination; pages are 1-indexed and page 0 is treated as the first.
    pub fn page(page: u32, per_page: u32) -> Self {
        Self {
            limit: Some(per_page),
            offset: Some(page.saturating_sub(1).saturating_mul(per_page)),
        }
    }

    pub fn limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: None,
        }
    }

    pub fn limit_offset(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }

    /// Cap the limit at `max_rows`, adding one when absent.
    pub fn clamped(self, max_rows: u32) -> Self {
        Self {
            limit: Some(self.limit.map_or(max_rows, |limit| limit.min(max_rows))),
            offset: self.offset,
        }
    }

    /// Following page of the same size, if this pagination is bounded.
    pub fn next(&self) -> Option<Self> {
        let limit = self.limit?;
        Some(Self {
            limit: Some(limit),
            offset: Some(self.offset.unwrap_or(0).saturating_add(limit)),
        })
    }

    /// Trailing SQL, with a leading space when non-empty.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }
}
