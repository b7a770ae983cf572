//! Common types used across the platform

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored or submitted tag does not name a known variant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}

impl Pagination {
    /// Clamp to sane bounds and return `(limit, offset)` for SQL
    pub fn limit_offset(&self) -> (i64, i64) {
        let per_page = self.per_page.clamp(1, 500) as i64;
        let page = self.page.max(1) as i64;
        (per_page, (page - 1) * per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_limit_offset() {
        let p = Pagination { page: 3, per_page: 20 };
        assert_eq!(p.limit_offset(), (20, 40));
    }

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination { page: 0, per_page: 10_000 };
        assert_eq!(p.limit_offset(), (500, 0));
    }
}
