//! Page/limit pagination shared by every listing operation.

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

const DEFAULT_PAGE: u64 = 1;
const DEFAULT_LIMIT: u64 = 10;
const MAX_ROWS: u64 = i64::MAX as u64;

/// 1-indexed pagination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    /// Page number, starting at 1.
    #[serde(default = "default_page")]
    pub page: u64,
    /// Maximum rows per page.
    #[serde(default = "default_limit")]
    pub limit: u64,
}

const fn default_page() -> u64 {
    DEFAULT_PAGE
}

const fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    /// Build a pagination request from optional raw values, applying defaults.
    pub fn new(page: Option<u64>, limit: Option<u64>) -> AppResult<Self> {
        let pagination = Self {
            page: page.unwrap_or(DEFAULT_PAGE),
            limit: limit.unwrap_or(DEFAULT_LIMIT),
        };
        pagination.validate()?;
        Ok(pagination)
    }

    /// Both page and limit must be positive, and the offset must fit a
    /// signed 64-bit SQL parameter.
    pub fn validate(&self) -> AppResult<()> {
        if self.page == 0 || self.limit == 0 {
            return Err(AppError::InvalidRequest(
                "page and limit must be positive integers".to_string(),
            ));
        }
        if self.limit > MAX_ROWS || self.offset() > MAX_ROWS {
            return Err(AppError::InvalidRequest(
                "page and limit are out of range".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of rows to skip. Saturates instead of overflowing.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of results together with the total number of matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// Total rows matching the filter, across all pages.
    pub count: u64,
    /// Rows on this page.
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Transform every row, keeping the count.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}
