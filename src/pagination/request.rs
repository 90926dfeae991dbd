use serde::Deserialize;

use super::PaginationError;
use crate::config::PaginationConfig;

/// Raw pagination parameters as they appear in the query string.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageQuery {
    pub size: Option<String>,
    pub page: Option<String>,
    pub before: Option<String>,
    pub before_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Offset { size: u32, page: u32 },
    /// Items strictly older than `(before, before_id)` in `created DESC, id
    /// DESC` order. Without `before_id` every item created at `before` is
    /// excluded.
    Cursor {
        size: u32,
        before: String,
        before_id: Option<i64>,
    },
}

impl PageRequest {
    /// Parse raw query parameters.
    ///
    /// A non-empty `before` selects cursor mode, anything else is offset mode.
    /// `before_id` breaks ties between items sharing the `before` timestamp
    /// and is only meaningful alongside it.
    /// Absent values fall back to defaults; present values that are not
    /// positive integers (or exceed the configured maximum size) are rejected.
    pub fn parse(query: &PageQuery, config: &PaginationConfig) -> Result<Self, PaginationError> {
        let size = match non_empty(&query.size) {
            Some(raw) => {
                let size = parse_positive("size", raw)?;
                if size > config.max_size {
                    return Err(PaginationError::invalid("size", raw));
                }
                size
            }
            None => config.default_size,
        };

        let before_id = match non_empty(&query.before_id) {
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) if id > 0 => Some(id),
                _ => return Err(PaginationError::invalid("before_id", raw)),
            },
            None => None,
        };

        if let Some(before) = non_empty(&query.before) {
            return Ok(Self::Cursor {
                size,
                before: before.to_string(),
                before_id,
            });
        }
        if let Some(id) = before_id {
            return Err(PaginationError::invalid("before_id", id.to_string()));
        }

        let page = match non_empty(&query.page) {
            Some(raw) => parse_positive("page", raw)?,
            None => 1,
        };

        Ok(Self::Offset { size, page })
    }

    pub fn size(&self) -> u32 {
        match self {
            Self::Offset { size, .. } | Self::Cursor { size, .. } => *size,
        }
    }

    /// Number of rows to skip; always zero for cursor requests.
    pub fn offset(&self) -> u64 {
        match self {
            Self::Offset { size, page } => u64::from(page.saturating_sub(1)) * u64::from(*size),
            Self::Cursor { .. } => 0,
        }
    }

    /// Reject offset requests that start past the end of `count` matching
    /// items. The first page is always satisfiable, even when empty.
    pub fn ensure_in_range(&self, count: u64) -> Result<(), PaginationError> {
        match self {
            Self::Offset { page, .. } if *page > 1 && self.offset() >= count => {
                Err(PaginationError::RangeNotSatisfiable)
            }
            _ => Ok(()),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_positive(name: &'static str, raw: &str) -> Result<u32, PaginationError> {
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(PaginationError::invalid(name, raw)),
    }
}
