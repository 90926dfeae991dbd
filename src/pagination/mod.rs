//! Offset and cursor pagination for list endpoints.
//!
//! A request's `size`/`page`/`before`/`before_id` query parameters are parsed into a
//! [`PageRequest`], the storage layer answers it with a [`Page`], and
//! [`PageResponse`] turns the page into a JSON body plus `Count`, `Size`,
//! `Page` and `Link` headers.

pub mod links;
pub mod request;
pub mod response;

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

pub use links::{build_links, format_link_header, Link, LinkBase, Rel};
pub use request::{PageQuery, PageRequest};
pub use response::PageResponse;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("invalid value for '{name}': {value:?}")]
    InvalidParameter { name: &'static str, value: String },
    #[error("requested page is beyond the available data")]
    RangeNotSatisfiable,
}

impl PaginationError {
    pub fn invalid(name: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            value: value.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            Self::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }
}

/// Anything that can be cursored over by its creation time, ties broken by
/// row id.
pub trait Timestamped {
    /// Canonical RFC 3339 creation timestamp.
    fn created(&self) -> &str;

    fn id(&self) -> i64;
}

/// One page of results.
///
/// `count` is the total number of matching items in offset mode. Cursor
/// queries never compute it.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, count: Option<u64>) -> Self {
        Self { items, count }
    }
}
