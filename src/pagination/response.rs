use axum::{
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::{format_link_header, Link, Page, PageRequest};

pub const COUNT_HEADER: HeaderName = HeaderName::from_static("count");
pub const SIZE_HEADER: HeaderName = HeaderName::from_static("size");
pub const PAGE_HEADER: HeaderName = HeaderName::from_static("page");

/// A page of items serialized as a JSON array with pagination headers.
///
/// `Size` and `Page` are kept for older clients; `Link` is what new clients
/// should follow.
pub struct PageResponse<T> {
    pub request: PageRequest,
    pub page: Page<T>,
    pub links: Vec<Link>,
}

impl<T> PageResponse<T> {
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(count) = self.page.count {
            headers.insert(COUNT_HEADER, HeaderValue::from(count));
        }
        headers.insert(SIZE_HEADER, HeaderValue::from(self.request.size()));
        if let PageRequest::Offset { page, .. } = self.request {
            headers.insert(PAGE_HEADER, HeaderValue::from(page));
        }
        if let Some(link) = format_link_header(&self.links) {
            match HeaderValue::from_str(&link) {
                Ok(value) => {
                    headers.insert(axum::http::header::LINK, value);
                }
                Err(e) => tracing::warn!(error = %e, "dropping unencodable Link header"),
            }
        }
        headers
    }
}

impl<T: Serialize> IntoResponse for PageResponse<T> {
    fn into_response(self) -> Response {
        let headers = self.headers();
        (headers, Json(self.page.items)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::Rel;

    #[test]
    fn offset_headers() {
        let response = PageResponse {
            request: PageRequest::Offset { size: 2, page: 1 },
            page: Page::new(vec![1, 2], Some(5)),
            links: vec![Link {
                rel: Rel::Next,
                url: "/x?size=2&page=2".to_string(),
            }],
        };
        let headers = response.headers();
        assert_eq!(headers["count"], "5");
        assert_eq!(headers["size"], "2");
        assert_eq!(headers["page"], "1");
        assert_eq!(headers["link"], "</x?size=2&page=2>; rel=\"next\"");
    }

    #[test]
    fn cursor_headers_omit_count_and_page() {
        let response = PageResponse {
            request: PageRequest::Cursor {
                size: 3,
                before: "2024-01-01T00:00:00.000Z".to_string(),
                before_id: Some(4),
            },
            page: Page::new(vec![1], None),
            links: Vec::new(),
        };
        let headers = response.headers();
        assert!(headers.get("count").is_none());
        assert!(headers.get("page").is_none());
        assert!(headers.get("link").is_none());
        assert_eq!(headers["size"], "3");
    }
}
