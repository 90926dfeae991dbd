use std::fmt;

use axum::http::Uri;
use url::form_urlencoded;

use super::{Page, PageRequest, Timestamped};
use crate::config::PaginationConfig;

const PAGINATION_PARAMS: [&str; 4] = ["size", "page", "before", "before_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rel {
    Next,
    Previous,
    First,
    Last,
}

impl Rel {
    pub fn as_str(self) -> &'static str {
        match self {
            Rel::Next => "next",
            Rel::Previous => "previous",
            Rel::First => "first",
            Rel::Last => "last",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub rel: Rel,
    pub url: String,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>; rel=\"{}\"", self.url, self.rel.as_str())
    }
}

/// The part of the request URL that every generated link shares: the path
/// and any non-pagination query parameters (filters, sort order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBase {
    path: String,
    params: Vec<(String, String)>,
}

impl LinkBase {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn from_uri(uri: &Uri) -> Self {
        let params = uri
            .query()
            .map(|query| {
                form_urlencoded::parse(query.as_bytes())
                    .filter(|(key, _)| !PAGINATION_PARAMS.contains(&key.as_ref()))
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            path: uri.path().to_string(),
            params,
        }
    }

    fn url(&self, pagination: &[(&str, &str)]) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.params {
            serializer.append_pair(key, value);
        }
        for (key, value) in pagination {
            serializer.append_pair(key, value);
        }
        format!("{}?{}", self.path, serializer.finish())
    }

    fn offset_link(&self, rel: Rel, size: u32, page: u64) -> Link {
        let (size, page) = (size.to_string(), page.to_string());
        Link {
            rel,
            url: self.url(&[("size", size.as_str()), ("page", page.as_str())]),
        }
    }
}

/// Compute the navigation relations for a page.
///
/// Cursor pages only ever link forward, and only when the page came back
/// full. The `next` cursor is the oldest item's `(created, id)` pair so items
/// sharing a timestamp across the page boundary are neither skipped nor
/// repeated. Offset pages link to `next`/`previous` when those exist and always to
/// `first`; `last` is omitted for empty results unless
/// `emit_last_when_empty` asks for the legacy `page=0` link.
pub fn build_links<T: Timestamped>(
    base: &LinkBase,
    request: &PageRequest,
    page: &Page<T>,
    config: &PaginationConfig,
) -> Vec<Link> {
    match request {
        PageRequest::Cursor { size, .. } => {
            let full = page.items.len() == *size as usize;
            match page.items.last() {
                Some(oldest) if full => {
                    let (size, id) = (size.to_string(), oldest.id().to_string());
                    vec![Link {
                        rel: Rel::Next,
                        url: base.url(&[
                            ("size", size.as_str()),
                            ("before", oldest.created()),
                            ("before_id", id.as_str()),
                        ]),
                    }]
                }
                _ => Vec::new(),
            }
        }
        PageRequest::Offset { size, page: current } => {
            let count = page.count.unwrap_or(0);
            let total_pages = count.div_ceil(u64::from(*size));
            let current = u64::from(*current);

            let mut links = Vec::with_capacity(4);
            if current < total_pages {
                links.push(base.offset_link(Rel::Next, *size, current + 1));
            }
            if current > 1 {
                links.push(base.offset_link(Rel::Previous, *size, current - 1));
            }
            links.push(base.offset_link(Rel::First, *size, 1));
            if total_pages > 0 || config.emit_last_when_empty {
                links.push(base.offset_link(Rel::Last, *size, total_pages));
            }
            links
        }
    }
}

/// Join relations into a `Link` header value, `None` when there are none.
pub fn format_link_header(links: &[Link]) -> Option<String> {
    if links.is_empty() {
        return None;
    }
    Some(
        links
            .iter()
            .map(Link::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item(&'static str, i64);

    impl Timestamped for Item {
        fn created(&self) -> &str {
            self.0
        }

        fn id(&self) -> i64 {
            self.1
        }
    }

    fn offset(size: u32, page: u32, count: u64) -> Vec<Link> {
        let items: Vec<Item> = Vec::new();
        build_links(
            &LinkBase::new("/user/uploads"),
            &PageRequest::Offset { size, page },
            &Page::new(items, Some(count)),
            &PaginationConfig::default(),
        )
    }

    fn find(links: &[Link], rel: Rel) -> Option<&str> {
        links.iter().find(|l| l.rel == rel).map(|l| l.url.as_str())
    }

    #[test]
    fn first_page_of_three() {
        let links = offset(2, 1, 5);
        assert_eq!(find(&links, Rel::Next), Some("/user/uploads?size=2&page=2"));
        assert_eq!(find(&links, Rel::Previous), None);
        assert_eq!(find(&links, Rel::First), Some("/user/uploads?size=2&page=1"));
        assert_eq!(find(&links, Rel::Last), Some("/user/uploads?size=2&page=3"));
    }

    #[test]
    fn last_page_has_no_next() {
        let links = offset(2, 3, 5);
        assert_eq!(find(&links, Rel::Next), None);
        assert_eq!(find(&links, Rel::Previous), Some("/user/uploads?size=2&page=2"));

        let single = offset(10, 1, 5);
        assert_eq!(find(&single, Rel::Next), None);
        assert_eq!(find(&single, Rel::Previous), None);
        assert_eq!(find(&single, Rel::Last), Some("/user/uploads?size=10&page=1"));
    }

    #[test]
    fn exact_multiple_of_size() {
        let links = offset(5, 1, 10);
        assert_eq!(find(&links, Rel::Last), Some("/user/uploads?size=5&page=2"));
        assert_eq!(find(&links, Rel::Next), Some("/user/uploads?size=5&page=2"));
    }

    #[test]
    fn empty_result_links_only_to_first() {
        let links = offset(10, 1, 0);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].rel, Rel::First);
    }

    #[test]
    fn empty_result_legacy_last_link() {
        let config = PaginationConfig {
            emit_last_when_empty: true,
            ..PaginationConfig::default()
        };
        let items: Vec<Item> = Vec::new();
        let links = build_links(
            &LinkBase::new("/p"),
            &PageRequest::Offset { size: 10, page: 1 },
            &Page::new(items, Some(0)),
            &config,
        );
        assert_eq!(find(&links, Rel::Last), Some("/p?size=10&page=0"));
        assert_eq!(find(&links, Rel::Next), None);
    }

    #[test]
    fn full_cursor_page_links_to_oldest_item() {
        let request = PageRequest::Cursor {
            size: 3,
            before: "2024-01-04T00:00:00.000Z".to_string(),
            before_id: None,
        };
        let page = Page::new(
            vec![
                Item("2024-01-03T00:00:00.000Z", 9),
                Item("2024-01-02T00:00:00.000Z", 8),
                Item("2024-01-01T00:00:00.000Z", 7),
            ],
            None,
        );
        let links = build_links(
            &LinkBase::new("/user/uploads"),
            &request,
            &page,
            &PaginationConfig::default(),
        );
        assert_eq!(
            links,
            vec![Link {
                rel: Rel::Next,
                url: "/user/uploads?size=3&before=2024-01-01T00%3A00%3A00.000Z&before_id=7"
                    .to_string(),
            }]
        );
    }

    #[test]
    fn short_cursor_page_has_no_links() {
        let request = PageRequest::Cursor {
            size: 3,
            before: "2024-01-04T00:00:00.000Z".to_string(),
            before_id: Some(10),
        };
        let page = Page::new(
            vec![
                Item("2024-01-03T00:00:00.000Z", 9),
                Item("2024-01-02T00:00:00.000Z", 8),
            ],
            None,
        );
        let links = build_links(
            &LinkBase::new("/user/uploads"),
            &request,
            &page,
            &PaginationConfig::default(),
        );
        assert!(links.is_empty());
        assert_eq!(format_link_header(&links), None);
    }

    #[test]
    fn base_keeps_filters_and_drops_pagination_params() {
        let uri: Uri = "/user/pins?status=pinned%2Cqueued&before=x&before_id=3&page=4&size=2"
            .parse()
            .unwrap();
        let base = LinkBase::from_uri(&uri);
        let link = base.offset_link(Rel::Next, 2, 5);
        assert_eq!(link.url, "/user/pins?status=pinned%2Cqueued&size=2&page=5");
    }

    #[test]
    fn header_format() {
        let links = offset(2, 2, 5);
        assert_eq!(
            format_link_header(&links).unwrap(),
            "</user/uploads?size=2&page=3>; rel=\"next\", \
             </user/uploads?size=2&page=1>; rel=\"previous\", \
             </user/uploads?size=2&page=1>; rel=\"first\", \
             </user/uploads?size=2&page=3>; rel=\"last\""
        );
    }
}
