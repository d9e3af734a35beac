// Page-number pagination with a `{count, next, previous, results}` envelope

use axum::http::Uri;
use serde::{Deserialize, Serialize};

use crate::config::PaginationConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::Window;

pub const INVALID_PAGE: &str = "Invalid page.";

/// Raw `page` / `page_size` query parameters. Kept as strings so malformed values
/// are handled by the paginator rather than rejected by the extractor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub fn window(&self) -> Window {
        Window {
            limit: self.page_size,
            offset: (self.page - 1) * self.page_size,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    default_page_size: usize,
    max_page_size: usize,
}

impl Paginator {
    pub fn new(config: &PaginationConfig) -> Self {
        Self {
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Invalid or non-positive sizes fall back to the default; large ones are clamped.
    pub fn page_size(&self, params: &PageParams) -> i64 {
        let size = params
            .page_size
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|size| *size > 0)
            .map(|size| size.min(self.max_page_size))
            .unwrap_or(self.default_page_size);
        size as i64
    }

    /// Resolve the requested page against `count` items. Pages past the end are a 404.
    pub fn request(&self, params: &PageParams, count: i64) -> AppResult<PageRequest> {
        let page_size = self.page_size(params);
        let last_page = ((count + page_size - 1) / page_size).max(1);

        let page = match params.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some("last") => last_page,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| AppError::NotFound(INVALID_PAGE.to_string()))?,
        };
        if page < 1 || page > last_page {
            return Err(AppError::NotFound(INVALID_PAGE.to_string()));
        }

        Ok(PageRequest { page, page_size })
    }

    pub fn page<T>(&self, request: PageRequest, count: i64, results: Vec<T>, uri: &Uri) -> Page<T> {
        let has_next = request.page * request.page_size < count;
        Page {
            count,
            next: has_next.then(|| page_link(uri, Some(request.page + 1))),
            previous: (request.page > 1).then(|| {
                let previous = request.page - 1;
                page_link(uri, (previous > 1).then_some(previous))
            }),
            results,
        }
    }

    /// Paginate an already-loaded, already-ordered collection.
    pub fn paginate<T>(&self, items: Vec<T>, params: &PageParams, uri: &Uri) -> AppResult<Page<T>> {
        let count = items.len() as i64;
        let request = self.request(params, count)?;
        let window = request.window();
        let results = items
            .into_iter()
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .collect();
        Ok(self.page(request, count, results, uri))
    }
}

/// The request path with its `page` parameter replaced (or dropped for page 1).
fn page_link(uri: &Uri, page: Option<i64>) -> String {
    let mut pairs: Vec<String> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some("page"))
        .map(str::to_string)
        .collect();
    if let Some(page) = page {
        pairs.push(format!("page={}", page));
    }

    if pairs.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), pairs.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paginator() -> Paginator {
        Paginator::new(&PaginationConfig {
            default_page_size: 10,
            max_page_size: 100,
        })
    }

    fn params(page: Option<&str>, page_size: Option<&str>) -> PageParams {
        PageParams {
            page: page.map(str::to_string),
            page_size: page_size.map(str::to_string),
        }
    }

    #[test]
    fn second_page_holds_items_eleven_to_twenty() {
        let uri: Uri = "/posts/newsfeed?page=2&page_size=10".parse().unwrap();
        let items: Vec<i64> = (1..=25).collect();
        let page = paginator()
            .paginate(items, &params(Some("2"), Some("10")), &uri)
            .unwrap();

        assert_eq!(page.count, 25);
        assert_eq!(page.results, (11..=20).collect::<Vec<_>>());
        assert_eq!(
            page.next.as_deref(),
            Some("/posts/newsfeed?page_size=10&page=3")
        );
        assert_eq!(page.previous.as_deref(), Some("/posts/newsfeed?page_size=10"));
    }

    #[test]
    fn page_size_is_clamped_and_defaulted() {
        let p = paginator();
        assert_eq!(p.page_size(&params(None, Some("500"))), 100);
        assert_eq!(p.page_size(&params(None, Some("0"))), 10);
        assert_eq!(p.page_size(&params(None, Some("abc"))), 10);
        assert_eq!(p.page_size(&params(None, None)), 10);
    }

    #[test]
    fn page_past_the_end_is_not_found() {
        let err = paginator().request(&params(Some("4"), None), 25).unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref msg) if msg == INVALID_PAGE));
        assert!(paginator().request(&params(Some("zero"), None), 25).is_err());
    }

    #[test]
    fn empty_collection_still_has_a_first_page() {
        let uri: Uri = "/likes".parse().unwrap();
        let page = paginator()
            .paginate(Vec::<i64>::new(), &PageParams::default(), &uri)
            .unwrap();
        assert_eq!(page.count, 0);
        assert!(page.next.is_none());
        assert!(page.previous.is_none());
    }

    #[test]
    fn last_page_keyword_resolves() {
        let request = paginator().request(&params(Some("last"), None), 25).unwrap();
        assert_eq!(request.page, 3);
        assert_eq!(request.window(), Window { limit: 10, offset: 20 });
    }
}
