//! Pagination normalization for list endpoints
//!
//! Caller-supplied paging inputs are never rejected. They are clamped into a
//! valid range, the total is counted once, and exactly one bounded fetch is
//! issued against the source:
//!
//! - `page` below 1 becomes 1
//! - `pageSize` is clamped into `1..=100`
//! - `totalPages` is at least 1, even for an empty source
//! - a page past the end collapses to the last page
//!
//! # Example
//!
//! ```rust,ignore
//! use api_pipeline::pagination::{paginate, VecSource};
//!
//! let source = VecSource::new((1..=25).collect::<Vec<u32>>());
//! let page = paginate(&source, 9, 10).await?;
//!
//! assert_eq!(page.pagination.page, 3);
//! assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
//! ```

use std::convert::Infallible;
use std::future::Future;

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::{Deserialize, Deserializer, Serialize};

/// Page used when the caller sends none or an unparsable value
pub const DEFAULT_PAGE: i64 = 1;

/// Page size used when the caller sends none or an unparsable value
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Largest page size ever served
pub const MAX_PAGE_SIZE: u32 = 100;

/// Raw paging parameters from the query string
///
/// Absent or unparsable values fall back to [`DEFAULT_PAGE`] and
/// [`DEFAULT_PAGE_SIZE`]; out-of-range values are left for
/// [`PaginationMeta::normalize`] to clamp. Used as an extractor it never
/// rejects: a repeated key keeps its first value.
///
/// # Example
///
/// ```rust
/// use api_pipeline::pagination::PageQuery;
///
/// let query = PageQuery::default();
/// assert_eq!(query.page(), 1);
/// assert_eq!(query.page_size(), 10);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    /// Requested page (1-indexed)
    #[serde(default, deserialize_with = "lenient_int")]
    pub page: Option<i64>,

    /// Requested number of items per page
    #[serde(default, deserialize_with = "lenient_int")]
    pub page_size: Option<i64>,
}

impl PageQuery {
    /// Create a query with explicit values
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    /// Requested page, defaulted
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(DEFAULT_PAGE)
    }

    /// Requested page size, defaulted
    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Read `page` and `pageSize` from decoded query pairs
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut query = Self::default();
        let mut seen_page = false;
        let mut seen_page_size = false;

        for (key, value) in pairs {
            match key {
                "page" if !seen_page => {
                    seen_page = true;
                    query.page = value.trim().parse().ok();
                }
                "pageSize" if !seen_page_size => {
                    seen_page_size = true;
                    query.page_size = value.trim().parse().ok();
                }
                _ => {}
            }
        }
        query
    }
}

impl<S> FromRequestParts<S> for PageQuery
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = match Query::<Vec<(String, String)>>::try_from_uri(&parts.uri) {
            Ok(Query(pairs)) => Self::from_pairs(
                pairs
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            ),
            Err(rejection) => {
                tracing::debug!(
                    error = %rejection,
                    "Unreadable query string, using default paging"
                );
                Self::default()
            }
        };
        Ok(query)
    }
}

/// Accepts integers and integer strings; anything else reads as absent
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(value) => Some(value),
        Raw::Text(text) => text.trim().parse().ok(),
        Raw::Other(_) => None,
    })
}

/// Normalized pagination metadata echoed in `meta.pagination`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    /// Current page number (1-indexed, never past `total_pages`)
    pub page: u64,
    /// Number of items per page, within `1..=100`
    pub page_size: u32,
    /// Total number of items across all pages
    pub total: u64,
    /// Total number of pages, at least 1
    pub total_pages: u64,
}

impl PaginationMeta {
    /// Clamp raw inputs against a known total
    ///
    /// # Example
    ///
    /// ```rust
    /// use api_pipeline::pagination::PaginationMeta;
    ///
    /// let meta = PaginationMeta::normalize(-4, 500, 0);
    /// assert_eq!(meta.page, 1);
    /// assert_eq!(meta.page_size, 100);
    /// assert_eq!(meta.total_pages, 1);
    /// ```
    #[must_use]
    pub fn normalize(page: i64, page_size: i64, total: u64) -> Self {
        let safe_page = u64::try_from(page.max(1)).unwrap_or(1);
        let safe_page_size = page_size.clamp(1, i64::from(MAX_PAGE_SIZE));
        let page_size = u32::try_from(safe_page_size).unwrap_or(MAX_PAGE_SIZE);
        let total_pages = total.div_ceil(u64::from(page_size)).max(1);

        Self {
            page: safe_page.min(total_pages),
            page_size,
            total,
            total_pages,
        }
    }

    /// Number of items to skip
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(u64::from(self.page_size))
    }

    /// Number of items to take
    #[must_use]
    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

/// One page of items plus its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedResult<T> {
    /// Items on the normalized page
    pub items: Vec<T>,
    /// Normalized pagination metadata
    pub pagination: PaginationMeta,
}

impl<T> PagedResult<T> {
    /// Map every item to a new type, keeping the metadata
    pub fn map<U, F>(self, f: F) -> PagedResult<U>
    where
        F: FnMut(T) -> U,
    {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// An ordered source of items with a known total count
///
/// Implemented by data-access collaborators; query construction, filtering
/// and ordering happen before the source reaches [`paginate`].
pub trait PageSource: Send + Sync {
    /// Item type produced by the source
    type Item: Send;
    /// Error raised by the underlying store
    type Error: Send;

    /// Count all matching items
    fn count(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send;

    /// Fetch at most `limit` items after skipping `offset`
    fn fetch(
        &self,
        offset: u64,
        limit: u64,
    ) -> impl Future<Output = Result<Vec<Self::Item>, Self::Error>> + Send;
}

/// Normalize the inputs and fetch the resulting page
///
/// Issues one `count` and one `fetch`. Errors from the source propagate
/// unchanged.
pub async fn paginate<S>(
    source: &S,
    page: i64,
    page_size: i64,
) -> Result<PagedResult<S::Item>, S::Error>
where
    S: PageSource + ?Sized,
{
    let total = source.count().await?;
    let pagination = PaginationMeta::normalize(page, page_size, total);
    let items = source.fetch(pagination.offset(), pagination.limit()).await?;

    tracing::trace!(
        page = pagination.page,
        page_size = pagination.page_size,
        total = pagination.total,
        returned = items.len(),
        "Page fetched"
    );

    Ok(PagedResult { items, pagination })
}

/// In-memory source over an owned collection
#[derive(Debug, Clone, Default)]
pub struct VecSource<T> {
    items: Vec<T>,
}

impl<T> VecSource<T> {
    /// Wrap a collection that is already filtered and ordered
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> PageSource for VecSource<T>
where
    T: Clone + Send + Sync,
{
    type Item = T;
    type Error = Infallible;

    async fn count(&self) -> Result<u64, Self::Error> {
        Ok(self.items.len() as u64)
    }

    async fn fetch(&self, offset: u64, limit: u64) -> Result<Vec<T>, Self::Error> {
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(self.items.iter().skip(skip).take(take).cloned().collect())
    }
}
