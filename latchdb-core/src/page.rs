//! Pagination parameters and result pages.
//!
//! Pages are 1-based. A negative page together with a negative page size means
//! "no pagination": every match is returned.

use serde::{Deserialize, Serialize};

use crate::backend::FindSpec;
use bson::Document;

/// A single page of results.
///
/// # Example
///
/// ```ignore
/// use latchdb::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.items.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of matching items across all pages.
    pub count: u64,
    /// The next page number (if more pages exist).
    pub next_page: Option<u64>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<u64>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page.
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Wraps one fetched window of results with navigation metadata.
    ///
    /// `count` is the total number of matches, not the window size.
    pub fn from_window(items: Vec<T>, count: u64, paging: Paging) -> Self {
        let Some(size) = paging.limit() else {
            return Page::builder(items).with_count(count).build();
        };

        let page = paging.page.max(1) as u64;
        let end = paging.skip().unwrap_or(0) + size;

        Page::builder(items)
            .with_count(count)
            .with_next_page((end < count).then_some(page + 1))
            .with_previous_page((page > 1).then_some(page - 1))
            .build()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for constructing [`Page`] instances.
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<u64>,
    previous_page: Option<u64>,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given items.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    /// Sets the total count of items across all pages.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Sets the next page number (or `None` if this is the last page).
    pub fn with_next_page(mut self, next_page: Option<u64>) -> Self {
        self.next_page = next_page;
        self
    }

    /// Sets the previous page number (or `None` if this is the first page).
    pub fn with_previous_page(mut self, previous_page: Option<u64>) -> Self {
        self.previous_page = previous_page;
        self
    }

    /// Builds and returns the final [`Page`] instance.
    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Which window of a result set to fetch.
///
/// Signed on purpose: `Paging::new(-1, -1)` asks for every match.
///
/// ```ignore
/// use latchdb::page::Paging;
///
/// let paging = Paging::new(3, 20);
/// assert_eq!(paging.skip(), Some(40));
/// assert_eq!(paging.limit(), Some(20));
/// assert!(Paging::unbounded().is_unbounded());
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    /// The page number (1-based).
    pub page: i64,
    /// Number of items per page.
    pub size: i64,
}

impl Paging {
    /// Creates paging parameters.
    pub fn new(page: i64, size: i64) -> Self {
        Self { page, size }
    }

    /// Paging that returns every match.
    pub fn unbounded() -> Self {
        Self { page: -1, size: -1 }
    }

    /// `true` when both page and size are negative.
    pub fn is_unbounded(&self) -> bool {
        self.page < 0 && self.size < 0
    }

    /// Number of matches to skip, `None` when nothing is skipped.
    ///
    /// `(page - 1) * size`, clamped at zero.
    pub fn skip(&self) -> Option<u64> {
        if self.is_unbounded() {
            return None;
        }

        let skip = self.page.saturating_sub(1).saturating_mul(self.size);

        (skip > 0).then_some(skip as u64)
    }

    /// Maximum number of matches to return, `None` for no limit.
    pub fn limit(&self) -> Option<u64> {
        if self.is_unbounded() {
            return None;
        }

        (self.size > 0).then_some(self.size as u64)
    }

    /// Turns the paging and an optional sort into backend find options.
    pub fn find_spec(&self, sort: Option<Document>) -> FindSpec {
        FindSpec {
            skip: self.skip(),
            limit: self.limit(),
            sort,
        }
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self { page: 1, size: 10 }
    }
}
