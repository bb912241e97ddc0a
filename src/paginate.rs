//! List loops over page-number and continuation-token APIs.
//!
//! Every page fetch goes through [`invoke`], and every item passes through a
//! client-side [`ListFilter`] because most list APIs only filter on a subset
//! of the attributes callers want to match on.

use std::collections::BTreeSet;
use std::future::Future;

use regex::Regex;
use tracing::debug;

use crate::retry::{Classification, RetryError, RetryPolicy, invoke};
use crate::schema::ValidationError;

/// Where the next page starts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PageCursor {
    /// 1-based page number.
    Number(u32),
    /// Continuation token; `None` requests the first page.
    Token(Option<String>),
}

impl PageCursor {
    /// Cursor for the first page of a page-number API.
    #[must_use]
    pub const fn first_page() -> Self {
        Self::Number(1)
    }

    /// Cursor for the first page of a token API.
    #[must_use]
    pub const fn first_token() -> Self {
        Self::Token(None)
    }
}

/// One page of results.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Continuation token for token APIs.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page without a continuation token.
    #[must_use]
    pub const fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }

    /// Attaches a continuation token.
    #[must_use]
    pub fn with_next_token(mut self, token: impl Into<String>) -> Self {
        self.next_token = Some(token.into());
        self
    }
}

/// Item that a [`ListFilter`] can match.
pub trait Listable {
    /// Identifier of the item.
    fn id(&self) -> &str;

    /// Display name of the item, when it has one.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Lifecycle status of the item, when it has one.
    fn status(&self) -> Option<&str> {
        None
    }
}

/// Client-side filter; an empty filter matches everything.
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    name_regex: Option<Regex>,
    ids: BTreeSet<String>,
    status: Option<String>,
}

impl ListFilter {
    /// Creates a filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps items whose name matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Invalid`] when `pattern` is not a valid
    /// regular expression.
    pub fn name_regex(mut self, pattern: &str) -> Result<Self, ValidationError> {
        let regex = Regex::new(pattern).map_err(|err| ValidationError::Invalid {
            attribute: "name_regex".to_owned(),
            reason: err.to_string(),
        })?;
        self.name_regex = Some(regex);
        Ok(self)
    }

    /// Keeps items whose id is listed; an empty list keeps everything.
    #[must_use]
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps items with exactly this status.
    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Whether `item` passes every configured condition.
    #[must_use]
    pub fn matches<T: Listable>(&self, item: &T) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(item.id()) {
            return false;
        }
        if let Some(regex) = &self.name_regex {
            if !item.name().is_some_and(|name| regex.is_match(name)) {
                return false;
            }
        }
        match &self.status {
            Some(status) => item.status() == Some(status.as_str()),
            None => true,
        }
    }
}

/// Drives a list API to exhaustion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Paginator {
    page_size: u32,
    policy: RetryPolicy,
}

impl Paginator {
    /// Creates a paginator; a zero page size is raised to one.
    #[must_use]
    pub fn new(page_size: u32, policy: RetryPolicy) -> Self {
        Self {
            page_size: page_size.max(1),
            policy,
        }
    }

    /// Page size requested from the API.
    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetches pages starting at `start` until a short page (or, for token
    /// cursors, a missing token) and returns the items `filter` keeps.
    ///
    /// # Errors
    ///
    /// Returns the [`RetryError`] of the first page fetch that fails.
    pub async fn list_all<T, E, F, Fut, C>(
        &self,
        action: &str,
        start: PageCursor,
        filter: &ListFilter,
        classify: C,
        mut fetch: F,
    ) -> Result<Vec<T>, RetryError<E>>
    where
        T: Listable,
        E: std::fmt::Display,
        F: FnMut(PageCursor, u32) -> Fut,
        Fut: Future<Output = Result<Page<T>, E>>,
        C: Fn(&E) -> Classification,
    {
        let page_size = self.page_size;
        let full_page = usize::try_from(page_size).unwrap_or(usize::MAX);
        let mut cursor = start;
        let mut results = Vec::new();
        let mut pages = 0_u32;

        loop {
            let request = cursor.clone();
            let page = invoke(action, &self.policy, &classify, || {
                fetch(request.clone(), page_size)
            })
            .await?;
            pages = pages.saturating_add(1);
            let fetched = page.items.len();
            debug!(action, pages, fetched, "fetched page");
            results.extend(page.items.into_iter().filter(|item| filter.matches(item)));

            if fetched < full_page {
                break;
            }
            cursor = match cursor {
                PageCursor::Number(number) => PageCursor::Number(number.saturating_add(1)),
                PageCursor::Token(_) => match page.next_token {
                    Some(token) if !token.is_empty() => PageCursor::Token(Some(token)),
                    _ => break,
                },
            };
        }
        Ok(results)
    }
}
