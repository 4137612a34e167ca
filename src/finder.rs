//! Locating remote objects by key.
//!
//! Two contracts live here:
//!
//! - [`Finder::find_by_key`] expects exactly one object. Zero matches is a
//!   [`ProviderError::NotFound`], more than one is a
//!   [`ProviderError::AmbiguousResult`].
//! - [`Finder::find_all`] enumerates. An empty result is `Ok(vec![])`.
//!
//! List-based lookups walk pages lazily through a [`Paginator`] and stop as
//! soon as the page holding the key has been seen.

use std::collections::HashSet;

use serde_json::json;
use tracing::{debug, warn};

use crate::error::{NotFoundError, ProviderError};
use crate::identity::{Identity, IdentityScheme};
use crate::remote::{ListFilter, RemoteObject, RemoteService};

/// How a resource kind is located remotely.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Lookup {
    /// A get-by-key call.
    #[default]
    Direct,
    /// A paginated list call, matched client-side on every identity field.
    List {
        /// Identity fields sent as exact server-side filters.
        equals: Vec<String>,
        /// Identity field sent as a server-side prefix filter.
        prefix: Option<String>,
    },
}

impl Lookup {
    /// A list lookup narrowed by `equals` fields and a `prefix` field.
    pub fn list<I, S>(equals: I, prefix: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List {
            equals: equals.into_iter().map(Into::into).collect(),
            prefix: prefix.map(str::to_string),
        }
    }
}

#[derive(Debug)]
enum Cursor {
    Start,
    Token(String),
    Done,
}

/// Lazily fetches pages of a list call.
///
/// Finite and not restartable: once the last page has been returned,
/// [`Paginator::next_page`] yields `None`.
pub struct Paginator<'a, R: ?Sized> {
    remote: &'a R,
    resource_type: &'a str,
    filter: ListFilter,
    cursor: Cursor,
    seen: HashSet<String>,
    pages: usize,
}

impl<'a, R: RemoteService + ?Sized> Paginator<'a, R> {
    /// Start paging through `resource_type` objects matching `filter`.
    pub fn new(remote: &'a R, resource_type: &'a str, filter: ListFilter) -> Self {
        Self {
            remote,
            resource_type,
            filter,
            cursor: Cursor::Start,
            seen: HashSet::new(),
            pages: 0,
        }
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Fetch the next page, or `None` when pages are exhausted.
    pub async fn next_page(&mut self) -> Option<Result<Vec<RemoteObject>, ProviderError>> {
        let token = match &self.cursor {
            Cursor::Done => return None,
            Cursor::Start => None,
            Cursor::Token(token) => Some(token.clone()),
        };

        let page = match self
            .remote
            .list(self.resource_type, &self.filter, token.as_deref())
            .await
        {
            Ok(page) => page,
            Err(err) => {
                self.cursor = Cursor::Done;
                return Some(Err(err));
            },
        };
        self.pages += 1;

        if let Some(token) = token {
            self.seen.insert(token);
        }
        self.cursor = match page.next_token {
            Some(next) if self.seen.contains(&next) => {
                warn!(
                    resource_type = self.resource_type,
                    token = %next,
                    "page token seen before, stopping"
                );
                Cursor::Done
            },
            Some(next) if !next.is_empty() => Cursor::Token(next),
            _ => Cursor::Done,
        };

        Some(Ok(page.items))
    }
}

/// Read-only lookups for one resource kind.
pub struct Finder<'a, R: ?Sized> {
    remote: &'a R,
    resource_type: &'a str,
    scheme: &'a IdentityScheme,
    lookup: &'a Lookup,
    page_size: Option<usize>,
}

impl<'a, R: RemoteService + ?Sized> Finder<'a, R> {
    /// Create a finder.
    pub fn new(
        remote: &'a R,
        resource_type: &'a str,
        scheme: &'a IdentityScheme,
        lookup: &'a Lookup,
    ) -> Self {
        Self {
            remote,
            resource_type,
            scheme,
            lookup,
            page_size: None,
        }
    }

    /// Ask list calls for at most `page_size` items per page.
    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        self.page_size = page_size;
        self
    }

    fn bounded(&self, filter: ListFilter) -> ListFilter {
        match (filter.limit, self.page_size) {
            (None, Some(size)) => filter.with_limit(size),
            _ => filter,
        }
    }

    /// Locate exactly one object by key.
    pub async fn find_by_key(&self, key: &Identity) -> Result<RemoteObject, ProviderError> {
        match self.lookup {
            Lookup::Direct => self.find_direct(key).await,
            Lookup::List { equals, prefix } => {
                self.find_listed(key, equals, prefix.as_deref()).await
            },
        }
    }

    /// Enumerate every object matching `filter`, across all pages.
    pub async fn find_all(&self, filter: ListFilter) -> Result<Vec<RemoteObject>, ProviderError> {
        let mut pages = Paginator::new(self.remote, self.resource_type, self.bounded(filter));
        let mut out = Vec::new();
        while let Some(page) = pages.next_page().await {
            out.extend(page?);
        }
        debug!(
            resource_type = self.resource_type,
            pages = pages.pages_fetched(),
            found = out.len(),
            "listed objects"
        );
        Ok(out)
    }

    async fn find_direct(&self, key: &Identity) -> Result<RemoteObject, ProviderError> {
        let request = json!({"resource_type": self.resource_type, "key": key.encode()});

        match self.remote.read(self.resource_type, key).await {
            Ok(object) if object.attributes.is_empty() => Err(ProviderError::NotFound(
                NotFoundError::new(format!("{} {}: empty result", self.resource_type, key))
                    .with_request(request),
            )),
            Ok(object) => Ok(object),
            Err(ProviderError::NotFound(err)) => Err(ProviderError::NotFound(attach(err, request))),
            Err(err) => Err(err),
        }
    }

    async fn find_listed(
        &self,
        key: &Identity,
        equals: &[String],
        prefix: Option<&str>,
    ) -> Result<RemoteObject, ProviderError> {
        let fields = self.scheme.fields(key)?;

        let mut filter = ListFilter::new();
        for (name, value) in &fields {
            if equals.iter().any(|e| e == name) {
                filter = filter.with_equals(name.as_str(), value.as_str());
            } else if prefix == Some(name.as_str()) {
                filter = filter.with_prefix(name.as_str(), value.as_str());
            }
        }
        let filter = self.bounded(filter);
        let request = json!({
            "resource_type": self.resource_type,
            "key": key.encode(),
            "filter": serde_json::to_value(&filter)?,
        });

        let mut pages = Paginator::new(self.remote, self.resource_type, filter);
        while let Some(page) = pages.next_page().await {
            let mut matches: Vec<RemoteObject> = page?
                .into_iter()
                .filter(|object| {
                    fields
                        .iter()
                        .all(|(name, value)| object.get_str(name) == Some(value.as_str()))
                })
                .collect();

            match matches.len() {
                0 => continue,
                1 => {
                    debug!(
                        resource_type = self.resource_type,
                        key = %key,
                        pages = pages.pages_fetched(),
                        "found object"
                    );
                    return Ok(matches.remove(0));
                },
                n => {
                    return Err(ProviderError::AmbiguousResult(format!(
                        "{} {}: expected 1 match, found {}",
                        self.resource_type, key, n
                    )))
                },
            }
        }

        Err(ProviderError::NotFound(
            NotFoundError::new(format!("{} {}", self.resource_type, key)).with_request(request),
        ))
    }
}

fn attach(err: NotFoundError, request: serde_json::Value) -> NotFoundError {
    if err.request.is_some() {
        err
    } else {
        err.with_request(request)
    }
}
