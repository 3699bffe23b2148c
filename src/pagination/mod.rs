//! Cursor pagination over `links.next`.

use crate::client::AppStoreConnectClient;
use crate::errors::AppStoreConnectResult;
use crate::types::ResourceLinks;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

/// Paging metadata reported with list responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    /// Total number of items, when the service reports it.
    #[serde(default)]
    pub total: Option<u64>,
    /// Page size.
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Metadata attached to a page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    /// Paging information.
    #[serde(default)]
    pub paging: Option<Paging>,
}

/// A single page of results.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct Page<T> {
    /// The items in this page.
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    /// Page links.
    #[serde(default)]
    pub links: ResourceLinks,
    /// Side-loaded related resources.
    #[serde(default)]
    pub included: Vec<Value>,
    /// Paging metadata.
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

impl<T> Page<T> {
    /// An empty page with no links.
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            links: ResourceLinks::default(),
            included: Vec::new(),
            meta: None,
        }
    }

    /// Returns the URL for the next page.
    pub fn next_url(&self) -> Option<&str> {
        self.links.next.as_deref()
    }

    /// Returns true if there is a next page.
    pub fn has_next(&self) -> bool {
        self.links.next.is_some()
    }

    /// Total item count, if reported.
    pub fn total(&self) -> Option<u64> {
        self.meta.as_ref().and_then(|m| m.paging.as_ref()).and_then(|p| p.total)
    }

    /// Consumes the page and returns the items.
    pub fn into_items(self) -> Vec<T> {
        self.data
    }
}

/// Walks pages by following `links.next` until it is absent.
///
/// Each page goes through the client's full retry pipeline. A next link that
/// points at a page already fetched ends the walk.
pub struct PageIterator<'a, T> {
    client: &'a AppStoreConnectClient,
    next_url: Option<String>,
    visited: HashSet<String>,
    pages_fetched: usize,
    _phantom: std::marker::PhantomData<T>,
}

impl<'a, T: DeserializeOwned> PageIterator<'a, T> {
    /// Creates an iterator starting at an absolute URL.
    pub fn new(client: &'a AppStoreConnectClient, start_url: String) -> Self {
        Self {
            client,
            next_url: Some(start_url),
            visited: HashSet::new(),
            pages_fetched: 0,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Fetches the next page, or `None` once the last page has been read.
    pub async fn next_page(&mut self) -> AppStoreConnectResult<Option<Page<T>>> {
        let Some(url) = self.next_url.take() else {
            return Ok(None);
        };

        let page: Page<T> = self
            .client
            .fetch_url(&url)
            .await?
            .unwrap_or_else(Page::empty);
        self.pages_fetched += 1;
        self.visited.insert(url);

        match page.links.next {
            Some(ref next) if self.visited.contains(next) => {
                tracing::warn!(
                    url = %next,
                    "Next link points at a page already fetched, stopping"
                );
            }
            Some(ref next) => self.next_url = Some(next.clone()),
            None => {}
        }

        Ok(Some(page))
    }

    /// Collects the `data` of every remaining page.
    pub async fn collect_all(mut self) -> AppStoreConnectResult<Vec<T>> {
        let mut all_items = Vec::new();

        while let Some(page) = self.next_page().await? {
            all_items.extend(page.into_items());
        }

        tracing::debug!(pages = self.pages_fetched, items = all_items.len(), "Pagination complete");
        Ok(all_items)
    }

    /// Returns true if there are more pages.
    pub fn has_more(&self) -> bool {
        self.next_url.is_some()
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }
}
