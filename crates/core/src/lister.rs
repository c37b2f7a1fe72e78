//! Paged listing over any [`ListBackend`]
//!
//! [`PagedLister`] turns a backend's one-page-per-call operation into three
//! pull-based views:
//! - [`PagedLister::list_page`] fetches exactly one page for an explicit token
//! - [`PagedLister::list_all`] yields every item, fetching pages lazily
//! - [`PagedLister::list_hierarchical`] yields one level of virtual folders and leaves
//!
//! Cursors fetch strictly one page at a time and only when their buffer is
//! drained. A fetch error ends the cursor; items yielded before it remain
//! valid but the enumeration is incomplete.

use std::collections::{HashSet, VecDeque};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::request::{Fingerprint, ListRequest};
use crate::token::ContinuationToken;
use crate::traits::{Item, ListBackend, PageResponse};

/// One page of a listing as seen by callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Leaf entries in backend order
    pub items: Vec<Item>,

    /// Virtual-folder prefixes (hierarchical listings only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<String>,

    /// Token for the next page; None on the last page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<ContinuationToken>,
}

impl Page {
    /// Whether this is the final page of the listing
    pub fn is_last(&self) -> bool {
        self.continuation_token.is_none()
    }

    /// Number of entries on the page
    pub fn len(&self) -> usize {
        self.items.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.prefixes.is_empty()
    }

    /// Split the page into hierarchy nodes, prefixes first
    pub fn into_nodes(self) -> Vec<HierarchyNode> {
        self.prefixes
            .into_iter()
            .map(|name| HierarchyNode::Prefix { name })
            .chain(self.items.into_iter().map(HierarchyNode::Leaf))
            .collect()
    }

    fn seal(response: PageResponse, fingerprint: &Fingerprint) -> Result<Self> {
        let continuation_token = response
            .next_marker
            .as_deref()
            .map(|marker| ContinuationToken::seal(fingerprint, marker))
            .transpose()?;

        Ok(Self {
            items: response.items,
            prefixes: response.prefixes,
            continuation_token,
        })
    }
}

/// Entry of a hierarchical listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HierarchyNode {
    /// Virtual folder; list it again with this name as prefix to descend
    Prefix { name: String },

    /// Concrete item
    Leaf(Item),
}

impl HierarchyNode {
    pub fn name(&self) -> &str {
        match self {
            HierarchyNode::Prefix { name } => name,
            HierarchyNode::Leaf(item) => &item.name,
        }
    }

    pub fn is_prefix(&self) -> bool {
        matches!(self, HierarchyNode::Prefix { .. })
    }
}

/// Uniform pagination over a listing backend
#[derive(Debug)]
pub struct PagedLister<B> {
    backend: B,
}

impl<B: ListBackend> PagedLister<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Get the underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Fetch exactly one page
    ///
    /// Without a token the first page is fetched. The returned page carries
    /// no token once the listing is exhausted. A token issued for any other
    /// request fails with [`Error::InvalidContinuationToken`].
    pub async fn list_page(
        &self,
        request: &ListRequest,
        token: Option<&ContinuationToken>,
    ) -> Result<Page> {
        let fingerprint = self.admit(request)?;
        let marker = token.map(|t| t.open(&fingerprint)).transpose()?;

        let response = self
            .backend
            .fetch_page(request, marker.as_deref())
            .await?;
        tracing::debug!(
            kind = request.target.kind(),
            entries = response.len(),
            more = response.next_marker.is_some(),
            "Fetched page"
        );

        if let (Some(next), Some(current)) = (&response.next_marker, &marker) {
            if next == current {
                return Err(repeated_marker());
            }
        }

        Page::seal(response, &fingerprint)
    }

    /// Walk the listing page by page
    pub fn list_pages(&self, request: ListRequest) -> Result<PageCursor<'_, B>> {
        let fingerprint = self.admit(&request)?;
        Ok(PageCursor::new(&self.backend, request, fingerprint))
    }

    /// Lazily yield every item of a flat listing
    ///
    /// Each call starts over from the first page.
    pub fn list_all(&self, request: ListRequest) -> Result<ItemCursor<'_, B>> {
        if request.is_hierarchical() {
            return Err(Error::RequestRejected(
                "list_all is flat; use list_hierarchical for delimiter-based listing".into(),
            ));
        }
        Ok(ItemCursor {
            pages: self.list_pages(request)?,
            buffer: VecDeque::new(),
        })
    }

    /// Lazily yield one level of a hierarchical listing
    ///
    /// Prefix nodes are not descended into. To go deeper, list again with
    /// the prefix name as the request prefix.
    pub fn list_hierarchical(
        &self,
        request: ListRequest,
        delimiter: char,
    ) -> Result<HierarchyCursor<'_, B>> {
        Ok(HierarchyCursor {
            pages: self.list_pages(request.with_delimiter(delimiter))?,
            buffer: VecDeque::new(),
            seen_prefixes: HashSet::new(),
        })
    }

    fn admit(&self, request: &ListRequest) -> Result<Fingerprint> {
        request.validate()?;
        self.backend.check(request)?;
        request.fingerprint()
    }
}

fn repeated_marker() -> Error {
    Error::General("backend returned the continuation marker it was given".into())
}

#[derive(Debug)]
enum CursorState {
    Start,
    Next(String),
    Done,
}

/// Forward-only walk over the pages of one listing
///
/// Empty intermediate pages are skipped. The final page is always yielded,
/// even when empty, so callers observe exhaustion.
#[derive(Debug)]
pub struct PageCursor<'a, B: ?Sized> {
    backend: &'a B,
    request: ListRequest,
    fingerprint: Fingerprint,
    state: CursorState,
    cancel: Option<CancellationToken>,
    pages_fetched: usize,
}

impl<'a, B: ListBackend + ?Sized> PageCursor<'a, B> {
    fn new(backend: &'a B, request: ListRequest, fingerprint: Fingerprint) -> Self {
        Self {
            backend,
            request,
            fingerprint,
            state: CursorState::Start,
            cancel: None,
            pages_fetched: 0,
        }
    }

    /// Resume from a token issued by an earlier walk of the same request
    pub fn starting_at(mut self, token: &ContinuationToken) -> Result<Self> {
        let marker = token.open(&self.fingerprint)?;
        self.state = CursorState::Next(marker);
        Ok(self)
    }

    /// Stop before the next fetch once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The request this cursor walks
    pub fn request(&self) -> &ListRequest {
        &self.request
    }

    /// Number of backend calls issued so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch the next page, or None when exhausted, failed or cancelled
    pub async fn next(&mut self) -> Option<Result<Page>> {
        loop {
            let marker = match &self.state {
                CursorState::Done => return None,
                CursorState::Start => None,
                CursorState::Next(marker) => Some(marker.clone()),
            };

            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                tracing::debug!(
                    pages = self.pages_fetched,
                    "Listing cancelled before next fetch"
                );
                self.state = CursorState::Done;
                return None;
            }

            let result = self
                .backend
                .fetch_page(&self.request, marker.as_deref())
                .await;
            self.pages_fetched += 1;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(page = self.pages_fetched, error = %e, "Page fetch failed");
                    self.state = CursorState::Done;
                    return Some(Err(e));
                }
            };

            tracing::debug!(
                kind = self.request.target.kind(),
                page = self.pages_fetched,
                entries = response.len(),
                more = response.next_marker.is_some(),
                "Fetched page"
            );

            self.state = match &response.next_marker {
                Some(next) if marker.as_ref() == Some(next) => {
                    tracing::warn!(marker = %next, "Backend repeated continuation marker");
                    self.state = CursorState::Done;
                    return Some(Err(repeated_marker()));
                }
                Some(next) => CursorState::Next(next.clone()),
                None => CursorState::Done,
            };

            if response.is_empty() && response.next_marker.is_some() {
                continue;
            }

            return Some(Page::seal(response, &self.fingerprint).inspect_err(|_| {
                self.state = CursorState::Done;
            }));
        }
    }

    /// Adapt the cursor into a [`Stream`] of pages
    pub fn into_stream(self) -> impl Stream<Item = Result<Page>> + 'a
    where
        B: 'a,
    {
        futures::stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|page| (page, cursor))
        })
    }
}

/// Lazy flat enumeration of every item of a listing
#[derive(Debug)]
pub struct ItemCursor<'a, B: ?Sized> {
    pages: PageCursor<'a, B>,
    buffer: VecDeque<Item>,
}

impl<'a, B: ListBackend + ?Sized> ItemCursor<'a, B> {
    /// Start after the page a token points at
    pub fn starting_at(mut self, token: &ContinuationToken) -> Result<Self> {
        self.pages = self.pages.starting_at(token)?;
        Ok(self)
    }

    /// Stop before the next fetch once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.pages = self.pages.with_cancellation(token);
        self
    }

    /// Number of backend calls issued so far
    pub fn pages_fetched(&self) -> usize {
        self.pages.pages_fetched()
    }

    /// Next item; pages are fetched only when the buffer is drained
    pub async fn next(&mut self) -> Option<Result<Item>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }

            match self.pages.next().await? {
                Ok(page) => self.buffer.extend(page.items),
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Drain the cursor into a vector, stopping at the first error
    pub async fn try_collect(mut self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// Adapt the cursor into a [`Stream`] of items
    pub fn into_stream(self) -> impl Stream<Item = Result<Item>> + 'a
    where
        B: 'a,
    {
        futures::stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|item| (item, cursor))
        })
    }
}

/// Lazy enumeration of one hierarchy level
#[derive(Debug)]
pub struct HierarchyCursor<'a, B: ?Sized> {
    pages: PageCursor<'a, B>,
    buffer: VecDeque<HierarchyNode>,
    seen_prefixes: HashSet<String>,
}

impl<'a, B: ListBackend + ?Sized> HierarchyCursor<'a, B> {
    /// Stop before the next fetch once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.pages = self.pages.with_cancellation(token);
        self
    }

    /// Number of backend calls issued so far
    pub fn pages_fetched(&self) -> usize {
        self.pages.pages_fetched()
    }

    /// Next node; prefixes repeated across pages are yielded once
    pub async fn next(&mut self) -> Option<Result<HierarchyNode>> {
        loop {
            if let Some(node) = self.buffer.pop_front() {
                return Some(Ok(node));
            }

            let page = match self.pages.next().await? {
                Ok(page) => page,
                Err(e) => return Some(Err(e)),
            };

            for node in page.into_nodes() {
                if let HierarchyNode::Prefix { name } = &node {
                    if !self.seen_prefixes.insert(name.clone()) {
                        continue;
                    }
                }
                self.buffer.push_back(node);
            }
        }
    }

    /// Drain the cursor into a vector, stopping at the first error
    pub async fn try_collect(mut self) -> Result<Vec<HierarchyNode>> {
        let mut nodes = Vec::new();
        while let Some(node) = self.next().await {
            nodes.push(node?);
        }
        Ok(nodes)
    }

    /// Adapt the cursor into a [`Stream`] of nodes
    pub fn into_stream(self) -> impl Stream<Item = Result<HierarchyNode>> + 'a
    where
        B: 'a,
    {
        futures::stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|node| (node, cursor))
        })
    }
}
