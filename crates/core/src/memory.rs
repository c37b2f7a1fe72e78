//! In-memory listing backend
//!
//! Holds containers, blobs and queues in ordered maps and serves them with
//! the paging rules a storage service applies: a page-size hint capped to a
//! service maximum, an opaque resume marker, delimiter grouping, inclusion
//! flags and tag queries. Useful for tests and for callers that want to
//! exercise listing code without a network.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::request::{IncludeFlags, ListRequest, ListTarget};
use crate::traits::{Capabilities, Item, ListBackend, PageResponse};

/// Default service maximum, matching the common 5000-entry page cap
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 5000;

/// Position of an entry in listing order
type SortKey = Vec<String>;

#[derive(Debug, Clone)]
struct Container {
    info: Item,
    blobs: BTreeMap<SortKey, Item>,
}

#[derive(Debug, Clone)]
enum Entry {
    Prefix(String),
    Item(Item),
}

/// Listing backend backed by process memory
#[derive(Debug)]
pub struct MemoryBackend {
    containers: RwLock<BTreeMap<String, Container>>,
    queues: RwLock<BTreeMap<String, Item>>,
    max_page_size: u32,
    fetches: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(BTreeMap::new()),
            queues: RwLock::new(BTreeMap::new()),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Cap every page at `max` entries regardless of the hint
    pub fn with_max_page_size(mut self, max: u32) -> Self {
        self.max_page_size = max.max(1);
        self
    }

    /// Number of pages served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Create a container, replacing its properties if it already exists
    pub fn create_container(&self, info: Item) -> Result<()> {
        let mut containers = self.write()?;
        match containers.get_mut(&info.name) {
            Some(existing) => existing.info = info,
            None => {
                containers.insert(
                    info.name.clone(),
                    Container {
                        info,
                        blobs: BTreeMap::new(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Remove a container and everything in it
    pub fn delete_container(&self, name: &str) -> Result<()> {
        self.write()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Container not found: {name}")))
    }

    /// Store a blob, snapshot or version; the container is created on demand
    ///
    /// Entries are keyed by name, snapshot and version, so storing the same
    /// combination again replaces it.
    pub fn put_blob(&self, container: &str, blob: Item) -> Result<()> {
        let mut containers = self.write()?;
        let entry = containers
            .entry(container.to_string())
            .or_insert_with(|| Container {
                info: Item::new(container),
                blobs: BTreeMap::new(),
            });
        entry.blobs.insert(blob_key(&blob), blob);
        Ok(())
    }

    /// Store empty blobs with the given names
    pub fn put_blobs<N>(&self, container: &str, names: impl IntoIterator<Item = N>) -> Result<()>
    where
        N: Into<String>,
    {
        for name in names {
            self.put_blob(container, Item::blob(name, 0))?;
        }
        Ok(())
    }

    /// Remove every entry stored under `name` in the container
    pub fn delete_blob(&self, container: &str, name: &str) -> Result<()> {
        let mut containers = self.write()?;
        let entry = containers
            .get_mut(container)
            .ok_or_else(|| Error::NotFound(format!("Container not found: {container}")))?;

        let before = entry.blobs.len();
        entry.blobs.retain(|_, blob| blob.name != name);
        if entry.blobs.len() == before {
            return Err(Error::NotFound(format!("{container}/{name}")));
        }
        Ok(())
    }

    /// Create a queue, replacing its properties if it already exists
    pub fn create_queue(&self, info: Item) -> Result<()> {
        self.queues
            .write()
            .map_err(|_| Error::General("memory backend lock poisoned".into()))?
            .insert(info.name.clone(), info);
        Ok(())
    }

    /// Remove a queue
    pub fn delete_queue(&self, name: &str) -> Result<()> {
        self.queues
            .write()
            .map_err(|_| Error::General("memory backend lock poisoned".into()))?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Queue not found: {name}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Container>>> {
        self.containers
            .write()
            .map_err(|_| Error::General("memory backend lock poisoned".into()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Container>>> {
        self.containers
            .read()
            .map_err(|_| Error::General("memory backend lock poisoned".into()))
    }

    /// Every entry of the listing in order, before paging
    fn entries(&self, request: &ListRequest) -> Result<Vec<(SortKey, Entry)>> {
        let containers = self.read()?;
        let include = &request.include;

        let entries: Vec<(SortKey, Entry)> = match &request.target {
            ListTarget::Containers => containers
                .values()
                .filter(|c| c.info.name.starts_with(&request.prefix))
                .filter(|c| include.deleted || !c.info.deleted)
                .filter(|c| include.system || !c.info.name.starts_with('$'))
                .map(|c| {
                    (
                        vec![c.info.name.clone()],
                        Entry::Item(project(&c.info, include)),
                    )
                })
                .collect(),

            ListTarget::Blobs { container } => {
                let entry = containers
                    .get(container)
                    .ok_or_else(|| Error::NotFound(format!("Container not found: {container}")))?;
                let visible = entry
                    .blobs
                    .iter()
                    .filter(|(_, blob)| blob.name.starts_with(&request.prefix))
                    .filter(|(_, blob)| is_visible(blob, include));

                match request.delimiter {
                    None => visible
                        .map(|(key, blob)| (key.clone(), Entry::Item(project(blob, include))))
                        .collect(),
                    Some(delimiter) => group(visible, &request.prefix, delimiter, include),
                }
            }

            ListTarget::TagQuery { expression } => {
                let query = TagQuery::parse(expression)?;
                let mut found = Vec::new();
                for (name, entry) in containers.iter() {
                    if query.container.as_deref().is_some_and(|c| c != name) {
                        continue;
                    }
                    for blob in entry.blobs.values() {
                        if blob.snapshot.is_some() || blob.version_id.is_some() || blob.deleted {
                            continue;
                        }
                        if !blob.name.starts_with(&request.prefix) {
                            continue;
                        }
                        let Some(tags) = &blob.tags else { continue };
                        if !query.matches(tags) {
                            continue;
                        }

                        let mut hit = Item::new(&blob.name);
                        hit.container = Some(name.clone());
                        hit.tags = Some(
                            tags.iter()
                                .filter(|(k, _)| query.mentions(k))
                                .map(|(k, v)| (k.clone(), v.clone()))
                                .collect(),
                        );
                        found.push((vec![name.clone(), blob.name.clone()], Entry::Item(hit)));
                    }
                }
                found
            }

            ListTarget::Queues => self
                .queues
                .read()
                .map_err(|_| Error::General("memory backend lock poisoned".into()))?
                .values()
                .filter(|q| q.name.starts_with(&request.prefix))
                .map(|q| (vec![q.name.clone()], Entry::Item(project(q, include))))
                .collect(),
        };

        Ok(entries)
    }
}

fn blob_key(blob: &Item) -> SortKey {
    vec![
        blob.name.clone(),
        blob.snapshot.clone().unwrap_or_default(),
        blob.version_id.clone().unwrap_or_default(),
    ]
}

fn is_visible(blob: &Item, include: &IncludeFlags) -> bool {
    (include.snapshots || blob.snapshot.is_none())
        && (include.versions || blob.version_id.is_none())
        && (include.deleted || !blob.deleted)
}

/// Copy of an item with metadata and tags stripped unless requested
fn project(item: &Item, include: &IncludeFlags) -> Item {
    let mut item = item.clone();
    if include.metadata {
        item.metadata.get_or_insert_with(BTreeMap::new);
    } else {
        item.metadata = None;
    }
    if include.tags {
        item.tags.get_or_insert_with(BTreeMap::new);
    } else {
        item.tags = None;
    }
    item
}

/// Collapse names below the next delimiter into virtual-folder prefixes
fn group<'a>(
    blobs: impl Iterator<Item = (&'a SortKey, &'a Item)>,
    prefix: &str,
    delimiter: char,
    include: &IncludeFlags,
) -> Vec<(SortKey, Entry)> {
    let mut grouped: BTreeMap<SortKey, Entry> = BTreeMap::new();
    for (key, blob) in blobs {
        let rest = &blob.name[prefix.len()..];
        match rest.find(delimiter) {
            Some(pos) => {
                let folder = format!("{prefix}{}", &rest[..pos + delimiter.len_utf8()]);
                grouped
                    .entry(vec![folder.clone(), String::new(), String::new()])
                    .or_insert(Entry::Prefix(folder));
            }
            None => {
                grouped.insert(key.clone(), Entry::Item(project(blob, include)));
            }
        }
    }
    grouped.into_iter().collect()
}

#[async_trait]
impl ListBackend for MemoryBackend {
    async fn fetch_page(&self, request: &ListRequest, marker: Option<&str>) -> Result<PageResponse> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let after: Option<SortKey> = marker
            .map(|m| {
                serde_json::from_str(m).map_err(|_| {
                    Error::InvalidContinuationToken(format!("unrecognized marker: {m}"))
                })
            })
            .transpose()?;

        let page_size = self.capabilities().effective_page_size(request.page_size) as usize;
        let mut remaining = self
            .entries(request)?
            .into_iter()
            .filter(|(key, _)| after.as_ref().is_none_or(|after| key > after))
            .peekable();

        let mut response = PageResponse::default();
        let mut last_key = None;
        for (key, entry) in remaining.by_ref().take(page_size) {
            match entry {
                Entry::Prefix(name) => response.prefixes.push(name),
                Entry::Item(item) => response.items.push(item),
            }
            last_key = Some(key);
        }

        if remaining.peek().is_some() {
            if let Some(key) = last_key {
                response.next_marker = Some(serde_json::to_string(&key)?);
            }
        }

        Ok(response)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::full(self.max_page_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone)]
struct Term {
    key: String,
    op: Op,
    value: String,
}

/// Parsed tag filter: `key op 'value'` terms joined by `AND`
#[derive(Debug, Clone)]
struct TagQuery {
    container: Option<String>,
    terms: Vec<Term>,
}

impl TagQuery {
    fn parse(expression: &str) -> Result<Self> {
        let mut query = TagQuery {
            container: None,
            terms: Vec::new(),
        };

        for clause in split_and(expression) {
            let (key, op, value) = split_term(clause).ok_or_else(|| {
                Error::RequestRejected(format!("invalid tag query term: '{clause}'"))
            })?;

            if key == "@container" {
                if op != Op::Eq {
                    return Err(Error::RequestRejected(
                        "@container only supports '='".into(),
                    ));
                }
                query.container = Some(value);
            } else {
                query.terms.push(Term { key, op, value });
            }
        }

        if query.terms.is_empty() && query.container.is_none() {
            return Err(Error::RequestRejected("tag query has no terms".into()));
        }

        Ok(query)
    }

    fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        self.terms.iter().all(|term| {
            tags.get(&term.key).is_some_and(|actual| {
                let actual = actual.as_str();
                let wanted = term.value.as_str();
                match term.op {
                    Op::Eq => actual == wanted,
                    Op::Gt => actual > wanted,
                    Op::Ge => actual >= wanted,
                    Op::Lt => actual < wanted,
                    Op::Le => actual <= wanted,
                }
            })
        })
    }

    fn mentions(&self, key: &str) -> bool {
        self.terms.iter().any(|t| t.key == key)
    }
}

/// Split on the `AND` keyword, case-insensitively, outside quotes
fn split_and(expression: &str) -> Vec<&str> {
    let bytes = expression.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quotes = !in_quotes,
            b' ' if !in_quotes
                && bytes.len() >= i + 5
                && bytes[i + 1..i + 4].eq_ignore_ascii_case(b"and")
                && bytes[i + 4] == b' ' =>
            {
                parts.push(expression[start..i].trim());
                i += 5;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(expression[start..].trim());
    parts
}

fn split_term(term: &str) -> Option<(String, Op, String)> {
    const OPERATORS: [(&str, Op); 5] = [
        (">=", Op::Ge),
        ("<=", Op::Le),
        ("=", Op::Eq),
        (">", Op::Gt),
        ("<", Op::Lt),
    ];

    let (pos, symbol, op) = OPERATORS
        .iter()
        .filter_map(|(symbol, op)| term.find(symbol).map(|pos| (pos, *symbol, *op)))
        .min_by_key(|(pos, symbol, _)| (*pos, std::cmp::Reverse(symbol.len())))?;

    let key = unquote(term[..pos].trim(), '"');
    let value = unquote(term[pos + symbol.len()..].trim(), '\'');
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key.to_string(), op, value.to_string()))
}

fn unquote(s: &str, quote: char) -> &str {
    s.strip_prefix(quote)
        .and_then(|s| s.strip_suffix(quote))
        .unwrap_or(s)
}
