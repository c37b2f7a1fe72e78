//! ListBackend trait definition
//!
//! This trait is the only collaborator the lister needs: one call that
//! returns one page of entries given an optional backend marker. It keeps
//! the pagination logic independent of any storage SDK.

use std::collections::BTreeMap;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::request::{ListRequest, ListTarget};

/// One listed entity: a container, blob or queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Entity name (container or queue name, or full blob key)
    pub name: String,

    /// User metadata, present when requested and supported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,

    /// Index tags, present when requested and supported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,

    /// Size in bytes (None for containers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,

    /// Human-readable size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_human: Option<String>,

    /// Last modified timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    /// ETag (usually MD5 for single-part uploads)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Storage class / access tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Version identifier when versions are listed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,

    /// Snapshot identifier when snapshots are listed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,

    /// Container the blob lives in (set by tag queries)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    /// Soft-deleted item or delete marker
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl Item {
    /// Create an item carrying only a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: None,
            tags: None,
            size_bytes: None,
            size_human: None,
            last_modified: None,
            etag: None,
            storage_class: None,
            version_id: None,
            snapshot: None,
            container: None,
            deleted: false,
        }
    }

    /// Create an item for a blob of the given size
    pub fn blob(name: impl Into<String>, size: i64) -> Self {
        let mut item = Self::new(name);
        item.size_bytes = Some(size);
        item.size_human = Some(humansize::format_size(
            size.max(0) as u64,
            humansize::BINARY,
        ));
        item
    }

    pub fn with_metadata<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata = Some(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn with_tags<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags = Some(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

/// One page exactly as the backend returned it
///
/// `next_marker` is the backend's own resume position; the lister never
/// shows it to callers unsealed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResponse {
    /// Leaf entries in backend order
    pub items: Vec<Item>,

    /// Virtual-folder prefixes (hierarchical listings only)
    pub prefixes: Vec<String>,

    /// Marker for the next page; None when the listing is exhausted
    pub next_marker: Option<String>,
}

impl PageResponse {
    /// Number of entries on the page
    pub fn len(&self) -> usize {
        self.items.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.prefixes.is_empty()
    }
}

/// Backend capability information
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// Largest page the backend serves; bigger hints are capped
    pub max_page_size: u32,

    /// Supports delimiter-based listing
    pub hierarchical: bool,

    /// Supports finding blobs by index tags
    pub tag_queries: bool,

    /// Lists message queues
    pub queues: bool,

    /// Returns user metadata in listings
    pub metadata: bool,

    /// Returns index tags in listings
    pub tags: bool,

    /// Lists soft-deleted items or delete markers
    pub deleted: bool,

    /// Lists snapshots
    pub snapshots: bool,

    /// Lists previous versions
    pub versions: bool,

    /// Lists system containers
    pub system: bool,
}

impl Capabilities {
    /// Every feature on, with the given page cap
    pub fn full(max_page_size: u32) -> Self {
        Self {
            max_page_size,
            hierarchical: true,
            tag_queries: true,
            queues: true,
            metadata: true,
            tags: true,
            deleted: true,
            snapshots: true,
            versions: true,
            system: true,
        }
    }

    /// Refuse a request that needs a feature this backend lacks
    pub fn check(&self, request: &ListRequest) -> Result<()> {
        let unsupported = |feature: &str| {
            Err(Error::UnsupportedFeature(format!(
                "{feature} is not supported by this backend"
            )))
        };

        if matches!(request.target, ListTarget::TagQuery { .. }) && !self.tag_queries {
            return unsupported("finding blobs by tags");
        }
        if matches!(request.target, ListTarget::Queues) && !self.queues {
            return unsupported("listing queues");
        }
        if request.is_hierarchical() && !self.hierarchical {
            return unsupported("hierarchical listing");
        }

        let include = &request.include;
        for (wanted, supported, feature) in [
            (include.metadata, self.metadata, "including metadata"),
            (include.tags, self.tags, "including tags"),
            (include.deleted, self.deleted, "including deleted items"),
            (include.snapshots, self.snapshots, "including snapshots"),
            (include.versions, self.versions, "including versions"),
            (include.system, self.system, "including system containers"),
        ] {
            if wanted && !supported {
                return unsupported(feature);
            }
        }

        Ok(())
    }

    /// Page size actually served for a hint
    pub fn effective_page_size(&self, hint: u32) -> u32 {
        if self.max_page_size == 0 {
            hint
        } else {
            hint.min(self.max_page_size)
        }
    }
}

/// Source of listing pages
///
/// Implemented by storage adapters and mocked in tests. Transient failures
/// are expected to be retried by the transport underneath; an error returned
/// here is final for that call.
#[async_trait]
pub trait ListBackend: Send + Sync {
    /// Fetch one page, starting after `marker` when given
    async fn fetch_page(&self, request: &ListRequest, marker: Option<&str>)
    -> Result<PageResponse>;

    /// Get backend capabilities
    fn capabilities(&self) -> Capabilities;

    /// Refuse a request this backend cannot serve, before any fetch
    ///
    /// Backends with rules the capability flags cannot express override
    /// this and add their own checks.
    fn check(&self, request: &ListRequest) -> Result<()> {
        self.capabilities().check(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::IncludeFlags;

    #[test]
    fn test_item_blob() {
        let item = Item::blob("test.txt", 1024);
        assert_eq!(item.name, "test.txt");
        assert_eq!(item.size_bytes, Some(1024));
        assert_eq!(item.size_human.as_deref(), Some("1 KiB"));
        assert!(item.metadata.is_none());
    }

    #[test]
    fn test_item_json_skips_empty_fields() {
        let item = Item::new("logs").with_metadata([("owner", "ops")]);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "logs", "metadata": {"owner": "ops"}})
        );
    }

    #[test]
    fn test_capabilities_refuse_missing_feature() {
        let caps = Capabilities {
            max_page_size: 1000,
            hierarchical: true,
            ..Default::default()
        };

        let request = ListRequest::blobs("b").with_include(IncludeFlags {
            snapshots: true,
            ..Default::default()
        });
        let err = caps.check(&request).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));

        let err = caps.check(&ListRequest::tag_query("a='b'")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));

        let err = caps.check(&ListRequest::queues()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));

        assert!(caps.check(&ListRequest::blobs("b").with_delimiter('/')).is_ok());
    }

    #[test]
    fn test_effective_page_size() {
        let caps = Capabilities::full(1000);
        assert_eq!(caps.effective_page_size(5000), 1000);
        assert_eq!(caps.effective_page_size(2), 2);
        assert_eq!(Capabilities::default().effective_page_size(7), 7);
    }
}
