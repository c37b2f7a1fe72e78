//! List request description
//!
//! A [`ListRequest`] fully describes one enumeration: what is listed, how it
//! is filtered, the page-size hint and the inclusion flags. Continuation
//! tokens are bound to the request that produced them through its
//! [`Fingerprint`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Default page-size hint when the caller does not pick one
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Default virtual-folder delimiter
pub const DEFAULT_DELIMITER: char = '/';

/// What a listing enumerates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListTarget {
    /// Containers (buckets) of the account
    Containers,

    /// Blobs (objects) inside one container
    Blobs { container: String },

    /// Blobs across containers whose index tags match an expression
    ///
    /// The expression is a conjunction of `key <op> 'value'` terms joined
    /// by `AND`, optionally scoped with `@container = 'name'`.
    TagQuery { expression: String },

    /// Message queues of the account
    Queues,
}

impl ListTarget {
    /// Short name used in logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            ListTarget::Containers => "containers",
            ListTarget::Blobs { .. } => "blobs",
            ListTarget::TagQuery { .. } => "tag query",
            ListTarget::Queues => "queues",
        }
    }
}

/// Independently togglable inclusion flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeFlags {
    /// Return user metadata with each item
    #[serde(default)]
    pub metadata: bool,

    /// Return index tags with each item
    #[serde(default)]
    pub tags: bool,

    /// Return soft-deleted items and delete markers
    #[serde(default)]
    pub deleted: bool,

    /// Return blob snapshots
    #[serde(default)]
    pub snapshots: bool,

    /// Return previous blob versions
    #[serde(default)]
    pub versions: bool,

    /// Return system containers (names starting with `$`)
    #[serde(default)]
    pub system: bool,
}

impl IncludeFlags {
    /// Names of the flags that are switched on
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            (self.metadata, "metadata"),
            (self.tags, "tags"),
            (self.deleted, "deleted"),
            (self.snapshots, "snapshots"),
            (self.versions, "versions"),
            (self.system, "system"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

/// Description of one listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    /// What is listed
    pub target: ListTarget,

    /// Only names starting with this prefix are returned
    #[serde(default)]
    pub prefix: String,

    /// Advisory number of entries per page
    pub page_size: u32,

    /// Inclusion flags
    #[serde(default)]
    pub include: IncludeFlags,

    /// Delimiter for hierarchical listing; `None` lists flat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
}

impl ListRequest {
    /// Create a request for the given target with default settings
    pub fn new(target: ListTarget) -> Self {
        Self {
            target,
            prefix: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            include: IncludeFlags::default(),
            delimiter: None,
        }
    }

    /// List the containers of the account
    pub fn containers() -> Self {
        Self::new(ListTarget::Containers)
    }

    /// List the blobs of one container
    pub fn blobs(container: impl Into<String>) -> Self {
        Self::new(ListTarget::Blobs {
            container: container.into(),
        })
    }

    /// List the message queues of the account
    pub fn queues() -> Self {
        Self::new(ListTarget::Queues)
    }

    /// Find blobs by index tags
    pub fn tag_query(expression: impl Into<String>) -> Self {
        Self::new(ListTarget::TagQuery {
            expression: expression.into(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_include(mut self, include: IncludeFlags) -> Self {
        self.include = include;
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Whether virtual folders are grouped by a delimiter
    pub fn is_hierarchical(&self) -> bool {
        self.delimiter.is_some()
    }

    /// Check the request for caller mistakes
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::RequestRejected(
                "page size must be a positive integer".into(),
            ));
        }

        match &self.target {
            ListTarget::Containers => {
                if self.delimiter.is_some() {
                    return Err(Error::RequestRejected(
                        "containers cannot be listed hierarchically".into(),
                    ));
                }
            }
            ListTarget::Blobs { container } => {
                if container.is_empty() {
                    return Err(Error::RequestRejected(
                        "container name cannot be empty".into(),
                    ));
                }
            }
            ListTarget::TagQuery { expression } => {
                if expression.trim().is_empty() {
                    return Err(Error::RequestRejected(
                        "tag query expression cannot be empty".into(),
                    ));
                }
                if self.delimiter.is_some() {
                    return Err(Error::RequestRejected(
                        "tag queries cannot be listed hierarchically".into(),
                    ));
                }
            }
            ListTarget::Queues => {
                if self.delimiter.is_some() {
                    return Err(Error::RequestRejected(
                        "queues cannot be listed hierarchically".into(),
                    ));
                }
                let include = IncludeFlags {
                    metadata: false,
                    ..self.include
                };
                if include != IncludeFlags::default() {
                    return Err(Error::RequestRejected(format!(
                        "queues can only include metadata, not {}",
                        include.enabled().join(", ")
                    )));
                }
            }
        }

        Ok(())
    }

    /// Stable digest of every field of the request
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let canonical = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&canonical);
        let mut bytes = [0u8; Fingerprint::LEN];
        bytes.copy_from_slice(&digest[..Fingerprint::LEN]);
        Ok(Fingerprint(bytes))
    }
}

/// Truncated SHA-256 of a serialized [`ListRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; Fingerprint::LEN]);

impl Fingerprint {
    const LEN: usize = 16;

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = ListRequest::blobs("photos");
        assert_eq!(request.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(request.prefix, "");
        assert!(!request.is_hierarchical());
        assert!(request.include.enabled().is_empty());
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let err = ListRequest::blobs("photos")
            .with_page_size(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::RequestRejected(_)));
    }

    #[test]
    fn test_empty_container_rejected() {
        let err = ListRequest::blobs("").validate().unwrap_err();
        assert!(matches!(err, Error::RequestRejected(_)));
    }

    #[test]
    fn test_blank_tag_query_rejected() {
        let err = ListRequest::tag_query("   ").validate().unwrap_err();
        assert!(matches!(err, Error::RequestRejected(_)));
    }

    #[test]
    fn test_hierarchical_containers_rejected() {
        let err = ListRequest::containers()
            .with_delimiter('/')
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::RequestRejected(_)));
    }

    #[test]
    fn test_queue_listing_is_flat_with_metadata_only() {
        let request = ListRequest::queues().with_include(IncludeFlags {
            metadata: true,
            ..Default::default()
        });
        assert!(request.validate().is_ok());

        let err = ListRequest::queues().with_delimiter('/').validate().unwrap_err();
        assert!(matches!(err, Error::RequestRejected(_)));

        let err = ListRequest::queues()
            .with_include(IncludeFlags {
                versions: true,
                ..Default::default()
            })
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::RequestRejected(m) if m.contains("versions")));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = ListRequest::blobs("photos").with_prefix("2024/");
        let b = ListRequest::blobs("photos").with_prefix("2024/");
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_covers_every_field() {
        let base = ListRequest::blobs("photos");
        let fp = base.fingerprint().unwrap();

        let variants = [
            ListRequest::blobs("videos"),
            base.clone().with_prefix("a"),
            base.clone().with_page_size(10),
            base.clone().with_delimiter('/'),
            base.clone().with_include(IncludeFlags {
                versions: true,
                ..Default::default()
            }),
        ];

        for variant in variants {
            assert_ne!(variant.fingerprint().unwrap(), fp, "{variant:?}");
        }
    }

    #[test]
    fn test_enabled_flags() {
        let flags = IncludeFlags {
            metadata: true,
            snapshots: true,
            ..Default::default()
        };
        assert_eq!(flags.enabled(), vec!["metadata", "snapshots"]);
    }
}
