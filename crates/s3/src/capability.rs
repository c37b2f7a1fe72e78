//! What the S3 listing APIs can express
//!
//! S3 has no index-tag search and no queues, does not return user metadata
//! or tags from list calls, and has no snapshots or system buckets. Requests asking for
//! those are refused up front instead of silently returning less.

use pw_core::{Capabilities, Error, ListRequest, ListTarget, Result};

/// Hard cap S3 applies to `max-keys`
pub const MAX_KEYS: u32 = 1000;

/// Capabilities of an S3-compatible endpoint
pub fn s3_capabilities() -> Capabilities {
    Capabilities {
        max_page_size: MAX_KEYS,
        hierarchical: true,
        tag_queries: false,
        queues: false,
        metadata: false,
        tags: false,
        deleted: true,
        snapshots: false,
        versions: true,
        system: false,
    }
}

/// Refuse combinations the capability flags cannot describe
///
/// Versions and delete markers only exist for objects, so asking for them
/// while listing buckets is unsupported.
pub fn require_listable(request: &ListRequest) -> Result<()> {
    match &request.target {
        ListTarget::TagQuery { .. } => Err(Error::UnsupportedFeature(
            "finding blobs by tags is not supported by S3".into(),
        )),
        ListTarget::Queues => Err(Error::UnsupportedFeature(
            "S3 has no queues to list".into(),
        )),
        ListTarget::Containers if request.include.versions || request.include.deleted => {
            Err(Error::UnsupportedFeature(
                "versions and delete markers apply to objects, not buckets".into(),
            ))
        }
        _ => Ok(()),
    }
}
