//! Listing path parsing
//!
//! `ls` and `tree` address what to list as `alias[/bucket[/prefix]]`.
//! An alias alone lists its buckets; adding a bucket lists the blobs in it,
//! optionally narrowed to a key prefix.

use std::fmt;

use crate::error::{Error, Result};
use crate::request::ListRequest;

/// A parsed listing location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPath {
    /// Alias name
    pub alias: String,
    /// Bucket name, absent when listing the alias's buckets
    pub bucket: Option<String>,
    /// Key prefix inside the bucket (may be empty)
    pub prefix: String,
}

impl ListPath {
    /// Path naming every bucket under an alias
    pub fn alias_root(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            bucket: None,
            prefix: String::new(),
        }
    }

    /// Path naming a prefix inside a bucket
    pub fn in_bucket(
        alias: impl Into<String>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            bucket: Some(bucket.into()),
            prefix: prefix.into(),
        }
    }

    /// Whether the path stops at the alias and therefore lists buckets
    pub fn is_alias_root(&self) -> bool {
        self.bucket.is_none()
    }

    /// The prefix, extended with `delimiter` unless empty or already terminated.
    ///
    /// `ls minio/photos/2024` means "the 2024 folder" when listing a level,
    /// so the prefix becomes `2024/`.
    pub fn dir_prefix(&self, delimiter: char) -> String {
        if self.prefix.is_empty() || self.prefix.ends_with(delimiter) {
            self.prefix.clone()
        } else {
            format!("{}{delimiter}", self.prefix)
        }
    }

    /// Base request for this path: containers at the alias root, blobs otherwise
    pub fn to_request(&self) -> ListRequest {
        match &self.bucket {
            None => ListRequest::containers(),
            Some(bucket) => ListRequest::blobs(bucket.clone()),
        }
        .with_prefix(self.prefix.clone())
    }
}

impl fmt::Display for ListPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bucket {
            None => write!(f, "{}", self.alias),
            Some(bucket) if self.prefix.is_empty() => write!(f, "{}/{bucket}", self.alias),
            Some(bucket) => write!(f, "{}/{bucket}/{}", self.alias, self.prefix),
        }
    }
}

/// Parse `alias[/bucket[/prefix]]`
///
/// A trailing slash after the alias or bucket is accepted; an empty bucket
/// segment followed by more path is not.
/// Slashes inside the prefix are kept verbatim.
pub fn parse_list_path(path: &str) -> Result<ListPath> {
    if path.is_empty() {
        return Err(Error::InvalidPath("Path cannot be empty".into()));
    }

    let mut parts = path.splitn(3, '/');
    let alias = parts.next().unwrap_or_default();
    if !is_valid_alias_name(alias) {
        return Err(Error::InvalidPath(format!(
            "Invalid alias name '{alias}'. Use format: alias[/bucket[/prefix]]"
        )));
    }

    let bucket = parts.next().unwrap_or_default();
    let prefix = parts.next();
    if bucket.is_empty() {
        if prefix.is_some() {
            return Err(Error::InvalidPath(format!(
                "Empty bucket name in '{path}'. Use format: alias[/bucket[/prefix]]"
            )));
        }
        return Ok(ListPath::alias_root(alias));
    }

    let prefix = prefix.unwrap_or_default();
    Ok(ListPath::in_bucket(alias, bucket, prefix))
}

/// Check if a string is a valid alias name
fn is_valid_alias_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
