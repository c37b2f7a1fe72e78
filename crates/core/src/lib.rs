//! pw-core: cursor-based paginated listing
//!
//! This crate provides:
//! - `PagedLister`, which walks any `ListBackend` page by page and hands out
//!   page, item, and hierarchical cursors
//! - Opaque continuation tokens bound to the request that produced them
//! - An in-memory backend used by tests and as a reference implementation
//! - Configuration, alias management, and listing-path parsing for the CLI
//!
//! The crate does not depend on any storage SDK. Network backends live in
//! sibling crates and only implement `ListBackend`.

pub mod alias;
pub mod config;
pub mod error;
pub mod lister;
pub mod memory;
pub mod path;
pub mod request;
pub mod token;
pub mod traits;

pub use alias::{Alias, AliasManager, RetryConfig, TimeoutConfig};
pub use config::{Config, ConfigManager, Defaults};
pub use error::{Error, Result};
pub use lister::{HierarchyCursor, HierarchyNode, ItemCursor, Page, PageCursor, PagedLister};
pub use memory::MemoryBackend;
pub use path::{ListPath, parse_list_path};
pub use request::{
    DEFAULT_DELIMITER, DEFAULT_PAGE_SIZE, Fingerprint, IncludeFlags, ListRequest, ListTarget,
};
pub use token::ContinuationToken;
pub use traits::{Capabilities, Item, ListBackend, PageResponse};
