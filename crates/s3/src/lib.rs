//! pw-s3: S3 listing backend for pagewalk
//!
//! This crate implements the `ListBackend` trait from pw-core on top of
//! aws-sdk-s3. It is the only crate that directly depends on the AWS SDK.

pub mod capability;
pub mod client;

pub use capability::{MAX_KEYS, s3_capabilities};
pub use client::S3Backend;
