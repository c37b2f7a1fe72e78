//! S3 listing backend
//!
//! Wraps aws-sdk-s3 and implements `ListBackend` from pw-core. Buckets come
//! from ListBuckets, objects from ListObjectsV2, and versions or delete
//! markers from ListObjectVersions.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_smithy_types::date_time::DateTime;
use serde::{Deserialize, Serialize};

use pw_core::{
    Alias, Capabilities, Error, Item, ListBackend, ListRequest, ListTarget, PageResponse, Result,
};

use crate::capability::{require_listable, s3_capabilities};

/// S3 listing backend
#[derive(Debug)]
pub struct S3Backend {
    inner: aws_sdk_s3::Client,
    capabilities: Capabilities,
}

impl S3Backend {
    /// Create a backend from an alias configuration
    ///
    /// Retry and timeout settings are handed to the SDK, which retries
    /// throttling and transient network errors before a page call fails.
    pub async fn new(alias: &Alias) -> Result<Self> {
        alias.validate()?;

        let credentials = aws_credential_types::Credentials::new(
            alias.access_key.clone(),
            alias.secret_key.clone(),
            None,
            None,
            "pw-static-credentials",
        );

        let retry = alias.retry_config();
        let retry_config = aws_config::retry::RetryConfig::standard()
            .with_max_attempts(retry.max_attempts)
            .with_initial_backoff(Duration::from_millis(retry.initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(retry.max_backoff_ms));

        let timeout = alias.timeout_config();
        let timeout_config = aws_config::timeout::TimeoutConfig::builder()
            .connect_timeout(Duration::from_millis(timeout.connect_ms))
            .read_timeout(Duration::from_millis(timeout.read_ms))
            .build();

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(alias.region.clone()))
            .endpoint_url(&alias.endpoint)
            .retry_config(retry_config)
            .timeout_config(timeout_config)
            .load()
            .await;

        // Most S3-compatible servers only understand path-style addressing.
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(alias.bucket_lookup != "dns")
            .build();

        tracing::debug!(alias = %alias.name, endpoint = %alias.endpoint, "Created S3 backend");
        Ok(Self::from_client(aws_sdk_s3::Client::from_conf(s3_config)))
    }

    /// Wrap an already configured client
    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self {
            inner: client,
            capabilities: s3_capabilities(),
        }
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    fn max_keys(&self, request: &ListRequest) -> i32 {
        let size = self.capabilities.effective_page_size(request.page_size);
        i32::try_from(size).unwrap_or(i32::MAX)
    }

    async fn list_buckets(&self, request: &ListRequest, marker: Option<&str>) -> Result<PageResponse> {
        let response = self
            .inner
            .list_buckets()
            .max_buckets(self.max_keys(request))
            .set_prefix(non_empty(&request.prefix))
            .set_continuation_token(marker.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "bucket listing", marker.is_some()))?;

        // Some servers ignore the prefix parameter.
        let items = response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(|name| (name, b.creation_date())))
            .filter(|(name, _)| name.starts_with(request.prefix.as_str()))
            .map(|(name, created)| {
                let mut item = Item::new(name);
                item.last_modified = created.and_then(to_timestamp);
                item
            })
            .collect();

        Ok(PageResponse {
            items,
            prefixes: Vec::new(),
            next_marker: response.continuation_token().map(str::to_string),
        })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        request: &ListRequest,
        marker: Option<&str>,
    ) -> Result<PageResponse> {
        let response = self
            .inner
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(self.max_keys(request))
            .set_prefix(non_empty(&request.prefix))
            .set_delimiter(request.delimiter.map(String::from))
            .set_continuation_token(marker.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, marker.is_some()))?;

        let items = response
            .contents()
            .iter()
            .map(|object| {
                let key = object.key().unwrap_or_default();
                let mut item = Item::blob(key, object.size().unwrap_or(0));
                item.last_modified = object.last_modified().and_then(to_timestamp);
                item.etag = object.e_tag().map(trim_etag);
                item.storage_class = object.storage_class().map(|sc| sc.as_str().to_string());
                item
            })
            .collect();

        let prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        let next_marker = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(PageResponse {
            items,
            prefixes,
            next_marker,
        })
    }

    async fn list_versions(
        &self,
        bucket: &str,
        request: &ListRequest,
        marker: Option<&str>,
    ) -> Result<PageResponse> {
        let marker = marker.map(VersionMarker::decode).transpose()?;
        let (key_marker, version_marker) = match marker {
            Some(m) => (Some(m.key), m.version_id),
            None => (None, None),
        };

        let response = self
            .inner
            .list_object_versions()
            .bucket(bucket)
            .max_keys(self.max_keys(request))
            .set_prefix(non_empty(&request.prefix))
            .set_delimiter(request.delimiter.map(String::from))
            .set_key_marker(key_marker.clone())
            .set_version_id_marker(version_marker)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key_marker.is_some()))?;

        let all_versions = request.include.versions;
        let mut items: Vec<Item> = response
            .versions()
            .iter()
            .filter(|v| all_versions || v.is_latest().unwrap_or(false))
            .map(|v| {
                let mut item = Item::blob(v.key().unwrap_or_default(), v.size().unwrap_or(0));
                item.version_id = v.version_id().map(str::to_string);
                item.last_modified = v.last_modified().and_then(to_timestamp);
                item.etag = v.e_tag().map(trim_etag);
                item.storage_class = v.storage_class().map(|sc| sc.as_str().to_string());
                item
            })
            .collect();

        if request.include.deleted {
            items.extend(
                response
                    .delete_markers()
                    .iter()
                    .filter(|m| all_versions || m.is_latest().unwrap_or(false))
                    .map(|m| {
                        let mut item = Item::new(m.key().unwrap_or_default());
                        item.version_id = m.version_id().map(str::to_string);
                        item.last_modified = m.last_modified().and_then(to_timestamp);
                        item.deleted = true;
                        item
                    }),
            );
        }

        // S3 reports versions and delete markers in separate lists; newest first per key.
        items.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| b.last_modified.cmp(&a.last_modified))
        });

        let prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        let next_marker = if response.is_truncated().unwrap_or(false) {
            response
                .next_key_marker()
                .map(|key| {
                    VersionMarker {
                        key: key.to_string(),
                        version_id: response.next_version_id_marker().map(str::to_string),
                    }
                    .encode()
                })
                .transpose()?
        } else {
            None
        };

        Ok(PageResponse {
            items,
            prefixes,
            next_marker,
        })
    }
}

#[async_trait]
impl ListBackend for S3Backend {
    async fn fetch_page(&self, request: &ListRequest, marker: Option<&str>) -> Result<PageResponse> {
        require_listable(request)?;

        match &request.target {
            ListTarget::Containers => self.list_buckets(request, marker).await,
            ListTarget::Blobs { container } => {
                if request.include.versions || request.include.deleted {
                    self.list_versions(container, request, marker).await
                } else {
                    self.list_objects(container, request, marker).await
                }
            }
            ListTarget::TagQuery { .. } | ListTarget::Queues => Err(Error::UnsupportedFeature(
                format!("listing {} is not supported by S3", request.target.kind()),
            )),
        }
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn check(&self, request: &ListRequest) -> Result<()> {
        self.capabilities.check(request)?;
        require_listable(request)
    }
}

/// Position inside a ListObjectVersions walk
///
/// S3 needs both the key and the version id to resume, so the pair is
/// carried as one JSON marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct VersionMarker {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version_id: Option<String>,
}

impl VersionMarker {
    fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::InvalidContinuationToken(format!("bad version marker: {e}")))
    }
}

fn non_empty(prefix: &str) -> Option<String> {
    (!prefix.is_empty()).then(|| prefix.to_string())
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

fn to_timestamp(dt: &DateTime) -> Option<jiff::Timestamp> {
    jiff::Timestamp::new(dt.secs(), i32::try_from(dt.subsec_nanos()).ok()?).ok()
}

fn map_sdk_error<E, R>(err: SdkError<E, R>, resource: &str, resumed: bool) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let code = err.as_service_error().and_then(|e| e.code()).map(str::to_string);
    let message = DisplayErrorContext(&err).to_string();
    classify_error(code.as_deref(), resource, resumed, message)
}

/// Map an S3 error code onto the listing error taxonomy
///
/// `resumed` is set when the call carried a marker, so argument errors can
/// be blamed on the continuation token rather than the request.
fn classify_error(code: Option<&str>, resource: &str, resumed: bool, message: String) -> Error {
    match code {
        Some("NoSuchBucket") => Error::NotFound(format!("Bucket not found: {resource}")),
        Some(
            "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken",
        ) => Error::Auth(message),
        Some("InvalidToken" | "InvalidContinuationToken" | "InvalidArgument") if resumed => {
            Error::InvalidContinuationToken(message)
        }
        Some("InvalidArgument" | "InvalidBucketName") => Error::RequestRejected(message),
        Some("NotImplemented") => Error::UnsupportedFeature(message),
        _ => {
            tracing::debug!(?code, resource, "S3 listing call failed");
            Error::BackendUnavailable(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_core::{IncludeFlags, PagedLister};

    fn offline_backend() -> S3Backend {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        S3Backend::from_client(aws_sdk_s3::Client::from_conf(config))
    }

    #[test]
    fn test_classify_error() {
        let msg = || "boom".to_string();
        assert!(matches!(
            classify_error(Some("NoSuchBucket"), "photos", false, msg()),
            Error::NotFound(m) if m.contains("photos")
        ));
        assert!(matches!(
            classify_error(Some("AccessDenied"), "b", false, msg()),
            Error::Auth(_)
        ));
        assert!(matches!(
            classify_error(Some("InvalidArgument"), "b", true, msg()),
            Error::InvalidContinuationToken(_)
        ));
        assert!(matches!(
            classify_error(Some("InvalidArgument"), "b", false, msg()),
            Error::RequestRejected(_)
        ));
        assert!(matches!(
            classify_error(Some("SlowDown"), "b", false, msg()),
            Error::BackendUnavailable(_)
        ));
        assert!(matches!(
            classify_error(None, "b", true, msg()),
            Error::BackendUnavailable(_)
        ));
    }

    #[test]
    fn test_version_marker_carries_key_and_version() {
        let marker = VersionMarker {
            key: "logs/a.txt".into(),
            version_id: Some("3HL4kqtJ".into()),
        };
        let raw = marker.encode().unwrap();
        assert_eq!(VersionMarker::decode(&raw).unwrap(), marker);

        let err = VersionMarker::decode("not-json").unwrap_err();
        assert!(matches!(err, Error::InvalidContinuationToken(_)));
    }

    #[test]
    fn test_max_keys_capped() {
        let backend = offline_backend();
        assert_eq!(backend.max_keys(&ListRequest::blobs("b").with_page_size(5000)), 1000);
        assert_eq!(backend.max_keys(&ListRequest::blobs("b").with_page_size(7)), 7);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(trim_etag("\"abc\""), "abc");
        assert_eq!(non_empty(""), None);
        assert_eq!(non_empty("a/"), Some("a/".to_string()));

        let ts = to_timestamp(&DateTime::from_secs(1_700_000_000)).unwrap();
        assert_eq!(ts.as_second(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_unsupported_requests_fail_before_network() {
        let lister = PagedLister::new(offline_backend());

        assert!(matches!(
            lister.list_pages(ListRequest::tag_query("a = 'b'")),
            Err(Error::UnsupportedFeature(_))
        ));

        let request = ListRequest::blobs("b").with_include(IncludeFlags {
            snapshots: true,
            ..IncludeFlags::default()
        });
        assert!(matches!(
            lister.list_all(request),
            Err(Error::UnsupportedFeature(_))
        ));

        let request = ListRequest::containers().with_include(IncludeFlags {
            deleted: true,
            ..IncludeFlags::default()
        });
        assert!(matches!(
            lister.list_pages(request.clone()),
            Err(Error::UnsupportedFeature(_))
        ));
        let err = lister.list_page(&request, None).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));
        let err = lister.backend().fetch_page(&request, None).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));

        assert!(matches!(
            lister.list_all(ListRequest::queues()),
            Err(Error::UnsupportedFeature(_))
        ));
    }
}
