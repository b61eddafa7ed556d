//! AWS SDK S3 object store.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::DateTime;
use serde::Deserialize;

use super::{ListPage, ListRequest, ObjectMeta, ObjectStore, ObjectSummary, StoreError, StoreResult};

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// Region name; required when `endpoint` is set.
    pub region: Option<String>,
    /// Endpoint override for S3-compatible stores (MinIO, Ceph, ...).
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3Settings {
    /// Reject settings the client cannot be built from.
    pub fn validate(&self) -> StoreResult<()> {
        if self.endpoint.is_some() && self.region.is_none() {
            return Err(StoreError::configuration(
                "endpoint cannot be configured without a region",
            ));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(StoreError::configuration(
                "access_key_id and secret_access_key must be set together",
            ));
        }
        Ok(())
    }
}

/// ObjectStore implementation using the AWS SDK for Rust.
///
/// The SDK client is internally thread-safe and pools connections, so one
/// store is shared by every session.
pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    /// Build a client from settings, falling back to the default
    /// credential and region chains for anything left unset.
    pub async fn from_settings(settings: &S3Settings) -> StoreResult<Self> {
        settings.validate()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(ref region) = settings.region {
            loader = loader.region(aws_sdk_s3::config::Region::new(region.clone()));
        }
        if let (Some(key_id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,
                None,
                "courier",
            ));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(ref endpoint) = settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: S3Client::from_conf(builder.build()),
        })
    }
}

fn to_system_time(dt: &DateTime) -> Option<SystemTime> {
    let millis = dt.to_millis().ok()?;
    let millis = u64::try_from(millis).ok()?;
    Some(UNIX_EPOCH + Duration::from_millis(millis))
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectMeta>> {
        tracing::debug!(bucket, key, "head_object");

        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(ObjectMeta {
                size: output
                    .content_length()
                    .and_then(|l| u64::try_from(l).ok())
                    .unwrap_or(0),
                last_modified: output.last_modified().and_then(to_system_time),
            })),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    tracing::error!(bucket, key, error = %service_err, "head_object failed");
                    Err(StoreError::network(service_err.to_string()))
                }
            }
        }
    }

    async fn list_objects(&self, bucket: &str, request: &ListRequest<'_>) -> StoreResult<ListPage> {
        tracing::debug!(bucket, prefix = request.prefix, "list_objects_v2");

        let mut call = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(request.prefix);

        if let Some(delimiter) = request.delimiter {
            call = call.delimiter(delimiter);
        }
        if let Some(token) = request.continuation_token {
            call = call.continuation_token(token);
        }
        if let Some(max_keys) = request.max_keys {
            call = call.max_keys(max_keys);
        }

        let response = call
            .send()
            .await
            .map_err(|err| {
                let err = err.into_service_error();
                tracing::error!(bucket, prefix = request.prefix, error = %err, "list_objects_v2 failed");
                StoreError::network(err.to_string())
            })?;

        let objects = response
            .contents()
            .iter()
            .map(|obj| ObjectSummary {
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                last_modified: obj.last_modified().and_then(to_system_time),
            })
            .collect();

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|cp| cp.prefix().map(str::to_string))
            .collect();

        let next_continuation_token = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            common_prefixes,
            next_continuation_token,
        })
    }
}
