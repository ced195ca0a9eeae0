//! # S3 Object Storage
//!
//! [`ObjectStorage`] over the AWS SDK, pointed at an S3-compatible endpoint
//! (the Ceph RGW service by default). Bucket creation runs as the object
//! user so the user owns the bucket. Deletion runs as the object user when
//! their keys are still available and falls back to the controller's own
//! credentials from the default provider chain otherwise.

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use axum::http::Uri;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::constants::DELETE_OBJECTS_BATCH_SIZE;
use crate::observability::metrics;
use crate::provider::{BucketDeletion, BucketEndpoint, CredentialRecord, ObjectStorage, StorageError};

const CREDENTIAL_PROVIDER_NAME: &str = "object-bucket-controller";

/// Region in which S3 rejects an explicit location constraint
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug)]
pub struct S3ObjectStorage {
    endpoint_url: String,
    region: String,
    endpoint: BucketEndpoint,
    /// Client using the controller's own credentials
    controller_client: Client,
}

impl S3ObjectStorage {
    /// Build the storage adapter for `endpoint_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL cannot be parsed.
    pub async fn new(endpoint_url: &str, region: &str) -> Result<Self> {
        let endpoint = parse_endpoint(endpoint_url)?;

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint_url)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        info!(
            endpoint = endpoint_url,
            region = region,
            "Configured S3 object storage"
        );

        Ok(Self {
            endpoint_url: endpoint_url.to_string(),
            region: region.to_string(),
            endpoint,
            controller_client: Client::from_conf(s3_config),
        })
    }

    fn user_client(&self, credential: &CredentialRecord) -> Client {
        let credentials = Credentials::new(
            credential.access_key_id.clone(),
            credential.secret_access_key.as_str(),
            None,
            None,
            CREDENTIAL_PROVIDER_NAME,
        );
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .endpoint_url(&self.endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        Client::from_conf(config)
    }

    async fn create_bucket(&self, client: &Client, name: &str) -> Result<(), StorageError> {
        let mut request = client.create_bucket().bucket(name);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        let start = Instant::now();
        let result = request.send().await;
        record("create_bucket", start, result.is_ok());

        match result {
            Ok(_) => {
                info!(bucket = name, "Created bucket");
                metrics::increment_buckets_provisioned();
                Ok(())
            }
            Err(e) => create_failure(
                name,
                e.as_service_error().and_then(|se| se.code()),
                DisplayErrorContext(&e),
            ),
        }
    }

    /// Delete every object in `name`, one page at a time
    async fn empty_bucket(&self, client: &Client, name: &str) -> Result<usize, StorageError> {
        let mut removed = 0;
        let mut continuation: Option<String> = None;

        loop {
            let start = Instant::now();
            let page = client
                .list_objects_v2()
                .bucket(name)
                .max_keys(DELETE_OBJECTS_BATCH_SIZE)
                .set_continuation_token(continuation.take())
                .send()
                .await;
            record("list_objects", start, page.is_ok());
            let page = page.map_err(|e| {
                StorageError::Unavailable(anyhow!(
                    "Failed to list objects in bucket {}: {}",
                    name,
                    DisplayErrorContext(&e)
                ))
            })?;

            let identifiers = page
                .contents()
                .iter()
                .filter_map(|object| object.key())
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to build object identifiers")?;

            if !identifiers.is_empty() {
                let count = identifiers.len();
                let delete = Delete::builder()
                    .set_objects(Some(identifiers))
                    .quiet(true)
                    .build()
                    .context("Failed to build delete request")?;

                let start = Instant::now();
                let result = client
                    .delete_objects()
                    .bucket(name)
                    .delete(delete)
                    .send()
                    .await;
                record("delete_objects", start, result.is_ok());
                result.map_err(|e| {
                    StorageError::Unavailable(anyhow!(
                        "Failed to delete objects in bucket {}: {}",
                        name,
                        DisplayErrorContext(&e)
                    ))
                })?;
                removed += count;
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(removed)
    }

    async fn has_objects(&self, client: &Client, name: &str) -> Result<bool, StorageError> {
        let start = Instant::now();
        let page = client
            .list_objects_v2()
            .bucket(name)
            .max_keys(1)
            .send()
            .await;
        record("list_objects", start, page.is_ok());
        let page = page.map_err(|e| {
            StorageError::Unavailable(anyhow!(
                "Failed to list objects in bucket {}: {}",
                name,
                DisplayErrorContext(&e)
            ))
        })?;
        Ok(!page.contents().is_empty())
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn create_or_get_bucket(
        &self,
        credential: &CredentialRecord,
        name: &str,
    ) -> Result<BucketEndpoint, StorageError> {
        let span = info_span!("s3.bucket.ensure", bucket = name, user = %credential.user);

        async move {
            let client = self.user_client(credential);

            let start = Instant::now();
            let head = client.head_bucket().bucket(name).send().await;
            record("head_bucket", start, head.is_ok());

            match head {
                Ok(_) => {
                    debug!(bucket = name, "Bucket exists and is accessible");
                }
                // A 403 is either a bucket owned by someone else or bad keys;
                // only the create response tells them apart
                Err(e) if e.raw_response().map(|r| r.status().as_u16()) == Some(403) => {
                    debug!(bucket = name, "Bucket not accessible, attempting creation");
                    self.create_bucket(&client, name).await?;
                }
                Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                    self.create_bucket(&client, name).await?;
                }
                Err(e) => {
                    return Err(StorageError::Unavailable(anyhow!(
                        "Failed to check bucket {}: {}",
                        name,
                        DisplayErrorContext(&e)
                    )));
                }
            }

            Ok(self.endpoint.clone())
        }
        .instrument(span)
        .await
    }

    async fn delete_bucket(
        &self,
        credential: Option<&CredentialRecord>,
        name: &str,
        force_if_non_empty: bool,
    ) -> Result<BucketDeletion, StorageError> {
        let span = info_span!("s3.bucket.delete", bucket = name, force = force_if_non_empty);

        async move {
            let client = match credential {
                Some(credential) => self.user_client(credential),
                None => {
                    warn!(
                        bucket = name,
                        "Owner credential unavailable, deleting with controller credentials"
                    );
                    self.controller_client.clone()
                }
            };

            let start = Instant::now();
            let head = client.head_bucket().bucket(name).send().await;
            record("head_bucket", start, head.is_ok());
            if let Err(e) = head {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    debug!(bucket = name, "Bucket already absent");
                    return Ok(BucketDeletion::Absent);
                }
                return Err(StorageError::Unavailable(anyhow!(
                    "Failed to check bucket {}: {}",
                    name,
                    DisplayErrorContext(&e)
                )));
            }

            if force_if_non_empty {
                let removed = self.empty_bucket(&client, name).await?;
                if removed > 0 {
                    info!(bucket = name, objects = removed, "Emptied bucket before deletion");
                }
            } else if self.has_objects(&client, name).await? {
                return Err(StorageError::NotEmpty {
                    bucket: name.to_string(),
                });
            }

            let start = Instant::now();
            let result = client.delete_bucket().bucket(name).send().await;
            record("delete_bucket", start, result.is_ok());

            match result {
                Ok(_) => {
                    info!(bucket = name, "Deleted bucket");
                    metrics::increment_buckets_deleted();
                    Ok(BucketDeletion::Deleted)
                }
                Err(e) => match e.as_service_error().and_then(|se| se.code()) {
                    Some("NoSuchBucket") => Ok(BucketDeletion::Absent),
                    Some("BucketNotEmpty") => Err(StorageError::NotEmpty {
                        bucket: name.to_string(),
                    }),
                    _ => Err(StorageError::Unavailable(anyhow!(
                        "Failed to delete bucket {}: {}",
                        name,
                        DisplayErrorContext(&e)
                    ))),
                },
            }
        }
        .instrument(span)
        .await
    }
}

/// Map a rejected `CreateBucket` by its S3 error code. Only
/// `BucketAlreadyExists` means another owner; authentication failures such as
/// `InvalidAccessKeyId` or `SignatureDoesNotMatch` stay retryable.
fn create_failure(
    name: &str,
    code: Option<&str>,
    detail: impl std::fmt::Display,
) -> Result<(), StorageError> {
    match code {
        Some("BucketAlreadyOwnedByYou") => {
            debug!(bucket = name, "Bucket already owned by this user");
            Ok(())
        }
        Some("BucketAlreadyExists") => Err(StorageError::Conflict {
            bucket: name.to_string(),
        }),
        _ => Err(StorageError::Unavailable(anyhow!(
            "Failed to create bucket {}: {}",
            name,
            detail
        ))),
    }
}

fn record(operation: &str, start: Instant, ok: bool) {
    metrics::record_storage_operation(operation, start.elapsed().as_secs_f64());
    if !ok {
        metrics::increment_storage_operation_errors(operation);
    }
}

/// Host, port and TLS flag published for every bucket served by `endpoint_url`
///
/// # Errors
///
/// Returns an error if the URL has no host or an unsupported scheme.
pub fn parse_endpoint(endpoint_url: &str) -> Result<BucketEndpoint> {
    let uri: Uri = endpoint_url
        .parse()
        .with_context(|| format!("Invalid object store endpoint '{endpoint_url}'"))?;

    let tls = match uri.scheme_str() {
        Some("https") => true,
        Some("http") | None => false,
        Some(other) => {
            return Err(anyhow!(
                "Unsupported scheme '{other}' in object store endpoint '{endpoint_url}'"
            ))
        }
    };
    let host = uri
        .host()
        .with_context(|| format!("Object store endpoint '{endpoint_url}' has no host"))?
        .to_string();
    let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

    Ok(BucketEndpoint { host, port, tls })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint_with_explicit_port() {
        let endpoint = parse_endpoint("http://rook-ceph-rgw-my-store.rook-ceph.svc:8080").unwrap();
        assert_eq!(
            endpoint,
            BucketEndpoint {
                host: "rook-ceph-rgw-my-store.rook-ceph.svc".to_string(),
                port: 8080,
                tls: false,
            }
        );
    }

    #[test]
    fn test_parse_endpoint_default_ports() {
        assert_eq!(parse_endpoint("https://s3.example.com").unwrap().port, 443);
        assert!(parse_endpoint("https://s3.example.com").unwrap().tls);
        assert_eq!(parse_endpoint("http://s3.example.com").unwrap().port, 80);
    }

    #[test]
    fn test_create_failure_conflict_only_for_existing_bucket() {
        let created = metrics::buckets_provisioned();
        assert!(create_failure("photos", Some("BucketAlreadyOwnedByYou"), "").is_ok());
        // Finding an existing bucket is not a creation
        assert_eq!(metrics::buckets_provisioned(), created);
        assert!(matches!(
            create_failure("photos", Some("BucketAlreadyExists"), ""),
            Err(StorageError::Conflict { .. })
        ));
    }

    #[test]
    fn test_create_failure_bad_keys_are_unavailable() {
        for code in [
            Some("InvalidAccessKeyId"),
            Some("SignatureDoesNotMatch"),
            Some("AccessDenied"),
            None,
        ] {
            let err = create_failure("photos", code, "403 Forbidden").unwrap_err();
            assert!(
                matches!(err, StorageError::Unavailable(_)),
                "{code:?} should be Unavailable"
            );
            assert!(err.to_string().contains("403 Forbidden"));
        }
    }

    #[test]
    fn test_parse_endpoint_rejects_unknown_scheme() {
        let err = parse_endpoint("ftp://s3.example.com").unwrap_err();
        assert!(err.to_string().contains("Unsupported scheme"));
    }
}
