// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object-store access.
//!
//! The kernel treats paths as opaque strings; the only layout knowledge it
//! carries is the per-pipeline source prefix, mirrored from the API layer
//! so the reaper can find a deleted pipeline's files.

use crate::config::S3Config;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use smelt_core::PipelineRef;
use std::time::Duration;
use thiserror::Error;

/// Prefix under which a pipeline's source artifacts live.
pub fn pipeline_source_prefix(reference: &PipelineRef) -> String {
    format!(
        "pipelines/{}/{}/{}/",
        reference.namespace, reference.layer, reference.name
    )
}

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object store error: {0}")]
    Backend(String),

    #[error("object store {kind} operation timed out after {timeout:?}")]
    Timeout { kind: &'static str, timeout: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: i64,
    pub modified: Option<i64>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;
    async fn read(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError>;
    async fn write(&self, path: &str, data: Vec<u8>) -> Result<(), ObjectStoreError>;
    async fn delete(&self, path: &str) -> Result<(), ObjectStoreError>;
    async fn stat(&self, path: &str) -> Result<Option<ObjectMeta>, ObjectStoreError>;
}

/// S3-compatible implementation (MinIO in the common deployment).
///
/// Metadata operations run under the metadata timeout (default 10 s), data
/// operations under the data timeout (default 60 s); both are overridable
/// through configuration.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    metadata_timeout: Duration,
    data_timeout: Duration,
}

impl S3ObjectStore {
    pub fn new(config: &S3Config) -> Self {
        let endpoint = if config.endpoint.starts_with("http://")
            || config.endpoint.starts_with("https://")
        {
            config.endpoint.clone()
        } else if config.use_ssl {
            format!("https://{}", config.endpoint)
        } else {
            format!("http://{}", config.endpoint)
        };

        let credentials =
            Credentials::new(&config.access_key, &config.secret_key, None, None, "smelt-env");
        let s3_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            metadata_timeout: config.metadata_timeout,
            data_timeout: config.data_timeout,
        }
    }

    async fn bounded<T, E, F>(
        &self,
        kind: &'static str,
        timeout: Duration,
        fut: F,
    ) -> Result<T, ObjectStoreError>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(ObjectStoreError::Backend(format!("{kind}: {error}"))),
            Err(_) => Err(ObjectStoreError::Timeout { kind, timeout }),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.clone());
            let page = self
                .bounded("list", self.metadata_timeout, request.send())
                .await?;
            keys.extend(page.contents().iter().filter_map(|o| o.key().map(String::from)));
            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let output = self
            .bounded(
                "read",
                self.data_timeout,
                self.client.get_object().bucket(&self.bucket).key(path).send(),
            )
            .await?;
        let data = self
            .bounded("read-body", self.data_timeout, output.body.collect())
            .await?;
        Ok(data.into_bytes().to_vec())
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<(), ObjectStoreError> {
        self.bounded(
            "write",
            self.data_timeout,
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(path)
                .body(ByteStream::from(data))
                .send(),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), ObjectStoreError> {
        self.bounded(
            "delete",
            self.metadata_timeout,
            self.client.delete_object().bucket(&self.bucket).key(path).send(),
        )
        .await?;
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<ObjectMeta>, ObjectStoreError> {
        let request = self.client.head_object().bucket(&self.bucket).key(path).send();
        match tokio::time::timeout(self.metadata_timeout, request).await {
            Ok(Ok(head)) => Ok(Some(ObjectMeta {
                size: head.content_length().unwrap_or(0),
                modified: head.last_modified().map(|t| t.secs()),
            })),
            Ok(Err(error)) => {
                if error
                    .as_service_error()
                    .map(|service| service.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(None)
                } else {
                    Err(ObjectStoreError::Backend(format!("stat: {error}")))
                }
            }
            Err(_) => Err(ObjectStoreError::Timeout {
                kind: "stat",
                timeout: self.metadata_timeout,
            }),
        }
    }
}

#[cfg(test)]
pub mod mem {
    //! In-memory object store for reaper tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct MemObjectStore {
        objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    }

    impl MemObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put(&self, path: &str, data: &[u8]) {
            self.objects.lock().insert(path.to_string(), data.to_vec());
        }

        pub fn contains(&self, path: &str) -> bool {
            self.objects.lock().contains_key(path)
        }

        pub fn len(&self) -> usize {
            self.objects.lock().len()
        }
    }

    #[async_trait]
    impl ObjectStore for MemObjectStore {
        async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
            Ok(self
                .objects
                .lock()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn read(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError> {
            self.objects
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| ObjectStoreError::Backend(format!("no such object: {path}")))
        }

        async fn write(&self, path: &str, data: Vec<u8>) -> Result<(), ObjectStoreError> {
            self.objects.lock().insert(path.to_string(), data);
            Ok(())
        }

        async fn delete(&self, path: &str) -> Result<(), ObjectStoreError> {
            self.objects.lock().remove(path);
            Ok(())
        }

        async fn stat(&self, path: &str) -> Result<Option<ObjectMeta>, ObjectStoreError> {
            Ok(self
                .objects
                .lock()
                .get(path)
                .map(|data| ObjectMeta { size: data.len() as i64, modified: None }))
        }
    }
}

/// Used when no object store is configured: every operation is a clean
/// no-op so the reaper's file steps degrade gracefully.
pub struct NullObjectStore;

#[async_trait]
impl ObjectStore for NullObjectStore {
    async fn list(&self, _prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        Ok(Vec::new())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError> {
        Err(ObjectStoreError::Backend(format!("no object store configured: {path}")))
    }

    async fn write(&self, _path: &str, _data: Vec<u8>) -> Result<(), ObjectStoreError> {
        Ok(())
    }

    async fn delete(&self, _path: &str) -> Result<(), ObjectStoreError> {
        Ok(())
    }

    async fn stat(&self, _path: &str) -> Result<Option<ObjectMeta>, ObjectStoreError> {
        Ok(None)
    }
}
