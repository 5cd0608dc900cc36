use super::classify;
use crate::error::PortError;
use crate::ports::{ObjectStore, RemoteObject, SHA256_METADATA_KEY};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use shipfront_artifacts::Artifact;
use std::path::Path;
use tracing::debug;

/// [`ObjectStore`] backed by Amazon S3 (or an S3-compatible endpoint)
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(config: &SdkConfig, endpoint_url: Option<&str>) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(config);
        if let Some(url) = endpoint_url {
            // Most S3-compatible stores do not do virtual-hosted buckets
            builder = builder.endpoint_url(url).force_path_style(true);
        }
        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Stream a file from disk instead of buffering it
async fn file_body(path: &Path) -> Result<ByteStream, PortError> {
    ByteStream::from_path(path)
        .await
        .map_err(|e| PortError::rejected(format!("read {}: {}", path.display(), e)))
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<RemoteObject>, PortError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix(prefix.map(|p| format!("{}/", p)))
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| classify("ListObjectsV2", e))?;

            for object in page.contents() {
                if let Some(key) = object.key() {
                    objects.push(RemoteObject {
                        key: key.to_string(),
                        size: object.size().unwrap_or(0).max(0) as u64,
                        sha256: None,
                    });
                }
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(bucket, count = objects.len(), "listed bucket");
        Ok(objects)
    }

    async fn content_hash(&self, bucket: &str, key: &str) -> Result<Option<String>, PortError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(head) => Ok(head
                .metadata()
                .and_then(|m| m.get(SHA256_METADATA_KEY))
                .cloned()),
            Err(SdkError::ServiceError(ctx)) if ctx.err().is_not_found() => Ok(None),
            Err(e) => Err(classify("HeadObject", e)),
        }
    }

    async fn put(&self, bucket: &str, artifact: &Artifact) -> Result<(), PortError> {
        let body = file_body(&artifact.path).await?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(&artifact.key)
            .body(body)
            .content_type(&artifact.content_type)
            .set_cache_control(artifact.cache_control.clone())
            .metadata(SHA256_METADATA_KEY, &artifact.sha256)
            .send()
            .await
            .map_err(|e| classify("PutObject", e))?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, keys: &[String]) -> Result<(), PortError> {
        if keys.is_empty() {
            return Ok(());
        }

        let identifiers = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PortError::rejected(format!("DeleteObjects: {}", e)))?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|e| PortError::rejected(format!("DeleteObjects: {}", e)))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| classify("DeleteObjects", e))?;

        // DeleteObjects reports per-key failures in a 200 response
        let failures = output.errors();
        if let Some(first) = failures.first() {
            let code = first.code().unwrap_or("Unknown");
            let message = format!(
                "DeleteObjects failed for {} key(s), first {}: {} {}",
                failures.len(),
                first.key().unwrap_or("?"),
                code,
                first.message().unwrap_or_default()
            );
            return Err(if code == "AccessDenied" {
                PortError::auth(message)
            } else if code == "InternalError" || code == "SlowDown" {
                PortError::transient(message)
            } else {
                PortError::rejected(message)
            });
        }
        Ok(())
    }
}
