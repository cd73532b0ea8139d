use crate::backend::{Backend, ObjectInfo};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chainsweep_core::{Error, Result, StorageKind, StorageOptions};

pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    pub async fn new(bucket: String, region: Option<String>, endpoint: Option<String>) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint) = &endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        // S3-compatible endpoints rarely support virtual-hosted buckets.
        let config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(endpoint.is_some())
            .build();

        Ok(Self {
            client: Client::from_conf(config),
            bucket,
        })
    }

    pub async fn from_options(options: &StorageOptions) -> Result<Self> {
        if options.location.is_empty() {
            return Err(Error::InvalidStorage("s3 storage requires a bucket".to_string()));
        }
        Self::new(options.location.clone(), options.region.clone(), options.endpoint.clone()).await
    }

    fn key(path: &str) -> &str {
        path.trim_start_matches('/')
    }

    /// Listing prefix for the objects below `key`. The trailing `/` keeps
    /// `snap-1` from matching `snap-10/...`.
    fn dir_prefix(key: &str) -> String {
        let key = key.trim_end_matches('/');
        if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key)
        }
    }
}

#[async_trait]
impl Backend for S3Backend {
    async fn exists(&self, path: &str) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(Self::key(path))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(Error::Backend(format!("Failed to check existence of {}: {}", path, e)))
                }
            }
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(Self::key(path))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to read {}: {}", path, e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Backend(format!("Failed to read body of {}: {}", path, e)))?;

        Ok(data.into_bytes())
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(Self::key(path))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to write {}: {}", path, e)))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(Self::key(path))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to delete s3://{}/{}: {}", self.bucket, path, e)))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let key = Self::key(prefix).trim_end_matches('/');
        let mut results = Vec::new();
        if !key.is_empty() && self.exists(key).await? {
            results.push(key.to_string());
        }

        let dir_prefix = Self::dir_prefix(key);
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&dir_prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Backend(format!("Failed to list s3://{}/{}: {}", self.bucket, prefix, e)))?;

            if let Some(contents) = response.contents {
                results.extend(contents.into_iter().filter_map(|object| object.key));
            }

            if response.is_truncated.unwrap_or(false) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(results)
    }

    async fn stat(&self, path: &str) -> Result<ObjectInfo> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(Self::key(path))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to stat {}: {}", path, e)))?;

        let size = response.content_length.unwrap_or(0) as u64;
        let modified = response
            .last_modified
            .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), 0))
            .unwrap_or_else(chrono::Utc::now);

        Ok(ObjectInfo {
            path: path.to_string(),
            size,
            modified,
        })
    }

    fn backend_type(&self) -> StorageKind {
        StorageKind::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_prefix_stops_at_path_boundary() {
        assert_eq!(S3Backend::dir_prefix("snap-1"), "snap-1/");
        assert_eq!(S3Backend::dir_prefix("snap-1/"), "snap-1/");
        assert_eq!(S3Backend::dir_prefix("tidb/snap-1//"), "tidb/snap-1/");
        assert_eq!(S3Backend::dir_prefix(""), "");
        assert!(!"snap-10/1.sst".starts_with(&S3Backend::dir_prefix("snap-1")));
        assert!("snap-1/1.sst".starts_with(&S3Backend::dir_prefix("snap-1")));
    }

    #[test]
    fn test_key_strips_leading_slash() {
        assert_eq!(S3Backend::key("/snap-1/backupmeta"), "snap-1/backupmeta");
        assert_eq!(S3Backend::key("snap-1"), "snap-1");
    }
}
