use super::{check_key, CoverStore};
use crate::config::S3Settings;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, types::ObjectCannedAcl, Client as S3Client};

pub struct S3Store {
    client: S3Client,
    bucket: String,
    public_read: bool,
}

/// Canned ACL for uploaded covers. Buckets with ACLs disabled need `None`
/// and a bucket policy granting public reads instead.
fn object_acl(public_read: bool) -> Option<ObjectCannedAcl> {
    public_read.then_some(ObjectCannedAcl::PublicRead)
}

impl S3Store {
    pub async fn new(settings: &S3Settings) -> Result<Self> {
        let credentials = aws_sdk_s3::config::Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "bookshelf-covers",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(settings.region.clone()));
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;

        Ok(Self {
            client: S3Client::new(&config),
            bucket: settings.bucket.clone(),
            public_read: settings.public_read,
        })
    }
}

#[async_trait]
impl CoverStore for S3Store {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        check_key(key)?;
        let body = ByteStream::from(data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .set_acl(object_acl(self.public_read))
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Failed to upload {}: {}", key, e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        // S3 reports success for missing keys.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete {}: {}", key, e)))?;

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(Error::Storage(format!(
                        "Failed to check {}: {}",
                        key, service_error
                    )))
                }
            }
        }
    }
}
