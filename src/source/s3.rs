//! S3-compatible bucket-prefix file source. Mirrors `internal/s3/s3.go`,
//! using `aws-sdk-s3` in place of the minio Go client.

use std::collections::HashMap;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{KonvahtiError, Result};
use crate::statmodel::{self, Fingerprint};
use crate::swap::{self, ScopedFs};
use super::FileSource;

const LATEST_LINK_NAME: &str = "latest";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub bucket_prefix: String,
    pub directory: String,
    #[serde(default)]
    pub disable_tls: bool,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(KonvahtiError::Config("no S3 endpoint specified".into()));
        }
        if self.access_key_id.is_empty() {
            return Err(KonvahtiError::Config("no S3 access key ID specified".into()));
        }
        if self.secret_access_key.is_empty() {
            return Err(KonvahtiError::Config("no S3 secret access key specified".into()));
        }
        if self.bucket_name.is_empty() {
            return Err(KonvahtiError::Config("no S3 bucket name specified".into()));
        }
        if self.bucket_prefix.is_empty() {
            return Err(KonvahtiError::Config("no S3 bucket path specified".into()));
        }
        Ok(())
    }

    /// Normalizes to start and end with exactly one `/`, collapsing any
    /// repeated trailing slashes (`"foobar"` -> `"/foobar/"`,
    /// `"/foo/bar///"` -> `"/foo/bar/"`).
    fn sanitized_bucket_prefix(&self) -> String {
        let trimmed = self.bucket_prefix.trim_end_matches('/');
        if trimmed.is_empty() {
            return "/".to_string();
        }
        if trimmed.starts_with('/') {
            format!("{trimmed}/")
        } else {
            format!("/{trimmed}/")
        }
    }

    fn endpoint_url(&self) -> String {
        let scheme = if self.disable_tls { "http" } else { "https" };
        format!("{scheme}://{}", self.endpoint)
    }
}

pub struct S3Source {
    client: Client,
    config: Config,
    bucket_prefix: String,
    last_changes: Fingerprint,
    latest_directory: String,
}

impl S3Source {
    pub fn new(config: Config) -> Self {
        let bucket_prefix = config.sanitized_bucket_prefix();
        let sdk_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(Credentials::new(
                config.access_key_id.clone(),
                config.secret_access_key.clone(),
                None,
                None,
                "konvahti",
            ))
            .force_path_style(true)
            .build();

        let latest_directory = format!("{}/{LATEST_LINK_NAME}", config.directory.trim_end_matches('/'));

        Self {
            client: Client::from_conf(sdk_config),
            config,
            bucket_prefix,
            last_changes: Fingerprint::new(),
            latest_directory,
        }
    }

    async fn list_files(&self) -> Result<Fingerprint> {
        let mut files = Fingerprint::new();
        let mut stream = self
            .client
            .list_objects_v2()
            .bucket(&self.config.bucket_name)
            .prefix(&self.bucket_prefix)
            .into_paginator()
            .send();

        while let Some(page) = stream
            .try_next()
            .await
            .map_err(|e| KonvahtiError::Source(e.into()))?
        {
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let modified = object
                    .last_modified()
                    .and_then(|t| t.to_system_time().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                files.insert(key.to_string(), modified);
            }
        }
        Ok(files)
    }

    async fn pull_object(&self, fs: &ScopedFs, object_key: &str) -> Result<()> {
        let filename = object_key_to_filename(&self.bucket_prefix, object_key);
        debug!(object_key, filename, "downloading file");

        let object = self
            .client
            .get_object()
            .bucket(&self.config.bucket_name)
            .key(object_key)
            .send()
            .await
            .map_err(|e| KonvahtiError::Source(e.into()))?;

        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| KonvahtiError::Source(e.into()))?
            .into_bytes();

        fs.write(&filename, &bytes).await
    }

    async fn copy_local_file(&self, fs: &ScopedFs, object_key: &str) -> Result<()> {
        let filename = object_key_to_filename(&self.bucket_prefix, object_key);
        debug!(object_key, filename, "copying file");

        let source_path = std::path::Path::new(&self.latest_directory).join(&filename);
        let contents = tokio::fs::read(&source_path).await?;
        fs.write(&filename, &contents).await
    }
}

#[async_trait]
impl FileSource for S3Source {
    async fn refresh(&mut self) -> Result<Vec<String>> {
        info!("refreshing files from S3");

        let files = self.list_files().await?;
        let (updated, existing) = statmodel::updated(&self.last_changes, &files);

        let next_directory_name = unix_timestamp_string();
        let next_directory =
            std::path::Path::new(&self.config.directory).join(&next_directory_name);
        let target_link = std::path::Path::new(&self.latest_directory).to_path_buf();

        let updated_for_populate = updated.clone();
        let existing_for_populate = existing.clone();
        let this: &S3Source = self;

        swap::swap_directory(&target_link, &next_directory, |fs| async move {
            for object_key in &updated_for_populate {
                this.pull_object(&fs, object_key).await?;
            }
            for object_key in &existing_for_populate {
                this.copy_local_file(&fs, object_key).await?;
            }
            Ok(())
        })
        .await?;

        self.last_changes = files;
        Ok(updated)
    }

    fn directory(&self) -> &str {
        &self.latest_directory
    }
}

fn unix_timestamp_string() -> String {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

fn object_key_to_filename(prefix: &str, key: &str) -> String {
    if prefix.len() >= key.len() {
        return String::new();
    }
    let filename = &key[prefix.len()..];
    filename.strip_prefix('/').unwrap_or(filename).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_checks_all_required_fields() {
        let base = Config {
            endpoint: "s3.example.com".into(),
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            bucket_name: "bucket".into(),
            bucket_prefix: "releases/".into(),
            directory: "/tmp/dest".into(),
            disable_tls: false,
        };
        assert!(base.validate().is_ok());

        let mut missing_endpoint = base.clone();
        missing_endpoint.endpoint.clear();
        assert!(missing_endpoint.validate().is_err());

        let mut missing_prefix = base.clone();
        missing_prefix.bucket_prefix.clear();
        assert!(missing_prefix.validate().is_err());
    }

    #[test]
    fn object_key_to_filename_strips_prefix_and_leading_slash() {
        assert_eq!(object_key_to_filename("/foobar/", "/foobar/file1"), "file1");
        assert_eq!(object_key_to_filename("/foobar/", "/foobar/dir/file1"), "dir/file1");
        assert_eq!(object_key_to_filename("/foobar/dir/", "/foobar/dir/file1"), "file1");
        assert_eq!(object_key_to_filename("/releases/", "short"), "");
    }

    #[test]
    fn sanitized_bucket_prefix_normalizes_leading_and_trailing_slashes() {
        let mut config = Config {
            endpoint: "s3.example.com".into(),
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            bucket_name: "bucket".into(),
            bucket_prefix: "/foo/bar/".into(),
            directory: "/tmp/dest".into(),
            disable_tls: false,
        };
        assert_eq!(config.sanitized_bucket_prefix(), "/foo/bar/");
        config.bucket_prefix = "foo/bar".into();
        assert_eq!(config.sanitized_bucket_prefix(), "/foo/bar/");
        config.bucket_prefix = "/foo/bar///".into();
        assert_eq!(config.sanitized_bucket_prefix(), "/foo/bar/");
        config.bucket_prefix = "foobar".into();
        assert_eq!(config.sanitized_bucket_prefix(), "/foobar/");
    }
}
