//! Storage locations and the object-store handles behind them.
//!
//! A location string names where input is read from or output is written
//! to. Supported forms:
//!
//! - `s3://bucket` or `s3://bucket/some/prefix`
//! - `file:///absolute/path` or a bare filesystem path
//! - `memory://` for an in-process store

use anyhow::Result;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::AwsConfig;
use crate::error::EtlError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    S3 { bucket: String, prefix: String },
    Local { root: PathBuf },
    Memory,
}

impl Location {
    pub fn parse(location: &str) -> Result<Self, EtlError> {
        let invalid = |reason: &str| EtlError::InvalidLocation {
            location: location.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = location.trim();
        if trimmed.is_empty() {
            return Err(invalid("location is empty"));
        }

        if let Some(rest) = trimmed
            .strip_prefix("s3://")
            .or_else(|| trimmed.strip_prefix("s3a://"))
        {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(invalid("missing bucket name"));
            }
            return Ok(Location::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.trim_matches('/').to_string(),
            });
        }

        if trimmed == "memory://" || trimmed == "memory:" {
            return Ok(Location::Memory);
        }

        if let Some(path) = trimmed.strip_prefix("file://") {
            if !path.starts_with('/') {
                return Err(invalid("file:// locations must be absolute"));
            }
            return Ok(Location::Local {
                root: PathBuf::from(path),
            });
        }

        if let Some((scheme, _)) = trimmed.split_once("://") {
            return Err(invalid(&format!("unsupported scheme {:?}", scheme)));
        }

        Ok(Location::Local {
            root: PathBuf::from(trimmed),
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::S3 { bucket, prefix } if prefix.is_empty() => write!(f, "s3://{}", bucket),
            Location::S3 { bucket, prefix } => write!(f, "s3://{}/{}", bucket, prefix),
            Location::Local { root } => write!(f, "file://{}", root.display()),
            Location::Memory => write!(f, "memory://"),
        }
    }
}

/// An object store plus the root path inside it that a location maps to.
#[derive(Clone)]
pub struct StoreHandle {
    pub store: Arc<dyn ObjectStore>,
    pub root: Path,
    pub label: String,
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("root", &self.root)
            .field("label", &self.label)
            .finish()
    }
}

impl StoreHandle {
    pub fn new(store: Arc<dyn ObjectStore>, root: Path, label: impl Into<String>) -> Self {
        Self {
            store,
            root,
            label: label.into(),
        }
    }

    /// Open the store a location points at. Local output roots are created
    /// when `create_local` is set; local input roots must already exist.
    pub fn open(location: &Location, aws: &AwsConfig, create_local: bool) -> Result<Self> {
        let label = location.to_string();
        match location {
            Location::S3 { bucket, prefix } => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(key) = &aws.access_key_id {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(secret) = &aws.secret_access_key {
                    builder = builder.with_secret_access_key(secret);
                }
                if let Some(region) = &aws.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &aws.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if aws.allow_http {
                    builder = builder.with_allow_http(true);
                }
                let store = builder
                    .build()
                    .map_err(|e| EtlError::storage("connect", &label, e))?;
                debug!("Opened S3 store for bucket {}", bucket);
                Ok(Self::new(Arc::new(store), Path::from(prefix.as_str()), label))
            }
            Location::Local { root } => {
                if create_local {
                    std::fs::create_dir_all(root)?;
                } else if !root.is_dir() {
                    return Err(EtlError::InvalidLocation {
                        location: label,
                        reason: "directory does not exist".to_string(),
                    }
                    .into());
                }
                let store = LocalFileSystem::new_with_prefix(root)
                    .map_err(|e| EtlError::storage("open", &label, e))?;
                Ok(Self::new(Arc::new(store), Path::default(), label))
            }
            Location::Memory => Ok(Self::new(Arc::new(InMemory::new()), Path::default(), label)),
        }
    }

    /// Path of `relative` (a `/`-separated string) under this handle's root.
    pub fn path(&self, relative: &str) -> Path {
        join(&self.root, relative)
    }

    /// Every object under `prefix`, recursively, sorted by path.
    pub async fn list(&self, prefix: &Path) -> Result<Vec<ObjectMeta>, EtlError> {
        let mut objects: Vec<ObjectMeta> = self
            .store
            .list(Some(prefix))
            .try_collect()
            .await
            .map_err(|e| EtlError::storage("list", prefix, e))?;
        objects.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(objects)
    }

    /// Cheap reachability and permission check against the root.
    pub async fn probe(&self) -> Result<(), EtlError> {
        let mut listing = self.store.list(Some(&self.root));
        match listing.try_next().await {
            Ok(_) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(EtlError::storage("probe", &self.label, e)),
        }
    }

    /// Delete every object under `prefix` and return how many went.
    pub async fn delete_prefix(&self, prefix: &Path) -> Result<usize, EtlError> {
        let objects = self.list(prefix).await?;
        for meta in &objects {
            self.store
                .delete(&meta.location)
                .await
                .map_err(|e| EtlError::storage("delete", &meta.location, e))?;
        }
        Ok(objects.len())
    }
}

/// Append the `/`-separated segments of `relative` to `root`.
pub fn join(root: &Path, relative: &str) -> Path {
    let mut path = root.clone();
    for part in relative.split('/').filter(|p| !p.is_empty()) {
        path = path.child(part);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    #[test]
    fn test_parse_s3_locations() {
        assert_eq!(
            Location::parse("s3://udacity-dend").unwrap(),
            Location::S3 {
                bucket: "udacity-dend".to_string(),
                prefix: String::new()
            }
        );
        assert_eq!(
            Location::parse("s3a://lake/dim-tables/").unwrap(),
            Location::S3 {
                bucket: "lake".to_string(),
                prefix: "dim-tables".to_string()
            }
        );
        assert!(Location::parse("s3:///nope").is_err());
    }

    #[test]
    fn test_parse_local_and_memory_locations() {
        assert_eq!(
            Location::parse("file:///data/raw").unwrap(),
            Location::Local {
                root: PathBuf::from("/data/raw")
            }
        );
        assert_eq!(
            Location::parse("./output").unwrap(),
            Location::Local {
                root: PathBuf::from("./output")
            }
        );
        assert_eq!(Location::parse("memory://").unwrap(), Location::Memory);
        assert!(Location::parse("file://relative").is_err());
        assert!(Location::parse("gs://bucket").is_err());
        assert!(Location::parse("  ").is_err());
    }

    #[test]
    fn test_join_skips_empty_segments() {
        let root = Path::from("lake");
        assert_eq!(join(&root, "songs.parquet//year=2000/").as_ref(), "lake/songs.parquet/year=2000");
        assert_eq!(join(&Path::default(), "a/b").as_ref(), "a/b");
    }

    #[tokio::test]
    async fn test_local_input_must_exist() {
        let dir = tempdir().unwrap();
        let missing = Location::Local {
            root: dir.path().join("missing"),
        };
        assert!(StoreHandle::open(&missing, &AwsConfig::default(), false).is_err());
        let created = StoreHandle::open(&missing, &AwsConfig::default(), true).unwrap();
        created.probe().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_and_delete_prefix() {
        let handle = StoreHandle::open(&Location::Memory, &AwsConfig::default(), false).unwrap();
        for name in ["t/b.json", "t/a.json", "t/x/c.json", "other/d.json"] {
            handle
                .store
                .put(&Path::from(name), Bytes::from_static(b"{}").into())
                .await
                .unwrap();
        }

        let listed = handle.list(&Path::from("t")).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|m| m.location.as_ref()).collect();
        assert_eq!(names, vec!["t/a.json", "t/b.json", "t/x/c.json"]);

        assert_eq!(handle.delete_prefix(&Path::from("t")).await.unwrap(), 3);
        assert!(handle.list(&Path::from("t")).await.unwrap().is_empty());
        assert_eq!(handle.list(&Path::from("other")).await.unwrap().len(), 1);
    }
}
