use crate::error::CacdError;
use crate::types::{BlobHash, ProjectId};
use anyhow::{Context, Result};
use bytes::Bytes;
use object_store::{Attribute, Attributes, ObjectStore, PutMode, PutOptions};
use std::path::PathBuf;

pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Snapshot archives, filed per project under their content hash
#[async_trait::async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Store a project's zip archive; an identical archive is stored once
    async fn put(&self, project: ProjectId, archive: Bytes) -> Result<BlobHash>;

    /// Fetch an archive of `project`; `None` when that project never stored it
    async fn get(&self, project: ProjectId, hash: &BlobHash) -> Result<Option<Bytes>>;
}

fn ensure_zip(archive: &[u8]) -> Result<()> {
    if archive.starts_with(b"PK") {
        Ok(())
    } else {
        Err(CacdError::invalid("snapshot archive is not a zip file").into())
    }
}

/// Archives on the local filesystem at `<base>/<project>/<hash>.zip`
#[derive(Clone)]
pub struct FilesystemArchiveStore {
    base_path: PathBuf,
}

impl FilesystemArchiveStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)
            .context("Failed to create archive store directory")?;
        Ok(Self { base_path })
    }

    fn archive_path(&self, project: ProjectId, hash: &BlobHash) -> PathBuf {
        self.base_path
            .join(project.to_string())
            .join(format!("{}.zip", hash))
    }
}

#[async_trait::async_trait]
impl ArchiveStore for FilesystemArchiveStore {
    async fn put(&self, project: ProjectId, archive: Bytes) -> Result<BlobHash> {
        ensure_zip(&archive)?;
        let hash = BlobHash::from_bytes(&archive);
        let path = self.archive_path(project, &hash);

        if tokio::fs::try_exists(&path)
            .await
            .context("Failed to check archive file")?
        {
            return Ok(hash);
        }

        let dir = self.base_path.join(project.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .context("Failed to create project archive directory")?;

        // Readers never see a partly written zip
        let partial = path.with_extension("zip.partial");
        tokio::fs::write(&partial, &archive)
            .await
            .context("Failed to write archive")?;
        tokio::fs::rename(&partial, &path)
            .await
            .context("Failed to move archive into place")?;

        tracing::debug!(project_id = %project, hash = %hash, size = archive.len(), "Stored archive");
        Ok(hash)
    }

    async fn get(&self, project: ProjectId, hash: &BlobHash) -> Result<Option<Bytes>> {
        match tokio::fs::read(self.archive_path(project, hash)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read archive"),
        }
    }
}

/// Archives in an S3-compatible bucket at `<prefix>/projects/<project>/<hash>.zip`
pub struct ObjectStoreArchiveStore {
    store: Box<dyn ObjectStore>,
    prefix: String,
}

impl ObjectStoreArchiveStore {
    pub fn new(store: Box<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Build a store for an S3 bucket; credentials come from the environment
    pub fn s3(
        bucket: &str,
        region: Option<&str>,
        endpoint: Option<&str>,
        prefix: impl Into<String>,
    ) -> Result<Self> {
        let mut builder = object_store::aws::AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        let store = builder.build().context("Failed to configure S3 archive store")?;
        Ok(Self::new(Box::new(store), prefix))
    }

    fn archive_key(&self, project: ProjectId, hash: &BlobHash) -> object_store::path::Path {
        object_store::path::Path::from(format!(
            "{}/projects/{}/{}.zip",
            self.prefix, project, hash
        ))
    }
}

#[async_trait::async_trait]
impl ArchiveStore for ObjectStoreArchiveStore {
    async fn put(&self, project: ProjectId, archive: Bytes) -> Result<BlobHash> {
        ensure_zip(&archive)?;
        let hash = BlobHash::from_bytes(&archive);
        let key = self.archive_key(project, &hash);

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, ARCHIVE_CONTENT_TYPE.into());
        let options = PutOptions {
            mode: PutMode::Create,
            attributes,
            ..Default::default()
        };

        match self.store.put_opts(&key, archive.into(), options).await {
            Ok(_) | Err(object_store::Error::AlreadyExists { .. }) => Ok(hash),
            Err(e) => Err(e).context("Failed to put archive to object store"),
        }
    }

    async fn get(&self, project: ProjectId, hash: &BlobHash) -> Result<Option<Bytes>> {
        match self.store.get(&self.archive_key(project, hash)).await {
            Ok(result) => Ok(Some(
                result
                    .bytes()
                    .await
                    .context("Failed to read archive bytes")?,
            )),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e).context("Failed to get archive from object store"),
        }
    }
}
