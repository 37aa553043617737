//! Client-side upload validation and presigned uploads to object storage.
//!
//! Every check runs before the first request is sent; a rejected file never
//! reaches the network.

use futures_util::future::try_join_all;
use log::{debug, info};
use reqwest::Client;
use shared::{
    base_name, Backup, ConfigFile, Mod, BACKUP_AUTO_MARKER, MAX_UPLOAD_BYTES, SEED_EXTENSION,
    UPLOAD_TIMEOUT_SECS, WORLD_EXTENSION,
};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::api::{KubeApi, PresignFile};
use crate::error::ApiError;
use crate::listing::{mod_id, ByteSize};
use crate::session::Session;

pub const CONFIG_EXTENSIONS: [&str; 3] = [".cfg", ".yaml", ".json"];
pub const MOD_ROOT: &str = "mods";
pub const CONFIG_ROOT: &str = "config";
pub const WORLD_ROOT: &str = "valheim-backups-auto";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Mod file must be a .zip file")]
    NotAZip,
    #[error("Config file must be a .cfg, .yaml, or .json file")]
    NotAConfig,
    #[error("Seed file must be a .fwl file")]
    NotASeed,
    #[error("World file must be a .db file")]
    NotAWorld,
    #[error("File size ({size}) exceeds the maximum limit of {limit}")]
    TooLarge { size: ByteSize, limit: ByteSize },
    #[error("You cannot use a backup as a new world.")]
    BackupNotAllowed,
    #[error("File names must match (excluding extensions)")]
    NameMismatch,
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to upload files: {0}")]
    Api(#[from] ApiError),
}

/// A file picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
}

impl LocalFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|source| UploadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            size: metadata.len(),
            path: path.to_path_buf(),
        })
    }
}

fn check_size(file: &LocalFile) -> Result<(), UploadError> {
    if file.size > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge {
            size: ByteSize(file.size),
            limit: ByteSize(MAX_UPLOAD_BYTES),
        });
    }
    Ok(())
}

pub fn validate_mod(file: &LocalFile) -> Result<(), UploadError> {
    if !file.name.ends_with(".zip") {
        return Err(UploadError::NotAZip);
    }
    check_size(file)
}

pub fn validate_config(file: &LocalFile) -> Result<(), UploadError> {
    if !CONFIG_EXTENSIONS.iter().any(|ext| file.name.ends_with(ext)) {
        return Err(UploadError::NotAConfig);
    }
    check_size(file)
}

/// A world upload is a `.fwl` seed and a `.db` world sharing a base name.
/// Automatic backups are refused: their names would not match the target world.
pub fn validate_world_pair(seed: &LocalFile, world: &LocalFile) -> Result<(), UploadError> {
    if !seed.name.ends_with(SEED_EXTENSION) {
        return Err(UploadError::NotASeed);
    }
    if !world.name.ends_with(WORLD_EXTENSION) {
        return Err(UploadError::NotAWorld);
    }
    if seed.name.contains(BACKUP_AUTO_MARKER) || world.name.contains(BACKUP_AUTO_MARKER) {
        return Err(UploadError::BackupNotAllowed);
    }
    check_size(seed)?;
    check_size(world)?;
    if base_name(&seed.name) != base_name(&world.name) {
        return Err(UploadError::NameMismatch);
    }
    Ok(())
}

pub struct Uploader {
    kube: KubeApi,
    http: Client,
    timeout: Duration,
}

impl Uploader {
    pub fn new(kube: KubeApi, http: Client) -> Self {
        Self {
            kube,
            http,
            timeout: Duration::from_secs(UPLOAD_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn upload_mod(
        &self,
        session: &Session,
        file: &LocalFile,
    ) -> Result<Mod, UploadError> {
        validate_mod(file)?;
        let key = format!("{}{}", session.object_prefix(MOD_ROOT), file.name);
        self.put_all(session, &[(file, key.clone())]).await?;

        Ok(Mod {
            id: mod_id(&file.name, file.size),
            key,
            name: file.name.trim_end_matches(".zip").to_string(),
            size: file.size,
            is_default: false,
            installed: false,
            installing: false,
        })
    }

    pub async fn upload_config(
        &self,
        session: &Session,
        file: &LocalFile,
    ) -> Result<ConfigFile, UploadError> {
        validate_config(file)?;
        let key = format!("{}{}", session.object_prefix(CONFIG_ROOT), file.name);
        self.put_all(session, &[(file, key.clone())]).await?;

        Ok(ConfigFile {
            key,
            name: file.name.clone(),
            size: file.size,
            installed: false,
            installing: false,
            content: None,
        })
    }

    /// Uploads both halves of a world save; the returned backup is the `.db` half.
    pub async fn upload_world(
        &self,
        session: &Session,
        seed: &LocalFile,
        world: &LocalFile,
    ) -> Result<Backup, UploadError> {
        validate_world_pair(seed, world)?;
        let prefix = session.object_prefix(WORLD_ROOT);
        let seed_key = format!("{}{}", prefix, seed.name);
        let world_key = format!("{}{}", prefix, world.name);
        self.put_all(session, &[(seed, seed_key), (world, world_key.clone())])
            .await?;

        Ok(Backup::new(world_key, world.size))
    }

    async fn put_all(
        &self,
        session: &Session,
        files: &[(&LocalFile, String)],
    ) -> Result<(), UploadError> {
        let request: Vec<PresignFile> = files
            .iter()
            .map(|(file, key)| PresignFile {
                name: file.name.clone(),
                size: file.size,
                prefix: key.clone(),
            })
            .collect();
        let presigned = self.kube.generate_presigned_urls(session, &request).await?;

        let uploads = files.iter().map(|(file, _)| {
            let url = presigned.urls.get(&file.name).cloned();
            async move {
                match url {
                    Some(url) => self.put(file, &url).await,
                    None => Err(ApiError::MissingUploadUrl(file.name.clone()).into()),
                }
            }
        });
        try_join_all(uploads).await?;
        Ok(())
    }

    /// Single PUT bounded by the upload timeout; never retried.
    async fn put(&self, file: &LocalFile, url: &str) -> Result<(), UploadError> {
        let body = tokio::fs::read(&file.path)
            .await
            .map_err(|source| UploadError::Read {
                path: file.path.clone(),
                source,
            })?;

        debug!("Uploading {} ({} bytes)", file.name, body.len());
        let response = self
            .http
            .put(url)
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &text).into());
        }

        info!("Uploaded {}", file.name);
        Ok(())
    }
}
