use crate::crawler::Fetcher;
use crate::download::{ArtifactTarget, DownloadError, Stored};
use crate::fetch::FetchError;
use crate::ledger::DedupLedger;
use crate::record::DownloadedArtifact;
use crate::storage::{lock, FailureEntry, SharedStorage, Storage};
use crate::url::{extension, extension_for_media_type, file_name_for, sanitize_filename, year_bucket};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Length of the checksum prefix appended to colliding file names
const COLLISION_SUFFIX_LEN: usize = 8;

pub struct DownloadManager {
    fetcher: Arc<Fetcher>,
    ledger: Arc<DedupLedger>,
    storage: SharedStorage,
    root: PathBuf,
    /// Serializes checksum lookup, file write and artifact registration
    store_lock: tokio::sync::Mutex<()>,
}

impl DownloadManager {
    pub fn new(
        fetcher: Arc<Fetcher>,
        ledger: Arc<DedupLedger>,
        storage: SharedStorage,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            ledger,
            storage,
            root: root.into(),
            store_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetches `url` and stores its content unless the same bytes are already stored
    ///
    /// Fetch failures other than cancellation are written to the failure log before
    /// they are returned.
    pub async fn fetch_and_store(
        &self,
        url: &Url,
        target: &ArtifactTarget,
    ) -> Result<Stored, DownloadError> {
        let response = match self.fetcher.get(url).await {
            Ok(response) => response,
            Err(e) => {
                self.record_failure(url, &e)?;
                return Err(e.into());
            }
        };

        let ext = artifact_extension(url, response.media_type().as_deref());
        self.store_bytes(url, &response.bytes, &ext, target).await
    }

    /// Stores already fetched content
    pub async fn store_bytes(
        &self,
        url: &Url,
        bytes: &[u8],
        ext: &str,
        target: &ArtifactTarget,
    ) -> Result<Stored, DownloadError> {
        let checksum = hex::encode(Sha256::digest(bytes));
        let _guard = self.store_lock.lock().await;

        if let Some(existing) = self.ledger.artifact_for_checksum(&checksum)? {
            tracing::debug!(
                "{} has the same content as {}, not storing again",
                url,
                existing.source_url
            );
            return Ok(Stored::Duplicate(existing));
        }

        let year = year_bucket(target.date_hint.as_deref());
        let bucket = if target.bucket_by_section {
            target.section.clone()
        } else {
            year.clone()
        };

        let dir = format!("{}/{}/{}", sanitize_filename(&target.source), ext, bucket);
        let name = file_name_for(url, ext);
        let mut local_path = format!("{}/{}", dir, name);
        let candidate = self.root.join(&local_path);
        let taken = tokio::fs::try_exists(&candidate)
            .await
            .map_err(|source| DownloadError::Io {
                path: candidate.clone(),
                source,
            })?;
        if taken {
            local_path = format!("{}/{}", dir, with_suffix(&name, &checksum[..COLLISION_SUFFIX_LEN]));
        }

        self.write_file(&self.root.join(&local_path), bytes).await?;

        let artifact = DownloadedArtifact {
            local_path,
            section: target.section.clone(),
            year_bucket: year,
            checksum,
            source_url: url.to_string(),
        };
        let recorded = self.ledger.record_artifact(&artifact)?;
        tracing::info!("Stored {} ({} bytes) as {}", url, bytes.len(), recorded.local_path);

        Ok(Stored::New(recorded))
    }

    /// Writes through a temporary file and syncs it before the rename
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
        let io_err = |source: std::io::Error| DownloadError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut partial = path.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        let mut file = tokio::fs::File::create(&partial).await.map_err(io_err)?;
        file.write_all(bytes).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        tokio::fs::rename(&partial, path).await.map_err(io_err)
    }

    fn record_failure(&self, url: &Url, error: &FetchError) -> Result<(), DownloadError> {
        if matches!(error, FetchError::Cancelled) {
            return Ok(());
        }
        tracing::warn!("Download failed for {}: {}", url, error);
        lock(&self.storage)?.record_failure(
            &FailureEntry {
                url: url.to_string(),
                stage: "download".to_string(),
                message: error.to_string(),
                attempts: error.attempts(),
            },
            self.ledger.run_id(),
        )?;
        Ok(())
    }
}

/// Extension for the stored file: from the URL, else from the media type
fn artifact_extension(url: &Url, media_type: Option<&str>) -> String {
    extension(url)
        .or_else(|| media_type.and_then(extension_for_media_type).map(str::to_string))
        .unwrap_or_else(|| "bin".to_string())
}

/// `report.pdf` + `ab12cd34` → `report-ab12cd34.pdf`
fn with_suffix(name: &str, suffix: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, suffix, ext),
        _ => format!("{}-{}", name, suffix),
    }
}
