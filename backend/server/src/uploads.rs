//! # Proof Storage
//!
//! Payment-proof images live on disk under the upload directory and are served back
//! statically at `/uploads/<name>`.
//!
//! Names are `proof_<unix millis>_<sequence><.ext>`. The sequence is per process, so two
//! uploads landing in the same millisecond still get distinct names, and files are opened
//! with `create_new` so an existing proof is never overwritten.
use std::{
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

pub const PROOF_PREFIX: &str = "proof_";
const MAX_EXTENSION_LEN: usize = 8;

pub struct ProofStore {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl ProofStore {
    pub async fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        Ok(Self {
            dir,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn generate_name(&self, original_name: Option<&str>) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let extension = original_name
            .and_then(extension)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        format!(
            "{PROOF_PREFIX}{}_{sequence}{extension}",
            Utc::now().timestamp_millis()
        )
    }

    /// Writes the payload under a fresh name and returns that name.
    pub async fn save(&self, original_name: Option<&str>, bytes: &[u8]) -> io::Result<String> {
        let name = self.generate_name(original_name);
        let path = self.dir.join(&name);

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        if let Err(e) = write_all(&mut file, bytes).await {
            drop(file);
            self.remove(&name).await;
            return Err(e);
        }

        debug!("Stored proof {name} ({} bytes)", bytes.len());
        Ok(name)
    }

    /// Best effort, a failure is only logged.
    pub async fn remove(&self, name: &str) {
        if let Err(e) = fs::remove_file(self.dir.join(name)).await {
            warn!("Failed to remove proof {name}: {e}");
        }
    }
}

async fn write_all(file: &mut fs::File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}

fn extension(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name).extension()?.to_str()?;

    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    Some(ext.to_ascii_lowercase())
}
