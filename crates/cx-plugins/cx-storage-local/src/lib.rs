//! # cx-storage-local
//! Local filesystem implementation of `MediaStore`.
//!
//! Uploads land in a temporary directory first; creating a movie promotes
//! the file into the permanent movie directory.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use cx_core::traits::MediaStore;
use tokio::fs;

pub struct LocalMediaStore {
    /// Where uploads wait until a movie claims them (e.g., "public/temp")
    temp_dir: PathBuf,
    /// Permanent home of movie files (e.g., "public/movie")
    movie_dir: PathBuf,
}

impl LocalMediaStore {
    pub fn new(temp_dir: impl Into<PathBuf>, movie_dir: impl Into<PathBuf>) -> Self {
        Self { temp_dir: temp_dir.into(), movie_dir: movie_dir.into() }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

/// A bare file name: no separators, no parent references.
fn check_file_name(file_name: &str) -> anyhow::Result<()> {
    let name = Path::new(file_name);
    if file_name.is_empty() || name.file_name().and_then(|n| n.to_str()) != Some(file_name) {
        bail!("invalid media file name `{file_name}`");
    }
    Ok(())
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    fn permanent_path(&self, file_name: &str) -> String {
        self.movie_dir.join(file_name).to_string_lossy().into_owned()
    }

    async fn promote(&self, file_name: &str) -> anyhow::Result<()> {
        check_file_name(file_name)?;
        let from = self.temp_dir.join(file_name);
        let to = self.movie_dir.join(file_name);

        fs::create_dir_all(&self.movie_dir)
            .await
            .with_context(|| format!("creating {}", self.movie_dir.display()))?;
        fs::rename(&from, &to)
            .await
            .with_context(|| format!("moving {} to {}", from.display(), to.display()))?;

        tracing::debug!(file = file_name, "media promoted");
        Ok(())
    }
}
