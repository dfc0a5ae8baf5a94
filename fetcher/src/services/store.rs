use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use squares_shared::{SessionCache, TileKey};

use crate::config::MANIFEST_FILE;
use crate::state::FetchCountersSnapshot;

const DEFAULT_EXTENSION: &str = "png";

/// Writes fetched tiles under `{root}/{zoom}/{column}/{row}.{ext}`.
#[derive(Debug, Clone)]
pub struct TileStore {
    root: PathBuf,
}

#[derive(Serialize)]
struct Manifest<'a> {
    counters: FetchCountersSnapshot,
    session: &'a SessionCache,
}

impl TileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, key: TileKey, url: &str) -> PathBuf {
        self.root
            .join(key.zoom.to_string())
            .join(key.column.to_string())
            .join(format!("{}.{}", key.row, extension_from_url(url)))
    }

    pub async fn write(&self, key: TileKey, url: &str, body: &[u8]) -> io::Result<PathBuf> {
        let path = self.tile_path(key, url);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }

    /// Record which URLs this session loaded, and when.
    pub async fn write_manifest(
        &self,
        counters: FetchCountersSnapshot,
        session: &SessionCache,
    ) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>> {
        let json = serde_json::to_vec_pretty(&Manifest { counters, session })?;
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(MANIFEST_FILE);
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

fn extension_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext
        }
        _ => DEFAULT_EXTENSION,
    }
}
