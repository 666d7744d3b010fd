use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use log::{debug, warn};
use crate::storage::base::{EntryMeta, ScratchStore};

pub struct FileScratchStore {
    root: PathBuf,
}

impl FileScratchStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn meta_for(path: &Path, metadata: &std::fs::Metadata) -> io::Result<EntryMeta> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(EntryMeta {
            name,
            path: path.to_path_buf(),
            size: metadata.len(),
            modified: metadata.modified()?,
            is_dir: metadata.is_dir(),
        })
    }
}

#[async_trait]
impl ScratchStore for FileScratchStore {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn check(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;

        if !fs::metadata(&self.root).await?.is_dir() {
            return Err(anyhow!("下载目录不是一个目录: {}", self.root.display()));
        }

        // 检查是否有写入权限
        let test_file = self.root.join(".writetest");
        fs::write(&test_file, b"test").await?;
        fs::remove_file(test_file).await?;

        Ok(())
    }

    async fn list(&self, dir: &Path) -> io::Result<Vec<EntryMeta>> {
        let mut entries = fs::read_dir(dir).await?;
        let mut result = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // 条目可能在列出后被删除
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("跳过无法读取元数据的条目: {} - {}", path.display(), e);
                    continue;
                }
            };

            match Self::meta_for(&path, &metadata) {
                Ok(meta) => result.push(meta),
                Err(e) => warn!("无法读取修改时间: {} - {}", path.display(), e),
            }
        }

        Ok(result)
    }

    async fn stat(&self, path: &Path) -> io::Result<EntryMeta> {
        let metadata = fs::metadata(path).await?;
        Self::meta_for(path, &metadata)
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path).await
    }

    async fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path).await
    }

    async fn open(&self, path: &Path) -> io::Result<fs::File> {
        fs::File::open(path).await
    }
}
