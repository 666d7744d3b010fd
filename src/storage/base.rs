use anyhow::Result;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::Config;
use crate::storage::file::FileScratchStore;
use log::info;

/// 目录项及其元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub is_dir: bool,
}

/// 下载临时目录的抽象。文件系统本身就是状态，所有实现都必须容忍
/// 检查与操作之间文件被其他请求或人工删除
#[async_trait]
pub trait ScratchStore: Send + Sync {
    fn root(&self) -> &Path;

    fn resolve(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    /// 创建根目录并确认可写
    async fn check(&self) -> Result<()>;

    /// 列出目录内容。单个条目读取元数据失败时跳过该条目，目录不存在时返回 NotFound
    async fn list(&self, dir: &Path) -> io::Result<Vec<EntryMeta>>;

    async fn stat(&self, path: &Path) -> io::Result<EntryMeta>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    async fn create_dir(&self, path: &Path) -> io::Result<()>;

    async fn remove_dir(&self, path: &Path) -> io::Result<()>;

    async fn open(&self, path: &Path) -> io::Result<tokio::fs::File>;
}

pub fn get_store(config: &Config) -> Arc<dyn ScratchStore> {
    let store = FileScratchStore::new(config.download_dir.clone());
    info!("使用下载目录: {}", config.download_dir.display());
    Arc::new(store)
}
