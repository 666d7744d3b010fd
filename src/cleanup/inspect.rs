use log::error;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

use crate::storage::ScratchStore;
use crate::types::FileSnapshot;
use crate::util::{age_millis, to_utc};

#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    pub exists: bool,
    pub files: Vec<FileSnapshot>,
}

impl DirectorySnapshot {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// 读取目录中的普通文件。子目录（批量下载的工作目录）不计入。
/// 目录不存在时返回 exists=false，从不返回错误
pub async fn inspect(store: &dyn ScratchStore, dir: &Path) -> DirectorySnapshot {
    let entries = match store.list(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return DirectorySnapshot::default(),
        Err(e) => {
            error!("读取目录失败: {} - {}", dir.display(), e);
            return DirectorySnapshot {
                exists: true,
                files: Vec::new(),
            };
        }
    };

    let now = SystemTime::now();
    let files = entries
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .map(|entry| FileSnapshot {
            age_ms: age_millis(now, entry.modified),
            modified: to_utc(entry.modified),
            name: entry.name,
            path: entry.path,
            size: entry.size,
        })
        .collect();

    DirectorySnapshot {
        exists: true,
        files,
    }
}
