use chrono::Utc;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::archive::create_archive;
use crate::constants::{BULK_NAME_CAP, DEFAULT_BULK_PAUSE};
use crate::error::BulkError;
use crate::fetcher::{FetchRequest, Fetcher};
use crate::logger::MULTI_PROGRESS;
use crate::storage::ScratchStore;
use crate::types::{AudioFormat, BulkDownloadResult, EpisodeDescriptor};
use crate::util::sanitize_filename;

// 工作目录和压缩包名中用户名部分的长度上限
const OWNER_NAME_CAP: usize = 64;

#[derive(Debug, Clone)]
pub struct BulkSettings {
    pub pause: Duration,
    pub name_cap: usize,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            pause: *DEFAULT_BULK_PAUSE,
            name_cap: BULK_NAME_CAP,
        }
    }
}

/// 顺序下载多集并打包为 ZIP。每次调用使用独立的工作目录，结束后删除
pub struct BulkDownloader {
    store: Arc<dyn ScratchStore>,
    fetcher: Arc<Fetcher>,
    settings: BulkSettings,
}

impl BulkDownloader {
    pub fn new(store: Arc<dyn ScratchStore>, fetcher: Arc<Fetcher>, settings: BulkSettings) -> Self {
        Self {
            store,
            fetcher,
            settings,
        }
    }

    pub async fn download_all(
        &self,
        items: &[EpisodeDescriptor],
        owner: &str,
        cancel: &CancellationToken,
    ) -> Result<BulkDownloadResult, BulkError> {
        if items.is_empty() {
            return Err(BulkError::EmptyRequest);
        }

        let owner_stem = sanitize_filename(owner, OWNER_NAME_CAP);
        let stamp = Utc::now().timestamp_millis();
        let workspace = self.store.resolve(&format!("bulk_{}_{}", owner_stem, stamp));

        self.store
            .create_dir(&workspace)
            .await
            .map_err(|source| BulkError::WorkingDir {
                path: workspace.clone(),
                source,
            })?;

        info!(
            "{}",
            format!("开始批量下载 {} 集 ({})", items.len(), owner).green()
        );

        let (succeeded, failed) = self.fetch_sequentially(items, &workspace, cancel).await;

        info!(
            "批量下载结束. 成功: {}, 失败: {}",
            succeeded.len(),
            failed.len()
        );

        if succeeded.is_empty() {
            self.teardown(&workspace, &succeeded).await;
            return Err(BulkError::NothingDownloaded { failed });
        }

        let archive_name = format!("{}_all_episodes_{}.zip", owner_stem, stamp);
        let archive_path = self.store.resolve(&archive_name);
        let archived = create_archive(&succeeded, &archive_path).await;

        self.teardown(&workspace, &succeeded).await;

        let summary = match archived {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(remove_err) = self.store.remove_file(&archive_path).await {
                    debug!("删除不完整的压缩包失败: {}", remove_err);
                }
                return Err(BulkError::Archive(e));
            }
        };

        Ok(BulkDownloadResult {
            total_items: items.len(),
            succeeded_file_paths: succeeded,
            failed_item_names: failed,
            archive_path,
            archive_name,
            archive_size: summary.size,
        })
    }

    async fn fetch_sequentially(
        &self,
        items: &[EpisodeDescriptor],
        workspace: &Path,
        cancel: &CancellationToken,
    ) -> (Vec<PathBuf>, Vec<String>) {
        let total = items.len();
        let progress = MULTI_PROGRESS.add(ProgressBar::new(total as u64));
        progress.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut used_stems = HashSet::new();

        for (i, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("批量下载被取消，剩余 {} 集未处理", total - i);
                failed.extend(items[i..].iter().map(|e| e.name.clone()));
                break;
            }

            let percent = ((i + 1) * 100 + total / 2) / total;
            info!("[{}/{}] ({}%) 下载: {}", i + 1, total, percent, item.name);
            progress.set_message(item.name.clone());

            let stem = self.unique_stem(&item.name, i, &mut used_stems);
            let request = FetchRequest {
                source_url: item.source_url(),
                desired_name: &stem,
                target_dir: workspace,
                format: AudioFormat::M4a,
                name_cap: self.settings.name_cap,
                overwrite: false,
            };

            match self.fetcher.fetch_one(&request).await {
                // 同一个文件不能算作两集的结果
                Ok(file) if succeeded.contains(&file.path) => {
                    error!("下载失败 {}: 输出 {} 属于前面的单集", item.name, file.file_name);
                    failed.push(item.name.clone());
                }
                Ok(file) => succeeded.push(file.path),
                Err(e) => {
                    if e.is_transient() {
                        warn!("下载失败 {}: {}", item.name, e);
                    } else {
                        error!("下载失败 {}: {}", item.name, e);
                    }
                    failed.push(item.name.clone());
                }
            }
            progress.inc(1);

            if i + 1 < total {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.pause) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        progress.finish_and_clear();
        (succeeded, failed)
    }

    // 同名单集会在同一工作目录中互相覆盖，加序号区分
    fn unique_stem(&self, name: &str, index: usize, used: &mut HashSet<String>) -> String {
        let cap = self.settings.name_cap;
        let mut stem = sanitize_filename(name, cap);
        if used.contains(&stem) {
            let suffix = format!("_{}", index + 1);
            let keep = cap.saturating_sub(suffix.chars().count());
            stem = stem.chars().take(keep).collect::<String>() + &suffix;
        }
        used.insert(stem.clone());
        stem
    }

    // 尽力清理：逐个删除下载的文件、残留分片，最后删除工作目录
    async fn teardown(&self, workspace: &Path, downloaded: &[PathBuf]) {
        info!("清理临时文件...");

        for path in downloaded {
            match self.store.remove_file(path).await {
                Ok(()) => debug!("已删除: {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("删除临时文件失败: {} - {}", path.display(), e),
            }
        }

        match self.store.list(workspace).await {
            Ok(entries) => {
                for entry in entries {
                    let removed = if entry.is_dir {
                        self.store.remove_dir(&entry.path).await
                    } else {
                        self.store.remove_file(&entry.path).await
                    };
                    match removed {
                        Ok(()) => debug!("已删除残留: {}", entry.name),
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => warn!("删除残留失败: {} - {}", entry.name, e),
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return,
            Err(e) => warn!("读取工作目录失败: {} - {}", workspace.display(), e),
        }

        match self.store.remove_dir(workspace).await {
            Ok(()) => debug!("工作目录已删除: {}", workspace.display()),
            Err(e) => warn!("删除工作目录失败: {} - {}", workspace.display(), e),
        }
    }
}
