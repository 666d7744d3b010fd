use anyhow::{Context, Result};
use bytesize::ByteSize;
use colored::Colorize;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::bulk::BulkDownloader;
use crate::cleanup::{
    inspect, run_cleanup, CleanupReport, DirectoryReport, PolicyReport, RetentionPolicy,
};
use crate::config::Config;
use crate::constants::SINGLE_NAME_CAP;
use crate::error::{ProviderError, RetrievalError};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::file::{validate_retrieval_name, FileKind};
use crate::mixcloud::{parse_username, MixcloudClient};
use crate::storage::{get_store, ScratchStore};
use crate::tool::ToolRunner;
use crate::types::{AudioFormat, EpisodeDescriptor};
use crate::util::mb_rounded;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupInfo {
    pub download_dir: DirectoryReport,
    pub cleanup_policy: PolicyReport,
}

/// 手动清理时可覆盖的阈值，缺省或为 0 时使用默认策略
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOverrides {
    pub max_age_minutes: Option<u64>,
    pub max_files: Option<u32>,
    #[serde(rename = "maxSizeMB")]
    pub max_size_mb: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleDownload {
    pub filename: String,
    pub format: AudioFormat,
    pub size: u64,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDownload {
    pub filename: String,
    pub download_url: String,
    pub total_episodes: usize,
    pub successful_downloads: usize,
    pub failed_downloads: usize,
    pub failed_list: Vec<String>,
    pub zip_size: u64,
    #[serde(rename = "zipSizeMB")]
    pub zip_size_mb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeListing {
    pub episodes: Vec<EpisodeDescriptor>,
    pub total: usize,
    pub user: String,
}

/// 已打开、等待发送的下载文件
#[derive(Debug)]
pub struct Download {
    pub name: String,
    pub kind: FileKind,
    pub len: u64,
    pub file: tokio::fs::File,
}

pub fn download_url(filename: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(filename.as_bytes()).collect();
    format!("/api/download/{}", encoded)
}

pub struct MixService {
    store: Arc<dyn ScratchStore>,
    fetcher: Arc<Fetcher>,
    bulk: BulkDownloader,
    provider: MixcloudClient,
    policy: RetentionPolicy,
    cancel: CancellationToken,
}

impl MixService {
    pub fn new(config: &Config, runner: Arc<dyn ToolRunner>, cancel: CancellationToken) -> Result<Self> {
        let store = get_store(config);
        let fetcher = Arc::new(Fetcher::new(runner, store.clone(), config.fetch_settings()));
        let bulk = BulkDownloader::new(store.clone(), fetcher.clone(), config.bulk_settings());
        let provider = MixcloudClient::new(&config.mixcloud_api, config.mixcloud_max_pages)?;

        Ok(MixService {
            store,
            fetcher,
            bulk,
            provider,
            policy: config.retention_policy(),
            cancel,
        })
    }

    pub fn store(&self) -> Arc<dyn ScratchStore> {
        self.store.clone()
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub async fn cleanup_info(&self) -> CleanupInfo {
        let snapshot = inspect(self.store.as_ref(), self.store.root()).await;
        CleanupInfo {
            download_dir: DirectoryReport::from(&snapshot),
            cleanup_policy: PolicyReport::from(&self.policy),
        }
    }

    pub async fn cleanup(&self, overrides: CleanupOverrides) -> CleanupReport {
        let policy = self.policy.with_overrides(
            overrides.max_age_minutes,
            overrides.max_files,
            overrides.max_size_mb,
        );
        info!(
            "执行手动清理: 最长保留 {} 分钟, 最多 {} 个文件, 最大 {} MB",
            policy.max_age_minutes(),
            policy.max_file_count,
            policy.max_size_mb()
        );
        let result = run_cleanup(self.store.as_ref(), self.store.root(), &policy).await;
        CleanupReport::from(result)
    }

    pub async fn download_single(
        &self,
        source_url: &str,
        episode_name: &str,
        format: AudioFormat,
    ) -> Result<SingleDownload> {
        // 下载前先清理，清理失败不影响下载
        info!("执行下载前清理...");
        let cleaned = run_cleanup(self.store.as_ref(), self.store.root(), &self.policy).await;
        debug!("下载前清理删除了 {} 个文件", cleaned.deleted_files.len());

        self.store.check().await.context("下载目录不可用")?;

        info!("{}", format!("开始下载 {}: {}", format, episode_name).green());
        let request = FetchRequest {
            source_url,
            desired_name: episode_name,
            target_dir: self.store.root(),
            format,
            name_cap: SINGLE_NAME_CAP,
            overwrite: true,
        };
        let file = self.fetcher.fetch_one(&request).await?;

        Ok(SingleDownload {
            download_url: download_url(&file.file_name),
            filename: file.file_name,
            format: file.format,
            size: file.size,
        })
    }

    pub async fn download_all(&self, episodes: &[EpisodeDescriptor], owner: &str) -> Result<BulkDownload> {
        self.store.check().await.context("下载目录不可用")?;

        let result = self.bulk.download_all(episodes, owner, &self.cancel).await?;
        info!(
            "{}",
            format!(
                "ZIP 已创建: {} ({} 个单集, {})",
                result.archive_name,
                result.successful_downloads(),
                ByteSize(result.archive_size)
            )
            .green()
        );

        Ok(BulkDownload {
            download_url: download_url(&result.archive_name),
            total_episodes: result.total_items,
            successful_downloads: result.successful_downloads(),
            failed_downloads: result.failed_downloads(),
            zip_size: result.archive_size,
            zip_size_mb: mb_rounded(result.archive_size),
            filename: result.archive_name,
            failed_list: result.failed_item_names,
        })
    }

    pub async fn list_episodes(&self, profile_url: &str) -> Result<EpisodeListing, ProviderError> {
        let user = parse_username(profile_url)?;
        let episodes = self.provider.fetch_episodes(&user).await?;
        Ok(EpisodeListing {
            total: episodes.len(),
            episodes,
            user,
        })
    }

    pub async fn open_download(&self, filename: &str) -> Result<Download, RetrievalError> {
        let kind = validate_retrieval_name(filename)?;
        let path = self.store.resolve(filename);

        let meta = match self.store.stat(&path).await {
            Ok(meta) if !meta.is_dir => meta,
            Ok(_) => return Err(RetrievalError::NotFound(filename.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RetrievalError::NotFound(filename.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let file = match self.store.open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RetrievalError::NotFound(filename.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Download {
            name: meta.name,
            kind,
            len: meta.size,
            file,
        })
    }
}
