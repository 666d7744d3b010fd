mod inspect;
mod policy;
mod reclaim;

pub use inspect::{inspect, DirectorySnapshot};
pub use policy::{plan, DeletionPlan, RetentionPolicy};
pub use reclaim::reclaim;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::storage::ScratchStore;
use crate::types::CleanupResult;
use crate::util::mb_rounded;

/// 检查、评估、删除
pub async fn run_cleanup(
    store: &dyn ScratchStore,
    dir: &Path,
    policy: &RetentionPolicy,
) -> CleanupResult {
    let snapshot = inspect(store, dir).await;
    if !snapshot.exists {
        return CleanupResult::default();
    }
    let plan = plan(&snapshot.files, policy);
    reclaim(store, &plan).await
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub name: String,
    pub size_mb: f64,
    pub modified: DateTime<Utc>,
    pub age_minutes: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryReport {
    pub exists: bool,
    pub file_count: usize,
    pub total_size: u64,
    pub total_size_mb: f64,
    pub files: Vec<FileReport>,
}

impl From<&DirectorySnapshot> for DirectoryReport {
    fn from(snapshot: &DirectorySnapshot) -> Self {
        let total_size = snapshot.total_size();
        Self {
            exists: snapshot.exists,
            file_count: snapshot.file_count(),
            total_size,
            total_size_mb: mb_rounded(total_size),
            files: snapshot
                .files
                .iter()
                .map(|f| FileReport {
                    name: f.name.clone(),
                    size_mb: mb_rounded(f.size),
                    modified: f.modified,
                    age_minutes: f.age_ms / 1000 / 60,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReport {
    pub max_age_minutes: u64,
    pub max_files: u32,
    #[serde(rename = "maxSizeMB")]
    pub max_size_mb: u64,
}

impl From<&RetentionPolicy> for PolicyReport {
    fn from(policy: &RetentionPolicy) -> Self {
        Self {
            max_age_minutes: policy.max_age_minutes(),
            max_files: policy.max_file_count,
            max_size_mb: policy.max_size_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub deleted_files: Vec<String>,
    pub deleted_count: usize,
    pub remaining_files: u32,
    #[serde(rename = "freedSpaceMB")]
    pub freed_space_mb: f64,
}

impl From<CleanupResult> for CleanupReport {
    fn from(result: CleanupResult) -> Self {
        Self {
            deleted_count: result.deleted_files.len(),
            remaining_files: result.remaining_files,
            freed_space_mb: mb_rounded(result.freed_space),
            deleted_files: result.deleted_files,
        }
    }
}
