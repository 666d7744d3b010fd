use bytesize::ByteSize;
use colored::Colorize;
use log::{debug, info, warn};
use std::io::ErrorKind;

use crate::cleanup::policy::DeletionPlan;
use crate::storage::ScratchStore;
use crate::types::CleanupResult;
use crate::util::base_name;

/// 执行删除计划。单个文件读取或删除失败只记录日志并跳过，不影响其余文件
pub async fn reclaim(store: &dyn ScratchStore, plan: &DeletionPlan) -> CleanupResult {
    let mut result = CleanupResult::default();

    for path in &plan.paths {
        let size = match store.stat(path).await {
            Ok(meta) => meta.size,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("文件已不存在，跳过: {}", path.display());
                continue;
            }
            Err(e) => {
                warn!("读取文件信息失败: {} - {}", path.display(), e);
                continue;
            }
        };

        match store.remove_file(path).await {
            Ok(()) => {
                let name = base_name(path).unwrap_or_default();
                info!("{}", format!("删除文件: {} ({})", name, ByteSize(size)).dimmed());
                result.deleted_files.push(name);
                result.freed_space += size;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("文件已被其他请求删除: {}", path.display());
            }
            Err(e) => {
                warn!("删除文件失败: {} - {}", path.display(), e);
            }
        }
    }

    result.remaining_files = plan.considered.saturating_sub(result.deleted_files.len()) as u32;

    if !plan.is_empty() {
        info!(
            "清理完成: 删除 {} 个文件, 剩余 {} 个, 释放 {}",
            result.deleted_files.len(),
            result.remaining_files,
            ByteSize(result.freed_space)
        );
    }

    result
}
