use bytesize::ByteSize;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cleanup::{run_cleanup, RetentionPolicy};
use crate::storage::ScratchStore;
use crate::types::CleanupResult;

/// 需要定时清理的目录及其策略
#[derive(Clone)]
pub struct SweepTarget {
    pub label: &'static str,
    pub store: Arc<dyn ScratchStore>,
    pub policy: RetentionPolicy,
}

pub struct Sweeper {
    interval: Duration,
    targets: Vec<SweepTarget>,
    cancel: CancellationToken,
}

impl Sweeper {
    pub fn new(interval: Duration, targets: Vec<SweepTarget>, cancel: CancellationToken) -> Self {
        Sweeper {
            interval,
            targets,
            cancel,
        }
    }

    pub async fn sweep_once(&self) -> Vec<CleanupResult> {
        let mut results = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let result = run_cleanup(target.store.as_ref(), target.store.root(), &target.policy).await;
            if result.deleted_files.is_empty() {
                debug!("[{}] 无需清理，剩余 {} 个文件", target.label, result.remaining_files);
            } else {
                info!(
                    "[{}] 定时清理删除 {} 个文件，释放 {}",
                    target.label,
                    result.deleted_files.len(),
                    ByteSize(result.freed_space)
                );
            }
            results.push(result);
        }
        results
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = time::interval(self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回，跳过
            timer.tick().await;

            info!("定时清理已启动，间隔 {:?}", self.interval);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = timer.tick() => {}
                }
                self.sweep_once().await;
            }
            info!("定时清理任务结束");
        })
    }
}
