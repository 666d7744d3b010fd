use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use colored::Colorize;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::server::create_router;
use crate::service::MixService;
use crate::storage::{FileScratchStore, ScratchStore};
use crate::sweeper::{SweepTarget, Sweeper};
use crate::tool::ProcessRunner;

// 关闭时等待进行中请求的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub async fn bootstrap(version: &str, config: Config) -> Result<()> {
    // 打印启动信息
    info!("{}", format!("启动 rust-mixcloud-dl {}", version).green());

    let cancel = CancellationToken::new();
    let service = Arc::new(MixService::new(&config, Arc::new(ProcessRunner), cancel.clone())?);

    // 检查存储状态
    service.store().check().await.context("下载目录异常")?;

    // 设置定时清理
    let sweeper_handle = match config.sweep_interval {
        Some(interval) => {
            let logs: Arc<dyn ScratchStore> = Arc::new(FileScratchStore::new(config.log_dir.clone()));
            let sweeper = Sweeper::new(
                interval,
                vec![
                    SweepTarget {
                        label: "downloads",
                        store: service.store(),
                        policy: *service.policy(),
                    },
                    SweepTarget {
                        label: "logs",
                        store: logs,
                        policy: config.log_retention_policy(),
                    },
                ],
                cancel.clone(),
            );
            Some(sweeper.start())
        }
        None => {
            info!("定时清理已关闭");
            None
        }
    };

    let router = create_router(service.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    // 根据是否配置证书选择不同的服务器启动方式
    match config.tls_paths() {
        Some((cert, key)) => {
            info!("使用HTTPS模式启动服务器于端口 {}", config.port);
            let tls = RustlsConfig::from_pem_file(&cert, &key)
                .await
                .with_context(|| format!("加载证书失败: {} / {}", cert.display(), key.display()))?;

            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            let shutdown_cancel = cancel.clone();
            tokio::spawn(async move {
                wait_for_shutdown(shutdown_cancel).await;
                shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(router.into_make_service())
                .await
                .context("HTTPS服务器错误")?;
        }
        None => {
            info!("使用HTTP模式启动服务器于端口 {}", config.port);
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("无法监听端口 {}", config.port))?;

            axum::serve(listener, router)
                .with_graceful_shutdown(wait_for_shutdown(cancel.clone()))
                .await
                .context("HTTP服务器错误")?;
        }
    }

    if let Some(handle) = sweeper_handle {
        if let Err(e) = handle.await {
            error!("等待定时清理任务结束时发生错误: {}", e);
        }
    }

    info!("服务已成功关闭");
    Ok(())
}

// 收到 Ctrl+C 后取消共享的令牌：定时清理停止，批量下载在两集之间停止
async fn wait_for_shutdown(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => info!("收到终止信号，开始关闭服务..."),
        Err(e) => {
            // 无法监听信号时保持运行
            error!("无法监听Ctrl+C信号: {}", e);
            cancel.cancelled().await;
            return;
        }
    }
    cancel.cancel();
}
