use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 单集下载失败的分类
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("远程资源不存在: {url}")]
    NotFound { url: String },

    #[error("{program} 未安装或不在 PATH 中")]
    ToolNotInstalled { program: String },

    #[error("{program} 退出码异常 ({exit_code:?}): {stderr}")]
    ToolFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{program} 超时 ({after:?})")]
    Timeout { program: String, after: Duration },

    #[error("工具报告成功但未找到输出文件: {stem} (目录: {}, 现有文件: {})", dir.display(), listing.join(", "))]
    OutputMissing {
        stem: String,
        dir: PathBuf,
        listing: Vec<String>,
    },

    #[error("找到的输出文件不是本次下载生成的: {}", file.display())]
    StaleOutput { file: PathBuf },

    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// 工具自身已按 --retries 重试过，这类错误只记为单集失败
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::ToolFailed { .. } | FetchError::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum BulkError {
    #[error("单集列表为空")]
    EmptyRequest,

    #[error("没有任何单集下载成功 (失败 {} 个)", failed.len())]
    NothingDownloaded { failed: Vec<String> },

    #[error("无法创建工作目录 {}: {source}", path.display())]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("创建压缩包失败: {0}")]
    Archive(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("无效的 Mixcloud 地址: {0}，格式应为 https://www.mixcloud.com/username/")]
    InvalidUrl(String),

    #[error("Mixcloud 用户不存在: {0}")]
    UserNotFound(String),

    #[error("Mixcloud API 返回错误状态: {0}")]
    Status(u16),

    #[error("Mixcloud API 请求失败: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("不允许的文件: {0}")]
    Forbidden(String),

    #[error("文件不存在: {0}")]
    NotFound(String),

    #[error("读取文件失败: {0}")]
    Io(#[from] std::io::Error),
}
