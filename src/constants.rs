use lazy_static::lazy_static;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
pub const DEFAULT_LOG_DIR: &str = "logs";

pub const DEFAULT_EXTRACTOR: &str = "yt-dlp";
pub const DEFAULT_TRANSCODER: &str = "ffmpeg";
pub const DEFAULT_TOOL_RETRIES: u32 = 3;

pub const DEFAULT_MAX_AGE_MINUTES: u64 = 30;
pub const DEFAULT_MAX_FILES: u32 = 50;
pub const DEFAULT_MAX_SIZE_MB: u64 = 500;

// 文件名长度上限（字符数）
pub const SINGLE_NAME_CAP: usize = 100;
pub const BULK_NAME_CAP: usize = 200;

pub const DEFAULT_MIXCLOUD_API: &str = "https://api.mixcloud.com";
pub const DEFAULT_MIXCLOUD_MAX_PAGES: u32 = 20;

pub const BYTES_PER_MB: u64 = 1024 * 1024;

// 下载中间产物的标记
pub const PARTIAL_MARKERS: &[&str] = &[".part", "Frag", ".ytdl", ".temp", ".tmp"];

// 允许通过下载接口取回的扩展名
pub const RETRIEVABLE_EXTENSIONS: &[&str] = &["mp3", "m4a", "zip"];

lazy_static! {
    pub static ref DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);
    pub static ref DEFAULT_BULK_PAUSE: Duration = Duration::from_millis(1000);
    pub static ref DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);
    pub static ref FRESHNESS_SLACK: Duration = Duration::from_secs(2);
    pub static ref PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);
    // 日志目录的保留策略
    pub static ref LOG_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);
}

pub const LOG_MAX_FILES: u32 = 24;
pub const LOG_MAX_SIZE: u64 = 64 * BYTES_PER_MB;
