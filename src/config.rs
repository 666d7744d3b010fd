use anyhow::{anyhow, Result};
use log::info;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::bulk::BulkSettings;
use crate::cleanup::RetentionPolicy;
use crate::constants::*;
use crate::fetcher::FetchSettings;

#[derive(Debug, Clone)]
pub struct Config {
    // 基本配置
    pub download_dir: PathBuf,
    pub log_dir: PathBuf,
    pub port: u16,

    // SSL配置
    pub ssl_key: Option<String>,
    pub ssl_cert: Option<String>,

    // 外部工具
    pub extractor: String,
    pub transcoder: String,
    pub tool_timeout: Duration,
    pub tool_retries: u32,
    pub bulk_pause: Duration,

    // 清理策略
    pub max_age_minutes: u64,
    pub max_files: u32,
    pub max_size_mb: u64,
    pub sweep_interval: Option<Duration>,

    // Mixcloud API
    pub mixcloud_api: String,
    pub mixcloud_max_pages: u32,

    // 高级选项
    pub debug_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            port: DEFAULT_PORT,
            ssl_key: None,
            ssl_cert: None,
            extractor: DEFAULT_EXTRACTOR.to_string(),
            transcoder: DEFAULT_TRANSCODER.to_string(),
            tool_timeout: *DEFAULT_TOOL_TIMEOUT,
            tool_retries: DEFAULT_TOOL_RETRIES,
            bulk_pause: *DEFAULT_BULK_PAUSE,
            max_age_minutes: DEFAULT_MAX_AGE_MINUTES,
            max_files: DEFAULT_MAX_FILES,
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            sweep_interval: Some(*DEFAULT_SWEEP_INTERVAL),
            mixcloud_api: DEFAULT_MIXCLOUD_API.to_string(),
            mixcloud_max_pages: DEFAULT_MIXCLOUD_MAX_PAGES,
            debug_log: false,
        }
    }
}

impl Config {
    // 创建默认的.env文件模板（如果不存在）
    fn create_default_env_file() -> Result<()> {
        let env_path = ".env";
        if !Path::new(env_path).exists() {
            let env_content =
                "# 以下配置项均为可选，注释中为默认值\n\
                 # 服务监听端口\n\
                 # PORT=4000\n\
                 # 临时下载目录\n\
                 # DOWNLOAD_DIR=downloads\n\
                 # 日志目录\n\
                 # LOG_DIR=logs\n\
                 # 同时设置以下两项时启用HTTPS\n\
                 # SSL_CERT=\n\
                 # SSL_KEY=\n\
                 \n\
                 # yt-dlp 和 ffmpeg 的路径\n\
                 # YT_DLP_PATH=yt-dlp\n\
                 # FFMPEG_PATH=ffmpeg\n\
                 # 单次下载超时（秒）和重试次数\n\
                 # DOWNLOAD_TIMEOUT_SECS=300\n\
                 # DOWNLOAD_RETRIES=3\n\
                 # 批量下载时每集之间的间隔（毫秒）\n\
                 # BULK_PAUSE_MS=1000\n\
                 \n\
                 # 清理策略\n\
                 # CLEANUP_MAX_AGE_MINUTES=30\n\
                 # CLEANUP_MAX_FILES=50\n\
                 # CLEANUP_MAX_SIZE_MB=500\n\
                 # 定时清理间隔（秒），0 表示关闭\n\
                 # CLEANUP_INTERVAL_SECS=600\n\
                 \n\
                 # MIXCLOUD_API_BASE=https://api.mixcloud.com\n\
                 # MIXCLOUD_MAX_PAGES=20\n\
                 # DEBUG_LOG=false\n";

            fs::write(env_path, env_content)?;
            info!("已创建.env文件模板");
        }
        Ok(())
    }

    pub fn new() -> Result<Self> {
        Self::create_default_env_file()?;
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置，未设置的项使用默认值
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Config::default();

        let sweep_secs: u64 = parse_var(&get, "CLEANUP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL.as_secs())?;

        Ok(Config {
            download_dir: get("DOWNLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.download_dir),
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            port: parse_var(&get, "PORT", DEFAULT_PORT)?,
            ssl_key: get("SSL_KEY"),
            ssl_cert: get("SSL_CERT"),
            extractor: get("YT_DLP_PATH").unwrap_or(defaults.extractor),
            transcoder: get("FFMPEG_PATH").unwrap_or(defaults.transcoder),
            tool_timeout: Duration::from_secs(parse_var(
                &get,
                "DOWNLOAD_TIMEOUT_SECS",
                DEFAULT_TOOL_TIMEOUT.as_secs(),
            )?),
            tool_retries: parse_var(&get, "DOWNLOAD_RETRIES", DEFAULT_TOOL_RETRIES)?,
            bulk_pause: Duration::from_millis(parse_var(
                &get,
                "BULK_PAUSE_MS",
                DEFAULT_BULK_PAUSE.as_millis() as u64,
            )?),
            max_age_minutes: parse_var(&get, "CLEANUP_MAX_AGE_MINUTES", DEFAULT_MAX_AGE_MINUTES)?,
            max_files: parse_var(&get, "CLEANUP_MAX_FILES", DEFAULT_MAX_FILES)?,
            max_size_mb: parse_var(&get, "CLEANUP_MAX_SIZE_MB", DEFAULT_MAX_SIZE_MB)?,
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            mixcloud_api: get("MIXCLOUD_API_BASE").unwrap_or(defaults.mixcloud_api),
            mixcloud_max_pages: parse_var(&get, "MIXCLOUD_MAX_PAGES", DEFAULT_MIXCLOUD_MAX_PAGES)?,
            debug_log: get("DEBUG_LOG").map(|v| v == "true" || v == "1").unwrap_or(false),
        })
    }

    /// 证书和私钥都配置时才启用HTTPS
    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.ssl_cert, &self.ssl_key) {
            (Some(cert), Some(key)) => Some((PathBuf::from(cert), PathBuf::from(key))),
            _ => None,
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::from_user_units(self.max_age_minutes, self.max_files, self.max_size_mb)
    }

    pub fn log_retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age: *LOG_MAX_AGE,
            max_file_count: LOG_MAX_FILES,
            max_total_size: LOG_MAX_SIZE,
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            extractor: self.extractor.clone(),
            transcoder: self.transcoder.clone(),
            timeout: self.tool_timeout,
            retries: self.tool_retries,
        }
    }

    pub fn bulk_settings(&self) -> BulkSettings {
        BulkSettings {
            pause: self.bulk_pause,
            name_cap: BULK_NAME_CAP,
        }
    }
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("环境变量 {} 的值无效 ({}): {}", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.extractor, "yt-dlp");
        assert_eq!(config.retention_policy(), RetentionPolicy::default());
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(600)));
        assert!(config.tls_paths().is_none());
        assert!(!config.debug_log);
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("DOWNLOAD_DIR", "/srv/scratch"),
            ("YT_DLP_PATH", "/opt/yt-dlp"),
            ("DOWNLOAD_TIMEOUT_SECS", "60"),
            ("BULK_PAUSE_MS", "0"),
            ("CLEANUP_MAX_FILES", "5"),
            ("CLEANUP_INTERVAL_SECS", "0"),
            ("SSL_CERT", "cert.pem"),
            ("SSL_KEY", "key.pem"),
            ("DEBUG_LOG", "1"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.download_dir, PathBuf::from("/srv/scratch"));
        assert_eq!(config.fetch_settings().extractor, "/opt/yt-dlp");
        assert_eq!(config.fetch_settings().timeout, Duration::from_secs(60));
        assert_eq!(config.bulk_settings().pause, Duration::ZERO);
        assert_eq!(config.retention_policy().max_file_count, 5);
        assert_eq!(config.sweep_interval, None);
        assert_eq!(
            config.tls_paths(),
            Some((PathBuf::from("cert.pem"), PathBuf::from("key.pem")))
        );
        assert!(config.debug_log);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("PORT", "  "), ("DOWNLOAD_DIR", "")]).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.download_dir, PathBuf::from("downloads"));
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn tls_requires_both_files() {
        let config = config_from(&[("SSL_CERT", "cert.pem")]).unwrap();
        assert!(config.tls_paths().is_none());
    }
}
