use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// 目录中单个文件在某一时刻的状态，每次检查都重新生成
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub age_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub deleted_files: Vec<String>,
    pub remaining_files: u32,
    pub freed_space: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
        }
    }

    /// 按优先顺序列出可接受的输出扩展名。MP3 可能先以 M4A 落地，再转码
    pub fn accepted_extensions(&self) -> &'static [&'static str] {
        match self {
            AudioFormat::Mp3 => &["mp3", "m4a"],
            AudioFormat::M4a => &["m4a"],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" => Some(AudioFormat::M4a),
            _ => None,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFormat::Mp3 => write!(f, "MP3"),
            AudioFormat::M4a => write!(f, "M4A"),
        }
    }
}

impl FromStr for AudioFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Self::from_extension(s).ok_or_else(|| anyhow::anyhow!("不支持的音频格式: {}", s))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeOwner {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodePictures {
    #[serde(default)]
    pub medium: Option<String>,
}

/// 单集描述，字段形状与 Mixcloud API 的 cloudcast 记录一致
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeDescriptor {
    #[serde(default)]
    pub key: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub user: EpisodeOwner,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub audio_length: Option<u64>,
    #[serde(default)]
    pub play_count: Option<u64>,
    #[serde(default)]
    pub favorite_count: Option<u64>,
    #[serde(default)]
    pub comment_count: Option<u64>,
    #[serde(default)]
    pub pictures: EpisodePictures,
}

impl EpisodeDescriptor {
    pub fn source_url(&self) -> &str {
        &self.url
    }
}

/// 已落地的本地音频文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub format: AudioFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDownloadResult {
    pub total_items: usize,
    pub succeeded_file_paths: Vec<PathBuf>,
    pub failed_item_names: Vec<String>,
    pub archive_path: PathBuf,
    pub archive_name: String,
    pub archive_size: u64,
}

impl BulkDownloadResult {
    pub fn successful_downloads(&self) -> usize {
        self.succeeded_file_paths.len()
    }

    pub fn failed_downloads(&self) -> usize {
        self.failed_item_names.len()
    }
}
