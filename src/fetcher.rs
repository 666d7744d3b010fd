use bytesize::ByteSize;
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::constants::{
    DEFAULT_EXTRACTOR, DEFAULT_TOOL_RETRIES, DEFAULT_TOOL_TIMEOUT, DEFAULT_TRANSCODER,
    FRESHNESS_SLACK,
};
use crate::error::FetchError;
use crate::storage::{EntryMeta, ScratchStore};
use crate::tool::{ToolError, ToolInvocation, ToolOutput, ToolRunner};
use crate::types::{AudioFormat, LocalFile};
use crate::util::{is_partial_artifact, sanitize_filename, stem_suffix};

// 错误信息中保留的 stderr 长度
const STDERR_TAIL: usize = 2000;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub extractor: String,
    pub transcoder: String,
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            extractor: DEFAULT_EXTRACTOR.to_string(),
            transcoder: DEFAULT_TRANSCODER.to_string(),
            timeout: *DEFAULT_TOOL_TIMEOUT,
            retries: DEFAULT_TOOL_RETRIES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub source_url: &'a str,
    pub desired_name: &'a str,
    pub target_dir: &'a Path,
    pub format: AudioFormat,
    pub name_cap: usize,
    /// false 时传 --no-overwrites --no-continue（批量下载的独立目录）
    pub overwrite: bool,
}

/// 调用 yt-dlp 下载单集音频，并在目录中定位输出文件
pub struct Fetcher {
    runner: Arc<dyn ToolRunner>,
    store: Arc<dyn ScratchStore>,
    settings: FetchSettings,
}

impl Fetcher {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        store: Arc<dyn ScratchStore>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            runner,
            store,
            settings,
        }
    }

    fn extraction_args(&self, request: &FetchRequest<'_>, stem: &str) -> Vec<String> {
        let template = request.target_dir.join(format!("{}.%(ext)s", stem));
        let retries = self.settings.retries.to_string();

        let mut args: Vec<String> = vec![
            "--extract-audio",
            "--audio-format",
            request.format.extension(),
            "--audio-quality",
            "0",
            "--output",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        args.push(template.to_string_lossy().to_string());
        args.extend(
            [
                "--no-playlist",
                "--no-part",
                "--no-cache-dir",
                "--no-mtime",
                "--retries",
                retries.as_str(),
                "--fragment-retries",
                retries.as_str(),
                "--no-keep-fragments",
                "--embed-metadata",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        if request.overwrite {
            args.push("--force-overwrites".to_string());
        } else {
            args.push("--no-continue".to_string());
            args.push("--no-overwrites".to_string());
        }
        args.push(request.source_url.to_string());
        args
    }

    pub async fn fetch_one(&self, request: &FetchRequest<'_>) -> Result<LocalFile, FetchError> {
        let stem = sanitize_filename(request.desired_name, request.name_cap);
        let invocation = ToolInvocation {
            program: self.settings.extractor.clone(),
            args: self.extraction_args(request, &stem),
            timeout: self.settings.timeout,
        };

        let started = SystemTime::now();
        let output = match self.runner.invoke(&invocation).await {
            Ok(output) => output,
            Err(ToolError::NotInstalled(program)) => {
                return Err(FetchError::ToolNotInstalled { program })
            }
            Err(ToolError::Timeout { program, after }) => {
                self.discard_partials(request.target_dir, &stem, started).await;
                return Err(FetchError::Timeout { program, after });
            }
            Err(ToolError::Io { source, .. }) => return Err(FetchError::Io(source)),
        };

        if !output.success() {
            self.discard_partials(request.target_dir, &stem, started).await;
            return Err(self.classify_failure(request.source_url, output));
        }

        let found = self
            .locate_output(request.target_dir, &stem, request.format, started)
            .await?;
        info!("下载完成: {} ({})", found.file_name, ByteSize(found.size));

        if request.format == AudioFormat::Mp3 && found.format == AudioFormat::M4a {
            return Ok(self.transcode_to_mp3(found).await);
        }

        Ok(found)
    }

    fn classify_failure(&self, url: &str, output: ToolOutput) -> FetchError {
        let stderr = output.stderr.trim();
        if stderr.contains("HTTP Error 404") || stderr.contains("404: Not Found") {
            return FetchError::NotFound {
                url: url.to_string(),
            };
        }

        let tail_start = stderr
            .char_indices()
            .rev()
            .nth(STDERR_TAIL)
            .map(|(i, _)| i)
            .unwrap_or(0);

        FetchError::ToolFailed {
            program: self.settings.extractor.clone(),
            exit_code: output.exit_code,
            stderr: stderr[tail_start..].to_string(),
        }
    }

    fn fresh_threshold(started: SystemTime) -> SystemTime {
        started.checked_sub(*FRESHNESS_SLACK).unwrap_or(UNIX_EPOCH)
    }

    async fn locate_output(
        &self,
        dir: &Path,
        stem: &str,
        format: AudioFormat,
        started: SystemTime,
    ) -> Result<LocalFile, FetchError> {
        let entries = self.store.list(dir).await?;
        let accepted = format.accepted_extensions();

        // (是否非精确命名, 扩展名优先级, 条目)
        let mut candidates: Vec<(bool, usize, &EntryMeta)> = entries
            .iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| {
                let suffix = stem_suffix(&e.name, stem)?;
                if is_partial_artifact(suffix) {
                    return None;
                }
                let ext = Path::new(&e.name).extension()?.to_str()?.to_ascii_lowercase();
                let rank = accepted.iter().position(|a| *a == ext)?;
                let exact = e.name == format!("{}.{}", stem, ext);
                Some((!exact, rank, e))
            })
            .collect();

        if candidates.is_empty() {
            let mut listing: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
            listing.sort();
            warn!("未找到下载文件: {}，目录中的文件: {}", stem, listing.join(", "));
            return Err(FetchError::OutputMissing {
                stem: stem.to_string(),
                dir: dir.to_path_buf(),
                listing,
            });
        }

        candidates.sort_by(|a, b| (a.0, a.1, &a.2.name).cmp(&(b.0, b.1, &b.2.name)));

        let threshold = Self::fresh_threshold(started);
        let chosen = candidates
            .iter()
            .find(|(_, _, e)| e.modified >= threshold)
            .map(|(_, _, e)| *e);

        let entry = match chosen {
            Some(entry) => entry,
            None => {
                return Err(FetchError::StaleOutput {
                    file: candidates[0].2.path.clone(),
                })
            }
        };

        let format = Path::new(&entry.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(AudioFormat::from_extension)
            .unwrap_or(format);

        Ok(LocalFile {
            path: entry.path.clone(),
            file_name: entry.name.clone(),
            size: entry.size,
            format,
        })
    }

    // 转码失败时退回原始的 m4a 文件
    async fn transcode_to_mp3(&self, source: LocalFile) -> LocalFile {
        let target: PathBuf = source.path.with_extension("mp3");
        info!("转换 {} 为 MP3", source.file_name);

        let invocation = ToolInvocation {
            program: self.settings.transcoder.clone(),
            args: vec![
                "-hide_banner".to_string(),
                "-loglevel".to_string(),
                "error".to_string(),
                "-y".to_string(),
                "-i".to_string(),
                source.path.to_string_lossy().to_string(),
                "-codec:a".to_string(),
                "libmp3lame".to_string(),
                "-b:a".to_string(),
                "192k".to_string(),
                target.to_string_lossy().to_string(),
            ],
            timeout: self.settings.timeout,
        };

        let failure = match self.runner.invoke(&invocation).await {
            Ok(output) if output.success() => match self.store.stat(&target).await {
                Ok(meta) => {
                    if let Err(e) = self.store.remove_file(&source.path).await {
                        warn!("删除原始文件失败: {} - {}", source.path.display(), e);
                    }
                    info!("转换完成: {}", meta.name);
                    return LocalFile {
                        path: target,
                        file_name: meta.name,
                        size: meta.size,
                        format: AudioFormat::Mp3,
                    };
                }
                Err(e) => format!("转换输出缺失: {}", e),
            },
            Ok(output) => format!("退出码 {:?}: {}", output.exit_code, output.stderr.trim()),
            Err(e) => e.to_string(),
        };

        warn!("转换失败，使用原始文件 {}: {}", source.file_name, failure);
        match self.store.remove_file(&target).await {
            Ok(()) => debug!("已删除不完整的转换输出: {}", target.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("删除转换输出失败: {} - {}", target.display(), e),
        }
        source
    }

    // 下载失败或超时后清理本次调用留下的文件
    async fn discard_partials(&self, dir: &Path, stem: &str, started: SystemTime) {
        let entries = match self.store.list(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("无法列出目录以清理残留: {} - {}", dir.display(), e);
                return;
            }
        };

        let threshold = Self::fresh_threshold(started);
        for entry in entries {
            if entry.is_dir {
                continue;
            }
            let suffix = match stem_suffix(&entry.name, stem) {
                Some(suffix) => suffix,
                None => continue,
            };
            if !is_partial_artifact(suffix) && entry.modified < threshold {
                continue;
            }
            match self.store.remove_file(&entry.path).await {
                Ok(()) => debug!("已删除残留文件: {}", entry.name),
                Err(e) => warn!("删除残留文件失败: {} - {}", entry.name, e),
            }
        }
    }
}
