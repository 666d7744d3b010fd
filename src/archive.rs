use anyhow::{Context, Result};
use bytesize::ByteSize;
use log::{info, warn};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::util::base_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub size: u64,
}

/// 将文件打包为不压缩的 ZIP。条目名只保留文件名，
/// 打包时已不存在的文件会被跳过
pub async fn create_archive(files: &[PathBuf], output: &Path) -> Result<ArchiveSummary> {
    let files = files.to_vec();
    let output = output.to_path_buf();

    let summary = tokio::task::spawn_blocking(move || write_stored_zip(&files, &output))
        .await
        .context("打包任务异常退出")??;

    info!("ZIP 创建完成: {} 个文件, {}", summary.entries, ByteSize(summary.size));
    Ok(summary)
}

fn write_stored_zip(files: &[PathBuf], output: &Path) -> Result<ArchiveSummary> {
    let out = File::create(output)
        .with_context(|| format!("无法创建压缩包: {}", output.display()))?;
    let mut zip = ZipWriter::new(BufWriter::new(out));
    let mut seen = HashSet::new();
    let mut entries = 0;

    for path in files {
        let name = match base_name(path) {
            Some(name) => name,
            None => {
                warn!("跳过无效路径: {}", path.display());
                continue;
            }
        };
        if !seen.insert(name.clone()) {
            warn!("跳过重名文件: {}", name);
            continue;
        }

        let mut input = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("打包时文件已不存在: {}", path.display());
                continue;
            }
            Err(e) => {
                warn!("无法读取文件，跳过: {} - {}", path.display(), e);
                continue;
            }
        };
        let len = input.metadata().map(|m| m.len()).unwrap_or(0);

        // 音频已经是压缩格式，直接存储
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .unix_permissions(0o644)
            .large_file(len >= u32::MAX as u64);

        zip.start_file(name.as_str(), options)
            .with_context(|| format!("写入ZIP条目失败: {}", name))?;
        std::io::copy(&mut input, &mut zip)
            .with_context(|| format!("写入ZIP数据失败: {}", name))?;
        entries += 1;
    }

    let mut writer = zip.finish().context("完成ZIP失败")?;
    writer.flush().context("写入压缩包失败")?;
    drop(writer);

    let size = std::fs::metadata(output)?.len();
    Ok(ArchiveSummary { entries, size })
}
