use std::path::Path;

use crate::constants::RETRIEVABLE_EXTENSIONS;
use crate::error::RetrievalError;

/// 允许通过下载接口取回的文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Mp3,
    M4a,
    Zip,
}

impl FileKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        if !RETRIEVABLE_EXTENSIONS.contains(&ext.as_str()) {
            return None;
        }
        match ext.as_str() {
            "mp3" => Some(FileKind::Mp3),
            "m4a" => Some(FileKind::M4a),
            "zip" => Some(FileKind::Zip),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileKind::Mp3 => "audio/mpeg",
            FileKind::M4a => "audio/mp4",
            FileKind::Zip => "application/zip",
        }
    }
}

// 验证请求的文件名：只能是下载目录下的单层文件名，且扩展名在白名单内
pub fn validate_retrieval_name(name: &str) -> Result<FileKind, RetrievalError> {
    let forbidden = || RetrievalError::Forbidden(name.to_string());

    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.contains("..")
    {
        return Err(forbidden());
    }

    FileKind::from_name(name).ok_or_else(forbidden)
}
