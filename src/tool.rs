use async_trait::async_trait;
use log::debug;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} 未安装")]
    NotInstalled(String),

    #[error("{program} 执行超时 ({after:?})")]
    Timeout { program: String, after: Duration },

    #[error("启动 {program} 失败: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// 外部命令行工具（yt-dlp、ffmpeg）的调用接口
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError>;
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        debug!("执行: {} {}", invocation.program, invocation.args.join(" "));

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // 超时后 future 被丢弃，子进程随之被杀掉
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ToolError::NotInstalled(invocation.program.clone()),
                _ => ToolError::Io {
                    program: invocation.program.clone(),
                    source: e,
                },
            })?;

        let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::Io {
                    program: invocation.program.clone(),
                    source: e,
                })
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    program: invocation.program.clone(),
                    after: invocation.timeout,
                })
            }
        };

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
