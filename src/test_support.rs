//! 测试用的脚本化外部工具

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::tool::{ToolError, ToolInvocation, ToolOutput, ToolRunner};

#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// 按请求的格式写出文件
    Produce,
    /// 无论请求什么格式都写出该扩展名
    ProduceAs(&'static str),
    /// 写出文件并留下分片残留
    ProduceWithLeftovers,
    Fail { code: i32, stderr: &'static str },
    Timeout,
    /// 退出码为 0 但不产生文件
    SilentSuccess,
    /// 只留下一个很久以前的同名文件
    Stale,
}

pub struct FakeRunner {
    behaviors: HashMap<String, FakeBehavior>,
    transcode_ok: bool,
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            transcode_ok: true,
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, url: &str, behavior: FakeBehavior) -> Self {
        self.behaviors.insert(url.to_string(), behavior);
        self
    }

    pub fn failing_transcoder(mut self) -> Self {
        self.transcode_ok = false;
        self
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    fn arg_after(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    }

    fn ok() -> ToolOutput {
        ToolOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn extract(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let args = &invocation.args;
        let url = args.last().cloned().unwrap_or_default();
        let template = Self::arg_after(args, "--output").unwrap_or_default();
        let format = Self::arg_after(args, "--audio-format").unwrap_or_else(|| "m4a".into());
        let behavior = self
            .behaviors
            .get(&url)
            .cloned()
            .unwrap_or(FakeBehavior::Produce);

        let output_for = |ext: &str| PathBuf::from(template.replace("%(ext)s", ext));

        match behavior {
            FakeBehavior::Produce => {
                std::fs::write(output_for(&format), url.as_bytes()).unwrap();
                Ok(Self::ok())
            }
            FakeBehavior::ProduceAs(ext) => {
                std::fs::write(output_for(ext), url.as_bytes()).unwrap();
                Ok(Self::ok())
            }
            FakeBehavior::ProduceWithLeftovers => {
                let path = output_for(&format);
                std::fs::write(&path, url.as_bytes()).unwrap();
                let leftover = format!("{}.part-Frag3", path.display());
                std::fs::write(leftover, b"frag").unwrap();
                Ok(Self::ok())
            }
            FakeBehavior::Fail { code, stderr } => {
                // 失败前留下半成品
                let partial = format!("{}.part", output_for(&format).display());
                std::fs::write(partial, b"partial").unwrap();
                Ok(ToolOutput {
                    exit_code: Some(code),
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                })
            }
            FakeBehavior::Timeout => {
                let partial = format!("{}.part", output_for(&format).display());
                std::fs::write(partial, b"partial").unwrap();
                Err(ToolError::Timeout {
                    program: invocation.program.clone(),
                    after: invocation.timeout,
                })
            }
            FakeBehavior::SilentSuccess => Ok(Self::ok()),
            FakeBehavior::Stale => {
                let path = output_for(&format);
                std::fs::write(&path, b"old").unwrap();
                std::fs::File::options()
                    .write(true)
                    .open(&path)
                    .unwrap()
                    .set_modified(SystemTime::now() - Duration::from_secs(3600))
                    .unwrap();
                Ok(Self::ok())
            }
        }
    }

    fn transcode(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let output = invocation.args.last().cloned().unwrap_or_default();
        if self.transcode_ok {
            std::fs::write(output, b"mp3-data").unwrap();
            Ok(Self::ok())
        } else {
            std::fs::write(output, b"half").unwrap();
            Ok(ToolOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "Unknown encoder 'libmp3lame'".to_string(),
            })
        }
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        if invocation.program.contains("ffmpeg") {
            self.transcode(invocation)
        } else {
            self.extract(invocation)
        }
    }
}
