use anyhow::Result;
use chrono::Local;
use env_logger::fmt::Color;
use indicatif::MultiProgress;
use log::{Level, LevelFilter};
use std::fs::create_dir_all;
use std::io::{self, Write};
use std::path::Path;

pub const LOG_FILE_PREFIX: &str = "mixcloud-dl.log";

// 全局MultiProgress实例，批量下载的进度条注册在这里
lazy_static::lazy_static! {
    pub static ref MULTI_PROGRESS: MultiProgress = MultiProgress::new();
}

// 同时写入标准输出和文件
struct DualWriter {
    console: io::Stdout,
    file: Box<dyn Write + Send>,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // 写日志时临时隐藏进度条
        MULTI_PROGRESS.suspend(|| {
            let console_result = self.console.write(buf);
            let _ = self.file.write(buf);
            console_result
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.console.flush();
        let _ = self.file.flush();
        Ok(())
    }
}

pub fn init_logger(log_dir: &Path, debug: bool) -> Result<()> {
    if !log_dir.exists() {
        create_dir_all(log_dir)?;
    }

    // 按小时滚动，旧文件由定时清理任务回收
    let file_appender = tracing_appender::rolling::hourly(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // guard 被 drop 后不再写文件，需要存活到进程结束
    Box::leak(Box::new(guard));

    let dual_writer = DualWriter {
        console: io::stdout(),
        file: Box::new(non_blocking),
    };

    let default_level = if debug { LevelFilter::Debug } else { LevelFilter::Info };

    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let mut style = buf.style();
            let level_color = match record.level() {
                Level::Error => Color::Red,
                Level::Warn => Color::Yellow,
                Level::Info => Color::Green,
                Level::Debug => Color::Blue,
                Level::Trace => Color::Cyan,
            };
            style.set_color(level_color);

            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let level_str = style.value(format!("{:<5}", record.level()));

            writeln!(
                buf,
                "[{} {} {}] {}",
                timestamp,
                level_str,
                record.target(),
                record.args()
            )
        })
        .filter_level(default_level)
        .filter_module("hyper", LevelFilter::Warn)
        .filter_module("rustls", LevelFilter::Error)
        .target(env_logger::Target::Pipe(Box::new(dual_writer)));

    // RUST_LOG 优先于默认级别
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder.try_init()?;

    log::info!("日志系统启动，日志文件保存在 {} 目录", log_dir.display());
    log::debug!("系统环境: RUST_LOG={}", std::env::var("RUST_LOG").unwrap_or_default());

    Ok(())
}
