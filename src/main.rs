use anyhow::Result;
use dotenv::dotenv;
use log::error;
use rust_mixcloud_dl::bootstrap::bootstrap;
use rust_mixcloud_dl::config::Config;
use rust_mixcloud_dl::logger;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载环境变量
    dotenv().ok();

    let config = match Config::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("配置错误: {:#}", e);
            std::process::exit(1);
        }
    };

    // 初始化日志
    logger::init_logger(&config.log_dir, config.debug_log)?;

    let version = env!("CARGO_PKG_VERSION");
    if let Err(e) = bootstrap(version, config).await {
        error!("启动错误: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
