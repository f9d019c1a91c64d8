use std::path::Path;

use anyhow::{Context, Result};
use arrival_card_assist::orchestrator::{App, HostRequest};
use arrival_card_assist::utils::logging;
use arrival_card_assist::Config;
use tracing::info;

const DEFAULT_CONFIG_FILE: &str = "arrival_card.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = load_config()?;

    // 带参数时只回答一次宿主请求
    if let Some(raw) = std::env::args().nth(1) {
        let request: HostRequest =
            serde_json::from_str(&raw).with_context(|| format!("无法解析宿主请求: {}", raw))?;
        let app = App::initialize(config).await?;
        let response = app.handle_host_request(request).await?;
        println!("{}", serde_json::to_string(&response)?);
        return Ok(());
    }

    // 初始化并运行应用
    App::initialize(config).await?.run().await
}

/// `ARRIVAL_CARD_CONFIG` 指定的文件优先，其次是当前目录下的默认配置文件，都没有时只读环境变量
fn load_config() -> Result<Config> {
    let path = std::env::var("ARRIVAL_CARD_CONFIG").ok();
    let path = path.as_deref().unwrap_or(DEFAULT_CONFIG_FILE);
    if Path::new(path).exists() {
        info!("读取配置文件: {}", path);
        Config::from_file_and_env(Path::new(path))
    } else {
        Ok(Config::from_env())
    }
}
