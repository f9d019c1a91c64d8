//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：写运行日志头、连接浏览器、创建 JsExecutor 和各项页面能力
//! 2. **任务编排**：页面观察者独立运行，会话控制器在当前任务里消费页面事件
//! 3. **资源管理**：持有 Browser，退出前关闭通道并移除遮罩层

use std::sync::Arc;

use anyhow::Result;
use chromiumoxide::Browser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::browser;
use crate::config::Config;
use crate::infrastructure::JsExecutor;
use crate::orchestrator::host_bridge::{HostBridge, HostRequest, HostResponse};
use crate::orchestrator::page_watcher::PageWatcher;
use crate::services::{
    CdpFormInjector, CdpPageHost, CdpPageInspector, FormInjector, PageHost, PageInspector,
};
use crate::utils::logging::{init_log_file, log_startup};
use crate::workflow::SessionController;

/// 应用主结构
pub struct App {
    config: Config,
    _browser: Browser,
    inspector: Arc<dyn PageInspector>,
    injector: Arc<dyn FormInjector>,
    host: Arc<dyn PageHost>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        init_log_file(&config.output_log_file)?;

        log_startup(&config);

        let (browser, page) = browser::connect_to_browser_and_page(
            config.browser_debug_port,
            &config.target_url,
            config.target_marker(),
        )
        .await?;

        // page 内部是 Arc，多个能力共享同一个标签页
        let executor = JsExecutor::new(page);

        Ok(Self {
            inspector: Arc::new(CdpPageInspector::new(
                executor.clone(),
                config.target_marker(),
            )),
            injector: Arc::new(CdpFormInjector::new(executor.clone())),
            host: Arc::new(CdpPageHost::new(executor)),
            config,
            _browser: browser,
        })
    }

    /// 运行应用主逻辑，直到收到 Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let mut controller = SessionController::new(
            self.config.session_config(),
            self.inspector.clone(),
            self.injector.clone(),
            self.host.clone(),
        );

        let (tx, rx) = mpsc::channel(16);
        let watcher = PageWatcher::new(self.inspector.clone(), self.config.poll_interval());
        let watcher_handle = tokio::spawn(watcher.run(tx));

        tokio::select! {
            _ = controller.run(rx) => warn!("⚠️ 页面观察者已停止"),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("收到退出信号");
            }
        }

        watcher_handle.abort();
        controller.shutdown().await;

        info!("{}", "=".repeat(60));
        info!("👋 程序退出");
        info!("日志已保存至: {}", self.config.output_log_file);
        Ok(())
    }

    /// 回答一次宿主请求
    pub async fn handle_host_request(&self, request: HostRequest) -> Result<HostResponse> {
        HostBridge::new(self.inspector.clone(), self.host.clone())
            .handle(request)
            .await
    }
}
