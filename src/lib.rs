//! # Arrival Card Assist
//!
//! 入境卡自助填报辅助程序：通过浏览器调试端口接管填报页，
//! 和本地证件读卡程序经 WebSocket 交换证件图片和凭条数据
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//!
//! ### ② 通道（Channel）
//! - `channel/` - 一个端点一条 WebSocket 连接，指数退避重连，消息解码
//!
//! ### ③ 业务能力层（Services）
//! - `PageInspector` - 页面现在是什么样
//! - `FormInjector` - 填充证件图片、点击下一步
//! - `PageHost` - 遮罩层和跳转
//!
//! ### ④ 流程层（Workflow）
//! - `Session` - 单次会话：阶段、倒计时、processing guard
//! - `SessionController` - 证件阶段 / 凭条阶段状态机
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/app` - 连接浏览器，运行页面观察者和控制器
//! - `orchestrator/page_watcher` - 页面分类与变化通知
//! - `orchestrator/host_bridge` - 宿主请求

pub mod browser;
pub mod channel;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::connect_to_browser_and_page;
pub use channel::{Channel, ChannelEnvelope, ChannelEvent, InboundMessage};
pub use config::{Config, Endpoint};
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use models::{Artifact, ExtractedRecord, PageClass, PageEvent, PhaseKind, ReceiptStatus};
pub use orchestrator::{App, HostRequest, HostResponse};
pub use workflow::{Phase, ReceiptStep, SessionController};
