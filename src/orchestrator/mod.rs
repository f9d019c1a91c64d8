//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 连接浏览器、创建页面能力
//! - 启动页面观察者，运行会话控制器
//!
//! ### `page_watcher` - 页面观察者
//! - 定时给页面分类，变化时通知控制器
//!
//! ### `host_bridge` - 宿主请求
//! - 标签页信息、页面信息、遮罩层开关
//!
//! ## 层次关系
//!
//! ```text
//! app
//!  ├─ page_watcher ──PageEvent──┐
//!  │                            ↓
//!  └─────────────── workflow::SessionController ── channel (WebSocket)
//!                               ↓
//!                  services (inspector / injector / host)
//!                               ↓
//!                  infrastructure (JsExecutor)
//! ```

pub mod app;
pub mod host_bridge;
pub mod page_watcher;

pub use app::App;
pub use host_bridge::{HostBridge, HostRequest, HostResponse};
pub use page_watcher::{classify, PageWatcher};
