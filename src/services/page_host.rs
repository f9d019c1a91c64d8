//! 遮罩层与页面跳转 - 业务能力层

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::infrastructure::{js_string, JsExecutor};
use crate::models::PhaseKind;

/// 遮罩层节点 ID
pub const OVERLAY_ID: &str = "immigration-bureau-overlay";

/// 会话控制器触发的页面副作用
#[async_trait]
pub trait PageHost: Send + Sync {
    /// 显示阻塞遮罩层，已存在时不重复创建
    async fn show_overlay(&self, phase: PhaseKind) -> Result<()>;

    /// 移除遮罩层，不存在时什么都不做
    async fn hide_overlay(&self) -> Result<()>;

    async fn navigate(&self, url: &str) -> Result<()>;
}

/// 基于 CDP 的页面副作用
pub struct CdpPageHost {
    executor: JsExecutor,
}

impl CdpPageHost {
    pub fn new(executor: JsExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl PageHost for CdpPageHost {
    async fn show_overlay(&self, phase: PhaseKind) -> Result<()> {
        let js = format!(
            r#"
            (() => {{
                if (document.getElementById({id})) return false;
                const overlay = document.createElement("div");
                overlay.id = {id};
                overlay.style.cssText = "position:fixed;inset:0;z-index:2147483647;display:flex;"
                    + "align-items:center;justify-content:center;background:rgba(0,0,0,0.7);";
                const text = document.createElement("div");
                text.style.cssText = "color:#fff;font-size:32px;font-weight:bold;";
                text.textContent = {text};
                overlay.appendChild(text);
                document.body.appendChild(overlay);
                return true;
            }})()
            "#,
            id = js_string(OVERLAY_ID),
            text = js_string(phase.overlay_text()),
        );
        if self.executor.eval(js).await?.as_bool().unwrap_or(false) {
            info!("遮罩层已显示: {}", phase.overlay_text());
        }
        Ok(())
    }

    async fn hide_overlay(&self) -> Result<()> {
        let js = format!(
            r#"
            (() => {{
                const overlay = document.getElementById({});
                if (!overlay) return false;
                overlay.remove();
                return true;
            }})()
            "#,
            js_string(OVERLAY_ID)
        );
        if self.executor.eval(js).await?.as_bool().unwrap_or(false) {
            info!("遮罩层已隐藏");
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        info!("跳转到: {}", url);
        self.executor.goto(url).await
    }
}
