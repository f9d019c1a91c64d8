//! 表单填充 - 业务能力层
//!
//! 只负责"把图片放进上传控件"和"点下一步"，上传组件的框架细节都留在页面脚本里

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::infrastructure::{js_string, JsExecutor};
use crate::models::Artifact;

/// 表单填充能力
#[async_trait]
pub trait FormInjector: Send + Sync {
    /// 把证件图片填入上传控件
    async fn inject_artifact(&self, artifact: &Artifact) -> Result<bool>;

    /// 点击"下一步"
    async fn advance_wizard(&self) -> Result<bool>;
}

const INPUT_SELECTOR: &str = "#app > div > div.main > div > div.form-content > form > div:nth-child(2) > div > div:nth-child(1) > div > input";

/// 基于 CDP 的表单填充
pub struct CdpFormInjector {
    executor: JsExecutor,
}

impl CdpFormInjector {
    pub fn new(executor: JsExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl FormInjector for CdpFormInjector {
    async fn inject_artifact(&self, artifact: &Artifact) -> Result<bool> {
        if let Err(e) = artifact.decode() {
            warn!("base64 数据无效，无法填充: {}", e);
            return Ok(false);
        }

        let js = format!(
            r#"
            (() => {{
                const input = document.querySelector(".el-upload input[type='file']")
                    || document.querySelector({selector})
                    || document.querySelector(".el-upload__input");
                if (!input || input.type !== "file") return false;

                const binary = atob({payload});
                const bytes = new Uint8Array(binary.length);
                for (let i = 0; i < binary.length; i++) bytes[i] = binary.charCodeAt(i);
                const file = new File([new Blob([bytes], {{ type: {mime} }})], {name}, {{ type: {mime} }});

                const transfer = new DataTransfer();
                transfer.items.add(file);
                try {{
                    input.files = transfer.files;
                }} catch (e) {{
                    Object.defineProperty(input, "files", {{ value: transfer.files, configurable: true }});
                }}

                input.dispatchEvent(new Event("change", {{ bubbles: true, cancelable: true }}));
                input.dispatchEvent(new Event("input", {{ bubbles: true }}));
                input.dispatchEvent(new CustomEvent("fileSelected", {{ bubbles: true, detail: {{ files: transfer.files }} }}));
                return (input.files && input.files.length) > 0;
            }})()
            "#,
            selector = js_string(INPUT_SELECTOR),
            payload = js_string(artifact.payload()),
            mime = js_string(artifact.media_type()),
            name = js_string(&artifact.file_name()),
        );

        let filled = self.executor.eval(js).await?.as_bool().unwrap_or(false);
        if filled {
            info!("✓ 文件已设置到上传控件: {}", artifact.file_name());
        } else {
            warn!("未找到目标上传控件");
        }
        Ok(filled)
    }

    async fn advance_wizard(&self) -> Result<bool> {
        let js = r#"
            (() => {
                const isNext = (b) => {
                    const text = (b.textContent || "").trim();
                    return text.includes("下一步") || text.includes("Next");
                };
                let button = document.querySelector("button.el-button--primary, button[type='submit']")
                    || Array.from(document.querySelectorAll("button")).find(isNext);
                if (button && (button.offsetParent !== null || button.style.display !== "none")) {
                    button.click();
                    return "button";
                }
                const form = document.querySelector("form");
                if (form) {
                    form.dispatchEvent(new Event("submit", { bubbles: true, cancelable: true }));
                    return "form";
                }
                return null;
            })()
        "#;

        let result = self.executor.eval(js).await?;
        match result.as_str() {
            Some(via) => {
                debug!("下一步触发方式: {}", via);
                info!("✓ 已触发下一步");
                Ok(true)
            }
            None => {
                warn!("未找到任何可用的提交方式");
                Ok(false)
            }
        }
    }
}
