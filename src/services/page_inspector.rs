//! 页面状态查询 - 业务能力层
//!
//! 只回答"页面现在是什么样"，不关心流程

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::infrastructure::{js_string, JsExecutor};
use crate::models::{Artifact, RecordField};

/// 成功页面中的二维码
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddedArtifact {
    /// 已经是 base64（img data URI / canvas / svg）
    Ready(Artifact),
    /// 远程图片，需要调用 `load_artifact` 异步加载
    Pending(String),
    /// 页面中没有二维码
    Missing,
}

/// 页面状态查询能力
#[async_trait]
pub trait PageInspector: Send + Sync {
    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// 地址是否是入境卡填报页
    async fn is_target_page(&self) -> Result<bool>;

    /// `document.readyState == "complete"`
    async fn is_page_fully_loaded(&self) -> Result<bool>;

    /// 步骤条是否已渲染
    async fn is_step_container_present(&self) -> Result<bool>;

    /// 是否停留在填报页第一步
    async fn is_target_step1_page(&self) -> Result<bool>;

    /// 是否是提交成功页（带二维码的信息页）
    async fn is_success_page(&self) -> Result<bool>;

    /// 成功页信息列表（不含二维码）
    async fn extract_visible_record(&self) -> Result<Vec<RecordField>>;

    async fn extract_embedded_artifact(&self) -> Result<EmbeddedArtifact>;

    /// 加载远程二维码图片，失败时返回 None
    async fn load_artifact(&self, url: &str) -> Result<Option<Artifact>>;
}

const FIRST_STEP_ACTIVE_JS: &str = r#"
(() => {
    const steps = document.querySelectorAll(".el-step");
    if (steps.length === 0) return false;
    const first = steps[0];
    return first.querySelector(".is-process") !== null
        || first.querySelector(".el-step__head.is-process") !== null
        || first.classList.contains("is-process");
})()
"#;

const SUCCESS_PAGE_JS: &str = r##"
(() => document.querySelector("#app .info-content li.line-qr-code") !== null)()
"##;

const VISIBLE_RECORD_JS: &str = r##"
(() => {
    const info = document.querySelector("#app > div > div.main > div > div.info-content")
        || document.querySelector("#app .info-content");
    if (!info) return null;
    return Array.from(info.querySelectorAll("ul > li:not(.line-qr-code)")).map((li) => {
        const span = li.querySelector("span");
        const div = li.querySelector("div");
        if (span && div) {
            return { label: (span.textContent || "").trim(), value: (div.textContent || "").trim() };
        }
        return { label: null, value: (li.textContent || "").trim() };
    });
})()
"##;

const EMBEDDED_ARTIFACT_JS: &str = r##"
(() => {
    const box = document.querySelector("#app .info-content li.line-qr-code > div");
    if (!box) return null;
    const img = box.querySelector("img");
    if (!img) {
        const canvas = box.querySelector("canvas");
        if (canvas) {
            try { return { kind: "data", value: canvas.toDataURL("image/png") }; } catch (e) {}
        }
        const svg = box.querySelector("svg");
        if (svg) {
            try {
                const xml = new XMLSerializer().serializeToString(svg);
                return { kind: "data", value: "data:image/svg+xml;base64," + btoa(unescape(encodeURIComponent(xml))) };
            } catch (e) {}
        }
    }
    if (img && img.src) {
        if (img.src.startsWith("data:image")) return { kind: "data", value: img.src };
        return { kind: "url", value: img.src };
    }
    return null;
})()
"##;

#[derive(Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
enum QrSource {
    Data(String),
    Url(String),
}

/// 基于 CDP 的页面状态查询
pub struct CdpPageInspector {
    executor: JsExecutor,
    target_marker: String,
    http: reqwest::Client,
}

impl CdpPageInspector {
    /// `target_marker` 为填报页地址中的特征片段（如 `entry-registation-form`）
    pub fn new(executor: JsExecutor, target_marker: impl Into<String>) -> Self {
        Self {
            executor,
            target_marker: target_marker.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn eval_bool(&self, js: &str) -> Result<bool> {
        Ok(self.executor.eval(js).await?.as_bool().unwrap_or(false))
    }

    /// 页面内 fetch 被跨域拦截时，直接下载图片
    async fn download_artifact(&self, url: &str) -> Result<Artifact> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("下载二维码失败: {}", url))?
            .error_for_status()?;
        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response.bytes().await?;
        Ok(Artifact::from_bytes(&bytes, media_type.as_deref()))
    }
}

#[async_trait]
impl PageInspector for CdpPageInspector {
    async fn current_url(&self) -> Result<String> {
        self.executor.url().await
    }

    async fn title(&self) -> Result<String> {
        self.executor.title().await
    }

    async fn is_target_page(&self) -> Result<bool> {
        Ok(self.current_url().await?.contains(&self.target_marker))
    }

    async fn is_page_fully_loaded(&self) -> Result<bool> {
        let state = self.executor.eval("document.readyState").await?;
        Ok(state.as_str() == Some("complete"))
    }

    async fn is_step_container_present(&self) -> Result<bool> {
        self.eval_bool(r#"document.querySelector(".el-steps") !== null"#)
            .await
    }

    async fn is_target_step1_page(&self) -> Result<bool> {
        if !self.is_target_page().await? {
            return Ok(false);
        }
        self.eval_bool(FIRST_STEP_ACTIVE_JS).await
    }

    async fn is_success_page(&self) -> Result<bool> {
        self.eval_bool(SUCCESS_PAGE_JS).await
    }

    async fn extract_visible_record(&self) -> Result<Vec<RecordField>> {
        let rows: Option<Vec<RecordField>> = self.executor.eval_as(VISIBLE_RECORD_JS).await?;
        let rows = rows.ok_or_else(|| SessionError::Extraction("未找到信息容器".to_string()))?;
        debug!("提取到 {} 个字段", rows.len());
        Ok(rows)
    }

    async fn extract_embedded_artifact(&self) -> Result<EmbeddedArtifact> {
        let source: Option<QrSource> = self
            .executor
            .eval_as(EMBEDDED_ARTIFACT_JS)
            .await
            .context("提取二维码失败")?;
        Ok(match source {
            Some(QrSource::Data(data)) => EmbeddedArtifact::Ready(Artifact::parse(data)),
            Some(QrSource::Url(url)) => EmbeddedArtifact::Pending(url),
            None => {
                warn!("未找到二维码元素");
                EmbeddedArtifact::Missing
            }
        })
    }

    async fn load_artifact(&self, url: &str) -> Result<Option<Artifact>> {
        let js = format!(
            r#"
            (async () => {{
                try {{
                    const res = await fetch({}, {{ credentials: "include" }});
                    if (!res.ok) return null;
                    const blob = await res.blob();
                    return await new Promise((resolve) => {{
                        const reader = new FileReader();
                        reader.onload = () => resolve(reader.result);
                        reader.onerror = () => resolve(null);
                        reader.readAsDataURL(blob);
                    }});
                }} catch (err) {{
                    console.error("加载图片失败:", err);
                    return null;
                }}
            }})()
            "#,
            js_string(url)
        );
        let data_uri: Option<String> = self.executor.eval_as(js).await?;
        if let Some(data_uri) = data_uri {
            return Ok(Some(Artifact::parse(data_uri)));
        }

        debug!("页面内加载二维码失败，改为直接下载: {}", url);
        match self.download_artifact(url).await {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) => {
                warn!("加载二维码图片失败: {}", e);
                Ok(None)
            }
        }
    }
}
