//! JS 执行器 - 基础设施层
//!
//! 持有页面资源，只暴露"执行 JS"和"导航"的能力

use anyhow::{Context, Result};
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::AppError;

/// JS 执行器
///
/// 职责：
/// - 持有 Page 资源（内部是 Arc，clone 成本很低）
/// - 暴露 eval() 能力
/// - 不认识会话 / 阶段，不处理业务流程
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 执行 JS 代码并返回 JSON 结果
    ///
    /// 表达式返回 Promise 时等待其完成
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self
            .page
            .evaluate(js_code.into())
            .await
            .map_err(AppError::from)?;
        Ok(value_or_null(result.into_value::<JsonValue>()))
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> Result<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value.clone())
            .with_context(|| format!("脚本返回结果无法解析: {}", json_value))?;
        Ok(typed_value)
    }

    /// 当前页面地址
    pub async fn url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    /// 当前页面标题
    pub async fn title(&self) -> Result<String> {
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    /// 导航到指定地址
    pub async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("导航到 {} 失败", url))?;
        Ok(())
    }
}

/// 脚本没有返回值（`undefined`）或返回值无法转换时按 `null` 处理
fn value_or_null<E: std::fmt::Display>(value: std::result::Result<JsonValue, E>) -> JsonValue {
    match value {
        Ok(value) => value,
        Err(e) => {
            debug!("脚本返回值无法转换为 JSON，按 null 处理: {}", e);
            JsonValue::Null
        }
    }
}

/// 把 Rust 字符串安全地嵌入 JS 源码（带引号）
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
