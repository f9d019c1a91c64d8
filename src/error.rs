use thiserror::Error;

use crate::models::PhaseKind;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 本地通道错误
    #[error("通道错误: {0}")]
    Channel(#[from] ChannelError),
    /// 会话状态错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 本地 WebSocket 通道错误
#[derive(Debug, Error)]
pub enum ChannelError {
    /// 建立连接失败
    #[error("连接 {endpoint} 失败: {reason}")]
    ConnectFailed { endpoint: String, reason: String },
    /// 超过最大重连次数
    #[error("{endpoint} 重连失败，已达到最大重连次数 {attempts}")]
    RetriesExhausted { endpoint: String, attempts: u32 },
    /// 传输层错误
    #[error("WebSocket 错误: {0}")]
    Transport(String),
}

/// 消息解析错误（只记录，不致命）
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// JSON 结构中没有可识别字段
    #[error("消息中未找到 base64/image/data/isKeep 字段")]
    UnrecognizedShape,
    /// 非 JSON 且不像 base64 图片
    #[error("无法识别的消息格式 (长度 {len})")]
    UnrecognizedText { len: usize },
    /// 二进制帧
    #[error("不支持的二进制消息 (长度 {len})")]
    Binary { len: usize },
}

/// 会话状态错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 已有会话在进行中
    #[error("已有会话在进行中: {active:?}，拒绝进入 {requested:?}")]
    AlreadyActive {
        active: PhaseKind,
        requested: PhaseKind,
    },
    /// 页面信息提取失败
    #[error("提取页面信息失败: {0}")]
    Extraction(String),
    /// 证件图片填充失败
    #[error("填充证件图片失败: {0}")]
    Injection(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 时间配置超出范围
    #[error("时间配置 {field} 超出范围: {value}")]
    DurationOutOfRange { field: String, value: String },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChannelError::Transport(err.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器连接错误
    pub fn browser_connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
