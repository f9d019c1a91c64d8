use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

/// 本地程序提供的三个 WebSocket 端点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// 接收证件 base64（服务端 → 扩展）
    SubmitArtifact,
    /// 发送凭条表单数据（扩展 → 服务端）
    SubmitRecord,
    /// 监听凭条领取状态（服务端 → 扩展）
    ReceiveStatus,
}

impl Endpoint {
    pub fn label(self) -> &'static str {
        match self {
            Endpoint::SubmitArtifact => "submit-artifact",
            Endpoint::SubmitRecord => "submit-record",
            Endpoint::ReceiveStatus => "receive-status",
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 入境卡填报页面
    pub target_url: String,
    /// 本地程序 WebSocket 主机
    pub ws_host: String,
    /// 本地程序 WebSocket 端口
    pub ws_port: u16,
    /// step1: 接收 base64 数据
    pub submit_artifact_path: String,
    /// step2: 发送表单数据
    pub submit_record_path: String,
    /// step2: 监听凭条领取状态
    pub receive_status_path: String,
    /// 不连接本地程序，使用模拟数据（仅开发调试）
    pub simulation_mode: bool,
    /// 一个时间单位的毫秒数
    pub time_unit_ms: u64,
    /// 倒计时长度（时间单位）
    pub countdown_units: u32,
    /// 页面轮询间隔（时间单位）
    pub poll_interval_units: u32,
    /// 模拟模式下发送模拟数据前的等待
    pub simulation_delay_ms: u64,
    /// 重连退避基数
    pub reconnect_base_ms: u64,
    /// 重连退避上限
    pub reconnect_cap_ms: u64,
    /// 最大重连次数
    pub max_reconnect_attempts: u32,
    /// 发送表单数据后等待多久切换到监听端点
    pub settle_delay_ms: u64,
    /// 填充/下一步失败后的重试等待
    pub injection_grace_ms: u64,
    /// 等待二维码异步加载的上限
    pub artifact_load_timeout_ms: u64,
    /// 超时跳转地址
    pub timeout_redirect_url: String,
    /// 凭条领取完成后的跳转地址
    pub completion_redirect_url: String,
    /// 连接彻底失败后的跳转地址
    pub failure_redirect_url: String,
    /// 输出日志文件
    pub output_log_file: String,
}

const NOTICE_URL: &str = "https://s.nia.gov.cn/ArrivalCardFillingPC/entry-registation-notice";

const DEFAULT_TIME_UNIT_MS: u64 = 1000;
const DEFAULT_COUNTDOWN_UNITS: u32 = 30;
const DEFAULT_POLL_INTERVAL_UNITS: u32 = 1;

/// 任何等待时间的上限，超过时回退到默认值
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            target_url: "https://s.nia.gov.cn/ArrivalCardFillingPC/entry-registation-form".to_string(),
            ws_host: "localhost".to_string(),
            ws_port: 60001,
            submit_artifact_path: "/sendDocumentSignalApi".to_string(),
            submit_record_path: "/setFinalResultApi".to_string(),
            receive_status_path: "/keepReceiptApi".to_string(),
            simulation_mode: false,
            time_unit_ms: DEFAULT_TIME_UNIT_MS,
            countdown_units: DEFAULT_COUNTDOWN_UNITS,
            poll_interval_units: DEFAULT_POLL_INTERVAL_UNITS,
            simulation_delay_ms: 5000,
            reconnect_base_ms: 1000,
            reconnect_cap_ms: 10_000,
            max_reconnect_attempts: 5,
            settle_delay_ms: 2000,
            injection_grace_ms: 500,
            artifact_load_timeout_ms: 5000,
            timeout_redirect_url: NOTICE_URL.to_string(),
            completion_redirect_url: NOTICE_URL.to_string(),
            failure_redirect_url: NOTICE_URL.to_string(),
            output_log_file: "output.txt".to_string(),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    let Ok(value) = std::env::var(name) else {
        return default;
    };
    match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            let err = ConfigError::EnvVarParseFailed {
                var_name: name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            };
            warn!("{}，使用默认值", err);
            default
        }
    }
}

/// 毫秒配置项转换为 `Duration`，超过 `MAX_WAIT` 时回退到默认值
fn bounded_millis(field: &str, ms: u64, default_ms: u64) -> Duration {
    let duration = Duration::from_millis(ms);
    if duration <= MAX_WAIT {
        return duration;
    }
    let err = ConfigError::DurationOutOfRange {
        field: field.to_string(),
        value: format!("{}ms", ms),
    };
    warn!("{}，使用默认值", err);
    Duration::from_millis(default_ms)
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 先读取 TOML 配置文件，再用环境变量覆盖
    pub fn from_file_and_env(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))?;
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(self) -> Self {
        let d = self;
        Self {
            browser_debug_port: env_or("BROWSER_DEBUG_PORT", d.browser_debug_port),
            target_url: std::env::var("TARGET_URL").unwrap_or(d.target_url),
            ws_host: std::env::var("WS_HOST").unwrap_or(d.ws_host),
            ws_port: env_or("WS_PORT", d.ws_port),
            submit_artifact_path: std::env::var("WS_SUBMIT_ARTIFACT_PATH").unwrap_or(d.submit_artifact_path),
            submit_record_path: std::env::var("WS_SUBMIT_RECORD_PATH").unwrap_or(d.submit_record_path),
            receive_status_path: std::env::var("WS_RECEIVE_STATUS_PATH").unwrap_or(d.receive_status_path),
            simulation_mode: env_or("SIMULATION_MODE", d.simulation_mode),
            time_unit_ms: env_or("TIME_UNIT_MS", d.time_unit_ms),
            countdown_units: env_or("COUNTDOWN_UNITS", d.countdown_units),
            poll_interval_units: env_or("POLL_INTERVAL_UNITS", d.poll_interval_units),
            simulation_delay_ms: env_or("SIMULATION_DELAY_MS", d.simulation_delay_ms),
            reconnect_base_ms: env_or("RECONNECT_BASE_MS", d.reconnect_base_ms),
            reconnect_cap_ms: env_or("RECONNECT_CAP_MS", d.reconnect_cap_ms),
            max_reconnect_attempts: env_or("MAX_RECONNECT_ATTEMPTS", d.max_reconnect_attempts),
            settle_delay_ms: env_or("SETTLE_DELAY_MS", d.settle_delay_ms),
            injection_grace_ms: env_or("INJECTION_GRACE_MS", d.injection_grace_ms),
            artifact_load_timeout_ms: env_or("ARTIFACT_LOAD_TIMEOUT_MS", d.artifact_load_timeout_ms),
            timeout_redirect_url: std::env::var("TIMEOUT_REDIRECT_URL").unwrap_or(d.timeout_redirect_url),
            completion_redirect_url: std::env::var("COMPLETION_REDIRECT_URL").unwrap_or(d.completion_redirect_url),
            failure_redirect_url: std::env::var("FAILURE_REDIRECT_URL").unwrap_or(d.failure_redirect_url),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(d.output_log_file),
        }
    }

    /// 端点完整地址；模拟模式下返回 None
    pub fn endpoint_url(&self, endpoint: Endpoint) -> Option<String> {
        if self.simulation_mode || self.ws_host.trim().is_empty() {
            return None;
        }
        let path = match endpoint {
            Endpoint::SubmitArtifact => &self.submit_artifact_path,
            Endpoint::SubmitRecord => &self.submit_record_path,
            Endpoint::ReceiveStatus => &self.receive_status_path,
        };
        Some(format!("ws://{}:{}{}", self.ws_host, self.ws_port, path))
    }

    /// 填报页地址的最后一段，用来识别目标标签页
    pub fn target_marker(&self) -> &str {
        self.target_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.target_url)
    }

    pub fn time_unit(&self) -> Duration {
        bounded_millis("time_unit_ms", self.time_unit_ms, DEFAULT_TIME_UNIT_MS)
    }

    /// `units` 个时间单位；溢出或超过 `MAX_WAIT` 时回退到默认值
    fn units(&self, field: &str, units: u32, default_units: u32) -> Duration {
        if let Some(duration) = self
            .time_unit()
            .checked_mul(units)
            .filter(|d| *d <= MAX_WAIT)
        {
            return duration;
        }
        let err = ConfigError::DurationOutOfRange {
            field: field.to_string(),
            value: format!("{} x {}ms", units, self.time_unit_ms),
        };
        warn!("{}，使用默认值", err);
        Duration::from_millis(DEFAULT_TIME_UNIT_MS) * default_units
    }

    pub fn poll_interval(&self) -> Duration {
        self.units(
            "poll_interval_units",
            self.poll_interval_units,
            DEFAULT_POLL_INTERVAL_UNITS,
        )
    }

    pub fn countdown(&self) -> Duration {
        self.units("countdown_units", self.countdown_units, DEFAULT_COUNTDOWN_UNITS)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        let d = Config::default();
        ChannelConfig {
            simulation_delay: bounded_millis(
                "simulation_delay_ms",
                self.simulation_delay_ms,
                d.simulation_delay_ms,
            ),
            reconnect_base: bounded_millis(
                "reconnect_base_ms",
                self.reconnect_base_ms,
                d.reconnect_base_ms,
            ),
            reconnect_cap: bounded_millis("reconnect_cap_ms", self.reconnect_cap_ms, d.reconnect_cap_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let d = Config::default();
        SessionConfig {
            countdown: self.countdown(),
            settle_delay: bounded_millis("settle_delay_ms", self.settle_delay_ms, d.settle_delay_ms),
            injection_grace: bounded_millis(
                "injection_grace_ms",
                self.injection_grace_ms,
                d.injection_grace_ms,
            ),
            artifact_load_timeout: bounded_millis(
                "artifact_load_timeout_ms",
                self.artifact_load_timeout_ms,
                d.artifact_load_timeout_ms,
            ),
            submit_artifact_url: self.endpoint_url(Endpoint::SubmitArtifact),
            submit_record_url: self.endpoint_url(Endpoint::SubmitRecord),
            receive_status_url: self.endpoint_url(Endpoint::ReceiveStatus),
            timeout_redirect_url: self.timeout_redirect_url.clone(),
            completion_redirect_url: self.completion_redirect_url.clone(),
            failure_redirect_url: self.failure_redirect_url.clone(),
            channel: self.channel_config(),
        }
    }
}

/// 通道层使用的时间参数
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub simulation_delay: Duration,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    pub max_reconnect_attempts: u32,
}

/// 会话控制器使用的参数
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub countdown: Duration,
    pub settle_delay: Duration,
    pub injection_grace: Duration,
    pub artifact_load_timeout: Duration,
    pub submit_artifact_url: Option<String>,
    pub submit_record_url: Option<String>,
    pub receive_status_url: Option<String>,
    pub timeout_redirect_url: String,
    pub completion_redirect_url: String,
    pub failure_redirect_url: String,
    pub channel: ChannelConfig,
}

impl SessionConfig {
    pub fn endpoint_url(&self, endpoint: Endpoint) -> Option<&str> {
        match endpoint {
            Endpoint::SubmitArtifact => self.submit_artifact_url.as_deref(),
            Endpoint::SubmitRecord => self.submit_record_url.as_deref(),
            Endpoint::ReceiveStatus => self.receive_status_url.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_marker_is_last_path_segment() {
        let config = Config::default();
        assert_eq!(config.target_marker(), "entry-registation-form");
    }

    #[test]
    fn test_default_endpoints() {
        let config = Config::default();
        assert_eq!(
            config.endpoint_url(Endpoint::SubmitArtifact).as_deref(),
            Some("ws://localhost:60001/sendDocumentSignalApi")
        );
        assert_eq!(
            config.endpoint_url(Endpoint::ReceiveStatus).as_deref(),
            Some("ws://localhost:60001/keepReceiptApi")
        );
    }

    #[test]
    fn test_simulation_mode_has_no_endpoints() {
        let config = Config {
            simulation_mode: true,
            ..Config::default()
        };
        assert!(config.endpoint_url(Endpoint::SubmitRecord).is_none());
        assert!(config.session_config().submit_artifact_url.is_none());
    }

    #[test]
    fn test_countdown_is_thirty_units() {
        let config = Config {
            time_unit_ms: 10,
            ..Config::default()
        };
        assert_eq!(config.session_config().countdown, Duration::from_millis(300));
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_oversized_durations_fall_back_to_defaults() {
        let config = Config {
            time_unit_ms: 1000,
            countdown_units: u32::MAX,
            poll_interval_units: u32::MAX,
            settle_delay_ms: u64::MAX,
            reconnect_cap_ms: u64::MAX,
            ..Config::default()
        };
        let session = config.session_config();
        assert_eq!(session.countdown, Duration::from_secs(30));
        assert_eq!(session.settle_delay, Duration::from_millis(2000));
        assert_eq!(session.channel.reconnect_cap, Duration::from_millis(10_000));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));

        let huge_unit = Config {
            time_unit_ms: u64::MAX,
            ..Config::default()
        };
        assert_eq!(huge_unit.countdown(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("ws_port = 61000\nsimulation_mode = true").unwrap();
        assert_eq!(config.ws_port, 61000);
        assert!(config.simulation_mode);
        assert_eq!(config.countdown_units, 30);
    }
}
