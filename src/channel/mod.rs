//! 本地程序 WebSocket 通道
//!
//! 每个 `Channel` 绑定一个端点，在后台任务中维护连接、按指数退避重连、解析消息。
//! 连接事件通过 `mpsc` 发回会话控制器，并带上打开时分配的 `epoch`，
//! 控制器据此丢弃已被取代的通道发来的迟到事件。

pub mod backoff;
pub mod codec;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, DecodeError};
use crate::models::artifact::SIMULATED_ARTIFACT;
use crate::models::Artifact;
use crate::utils::logging::truncate_text;

pub use backoff::reconnect_delay;
pub use codec::{decode, InboundMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// 连接状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub reconnect_attempt: u32,
}

/// 通道事件
#[derive(Debug)]
pub enum ChannelEvent {
    /// 连接已建立（每次重连成功都会发送）
    Opened,
    /// 收到可识别的消息
    Message(InboundMessage),
    /// 重连次数用尽
    Fatal(ChannelError),
}

/// 带 epoch 的通道事件
#[derive(Debug)]
pub struct ChannelEnvelope {
    pub epoch: u64,
    pub event: ChannelEvent,
}

/// 到单个端点的双工连接
pub struct Channel {
    endpoint: Option<String>,
    epoch: u64,
    outbound: mpsc::UnboundedSender<String>,
    status: watch::Receiver<ConnectionStatus>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Channel {
    /// 打开通道
    ///
    /// `endpoint` 为空时进入模拟模式：等待 `simulation_delay` 后发送一条模拟图片消息，不建立任何连接。
    /// 必须在 tokio 运行时中调用。
    pub fn open(
        endpoint: Option<&str>,
        epoch: u64,
        events: mpsc::UnboundedSender<ChannelEnvelope>,
        config: &ChannelConfig,
    ) -> Self {
        let endpoint = endpoint
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus {
            state: ConnectionState::Connecting,
            reconnect_attempt: 0,
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = Worker {
            epoch,
            events,
            status: status_tx,
            shutdown: shutdown_rx,
            config: config.clone(),
        };

        match endpoint.clone() {
            Some(url) => {
                debug!("[通道 #{}] 连接 {}", epoch, url);
                tokio::spawn(worker.run_connection(url, outbound_rx));
            }
            None => {
                warn!(
                    "[通道 #{}] ⚠️ WebSocket 地址为空，使用模拟模式 - 将在 {}ms 后发送模拟 base64 数据",
                    epoch,
                    config.simulation_delay.as_millis()
                );
                warn!("提示：请配置正确的 WebSocket 地址连接到本地可执行程序");
                tokio::spawn(worker.run_simulation());
            }
        }

        Self {
            endpoint,
            epoch,
            outbound: outbound_tx,
            status: status_rx,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn is_simulated(&self) -> bool {
        self.endpoint.is_none()
    }

    pub fn status(&self) -> ConnectionStatus {
        if self.shutdown.is_none() {
            return ConnectionStatus {
                state: ConnectionState::Closed,
                ..*self.status.borrow()
            };
        }
        *self.status.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.status().state == ConnectionState::Open
    }

    /// 发送一条文本消息；未连接时只记录警告并返回 false
    pub fn send(&self, text: impl Into<String>) -> bool {
        if !self.is_open() {
            warn!("[通道 #{}] WebSocket 未连接，消息未发送", self.epoch);
            return false;
        }
        let text = text.into();
        debug!("[通道 #{}] 发送: {}", self.epoch, truncate_text(&text, 120));
        self.outbound.send(text).is_ok()
    }

    /// 关闭通道，可重复调用
    ///
    /// 取消待执行的重连、释放连接；后台任务退出后不再发送任何事件
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            debug!("[通道 #{}] 关闭", self.epoch);
            let _ = shutdown.send(());
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

/// 连接退出原因
enum PumpExit {
    /// 收到关闭信号或控制器已不再接收事件
    Shutdown,
    /// 连接被对端关闭或出错
    Dropped(String),
}

struct Worker {
    epoch: u64,
    events: mpsc::UnboundedSender<ChannelEnvelope>,
    status: watch::Sender<ConnectionStatus>,
    shutdown: oneshot::Receiver<()>,
    config: ChannelConfig,
}

impl Worker {
    fn emit(&self, event: ChannelEvent) -> bool {
        self.events
            .send(ChannelEnvelope {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }

    fn set_status(&self, state: ConnectionState, reconnect_attempt: u32) {
        self.status.send_replace(ConnectionStatus {
            state,
            reconnect_attempt,
        });
    }

    async fn run_simulation(mut self) {
        self.set_status(ConnectionState::Closed, 0);
        tokio::select! {
            _ = &mut self.shutdown => return,
            _ = sleep(self.config.simulation_delay) => {}
        }
        info!("[通道 #{}] 模拟模式：发送模拟 base64 数据", self.epoch);
        self.emit(ChannelEvent::Message(InboundMessage::Artifact(Artifact::parse(
            SIMULATED_ARTIFACT,
        ))));
    }

    async fn run_connection(mut self, url: String, mut outbound: mpsc::UnboundedReceiver<String>) {
        let mut attempt = 0u32;

        loop {
            self.set_status(ConnectionState::Connecting, attempt);

            let connected = tokio::select! {
                _ = &mut self.shutdown => break,
                result = tokio_tungstenite::connect_async(url.as_str()) => result,
            };

            match connected {
                Ok((stream, _)) => {
                    info!("[通道 #{}] ✓ WebSocket 连接成功: {}", self.epoch, url);
                    attempt = 0;
                    self.set_status(ConnectionState::Open, attempt);
                    if !self.emit(ChannelEvent::Opened) {
                        break;
                    }
                    match self.pump(stream, &mut outbound).await {
                        PumpExit::Shutdown => break,
                        PumpExit::Dropped(reason) => {
                            warn!("[通道 #{}] WebSocket 连接关闭: {}", self.epoch, reason);
                        }
                    }
                }
                Err(e) => {
                    let err = ChannelError::ConnectFailed {
                        endpoint: url.clone(),
                        reason: e.to_string(),
                    };
                    warn!("[通道 #{}] {}", self.epoch, err);
                }
            }

            self.set_status(ConnectionState::Closed, attempt);

            if attempt >= self.config.max_reconnect_attempts {
                let err = ChannelError::RetriesExhausted {
                    endpoint: url.clone(),
                    attempts: attempt,
                };
                error!("[通道 #{}] ❌ {}", self.epoch, err);
                self.emit(ChannelEvent::Fatal(err));
                break;
            }

            attempt += 1;
            let delay = reconnect_delay(
                attempt,
                self.config.reconnect_base,
                self.config.reconnect_cap,
            );
            info!(
                "[通道 #{}] 将在 {}ms 后尝试重连 ({}/{})",
                self.epoch,
                delay.as_millis(),
                attempt,
                self.config.max_reconnect_attempts
            );
            self.set_status(ConnectionState::Connecting, attempt);

            tokio::select! {
                _ = &mut self.shutdown => break,
                _ = sleep(delay) => {}
            }
        }

        self.set_status(ConnectionState::Closed, attempt);
        debug!("[通道 #{}] 后台任务退出", self.epoch);
    }

    /// 在一个已建立的连接上收发消息，直到连接断开或收到关闭信号
    async fn pump(
        &mut self,
        stream: WsStream,
        outbound: &mut mpsc::UnboundedReceiver<String>,
    ) -> PumpExit {
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                _ = &mut self.shutdown => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!("[通道 #{}] 发送关闭帧失败: {}", self.epoch, e);
                    }
                    return PumpExit::Shutdown;
                }
                Some(text) = outbound.recv() => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        let err = ChannelError::from(e);
                        error!("[通道 #{}] 发送消息失败: {}", self.epoch, err);
                        return PumpExit::Dropped(err.to_string());
                    }
                }
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !self.forward(text.as_str()) {
                            return PumpExit::Shutdown;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        warn!("[通道 #{}] {}", self.epoch, DecodeError::Binary { len: bytes.len() });
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return PumpExit::Dropped(format!("对端关闭 {:?}", frame));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return PumpExit::Dropped(e.to_string()),
                    None => return PumpExit::Dropped("连接已结束".to_string()),
                },
            }
        }
    }

    /// 解析并转发一条消息；返回 false 表示控制器已不再接收事件
    fn forward(&self, text: &str) -> bool {
        match decode(text) {
            Ok(message) => {
                debug!(
                    "[通道 #{}] 收到消息: {}",
                    self.epoch,
                    truncate_text(text, 80)
                );
                self.emit(ChannelEvent::Message(message))
            }
            Err(e) => {
                warn!(
                    "[通道 #{}] 丢弃消息: {} ({})",
                    self.epoch,
                    e,
                    truncate_text(text, 80)
                );
                true
            }
        }
    }
}
