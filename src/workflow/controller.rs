//! 会话控制器 - 流程层
//!
//! 核心职责：驱动两段流程的状态机
//!
//! 证件阶段：
//! 1. 显示遮罩层，连接 submit-artifact，开始倒计时
//! 2. 收到图片 → 关闭连接、隐藏遮罩 → 填充图片 → 下一步
//!
//! 凭条阶段：
//! 1. 显示遮罩层，连接 submit-record，开始倒计时
//! 2. 连接成功 → 提取凭条数据并发送一次
//! 3. 等待片刻 → 切换到 receive-status，重新倒计时
//! 4. 收到 `isKeep: 1` → 关闭连接、隐藏遮罩 → 跳转完成页
//!
//! 任何阶段倒计时结束都会跳转超时页。倒计时和消息处理谁先到谁生效，
//! 由会话的 processing guard 保证收尾动作只执行一次。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::channel::{Channel, ChannelEnvelope, ChannelEvent, InboundMessage};
use crate::config::{Endpoint, SessionConfig, MAX_WAIT};
use crate::error::{ChannelError, SessionError};
use crate::models::{
    Artifact, ExtractedRecord, PageClass, PageEvent, PhaseKind, ReceiptStatus,
};
use crate::services::{EmbeddedArtifact, FormInjector, PageHost, PageInspector};
use crate::workflow::session::{Phase, ReceiptStep, Session};

/// 控制器被唤醒的原因
#[derive(Debug)]
pub enum Wake {
    Page(PageEvent),
    Deadline,
    Settle,
    Channel(ChannelEnvelope),
}

/// 会话控制器
///
/// - 独占当前会话和当前通道
/// - 所有处理都在同一个任务里按顺序执行，不需要锁
/// - 只依赖页面能力（services），不直接接触浏览器
pub struct SessionController {
    config: SessionConfig,
    inspector: Arc<dyn PageInspector>,
    injector: Arc<dyn FormInjector>,
    host: Arc<dyn PageHost>,
    session: Option<Session>,
    channel: Option<Channel>,
    events_tx: mpsc::UnboundedSender<ChannelEnvelope>,
    events_rx: mpsc::UnboundedReceiver<ChannelEnvelope>,
    next_epoch: u64,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        inspector: Arc<dyn PageInspector>,
        injector: Arc<dyn FormInjector>,
        host: Arc<dyn PageHost>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            inspector,
            injector,
            host,
            session: None,
            channel: None,
            events_tx,
            events_rx,
            next_epoch: 1,
        }
    }

    /// 当前阶段；从未进入过任何阶段时为 `Idle`
    pub fn phase(&self) -> Phase {
        self.session
            .as_ref()
            .map(Session::phase)
            .unwrap_or(Phase::Idle)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_active)
    }

    // ========== 事件循环 ==========

    /// 主循环：处理页面事件、倒计时和通道事件，直到页面观察者退出
    pub async fn run(&mut self, mut page_events: mpsc::Receiver<PageEvent>) {
        loop {
            let wake = tokio::select! {
                event = page_events.recv() => match event {
                    Some(event) => Wake::Page(event),
                    None => break,
                },
                wake = self.next_session_wake() => wake,
            };
            self.dispatch(wake).await;
        }
        debug!("页面观察者已退出，控制器循环结束");
    }

    /// 驱动当前会话直到终止状态（没有活动会话时立即返回）
    pub async fn run_until_terminal(&mut self) -> Phase {
        while self.is_active() {
            let wake = self.next_session_wake().await;
            self.dispatch(wake).await;
        }
        self.phase()
    }

    /// 等待下一个会话相关事件；可以被安全取消
    async fn next_session_wake(&mut self) -> Wake {
        let deadline = self.session.as_ref().and_then(Session::deadline);
        let settle_at = self.session.as_ref().and_then(Session::settle_at);

        tokio::select! {
            _ = sleep_until_opt(deadline) => Wake::Deadline,
            _ = sleep_until_opt(settle_at) => Wake::Settle,
            Some(envelope) = self.events_rx.recv() => Wake::Channel(envelope),
        }
    }

    pub async fn dispatch(&mut self, wake: Wake) {
        match wake {
            Wake::Page(event) => self.on_page_event(event).await,
            Wake::Deadline => self.on_deadline_elapsed().await,
            Wake::Settle => self.on_settle_elapsed().await,
            Wake::Channel(envelope) => self.on_channel_envelope(envelope).await,
        }
    }

    async fn on_channel_envelope(&mut self, envelope: ChannelEnvelope) {
        let current = self
            .session
            .as_ref()
            .filter(|s| s.is_active())
            .map(Session::epoch);
        if current != Some(envelope.epoch) {
            debug!(
                "忽略过期通道事件 (通道 #{}, 当前 {:?}): {:?}",
                envelope.epoch, current, envelope.event
            );
            return;
        }

        match envelope.event {
            ChannelEvent::Opened => self.on_channel_open().await,
            ChannelEvent::Message(InboundMessage::Artifact(artifact)) => {
                self.on_artifact_received(artifact).await
            }
            ChannelEvent::Message(InboundMessage::Status(status)) => {
                self.on_receipt_status(status).await
            }
            ChannelEvent::Fatal(err) => self.on_channel_fatal(err).await,
        }
    }

    // ========== 阶段入口 ==========

    /// 页面分类变化
    pub async fn on_page_event(&mut self, event: PageEvent) {
        debug!("页面变化: {:?} {}", event.class, event.url);
        let requested = match event.class {
            PageClass::SuccessPage => PhaseKind::ReceiptAck,
            PageClass::FormStep1 => PhaseKind::ArtifactIntake,
            PageClass::Neither => {
                if !self.is_active() {
                    if let Err(e) = self.host.hide_overlay().await {
                        debug!("隐藏遮罩层失败: {}", e);
                    }
                }
                return;
            }
        };

        if let Err(e) = self.enter_phase(requested).await {
            debug!("{}", e);
        }
    }

    /// 进入阶段：开始倒计时、显示遮罩层、连接阶段的第一个端点
    pub async fn enter_phase(&mut self, kind: PhaseKind) -> Result<(), SessionError> {
        if let Some(active) = self.session.as_ref().filter(|s| s.is_active()) {
            return Err(SessionError::AlreadyActive {
                active: active.kind(),
                requested: kind,
            });
        }

        let epoch = self.allocate_epoch();
        let deadline = instant_after(self.config.countdown);
        self.session = Some(Session::new(kind, deadline, epoch));
        info!(
            "🚀 进入阶段 {:?}，倒计时 {}ms",
            kind,
            self.config.countdown.as_millis()
        );

        if let Err(e) = self.host.show_overlay(kind).await {
            warn!("显示遮罩层失败: {}", e);
        }

        let endpoint = match kind {
            PhaseKind::ArtifactIntake => Endpoint::SubmitArtifact,
            PhaseKind::ReceiptAck => Endpoint::SubmitRecord,
        };
        self.open_channel(endpoint, epoch);
        Ok(())
    }

    // ========== 会话事件处理 ==========

    /// 倒计时结束
    pub async fn on_deadline_elapsed(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.try_begin_terminal() {
            debug!("{} 已在收尾，忽略倒计时", session);
            return;
        }
        warn!("⏰ {} 倒计时结束，跳转超时页面", session);

        let destination = self.config.timeout_redirect_url.clone();
        self.terminate(Phase::TimedOut, Some(destination)).await;
    }

    /// 收到证件图片
    pub async fn on_artifact_received(&mut self, artifact: Artifact) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase() != Phase::AwaitingArtifact {
            warn!("{} 不在等待证件阶段，忽略图片消息", session);
            return;
        }
        if !session.try_begin_terminal() {
            debug!("{} 已在处理中，忽略重复的图片消息", session);
            return;
        }
        info!(
            "📥 {} 收到证件图片 ({}, {} 字符)",
            session,
            artifact.media_type(),
            artifact.payload().len()
        );

        self.close_channel();
        self.hide_overlay().await;

        let grace = self.config.injection_grace;
        if !self.inject_with_retry(&artifact, grace).await {
            error!("❌ 证件图片填充失败，仍尝试下一步，可能需要人工处理");
        }
        sleep(grace).await;
        if !self.advance_with_retry(grace).await {
            error!("❌ 无法进入下一步，需要人工处理");
        }

        if let Some(session) = self.session.as_mut() {
            session.finish(Phase::Complete);
            info!("✅ {} 证件阶段完成", session);
        }
    }

    /// 收到领取状态
    pub async fn on_receipt_status(&mut self, status: ReceiptStatus) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase() != Phase::AwaitingReceiptAck(ReceiptStep::Listening) {
            debug!("{} 未在监听领取状态，忽略 {:?}", session, status);
            return;
        }

        match status {
            ReceiptStatus::Pending => debug!("{} 凭条尚未领取，继续等待", session),
            ReceiptStatus::Unknown(value) => {
                warn!("{} 未知的领取状态 isKeep={}，忽略", session, value)
            }
            ReceiptStatus::Confirmed => {
                if !session.try_begin_terminal() {
                    debug!("{} 已在收尾，忽略领取确认", session);
                    return;
                }
                info!("✅ {} 凭条已领取", session);
                let destination = self.config.completion_redirect_url.clone();
                self.terminate(Phase::Complete, Some(destination)).await;
            }
        }
    }

    /// 通道连接成功
    pub async fn on_channel_open(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        match session.phase() {
            Phase::AwaitingArtifact => info!("{} 已连接，等待本地程序发送证件数据", session),
            Phase::AwaitingReceiptAck(ReceiptStep::Submitting) if !session.record_sent() => {
                self.submit_record().await
            }
            Phase::AwaitingReceiptAck(ReceiptStep::Listening) => {
                info!("{} 已连接，开始监听凭条领取状态", session)
            }
            _ => debug!("{} 重新连接成功", session),
        }
    }

    /// 凭条数据发送后的等待结束，切换到状态端点
    pub async fn on_settle_elapsed(&mut self) {
        let epoch = self.next_epoch;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.clear_settle();
        if session.processing_guard()
            || session.phase() != Phase::AwaitingReceiptAck(ReceiptStep::Submitting)
        {
            return;
        }

        self.next_epoch += 1;
        session.begin_listening(epoch, instant_after(self.config.countdown));
        info!("📨 {} 切换到领取状态监听，重新倒计时", session);

        self.close_channel();
        self.open_channel(Endpoint::ReceiveStatus, epoch);
    }

    /// 重连次数用尽
    pub async fn on_channel_fatal(&mut self, err: ChannelError) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.try_begin_terminal() {
            return;
        }
        error!("❌ {} 本地程序连接失败: {}", session, err);
        if let Some(channel) = self.channel.as_ref() {
            error!(
                "[通道 #{}] {} 已重连 {} 次",
                channel.epoch(),
                channel.endpoint().unwrap_or("模拟"),
                channel.status().reconnect_attempt
            );
        }
        let destination = self.config.failure_redirect_url.clone();
        self.terminate(Phase::TimedOut, Some(destination)).await;
    }

    /// 关闭通道并隐藏遮罩（程序退出时调用）
    pub async fn shutdown(&mut self) {
        self.close_channel();
        if self.is_active() {
            self.hide_overlay().await;
        }
    }

    // ========== 内部步骤 ==========

    fn allocate_epoch(&mut self) -> u64 {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        epoch
    }

    fn open_channel(&mut self, endpoint: Endpoint, epoch: u64) {
        self.close_channel();
        let url = self.config.endpoint_url(endpoint);
        debug!("打开通道 #{} → {} ({:?})", epoch, endpoint.label(), url);
        self.channel = Some(Channel::open(
            url,
            epoch,
            self.events_tx.clone(),
            &self.config.channel,
        ));
    }

    fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }

    async fn hide_overlay(&self) {
        if let Err(e) = self.host.hide_overlay().await {
            warn!("隐藏遮罩层失败: {}", e);
        }
    }

    /// 收尾：关闭通道、隐藏遮罩、跳转，调用方必须已拿到 processing guard
    async fn terminate(&mut self, outcome: Phase, destination: Option<String>) {
        self.close_channel();
        self.hide_overlay().await;

        if let Some(url) = destination {
            if let Err(e) = self.host.navigate(&url).await {
                error!("跳转到 {} 失败: {}", url, e);
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.finish(outcome);
            info!("{} 会话结束", session);
        }
    }

    async fn inject_with_retry(&self, artifact: &Artifact, grace: Duration) -> bool {
        for attempt in 1..=2 {
            match self.injector.inject_artifact(artifact).await {
                Ok(true) => return true,
                Ok(false) => warn!("填充证件图片失败 (第 {} 次)", attempt),
                Err(e) => warn!("{} (第 {} 次)", SessionError::Injection(e.to_string()), attempt),
            }
            if attempt == 1 {
                sleep(grace).await;
            }
        }
        false
    }

    async fn advance_with_retry(&self, grace: Duration) -> bool {
        for attempt in 1..=2 {
            match self.injector.advance_wizard().await {
                Ok(true) => return true,
                Ok(false) => warn!("点击下一步失败 (第 {} 次)", attempt),
                Err(e) => warn!("点击下一步出错: {} (第 {} 次)", e, attempt),
            }
            if attempt == 1 {
                sleep(grace).await;
            }
        }
        false
    }

    /// 提取并发送凭条数据；失败时不结束会话，交给倒计时处理
    async fn submit_record(&mut self) {
        let record = match self.extract_record().await {
            Ok(record) => record,
            Err(e) => {
                warn!("⚠️ {}，本次不发送，等待倒计时", e);
                return;
            }
        };
        let message = match record.to_message() {
            Ok(message) => message,
            Err(e) => {
                error!("序列化凭条数据失败: {}", e);
                return;
            }
        };

        let sent = self
            .channel
            .as_ref()
            .is_some_and(|channel| channel.send(message));
        if !sent {
            warn!("凭条数据未发送，等待重新连接");
            return;
        }

        let settle_at = instant_after(self.config.settle_delay);
        if let Some(session) = self.session.as_mut() {
            session.mark_record_sent(settle_at);
            info!(
                "📤 {} 已发送凭条数据 ({} 个字段)",
                session,
                record.fields().len()
            );
        }
    }

    async fn extract_record(&self) -> Result<ExtractedRecord, SessionError> {
        let rows = self
            .inspector
            .extract_visible_record()
            .await
            .map_err(|e| SessionError::Extraction(e.to_string()))?;

        let embedded = self
            .inspector
            .extract_embedded_artifact()
            .await
            .map_err(|e| SessionError::Extraction(e.to_string()))?;

        let qrcode = match embedded {
            EmbeddedArtifact::Ready(artifact) => artifact,
            EmbeddedArtifact::Pending(url) => {
                info!("二维码需要异步加载: {}", url);
                match timeout(
                    self.config.artifact_load_timeout,
                    self.inspector.load_artifact(&url),
                )
                .await
                {
                    Ok(Ok(Some(artifact))) => artifact,
                    Ok(Ok(None)) => {
                        return Err(SessionError::Extraction("二维码图片加载失败".to_string()))
                    }
                    Ok(Err(e)) => return Err(SessionError::Extraction(e.to_string())),
                    Err(_) => {
                        return Err(SessionError::Extraction("二维码图片加载超时".to_string()))
                    }
                }
            }
            EmbeddedArtifact::Missing => {
                return Err(SessionError::Extraction("未找到二维码".to_string()))
            }
        };

        if qrcode.is_empty() {
            return Err(SessionError::Extraction("二维码内容为空".to_string()));
        }
        if rows.is_empty() {
            warn!("成功页面没有可提取的字段，只发送二维码");
        }

        Ok(ExtractedRecord::from_rows(&rows, &qrcode))
    }
}

/// `now + delay`，超出时钟范围时按 `MAX_WAIT` 计算
fn instant_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or_else(|| {
        warn!("等待时间 {:?} 超出范围，按 {:?} 处理", delay, MAX_WAIT);
        now + MAX_WAIT
    })
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::models::RecordField;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const TIMEOUT_URL: &str = "https://example.test/timeout";
    const DONE_URL: &str = "https://example.test/done";
    const FAIL_URL: &str = "https://example.test/failed";

    /// 记录所有页面操作的假页面
    #[derive(Default)]
    struct FakePage {
        calls: Mutex<Vec<String>>,
        inject_results: Mutex<VecDeque<bool>>,
        embedded: Mutex<Option<EmbeddedArtifact>>,
        remote: Mutex<RemoteImage>,
    }

    /// 远程二维码的加载结果
    #[derive(Clone, Default)]
    enum RemoteImage {
        #[default]
        Unavailable,
        Loads(Artifact),
        Hangs,
    }

    impl FakePage {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageInspector for FakePage {
        async fn current_url(&self) -> Result<String> {
            Ok("https://example.test/entry-registation-form".to_string())
        }
        async fn title(&self) -> Result<String> {
            Ok("入境卡".to_string())
        }
        async fn is_target_page(&self) -> Result<bool> {
            Ok(true)
        }
        async fn is_page_fully_loaded(&self) -> Result<bool> {
            Ok(true)
        }
        async fn is_step_container_present(&self) -> Result<bool> {
            Ok(true)
        }
        async fn is_target_step1_page(&self) -> Result<bool> {
            Ok(true)
        }
        async fn is_success_page(&self) -> Result<bool> {
            Ok(false)
        }
        async fn extract_visible_record(&self) -> Result<Vec<RecordField>> {
            self.record("extract");
            Ok(vec![RecordField::new("姓名", "ZHANG SAN")])
        }
        async fn extract_embedded_artifact(&self) -> Result<EmbeddedArtifact> {
            Ok(self
                .embedded
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(EmbeddedArtifact::Missing))
        }
        async fn load_artifact(&self, url: &str) -> Result<Option<Artifact>> {
            self.record(format!("load:{}", url));
            let remote = self.remote.lock().unwrap().clone();
            match remote {
                RemoteImage::Unavailable => Ok(None),
                RemoteImage::Loads(artifact) => Ok(Some(artifact)),
                RemoteImage::Hangs => std::future::pending().await,
            }
        }
    }

    #[async_trait]
    impl FormInjector for FakePage {
        async fn inject_artifact(&self, _artifact: &Artifact) -> Result<bool> {
            self.record("inject");
            Ok(self.inject_results.lock().unwrap().pop_front().unwrap_or(true))
        }
        async fn advance_wizard(&self) -> Result<bool> {
            self.record("advance");
            Ok(true)
        }
    }

    #[async_trait]
    impl PageHost for FakePage {
        async fn show_overlay(&self, phase: PhaseKind) -> Result<()> {
            self.record(format!("show:{:?}", phase));
            Ok(())
        }
        async fn hide_overlay(&self) -> Result<()> {
            self.record("hide");
            Ok(())
        }
        async fn navigate(&self, url: &str) -> Result<()> {
            self.record(format!("navigate:{}", url));
            Ok(())
        }
    }

    fn test_config(simulation_delay: Duration) -> SessionConfig {
        SessionConfig {
            countdown: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            injection_grace: Duration::from_millis(500),
            artifact_load_timeout: Duration::from_secs(5),
            submit_artifact_url: None,
            submit_record_url: None,
            receive_status_url: None,
            timeout_redirect_url: TIMEOUT_URL.to_string(),
            completion_redirect_url: DONE_URL.to_string(),
            failure_redirect_url: FAIL_URL.to_string(),
            channel: ChannelConfig {
                simulation_delay,
                reconnect_base: Duration::from_millis(1000),
                reconnect_cap: Duration::from_millis(10_000),
                max_reconnect_attempts: 5,
            },
        }
    }

    fn controller(page: &Arc<FakePage>, simulation_delay: Duration) -> SessionController {
        SessionController::new(
            test_config(simulation_delay),
            page.clone(),
            page.clone(),
            page.clone(),
        )
    }

    fn artifact() -> Artifact {
        Artifact::parse("data:image/png;base64,QUJD")
    }

    #[tokio::test(start_paused = true)]
    async fn test_artifact_then_deadline_runs_terminal_sequence_once() {
        let page = Arc::new(FakePage::default());
        let mut ctrl = controller(&page, Duration::from_secs(60));

        ctrl.enter_phase(PhaseKind::ArtifactIntake).await.unwrap();
        ctrl.on_artifact_received(artifact()).await;
        ctrl.on_deadline_elapsed().await;
        ctrl.on_artifact_received(artifact()).await;

        assert_eq!(ctrl.phase(), Phase::Complete);
        assert_eq!(page.count("inject"), 1);
        assert_eq!(page.count("advance"), 1);
        assert_eq!(page.count("hide"), 1);
        assert_eq!(page.count("navigate"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_then_late_artifact_is_ignored() {
        let page = Arc::new(FakePage::default());
        let mut ctrl = controller(&page, Duration::from_secs(60));

        ctrl.enter_phase(PhaseKind::ArtifactIntake).await.unwrap();
        ctrl.on_deadline_elapsed().await;
        ctrl.on_deadline_elapsed().await;
        ctrl.on_artifact_received(artifact()).await;

        assert_eq!(ctrl.phase(), Phase::TimedOut);
        assert_eq!(page.count("inject"), 0);
        assert_eq!(page.count(&format!("navigate:{}", TIMEOUT_URL)), 1);
        assert_eq!(page.count("navigate"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_injection_failure_retries_once_then_still_advances() {
        let page = Arc::new(FakePage::default());
        page.inject_results
            .lock()
            .unwrap()
            .extend([false, false]);
        let mut ctrl = controller(&page, Duration::from_secs(60));

        ctrl.enter_phase(PhaseKind::ArtifactIntake).await.unwrap();
        ctrl.on_artifact_received(artifact()).await;

        assert_eq!(page.count("inject"), 2);
        assert_eq!(page.count("advance"), 1);
        assert_eq!(ctrl.phase(), Phase::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentry_is_rejected_while_active() {
        let page = Arc::new(FakePage::default());
        let mut ctrl = controller(&page, Duration::from_secs(60));

        ctrl.enter_phase(PhaseKind::ArtifactIntake).await.unwrap();
        let err = ctrl.enter_phase(PhaseKind::ReceiptAck).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyActive { .. }));
        assert_eq!(page.count("show"), 1);

        ctrl.on_deadline_elapsed().await;
        ctrl.enter_phase(PhaseKind::ReceiptAck).await.unwrap();
        assert_eq!(
            ctrl.phase(),
            Phase::AwaitingReceiptAck(ReceiptStep::Submitting)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_status_semantics() {
        let page = Arc::new(FakePage::default());
        let mut ctrl = controller(&page, Duration::from_secs(60));

        ctrl.enter_phase(PhaseKind::ReceiptAck).await.unwrap();
        // 未切换到监听前的状态消息被忽略
        ctrl.on_receipt_status(ReceiptStatus::Confirmed).await;
        assert_eq!(page.count("navigate"), 0);

        ctrl.on_settle_elapsed().await;
        let listening = Phase::AwaitingReceiptAck(ReceiptStep::Listening);
        assert_eq!(ctrl.phase(), listening);
        let calls_before = page.calls().len();

        ctrl.on_receipt_status(ReceiptStatus::Pending).await;
        ctrl.on_receipt_status(ReceiptStatus::Unknown("2".to_string())).await;
        assert_eq!(ctrl.phase(), listening);
        assert_eq!(page.calls().len(), calls_before);

        ctrl.on_receipt_status(ReceiptStatus::Confirmed).await;
        ctrl.on_receipt_status(ReceiptStatus::Confirmed).await;
        ctrl.on_deadline_elapsed().await;

        assert_eq!(ctrl.phase(), Phase::Complete);
        assert_eq!(page.count(&format!("navigate:{}", DONE_URL)), 1);
        assert_eq!(page.count("navigate"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_failure_leaves_session_to_countdown() {
        let page = Arc::new(FakePage::default());
        let mut ctrl = controller(&page, Duration::from_secs(60));

        ctrl.enter_phase(PhaseKind::ReceiptAck).await.unwrap();
        ctrl.on_channel_open().await;

        assert_eq!(page.count("extract"), 1);
        assert!(!ctrl.session().unwrap().record_sent());
        assert_eq!(
            ctrl.phase(),
            Phase::AwaitingReceiptAck(ReceiptStep::Submitting)
        );

        assert_eq!(ctrl.run_until_terminal().await, Phase::TimedOut);
        assert_eq!(page.count(&format!("navigate:{}", TIMEOUT_URL)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_channel_events_are_ignored() {
        let page = Arc::new(FakePage::default());
        let mut ctrl = controller(&page, Duration::from_secs(60));

        ctrl.enter_phase(PhaseKind::ArtifactIntake).await.unwrap();
        let stale = ctrl.session().unwrap().epoch() + 100;
        ctrl.dispatch(Wake::Channel(ChannelEnvelope {
            epoch: stale,
            event: ChannelEvent::Message(InboundMessage::Artifact(artifact())),
        }))
        .await;

        assert_eq!(ctrl.phase(), Phase::AwaitingArtifact);
        assert_eq!(page.count("inject"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_artifact_completes_intake() {
        let page = Arc::new(FakePage::default());
        let mut ctrl = controller(&page, Duration::from_secs(5));

        ctrl.enter_phase(PhaseKind::ArtifactIntake).await.unwrap();
        assert_eq!(ctrl.run_until_terminal().await, Phase::Complete);
        assert_eq!(page.count("inject"), 1);
        assert_eq!(page.count("advance"), 1);
        assert_eq!(page.count("navigate"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out() {
        let page = Arc::new(FakePage::default());
        let mut ctrl = controller(&page, Duration::from_secs(45));

        ctrl.enter_phase(PhaseKind::ArtifactIntake).await.unwrap();
        assert_eq!(ctrl.run_until_terminal().await, Phase::TimedOut);

        // 模拟消息原本会在第 45 秒到达，通道已关闭后不再产生任何动作
        sleep(Duration::from_secs(60)).await;
        assert_eq!(page.count("inject"), 0);
        assert_eq!(page.count("navigate"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_neither_page_hides_overlay_only_when_idle() {
        let page = Arc::new(FakePage::default());
        let mut ctrl = controller(&page, Duration::from_secs(60));
        let neither = PageEvent {
            url: "https://example.test/other".to_string(),
            class: PageClass::Neither,
        };

        ctrl.on_page_event(neither.clone()).await;
        assert_eq!(page.count("hide"), 1);

        ctrl.on_page_event(PageEvent {
            url: "https://example.test/entry-registation-form".to_string(),
            class: PageClass::FormStep1,
        })
        .await;
        assert_eq!(ctrl.phase(), Phase::AwaitingArtifact);

        ctrl.on_page_event(neither).await;
        assert_eq!(page.count("hide"), 1);
        assert_eq!(ctrl.phase(), Phase::AwaitingArtifact);
    }

    fn with_remote_qrcode(remote: RemoteImage) -> Arc<FakePage> {
        let page = Arc::new(FakePage::default());
        *page.embedded.lock().unwrap() = Some(EmbeddedArtifact::Pending(
            "https://s.nia.gov.cn/qrcode.png".to_string(),
        ));
        *page.remote.lock().unwrap() = remote;
        page
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_qrcode_is_loaded_into_record() {
        let loaded = Artifact::parse("data:image/png;base64,UVJDT0RF");
        let page = with_remote_qrcode(RemoteImage::Loads(loaded.clone()));
        let ctrl = controller(&page, Duration::from_secs(60));

        let record = ctrl.extract_record().await.unwrap();
        assert_eq!(record.qrcode(), loaded.to_data_uri());
        assert_eq!(record.get("name"), Some("ZHANG SAN"));
        assert_eq!(page.count("load:https://s.nia.gov.cn/qrcode.png"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_qrcode_load_gives_up_and_times_out() {
        let page = with_remote_qrcode(RemoteImage::Hangs);
        let mut ctrl = controller(&page, Duration::from_secs(60));

        ctrl.enter_phase(PhaseKind::ReceiptAck).await.unwrap();
        let started = Instant::now();
        ctrl.on_channel_open().await;

        // 加载等待受 artifact_load_timeout 限制
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(!ctrl.session().unwrap().record_sent());
        assert_eq!(
            ctrl.phase(),
            Phase::AwaitingReceiptAck(ReceiptStep::Submitting)
        );

        assert_eq!(ctrl.run_until_terminal().await, Phase::TimedOut);
        assert_eq!(page.count(&format!("navigate:{}", TIMEOUT_URL)), 1);
        assert_eq!(page.count("navigate"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_countdown_does_not_overflow() {
        let page = Arc::new(FakePage::default());
        let mut config = test_config(Duration::from_secs(5));
        config.countdown = Duration::MAX;
        config.settle_delay = Duration::MAX;
        let mut ctrl = SessionController::new(config, page.clone(), page.clone(), page.clone());

        ctrl.enter_phase(PhaseKind::ArtifactIntake).await.unwrap();
        let deadline = ctrl.session().unwrap().deadline().unwrap();
        assert!(deadline <= Instant::now() + MAX_WAIT);

        // 模拟图片在倒计时之前到达
        assert_eq!(ctrl.run_until_terminal().await, Phase::Complete);
    }
}
