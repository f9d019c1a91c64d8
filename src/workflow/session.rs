//! 单次流程会话
//!
//! 封装"现在处于哪个阶段、什么时候超时、是否已经开始收尾"这些信息

use std::fmt::Display;

use tokio::time::Instant;

use crate::models::PhaseKind;

/// 凭条阶段的两个子步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStep {
    /// 已连接发送端点，等待发送凭条数据
    Submitting,
    /// 已切换到状态端点，等待领取确认
    Listening,
}

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingArtifact,
    AwaitingReceiptAck(ReceiptStep),
    Complete,
    TimedOut,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::TimedOut)
    }
}

/// 会话
#[derive(Debug)]
pub struct Session {
    kind: PhaseKind,
    phase: Phase,
    deadline: Option<Instant>,
    processing_guard: bool,
    epoch: u64,
    settle_at: Option<Instant>,
    record_sent: bool,
}

impl Session {
    /// 进入阶段时创建
    pub fn new(kind: PhaseKind, deadline: Instant, epoch: u64) -> Self {
        let phase = match kind {
            PhaseKind::ArtifactIntake => Phase::AwaitingArtifact,
            PhaseKind::ReceiptAck => Phase::AwaitingReceiptAck(ReceiptStep::Submitting),
        };
        Self {
            kind,
            phase,
            deadline: Some(deadline),
            processing_guard: false,
            epoch,
            settle_at: None,
            record_sent: false,
        }
    }

    pub fn kind(&self) -> PhaseKind {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn settle_at(&self) -> Option<Instant> {
        self.settle_at
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn processing_guard(&self) -> bool {
        self.processing_guard
    }

    pub fn record_sent(&self) -> bool {
        self.record_sent
    }

    pub fn is_active(&self) -> bool {
        !self.phase.is_terminal()
    }

    /// 尝试开始收尾；只有第一次调用返回 true
    ///
    /// 成功时同时取消倒计时和待切换的监听
    pub fn try_begin_terminal(&mut self) -> bool {
        if self.processing_guard {
            return false;
        }
        self.processing_guard = true;
        self.deadline = None;
        self.settle_at = None;
        true
    }

    /// 进入终止状态
    pub fn finish(&mut self, outcome: Phase) {
        debug_assert!(outcome.is_terminal());
        self.phase = outcome;
        self.deadline = None;
        self.settle_at = None;
    }

    /// 凭条数据已发送，`settle_at` 之后切换到状态监听
    pub fn mark_record_sent(&mut self, settle_at: Instant) {
        self.record_sent = true;
        self.settle_at = Some(settle_at);
    }

    pub fn clear_settle(&mut self) {
        self.settle_at = None;
    }

    /// 切换到状态监听，重新开始倒计时
    pub fn begin_listening(&mut self, epoch: u64, deadline: Instant) {
        self.phase = Phase::AwaitingReceiptAck(ReceiptStep::Listening);
        self.epoch = epoch;
        self.deadline = Some(deadline);
        self.settle_at = None;
    }
}

impl Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[会话 #{} {:?}]", self.epoch, self.phase)
    }
}
