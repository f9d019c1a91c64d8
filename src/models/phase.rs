/// 自动化流程的两段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// 第一段：等待本地程序送来证件图片并填入表单
    ArtifactIntake,
    /// 第二段：把凭条信息发给本地程序并等待领取确认
    ReceiptAck,
}

impl PhaseKind {
    /// 遮罩层提示文字
    pub fn overlay_text(self) -> &'static str {
        match self {
            PhaseKind::ArtifactIntake => "请刷证件",
            PhaseKind::ReceiptAck => "请领取凭条",
        }
    }
}
