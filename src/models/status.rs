/// 凭条领取状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// `isKeep: 0`，继续等待
    Pending,
    /// `isKeep: 1`，已领取
    Confirmed,
    /// 其他取值，只记录日志
    Unknown(String),
}

impl ReceiptStatus {
    pub fn from_is_keep(value: &serde_json::Value) -> Self {
        match value.as_i64() {
            Some(0) => ReceiptStatus::Pending,
            Some(1) => ReceiptStatus::Confirmed,
            _ => ReceiptStatus::Unknown(value.to_string()),
        }
    }
}
