//! 本地程序消息解析
//!
//! 解析顺序：
//! 1. JSON 对象 → `isKeep` 状态 → `base64` → `image` → `data`
//! 2. 非 JSON 文本 → 以 `data:image` 开头或长度超过 100 时当作 base64 图片
//! 3. 其他一律丢弃（只记录警告）

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::DecodeError;
use crate::models::{Artifact, ReceiptStatus};

/// 长度超过该值的非 JSON 文本视为 base64 图片
const RAW_ARTIFACT_MIN_LEN: usize = 100;

/// 解析后的入站消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// 证件图片
    Artifact(Artifact),
    /// 凭条领取状态
    Status(ReceiptStatus),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Status {
        #[serde(rename = "isKeep")]
        is_keep: JsonValue,
    },
    Artifact {
        #[serde(default)]
        base64: Option<String>,
        #[serde(default)]
        image: Option<String>,
        #[serde(default)]
        data: Option<String>,
    },
}

/// 解析一条文本消息
pub fn decode(text: &str) -> Result<InboundMessage, DecodeError> {
    match serde_json::from_str::<JsonValue>(text) {
        Ok(value) if value.is_object() => decode_object(value),
        Ok(_) => Err(DecodeError::UnrecognizedShape),
        Err(_) => decode_raw(text),
    }
}

fn decode_object(value: JsonValue) -> Result<InboundMessage, DecodeError> {
    let payload =
        WirePayload::deserialize(value).map_err(|_| DecodeError::UnrecognizedShape)?;

    match payload {
        WirePayload::Status { is_keep } => {
            Ok(InboundMessage::Status(ReceiptStatus::from_is_keep(&is_keep)))
        }
        WirePayload::Artifact { base64, image, data } => [base64, image, data]
            .into_iter()
            .flatten()
            .find(|candidate| !candidate.trim().is_empty())
            .map(|raw| InboundMessage::Artifact(Artifact::parse(raw)))
            .ok_or(DecodeError::UnrecognizedShape),
    }
}

fn decode_raw(text: &str) -> Result<InboundMessage, DecodeError> {
    let trimmed = text.trim();
    if trimmed.starts_with("data:image") || trimmed.len() > RAW_ARTIFACT_MIN_LEN {
        Ok(InboundMessage::Artifact(Artifact::parse(trimmed)))
    } else {
        Err(DecodeError::UnrecognizedText { len: text.len() })
    }
}
