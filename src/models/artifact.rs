//! 证件/二维码图片载荷
//!
//! 本地程序和页面之间传递的都是 base64 字符串，可能带 `data:image/png;base64,` 前缀

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;

/// 模拟模式下发送的 1x1 透明像素
pub const SIMULATED_ARTIFACT: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8/5+hHgAHggJ/PchI7wAAAABJRU5ErkJggg==";

const DEFAULT_MEDIA_TYPE: &str = "image/png";

fn data_uri_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^data:([^;,]+)(?:;[^,]*)?,").expect("data URI 正则无效")
    })
}

/// 图片载荷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    media_type: Option<String>,
    payload: String,
}

impl Artifact {
    /// 解析原始字符串（纯 base64 或 data URI）
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let raw = raw.trim();
        if let Some(caps) = data_uri_regex().captures(raw) {
            let prefix_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
            return Self {
                media_type: caps.get(1).map(|m| m.as_str().to_string()),
                payload: raw[prefix_len..].to_string(),
            };
        }
        Self {
            media_type: None,
            payload: raw.to_string(),
        }
    }

    /// 由二进制内容构造（远程加载的二维码图片）
    pub fn from_bytes(bytes: &[u8], media_type: Option<&str>) -> Self {
        Self {
            media_type: media_type.map(str::to_string),
            payload: STANDARD.encode(bytes),
        }
    }

    pub fn media_type(&self) -> &str {
        self.media_type.as_deref().unwrap_or(DEFAULT_MEDIA_TYPE)
    }

    pub fn has_media_type(&self) -> bool {
        self.media_type.is_some()
    }

    /// 不带前缀的 base64 内容
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type(), self.payload)
    }

    /// 上传控件使用的文件名，扩展名跟随媒体类型
    pub fn file_name(&self) -> String {
        let ext = self
            .media_type()
            .rsplit('/')
            .next()
            .map(|sub| sub.split('+').next().unwrap_or(sub))
            .filter(|ext| !ext.is_empty())
            .unwrap_or("png");
        format!("id-card.{}", ext)
    }

    /// 解码为原始字节，用于在注入前校验载荷
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.payload.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_uri() {
        let artifact = Artifact::parse("data:image/jpeg;base64,QUJD");
        assert_eq!(artifact.media_type(), "image/jpeg");
        assert_eq!(artifact.payload(), "QUJD");
        assert_eq!(artifact.file_name(), "id-card.jpeg");
        assert_eq!(artifact.decode().unwrap(), b"ABC");
    }

    #[test]
    fn test_parse_plain_base64() {
        let artifact = Artifact::parse("  QUJD \n");
        assert!(!artifact.has_media_type());
        assert_eq!(artifact.media_type(), "image/png");
        assert_eq!(artifact.to_data_uri(), "data:image/png;base64,QUJD");
        assert_eq!(artifact.file_name(), "id-card.png");
    }

    #[test]
    fn test_svg_file_name() {
        let artifact = Artifact::parse("data:image/svg+xml;base64,PHN2Zz4=");
        assert_eq!(artifact.file_name(), "id-card.svg");
    }

    #[test]
    fn test_simulated_artifact_is_valid_png() {
        let artifact = Artifact::parse(SIMULATED_ARTIFACT);
        let bytes = artifact.decode().unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn test_from_bytes() {
        let artifact = Artifact::from_bytes(b"ABC", Some("image/gif"));
        assert_eq!(artifact.to_data_uri(), "data:image/gif;base64,QUJD");
    }
}
