//! 成功页面提取的凭条数据

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Artifact;

/// 成功页面信息列表中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    /// `<span>` 中的标签，结构不标准时为空
    #[serde(default)]
    pub label: Option<String>,
    pub value: String,
}

impl RecordField {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            value: value.into(),
        }
    }
}

/// 发送给本地程序的凭条数据
///
/// 序列化后是一个扁平的 JSON 对象：`{ "field0": "...", "field0_label": "...", ..., "qrcode": "data:..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedRecord {
    #[serde(flatten)]
    fields: BTreeMap<String, String>,
    qrcode: String,
}

impl ExtractedRecord {
    /// 由页面行数据和二维码构造
    ///
    /// 行按页面顺序编号为 `field{i}`，空值的行跳过但保留编号；
    /// 能识别的标签额外写入英文键（如 `name`、`passportNumber`），同名键只取第一次出现
    pub fn from_rows(rows: &[RecordField], qrcode: &Artifact) -> Self {
        let mut fields = BTreeMap::new();
        for (index, row) in rows.iter().enumerate() {
            let value = row.value.trim();
            if value.is_empty() {
                continue;
            }
            let key = format!("field{}", index);
            fields.insert(key.clone(), value.to_string());

            if let Some(label) = row.label.as_deref().map(str::trim) {
                fields.insert(format!("{}_label", key), label.to_string());
                if let Some(canonical) = canonical_key(label) {
                    fields
                        .entry(canonical.to_string())
                        .or_insert_with(|| value.to_string());
                }
            }
        }

        Self {
            fields,
            qrcode: qrcode.to_data_uri(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn qrcode(&self) -> &str {
        &self.qrcode
    }

    /// 序列化为一条 WebSocket 消息
    pub fn to_message(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// 将页面标签映射为英文键
pub fn canonical_key(label: &str) -> Option<&'static str> {
    const MAPPING: &[(&str, &str)] = &[
        ("姓名", "name"),
        ("名字", "name"),
        ("name", "name"),
        ("年龄", "age"),
        ("岁数", "age"),
        ("age", "age"),
        ("部门", "dep"),
        ("department", "dep"),
        ("证件号", "idNumber"),
        ("身份证", "idNumber"),
        ("护照号", "passportNumber"),
        ("手机号", "phone"),
        ("电话", "phone"),
        ("邮箱", "email"),
        ("地址", "address"),
        ("国籍", "nationality"),
        ("性别", "gender"),
        ("sex", "gender"),
        ("出生日期", "birthdate"),
        ("生日", "birthdate"),
        ("入境日期", "entryDate"),
        ("出境日期", "exitDate"),
    ];

    let label = label.trim().trim_end_matches([':', '：']).trim();
    if label.is_empty() {
        return None;
    }
    let lower = label.to_lowercase();

    if let Some((_, key)) = MAPPING.iter().find(|(k, _)| *k == lower) {
        return Some(*key);
    }
    MAPPING
        .iter()
        .find(|(k, _)| lower.contains(k) || k.contains(lower.as_str()))
        .map(|(_, key)| *key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn qrcode() -> Artifact {
        Artifact::parse("data:image/png;base64,QUJD")
    }

    #[test]
    fn test_from_rows_numbers_by_position() {
        let rows = vec![
            RecordField::new("姓名", "ZHANG SAN"),
            RecordField::new("备注", "  "),
            RecordField {
                label: None,
                value: "E12345678".to_string(),
            },
        ];
        let record = ExtractedRecord::from_rows(&rows, &qrcode());

        assert_eq!(record.get("field0"), Some("ZHANG SAN"));
        assert_eq!(record.get("field0_label"), Some("姓名"));
        assert_eq!(record.get("name"), Some("ZHANG SAN"));
        assert_eq!(record.get("field1"), None);
        assert_eq!(record.get("field2"), Some("E12345678"));
        assert_eq!(record.get("field2_label"), None);
    }

    #[test]
    fn test_message_is_flat_json_with_qrcode() {
        let rows = vec![RecordField::new("护照号：", "E12345678")];
        let record = ExtractedRecord::from_rows(&rows, &qrcode());
        let value: Value = serde_json::from_str(&record.to_message().unwrap()).unwrap();

        assert_eq!(value["field0"], "E12345678");
        assert_eq!(value["passportNumber"], "E12345678");
        assert_eq!(value["qrcode"], "data:image/png;base64,QUJD");
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!(canonical_key("Name"), Some("name"));
        assert_eq!(canonical_key("入境日期:"), Some("entryDate"));
        assert_eq!(canonical_key("航班号"), None);
        assert_eq!(canonical_key(""), None);
    }
}
