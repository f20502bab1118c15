//! 检测服务线上格式
//!
//! 请求体、响应体与状态码映射。这里全部是纯函数，网络收发在 `client` 中。

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fw_core::{DetectionResult, FloorWatchError, Result};

/// 错误详情最大保留长度
const MAX_DETAIL_LEN: usize = 200;

/// JSON 模式的检测请求体
#[derive(Debug, Clone, Serialize)]
pub struct FrameRequest<'a> {
    pub image_base64: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<&'a str>,
}

/// 检测响应体
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionResponse {
    #[serde(default)]
    pub id: Option<i64>,
    pub is_dirty: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl DetectionResponse {
    /// 校验并转换为领域结果
    pub fn into_result(self) -> Result<DetectionResult> {
        let confidence = self.confidence.unwrap_or(0.0);
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(FloorWatchError::MalformedResponse(format!(
                "confidence {confidence} is outside [0, 1]"
            )));
        }

        let created_at = match self.created_at.as_deref() {
            Some(raw) => parse_timestamp(raw)?,
            None => Utc::now(),
        };

        let id = self.id.unwrap_or_else(|| {
            tracing::debug!("detection response carries no event id, result was not persisted");
            0
        });

        Ok(DetectionResult {
            id,
            is_dirty: self.is_dirty,
            confidence: confidence as f32,
            created_at,
        })
    }
}

/// 解析检测响应正文
pub fn parse_detection(body: &str) -> Result<DetectionResult> {
    let response: DetectionResponse = serde_json::from_str(body).map_err(|e| {
        FloorWatchError::MalformedResponse(format!("invalid detection response: {e}"))
    })?;
    response.into_result()
}

/// 服务健康状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }
}

/// 服务端历史记录条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: i64,
    #[serde(default)]
    pub source: Option<String>,
    pub is_dirty: bool,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        Some(text) => parse_timestamp(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// 解析服务端历史列表
pub fn parse_history(body: &str) -> Result<Vec<HistoryItem>> {
    serde_json::from_str(body)
        .map_err(|e| FloorWatchError::MalformedResponse(format!("invalid history response: {e}")))
}

/// 解析时间戳：RFC 3339，或不带时区的 ISO 格式 (按 UTC 处理)
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(FloorWatchError::MalformedResponse(format!(
        "unrecognised timestamp '{raw}'"
    )))
}

/// 状态码映射：2xx 为 `None`，5xx 为服务不可用，其余为请求错误
pub fn classify_status(status: u16, body: &str) -> Option<FloorWatchError> {
    if (200..300).contains(&status) {
        return None;
    }
    let detail = extract_detail(body);
    if (500..600).contains(&status) {
        Some(FloorWatchError::ServiceUnavailable { status, detail })
    } else {
        Some(FloorWatchError::Request { status, detail })
    }
}

/// 从错误正文中提取可读详情
///
/// 依次尝试 `detail` (字符串或校验错误列表) 与 `error` 字段，最后退回原文。
pub fn extract_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "error"] {
            match value.get(key) {
                Some(Value::String(text)) if !text.is_empty() => return truncate(text),
                Some(Value::Array(items)) if !items.is_empty() => {
                    let joined = items
                        .iter()
                        .map(|item| match item.get("msg").and_then(Value::as_str) {
                            Some(msg) => msg.to_string(),
                            None => item.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join("; ");
                    return truncate(&joined);
                }
                Some(Value::Object(obj)) => {
                    if let Some(msg) = obj.get("message").and_then(Value::as_str) {
                        return truncate(msg);
                    }
                }
                _ => {}
            }
        }
    }

    let text = body.trim();
    if text.is_empty() {
        "no detail".to_string()
    } else {
        truncate(text)
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_DETAIL_LEN {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(MAX_DETAIL_LEN).collect();
        cut.push('…');
        cut
    }
}
