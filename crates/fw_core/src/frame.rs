//! 编码帧定义

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};

use crate::error::{FloorWatchError, Result};

/// 编码帧载荷
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    /// 原始 JPEG 字节 (multipart 传输)
    Jpeg(Vec<u8>),
    /// Base64 文本形式的 JPEG (JSON 传输)
    Base64(String),
}

impl FramePayload {
    /// 载荷是否为空
    pub fn is_empty(&self) -> bool {
        match self {
            FramePayload::Jpeg(bytes) => bytes.is_empty(),
            FramePayload::Base64(text) => text.is_empty(),
        }
    }

    /// 转为 Base64 文本
    pub fn to_base64(&self) -> String {
        match self {
            FramePayload::Jpeg(bytes) => STANDARD.encode(bytes),
            FramePayload::Base64(text) => text.clone(),
        }
    }

    /// 转为 JPEG 字节
    pub fn to_jpeg_bytes(&self) -> Result<Vec<u8>> {
        match self {
            FramePayload::Jpeg(bytes) => Ok(bytes.clone()),
            FramePayload::Base64(text) => STANDARD
                .decode(text)
                .map_err(|e| FloorWatchError::Encoding(format!("invalid base64 payload: {e}"))),
        }
    }
}

/// 一次采集得到的编码帧
///
/// 每次采集产生一个，只被检测客户端消费一次，不做保留。
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// 编码后的图像
    pub payload: FramePayload,
    /// 光栅目标宽度
    pub width: u32,
    /// 光栅目标高度
    pub height: u32,
    /// 编码质量 (0..1)
    pub quality: f32,
    /// 采集时间
    pub captured_at: DateTime<Utc>,
}

impl EncodedFrame {
    /// 创建新编码帧
    pub fn new(payload: FramePayload, width: u32, height: u32, quality: f32) -> Self {
        Self {
            payload,
            width,
            height,
            quality,
            captured_at: Utc::now(),
        }
    }

    /// 载荷字节数 (Base64 按文本长度计)
    pub fn payload_len(&self) -> usize {
        match &self.payload {
            FramePayload::Jpeg(bytes) => bytes.len(),
            FramePayload::Base64(text) => text.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_conversions() {
        let jpeg = FramePayload::Jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let text = jpeg.to_base64();
        assert_eq!(text, "/9j/2Q==");

        let back = FramePayload::Base64(text).to_jpeg_bytes().unwrap();
        assert_eq!(back, vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn test_invalid_base64_is_encoding_error() {
        let err = FramePayload::Base64("not base64!!".to_string())
            .to_jpeg_bytes()
            .unwrap_err();
        assert!(matches!(err, FloorWatchError::Encoding(_)));
    }

    #[test]
    fn test_empty_payload() {
        assert!(FramePayload::Jpeg(Vec::new()).is_empty());
        assert!(!FramePayload::Base64("AA==".to_string()).is_empty());
    }
}
