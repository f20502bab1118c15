//! 帧编码器
//!
//! 把当前视频画面缩放裁切到固定光栅尺寸，再按固定质量编码为 JPEG。

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

use fw_core::{CaptureConfig, EncodedFrame, FloorWatchError, FramePayload, Result, Transport};

use crate::session::CaptureSession;

/// 帧编码器
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    width: u32,
    height: u32,
    quality: f32,
    transport: Transport,
}

impl FrameEncoder {
    /// 按采集配置创建编码器，`transport` 决定载荷是二进制还是 Base64 文本
    pub fn new(config: &CaptureConfig, transport: Transport) -> Self {
        Self {
            width: config.width,
            height: config.height,
            quality: config.quality,
            transport,
        }
    }

    /// 质量因子映射到 JPEG 的 1..=100
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }

    /// 从活动会话采集一帧
    pub fn capture(&self, session: &mut CaptureSession) -> Result<EncodedFrame> {
        if !session.is_active() {
            return Err(FloorWatchError::Capture(
                "capture session is not active".to_string(),
            ));
        }
        let stream = session.stream_mut().ok_or_else(|| {
            FloorWatchError::Capture("capture session holds no video stream".to_string())
        })?;
        let surface = stream.snapshot().ok_or_else(|| {
            FloorWatchError::Capture(format!("video surface of {} is not ready", stream.label()))
        })?;
        if surface.width() == 0 || surface.height() == 0 {
            return Err(FloorWatchError::Capture("video surface is empty".to_string()));
        }

        self.encode(surface)
    }

    /// 缩放裁切并编码
    pub fn encode(&self, surface: RgbImage) -> Result<EncodedFrame> {
        let raster = DynamicImage::ImageRgb8(surface)
            .resize_to_fill(self.width, self.height, FilterType::Triangle)
            .to_rgb8();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality())
            .encode_image(&raster)
            .map_err(|e| FloorWatchError::Encoding(format!("JPEG encode failed: {e}")))?;

        if jpeg.is_empty() {
            return Err(FloorWatchError::Encoding("encoder produced no data".to_string()));
        }

        let payload = match self.transport {
            Transport::Multipart => FramePayload::Jpeg(jpeg),
            Transport::Json => FramePayload::Base64(FramePayload::Jpeg(jpeg).to_base64()),
        };

        tracing::debug!(
            width = self.width,
            height = self.height,
            quality = self.jpeg_quality(),
            "frame encoded"
        );
        Ok(EncodedFrame::new(payload, self.width, self.height, self.quality))
    }
}
