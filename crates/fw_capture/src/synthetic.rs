//! 内置设备提供者
//!
//! - `TestPatternProvider`: 生成滚动渐变测试图的虚拟摄像头
//! - `StillImageProvider`: 以图片文件充当画面的摄像头，每个源模式一张

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use image::{ImageError, Rgb, RgbImage};

use fw_core::{CameraConfig, DeviceAccessReason, FloorWatchError, Result, SourceMode};

use crate::device::{DeviceIndicator, DeviceProvider, IndicatorGuard, StreamRequest, VideoStream};

/// 按摄像头配置选择提供者
pub fn provider_from_config(
    config: &CameraConfig,
    indicator: DeviceIndicator,
) -> Arc<dyn DeviceProvider> {
    if !config.uses_still_images() {
        return Arc::new(TestPatternProvider::new(indicator));
    }

    let mut provider = StillImageProvider::new(indicator);
    if let Some(path) = &config.front_image {
        provider = provider.with_source(SourceMode::Front, path);
    }
    if let Some(path) = &config.rear_image {
        provider = provider.with_source(SourceMode::Rear, path);
    }
    Arc::new(provider)
}

/// 测试图摄像头
#[derive(Debug, Clone)]
pub struct TestPatternProvider {
    indicator: DeviceIndicator,
    modes: Vec<SourceMode>,
    permission_granted: bool,
    native_size: Option<(u32, u32)>,
    warmup_frames: u32,
}

impl TestPatternProvider {
    /// 创建新提供者 (前后置均可用)
    pub fn new(indicator: DeviceIndicator) -> Self {
        Self {
            indicator,
            modes: vec![SourceMode::Front, SourceMode::Rear],
            permission_granted: true,
            native_size: None,
            warmup_frames: 0,
        }
    }

    /// 限定可用的源模式
    pub fn with_modes(mut self, modes: &[SourceMode]) -> Self {
        self.modes = modes.to_vec();
        self
    }

    /// 模拟用户拒绝授权
    pub fn deny_permission(mut self) -> Self {
        self.permission_granted = false;
        self
    }

    /// 固定原生分辨率 (默认使用请求的期望分辨率)
    pub fn with_native_size(mut self, width: u32, height: u32) -> Self {
        self.native_size = Some((width, height));
        self
    }

    /// 前 N 次读取画面返回未就绪
    pub fn with_warmup(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }
}

#[async_trait]
impl DeviceProvider for TestPatternProvider {
    fn name(&self) -> &str {
        "test-pattern"
    }

    async fn acquire(&self, request: &StreamRequest) -> Result<Box<dyn VideoStream>> {
        if !self.permission_granted {
            return Err(FloorWatchError::device_access(
                DeviceAccessReason::PermissionDenied,
                "camera permission was not granted",
            ));
        }
        if !self.modes.contains(&request.mode) {
            return Err(FloorWatchError::device_access(
                DeviceAccessReason::NoMatchingDevice,
                format!("no {} camera available", request.mode),
            ));
        }

        let (width, height) = self
            .native_size
            .unwrap_or((request.ideal_width, request.ideal_height));

        Ok(Box::new(TestPatternStream {
            label: format!("test-pattern:{}", request.mode),
            mode: request.mode,
            width,
            height,
            tick: 0,
            warmup_left: self.warmup_frames,
            guard: self.indicator.light(),
        }))
    }
}

struct TestPatternStream {
    label: String,
    mode: SourceMode,
    width: u32,
    height: u32,
    tick: u32,
    warmup_left: u32,
    guard: IndicatorGuard,
}

impl VideoStream for TestPatternStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn native_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn snapshot(&mut self) -> Option<RgbImage> {
        if !self.guard.is_lit() {
            return None;
        }
        if self.warmup_left > 0 {
            self.warmup_left -= 1;
            return None;
        }

        self.tick = self.tick.wrapping_add(1);
        let shift = self.tick.wrapping_mul(7);
        let tint = match self.mode {
            SourceMode::Front => 200u8,
            SourceMode::Rear => 60u8,
        };
        let (w, h) = (self.width.max(1), self.height.max(1));

        Some(RgbImage::from_fn(self.width, self.height, |x, y| {
            let r = ((x.wrapping_add(shift) % w) * 255 / w) as u8;
            let g = (y * 255 / h) as u8;
            Rgb([r, g, tint])
        }))
    }

    fn release(&mut self) {
        self.guard.extinguish();
    }

    fn is_live(&self) -> bool {
        self.guard.is_lit()
    }
}

/// 图片文件摄像头
#[derive(Debug, Clone)]
pub struct StillImageProvider {
    indicator: DeviceIndicator,
    sources: HashMap<SourceMode, PathBuf>,
}

impl StillImageProvider {
    /// 创建新提供者 (尚无任何源)
    pub fn new(indicator: DeviceIndicator) -> Self {
        Self {
            indicator,
            sources: HashMap::new(),
        }
    }

    /// 为源模式指定图片文件
    pub fn with_source(mut self, mode: SourceMode, path: impl Into<PathBuf>) -> Self {
        self.sources.insert(mode, path.into());
        self
    }
}

#[async_trait]
impl DeviceProvider for StillImageProvider {
    fn name(&self) -> &str {
        "still-image"
    }

    async fn acquire(&self, request: &StreamRequest) -> Result<Box<dyn VideoStream>> {
        let path = self.sources.get(&request.mode).cloned().ok_or_else(|| {
            FloorWatchError::device_access(
                DeviceAccessReason::NoMatchingDevice,
                format!("no image configured for the {} source", request.mode),
            )
        })?;

        let display = path.display().to_string();
        let image = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| {
                FloorWatchError::device_access(DeviceAccessReason::Unavailable, e.to_string())
            })?
            .map_err(|e| map_image_error(&display, e))?
            .to_rgb8();

        Ok(Box::new(StillImageStream {
            label: format!("still-image:{display}"),
            image,
            guard: self.indicator.light(),
        }))
    }
}

fn map_image_error(path: &str, err: ImageError) -> FloorWatchError {
    match err {
        ImageError::IoError(io_err) if io_err.kind() == io::ErrorKind::PermissionDenied => {
            FloorWatchError::device_access(
                DeviceAccessReason::PermissionDenied,
                format!("{path}: {io_err}"),
            )
        }
        other => FloorWatchError::device_access(
            DeviceAccessReason::Unavailable,
            format!("{path}: {other}"),
        ),
    }
}

struct StillImageStream {
    label: String,
    image: RgbImage,
    guard: IndicatorGuard,
}

impl VideoStream for StillImageStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn native_size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn snapshot(&mut self) -> Option<RgbImage> {
        self.guard.is_lit().then(|| self.image.clone())
    }

    fn release(&mut self) {
        self.guard.extinguish();
    }

    fn is_live(&self) -> bool {
        self.guard.is_lit()
    }
}
