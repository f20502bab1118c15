//! 视频设备抽象
//!
//! `DeviceProvider` 负责按请求打开设备，返回的 `VideoStream` 即设备句柄本身，
//! 由 `CaptureSession` 独占持有。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;

use fw_core::{Result, SourceMode};

/// 设备访问请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    /// 视频源模式
    pub mode: SourceMode,
    /// 期望宽度
    pub ideal_width: u32,
    /// 期望高度
    pub ideal_height: u32,
}

/// 设备提供者特征
#[async_trait]
pub trait DeviceProvider: Send + Sync + 'static {
    /// 提供者名称
    fn name(&self) -> &str;

    /// 请求设备访问
    ///
    /// 失败时返回 `FloorWatchError::DeviceAccess`，不得遗留任何已打开的资源。
    async fn acquire(&self, request: &StreamRequest) -> Result<Box<dyn VideoStream>>;
}

/// 已获取的视频流 (设备句柄)
pub trait VideoStream: Send {
    /// 设备标签
    fn label(&self) -> &str;

    /// 原生分辨率
    fn native_size(&self) -> (u32, u32);

    /// 读取当前视频画面；画面尚未就绪时返回 `None`
    fn snapshot(&mut self) -> Option<RgbImage>;

    /// 停止所有轨道并释放设备 (幂等)
    fn release(&mut self);

    /// 句柄是否仍持有设备
    fn is_live(&self) -> bool;
}

#[derive(Debug, Default)]
struct IndicatorState {
    active: AtomicUsize,
    peak: AtomicUsize,
    acquisitions: AtomicU64,
    releases: AtomicU64,
}

/// 设备指示灯
///
/// 记录当前持有的句柄数、历史峰值以及获取 / 释放次数，可在多个提供者之间共享。
#[derive(Debug, Clone, Default)]
pub struct DeviceIndicator {
    inner: Arc<IndicatorState>,
}

impl DeviceIndicator {
    /// 创建新指示灯
    pub fn new() -> Self {
        Self::default()
    }

    /// 点亮指示灯，返回的守卫在释放或析构时熄灭一次
    pub fn light(&self) -> IndicatorGuard {
        let now = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        self.inner.acquisitions.fetch_add(1, Ordering::SeqCst);
        IndicatorGuard {
            indicator: self.clone(),
            lit: true,
        }
    }

    /// 当前持有的句柄数
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// 同时持有句柄数的历史峰值
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    /// 累计获取次数
    pub fn acquisitions(&self) -> u64 {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }

    /// 累计释放次数
    pub fn releases(&self) -> u64 {
        self.inner.releases.load(Ordering::SeqCst)
    }

    /// 是否有设备处于打开状态
    pub fn is_on(&self) -> bool {
        self.active() > 0
    }
}

/// 指示灯守卫
#[derive(Debug)]
pub struct IndicatorGuard {
    indicator: DeviceIndicator,
    lit: bool,
}

impl IndicatorGuard {
    /// 熄灭 (只生效一次)
    pub fn extinguish(&mut self) {
        if self.lit {
            self.lit = false;
            self.indicator.inner.active.fetch_sub(1, Ordering::SeqCst);
            self.indicator.inner.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }
}

impl Drop for IndicatorGuard {
    fn drop(&mut self) {
        self.extinguish();
    }
}
