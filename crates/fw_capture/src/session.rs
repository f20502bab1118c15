//! 采集会话
//!
//! 会话是设备句柄的唯一所有者。切换视频源时先释放旧句柄再申请新句柄，
//! 任意时刻最多只有一个句柄处于打开状态。

use std::sync::Arc;

use fw_core::{CaptureConfig, DeviceAccessReason, FloorWatchError, Result, SourceMode};

use crate::device::{DeviceProvider, StreamRequest, VideoStream};

/// 会话生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Inactive,
    Active,
}

/// 采集会话
pub struct CaptureSession {
    provider: Arc<dyn DeviceProvider>,
    /// 设备句柄 (仅 Active 时存在)
    handle: Option<Box<dyn VideoStream>>,
    /// 当前 (或下一次启动使用的) 源模式
    mode: SourceMode,
    /// 每次成功获取设备时递增
    generation: u64,
    ideal_width: u32,
    ideal_height: u32,
}

impl CaptureSession {
    /// 创建新会话 (初始为 Inactive)
    pub fn new(provider: Arc<dyn DeviceProvider>, config: &CaptureConfig) -> Self {
        Self {
            provider,
            handle: None,
            mode: config.source_mode,
            generation: 0,
            ideal_width: config.width,
            ideal_height: config.height,
        }
    }

    /// 生命周期状态
    pub fn state(&self) -> LifecycleState {
        if self.handle.is_some() {
            LifecycleState::Active
        } else {
            LifecycleState::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    /// 当前会话代数
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 设备标签
    pub fn device_label(&self) -> Option<&str> {
        self.handle.as_ref().map(|stream| stream.label())
    }

    /// 借出视频流 (供帧编码器读取画面)
    pub fn stream_mut(&mut self) -> Option<&mut (dyn VideoStream + 'static)> {
        self.handle.as_deref_mut()
    }

    /// 启动会话
    ///
    /// `mode` 为空时沿用当前模式。会话已激活时先释放现有句柄。
    pub async fn start(&mut self, mode: Option<SourceMode>) -> Result<SourceMode> {
        let mode = mode.unwrap_or(self.mode);
        if self.handle.is_some() {
            self.stop();
        }

        let request = StreamRequest {
            mode,
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
        };

        let stream = match self.provider.acquire(&request).await {
            Ok(stream) => stream,
            Err(err) => {
                let err = match err {
                    FloorWatchError::DeviceAccess { .. } => err,
                    other => FloorWatchError::device_access(
                        DeviceAccessReason::Unavailable,
                        other.to_string(),
                    ),
                };
                tracing::warn!(provider = self.provider.name(), %mode, error = %err, "device acquisition failed");
                return Err(err);
            }
        };

        let (width, height) = stream.native_size();
        self.generation += 1;
        self.mode = mode;
        tracing::info!(
            device = stream.label(),
            %mode,
            generation = self.generation,
            width,
            height,
            "capture session started"
        );
        self.handle = Some(stream);
        Ok(mode)
    }

    /// 停止会话并释放设备 (幂等)
    ///
    /// 返回是否确实释放了句柄。
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(mut stream) => {
                stream.release();
                tracing::info!(
                    device = stream.label(),
                    generation = self.generation,
                    "capture session stopped"
                );
                true
            }
            None => false,
        }
    }

    /// 切换到相反的视频源
    ///
    /// 未激活时为空操作并返回 `Ok(None)`。重新获取失败时会话保持 Inactive，
    /// 不会回退到旧的视频源。
    pub async fn switch_source(&mut self) -> Result<Option<SourceMode>> {
        if !self.is_active() {
            return Ok(None);
        }
        let next = self.mode.opposite();
        self.stop();
        self.start(Some(next)).await.map(Some)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceIndicator;
    use crate::synthetic::TestPatternProvider;
    use fw_core::ErrorKind;

    fn session_with(provider: TestPatternProvider) -> CaptureSession {
        CaptureSession::new(Arc::new(provider), &CaptureConfig::default())
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let indicator = DeviceIndicator::new();
        let mut session = session_with(TestPatternProvider::new(indicator.clone()));

        let mode = session.start(None).await.unwrap();
        assert_eq!(mode, SourceMode::Rear);
        assert_eq!(session.state(), LifecycleState::Active);
        assert_eq!(session.generation(), 1);
        assert!(indicator.is_on());

        assert!(session.stop());
        assert_eq!(session.state(), LifecycleState::Inactive);
        assert!(!indicator.is_on());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let indicator = DeviceIndicator::new();
        let mut session = session_with(TestPatternProvider::new(indicator.clone()));
        tokio_test::assert_ok!(session.start(None).await);

        assert!(session.stop());
        assert!(!session.stop());
        assert_eq!(indicator.releases(), 1);
        assert_eq!(session.state(), LifecycleState::Inactive);
    }

    #[tokio::test]
    async fn test_permission_denied_leaves_inactive() {
        let indicator = DeviceIndicator::new();
        let mut session =
            session_with(TestPatternProvider::new(indicator.clone()).deny_permission());

        let err = session.start(Some(SourceMode::Front)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceAccess);
        assert!(matches!(
            err,
            FloorWatchError::DeviceAccess {
                reason: DeviceAccessReason::PermissionDenied,
                ..
            }
        ));
        assert_eq!(session.state(), LifecycleState::Inactive);
        assert_eq!(session.generation(), 0);
        assert_eq!(indicator.acquisitions(), 0);
    }

    #[tokio::test]
    async fn test_switch_releases_before_acquire() {
        let indicator = DeviceIndicator::new();
        let mut session = session_with(TestPatternProvider::new(indicator.clone()));
        session.start(Some(SourceMode::Front)).await.unwrap();

        let switched = session.switch_source().await.unwrap();
        assert_eq!(switched, Some(SourceMode::Rear));
        assert_eq!(session.mode(), SourceMode::Rear);
        assert_eq!(session.generation(), 2);
        assert_eq!(indicator.peak(), 1);
        assert_eq!(indicator.acquisitions(), 2);
        assert_eq!(indicator.releases(), 1);
    }

    #[tokio::test]
    async fn test_switch_while_inactive_is_noop() {
        let indicator = DeviceIndicator::new();
        let mut session = session_with(TestPatternProvider::new(indicator.clone()));

        assert_eq!(session.switch_source().await.unwrap(), None);
        assert_eq!(indicator.acquisitions(), 0);
    }

    #[tokio::test]
    async fn test_failed_switch_ends_inactive() {
        let indicator = DeviceIndicator::new();
        let provider =
            TestPatternProvider::new(indicator.clone()).with_modes(&[SourceMode::Rear]);
        let mut session = session_with(provider);
        session.start(None).await.unwrap();

        let err = session.switch_source().await.unwrap_err();
        assert!(matches!(
            err,
            FloorWatchError::DeviceAccess {
                reason: DeviceAccessReason::NoMatchingDevice,
                ..
            }
        ));
        assert!(!session.is_active());
        assert!(!indicator.is_on());
    }

    #[tokio::test]
    async fn test_restart_while_active_keeps_single_handle() {
        let indicator = DeviceIndicator::new();
        let mut session = session_with(TestPatternProvider::new(indicator.clone()));
        session.start(None).await.unwrap();
        session.start(Some(SourceMode::Front)).await.unwrap();

        assert_eq!(indicator.active(), 1);
        assert_eq!(indicator.peak(), 1);
        assert_eq!(session.mode(), SourceMode::Front);
    }

    #[tokio::test]
    async fn test_drop_releases_device() {
        let indicator = DeviceIndicator::new();
        {
            let mut session = session_with(TestPatternProvider::new(indicator.clone()));
            session.start(None).await.unwrap();
            assert!(indicator.is_on());
        }
        assert!(!indicator.is_on());
    }
}
