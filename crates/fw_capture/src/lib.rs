//! # fw_capture - FloorWatch Capture Session
//!
//! 视频源采集：设备句柄独占、前后置切换、帧缩放与 JPEG 编码。

pub mod device;
pub mod encoder;
pub mod session;
pub mod synthetic;

pub use device::{DeviceIndicator, DeviceProvider, IndicatorGuard, StreamRequest, VideoStream};
pub use encoder::FrameEncoder;
pub use session::{CaptureSession, LifecycleState};
pub use synthetic::{provider_from_config, StillImageProvider, TestPatternProvider};

pub use fw_core::{FloorWatchError, Result};
