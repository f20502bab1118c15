//! # fw_core - FloorWatch Core Primitives
//!
//! 核心原语层，定义错误分类、编码帧、检测结果与全局配置。
//! 此 crate 是整个项目的基础依赖，不依赖其他业务 crate。

pub mod config;
pub mod error;
pub mod frame;
pub mod result;

pub use config::{
    ApiConfig, CameraConfig, CaptureConfig, FloorWatchConfig, SchedulerConfig, Transport,
};
pub use error::{DeviceAccessReason, ErrorKind, FloorWatchError, Result};
pub use frame::{EncodedFrame, FramePayload};
pub use result::{DetectionResult, SourceMode};
