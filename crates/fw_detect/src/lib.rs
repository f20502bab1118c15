//! # fw_detect - FloorWatch Detection Client
//!
//! 检测客户端层：一次网络往返把编码帧换成分类结果，并把传输层 / 服务端失败
//! 映射为统一错误类型。

pub mod client;
pub mod wire;

pub use client::{DetectionClient, Detector};
pub use wire::{HealthStatus, HistoryItem};

pub use fw_core::{FloorWatchError, Result};
