//! # fw_scheduler - FloorWatch Detection Scheduler
//!
//! 调度层：持有采集会话，按手动或定时触发发出互不重叠的检测请求，
//! 维护有界结果历史，并经 `ResultSink` 向上层报告。

pub mod history;
pub mod scheduler;
pub mod sink;

pub use history::ResultHistory;
pub use scheduler::{DetectionScheduler, SchedulerHandle, SchedulerPhase, SchedulerStatus};
pub use sink::{ChannelSink, ResultSink, SchedulerEvent, SessionEvent};

pub use fw_core::{FloorWatchError, Result};
