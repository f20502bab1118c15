//! 结果出口
//!
//! 调度器通过 `ResultSink` 向上层报告结果、错误与会话变化。

use serde::Serialize;
use tokio::sync::mpsc;

use fw_core::{DetectionResult, FloorWatchError, SourceMode};

/// 会话变化
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// 已获取设备并进入活动状态
    Started {
        mode: SourceMode,
        generation: u64,
        device: String,
    },
    /// 已释放设备
    Stopped { generation: u64 },
    /// 自动检测开关变化
    AutoDetect { enabled: bool },
}

/// 结果出口
pub trait ResultSink: Send + 'static {
    /// 一次检测成功 (已写入历史)
    fn on_result(&mut self, result: &DetectionResult);

    /// 一次尝试失败，或会话启动失败
    fn on_error(&mut self, error: &FloorWatchError);

    /// 会话变化
    fn on_session(&mut self, _event: &SessionEvent) {}
}

/// 调度器事件
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    Result(DetectionResult),
    Error(FloorWatchError),
    Session(SessionEvent),
}

/// 基于 mpsc 通道的出口
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SchedulerEvent>,
}

impl ChannelSink {
    /// 创建出口与对应的接收端
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: SchedulerEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("scheduler event receiver dropped");
        }
    }
}

impl ResultSink for ChannelSink {
    fn on_result(&mut self, result: &DetectionResult) {
        self.emit(SchedulerEvent::Result(result.clone()));
    }

    fn on_error(&mut self, error: &FloorWatchError) {
        self.emit(SchedulerEvent::Error(error.clone()));
    }

    fn on_session(&mut self, event: &SessionEvent) {
        self.emit(SchedulerEvent::Session(event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_channel_sink_forwards_in_order() {
        let (mut sink, mut rx) = ChannelSink::new();
        let result = DetectionResult::new(3, true, 0.7, Utc::now());

        sink.on_session(&SessionEvent::AutoDetect { enabled: true });
        sink.on_result(&result);
        sink.on_error(&FloorWatchError::Inactive);

        assert_eq!(
            rx.try_recv().unwrap(),
            SchedulerEvent::Session(SessionEvent::AutoDetect { enabled: true })
        );
        assert_eq!(rx.try_recv().unwrap(), SchedulerEvent::Result(result));
        assert_eq!(
            rx.try_recv().unwrap(),
            SchedulerEvent::Error(FloorWatchError::Inactive)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (mut sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_error(&FloorWatchError::Inactive);
    }

    #[test]
    fn test_session_event_json() {
        let json = serde_json::to_string(&SessionEvent::Stopped { generation: 4 }).unwrap();
        assert_eq!(json, r#"{"type":"stopped","generation":4}"#);
    }
}
