//! 检测调度器
//!
//! 单邮箱 Actor：命令、定时 tick 与请求完成事件在同一个 `select!` 循环里串行处理，
//! 任意两条消息之间状态都是完整的。检测请求永不重叠；`stop` 之后才到达的结果
//! 通过会话代数 (generation) 识别并丢弃。

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use fw_capture::{CaptureSession, FrameEncoder};
use fw_core::{DetectionResult, FloorWatchError, Result, SchedulerConfig, SourceMode};
use fw_detect::Detector;

use crate::history::ResultHistory;
use crate::sink::{ResultSink, SessionEvent};

const MAILBOX_CAPACITY: usize = 32;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// `tokio::time::interval` 不接受零周期
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// 调度阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    Idle,
    ActiveIdle,
    ActiveDetecting,
}

/// 调度器状态快照
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub phase: SchedulerPhase,
    pub auto_detect: bool,
    pub source_mode: SourceMode,
    pub generation: u64,
    pub device: Option<String>,
    pub history_len: usize,
    pub dispatched: u64,
    pub discarded: u64,
    pub skipped_ticks: u64,
}

enum Command {
    Start {
        mode: Option<SourceMode>,
        reply: oneshot::Sender<Result<SourceMode>>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    Switch {
        reply: oneshot::Sender<Result<Option<SourceMode>>>,
    },
    Detect {
        reply: oneshot::Sender<Result<u64>>,
    },
    AutoDetect {
        /// `None` 表示翻转
        enabled: Option<bool>,
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<SchedulerStatus>,
    },
    History {
        reply: oneshot::Sender<Vec<DetectionResult>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct Completion {
    request_id: u64,
    generation: u64,
    outcome: Result<DetectionResult>,
}

struct InFlight {
    request_id: u64,
    generation: u64,
    dispatched_at: Instant,
}

/// 检测调度器 (Actor 本体)
pub struct DetectionScheduler {
    session: CaptureSession,
    encoder: FrameEncoder,
    detector: Arc<dyn Detector>,
    sink: Box<dyn ResultSink>,
    history: ResultHistory,
    interval: Duration,
    request_timeout: Duration,
    auto_detect: bool,
    ticker: Option<Interval>,
    in_flight: Option<InFlight>,
    next_request_id: u64,
    dispatched: u64,
    discarded: u64,
    skipped_ticks: u64,
    mailbox: mpsc::Receiver<Command>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
}

impl DetectionScheduler {
    /// 创建调度器与其句柄；调用 `run` (通常经 `tokio::spawn`) 开始处理消息
    pub fn new(
        session: CaptureSession,
        encoder: FrameEncoder,
        detector: Arc<dyn Detector>,
        sink: Box<dyn ResultSink>,
        config: &SchedulerConfig,
    ) -> (Self, SchedulerHandle) {
        let (tx, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let scheduler = Self {
            session,
            encoder,
            detector,
            sink,
            history: ResultHistory::new(config.history_capacity),
            interval: config.interval().max(MIN_INTERVAL),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auto_detect: false,
            ticker: None,
            in_flight: None,
            next_request_id: 1,
            dispatched: 0,
            discarded: 0,
            skipped_ticks: 0,
            mailbox,
            completion_tx,
            completion_rx,
        };
        (scheduler, SchedulerHandle { tx })
    }

    /// 单次检测的上限时长，超时按网络错误处理
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 消息循环，所有句柄被丢弃或收到关闭命令时退出
    pub async fn run(mut self) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            capacity = self.history.capacity(),
            "detection scheduler running"
        );

        loop {
            tokio::select! {
                biased;

                Some(done) = self.completion_rx.recv() => self.on_completion(done),

                command = self.mailbox.recv() => match command {
                    Some(command) => {
                        if self.handle(command).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        self.stop();
                        break;
                    }
                },

                _ = next_tick(&mut self.ticker) => self.on_tick(),
            }
        }

        tracing::info!("detection scheduler stopped");
    }

    async fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Start { mode, reply } => {
                let outcome = self.start(mode).await;
                let _ = reply.send(outcome);
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop());
            }
            Command::Switch { reply } => {
                let outcome = self.switch_source().await;
                let _ = reply.send(outcome);
            }
            Command::Detect { reply } => {
                let _ = reply.send(self.dispatch());
            }
            Command::AutoDetect { enabled, reply } => {
                let enabled = enabled.unwrap_or(!self.auto_detect);
                let _ = reply.send(self.set_auto_detect(enabled));
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::History { reply } => {
                let _ = reply.send(self.history.to_vec());
            }
            Command::Shutdown { reply } => {
                self.stop();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn start(&mut self, mode: Option<SourceMode>) -> Result<SourceMode> {
        if self.session.is_active() {
            self.ticker = None;
            self.sink.on_session(&SessionEvent::Stopped {
                generation: self.session.generation(),
            });
        }

        match self.session.start(mode).await {
            Ok(mode) => {
                self.enter_active();
                Ok(mode)
            }
            Err(err) => {
                self.ticker = None;
                tracing::warn!(error = %err, "capture session failed to start");
                self.sink.on_error(&err);
                Err(err)
            }
        }
    }

    fn stop(&mut self) -> bool {
        self.ticker = None;
        let generation = self.session.generation();
        let was_active = self.session.stop();
        if was_active {
            tracing::info!(generation, "capture session stopped");
            self.sink.on_session(&SessionEvent::Stopped { generation });
        }
        was_active
    }

    async fn switch_source(&mut self) -> Result<Option<SourceMode>> {
        if !self.session.is_active() {
            return Ok(None);
        }

        self.ticker = None;
        self.sink.on_session(&SessionEvent::Stopped {
            generation: self.session.generation(),
        });

        match self.session.switch_source().await {
            Ok(Some(mode)) => {
                self.enter_active();
                Ok(Some(mode))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                tracing::warn!(error = %err, "source switch failed, session is inactive");
                self.sink.on_error(&err);
                Err(err)
            }
        }
    }

    fn enter_active(&mut self) {
        let event = SessionEvent::Started {
            mode: self.session.mode(),
            generation: self.session.generation(),
            device: self.session.device_label().unwrap_or_default().to_string(),
        };
        tracing::info!(
            mode = %self.session.mode(),
            generation = self.session.generation(),
            "capture session active"
        );
        self.sink.on_session(&event);

        if self.auto_detect {
            self.arm_timer();
        }
    }

    fn set_auto_detect(&mut self, enabled: bool) -> bool {
        if enabled == self.auto_detect {
            return enabled;
        }

        self.auto_detect = enabled;
        if enabled && self.session.is_active() {
            self.arm_timer();
        } else {
            self.ticker = None;
        }

        tracing::info!(enabled, active = self.session.is_active(), "auto-detect toggled");
        self.sink.on_session(&SessionEvent::AutoDetect { enabled });
        enabled
    }

    fn arm_timer(&mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
    }

    fn on_tick(&mut self) {
        if let Some(in_flight) = &self.in_flight {
            self.skipped_ticks += 1;
            tracing::debug!(
                request_id = in_flight.request_id,
                skipped = self.skipped_ticks,
                "tick skipped, detection still in flight"
            );
            return;
        }

        if let Err(err) = self.dispatch() {
            tracing::debug!(error = %err, "tick produced no request");
        }
    }

    /// 采集一帧并发出检测请求，返回请求编号
    fn dispatch(&mut self) -> Result<u64> {
        if !self.session.is_active() {
            return Err(FloorWatchError::Inactive);
        }
        if let Some(in_flight) = &self.in_flight {
            return Err(FloorWatchError::NotReady(format!(
                "request #{} is still in flight",
                in_flight.request_id
            )));
        }

        let frame = match self.encoder.capture(&mut self.session) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "frame capture failed");
                self.sink.on_error(&err);
                return Err(err);
            }
        };

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.dispatched += 1;
        let generation = self.session.generation();
        self.in_flight = Some(InFlight {
            request_id,
            generation,
            dispatched_at: Instant::now(),
        });

        tracing::debug!(
            request_id,
            generation,
            bytes = frame.payload_len(),
            captured_at = %frame.captured_at,
            "detection dispatched"
        );

        let detector = Arc::clone(&self.detector);
        let completion_tx = self.completion_tx.clone();
        let limit = self.request_timeout;
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(limit, detector.detect(frame)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FloorWatchError::Network(format!(
                    "detection timed out after {}ms",
                    limit.as_millis()
                ))),
            };
            let _ = completion_tx.send(Completion {
                request_id,
                generation,
                outcome,
            });
        });

        Ok(request_id)
    }

    fn on_completion(&mut self, done: Completion) {
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.request_id == done.request_id => in_flight,
            other => {
                self.in_flight = other;
                tracing::warn!(request_id = done.request_id, "completion for unknown request");
                return;
            }
        };
        let elapsed_ms = in_flight.dispatched_at.elapsed().as_millis() as u64;

        if !self.session.is_active() || self.session.generation() != in_flight.generation {
            self.discarded += 1;
            tracing::debug!(
                request_id = done.request_id,
                generation = done.generation,
                elapsed_ms,
                "stale detection discarded"
            );
            return;
        }

        match done.outcome {
            Ok(result) => {
                tracing::info!(
                    request_id = done.request_id,
                    id = result.id,
                    label = result.label(),
                    confidence = result.confidence,
                    elapsed_ms,
                    "detection completed"
                );
                self.history.push(result.clone());
                self.sink.on_result(&result);
            }
            Err(err) => {
                tracing::warn!(
                    request_id = done.request_id,
                    kind = err.kind().as_str(),
                    error = %err,
                    elapsed_ms,
                    "detection failed"
                );
                self.sink.on_error(&err);
            }
        }
    }

    fn status(&self) -> SchedulerStatus {
        let phase = match (self.session.is_active(), self.in_flight.is_some()) {
            (false, _) => SchedulerPhase::Idle,
            (true, true) => SchedulerPhase::ActiveDetecting,
            (true, false) => SchedulerPhase::ActiveIdle,
        };
        SchedulerStatus {
            phase,
            auto_detect: self.auto_detect,
            source_mode: self.session.mode(),
            generation: self.session.generation(),
            device: self.session.device_label().map(str::to_string),
            history_len: self.history.len(),
            dispatched: self.dispatched,
            discarded: self.discarded,
            skipped_ticks: self.skipped_ticks,
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) -> Instant {
    match ticker {
        Some(ticker) => ticker.tick().await,
        None => std::future::pending().await,
    }
}

/// 调度器句柄 (可克隆，所有操作经邮箱串行执行)
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| FloorWatchError::Channel("scheduler is not running".to_string()))?;
        rx.await
            .map_err(|_| FloorWatchError::Channel("scheduler dropped the request".to_string()))
    }

    /// 启动采集 (`None` 沿用当前源模式)
    pub async fn start(&self, mode: Option<SourceMode>) -> Result<SourceMode> {
        self.request(|reply| Command::Start { mode, reply }).await?
    }

    /// 停止采集，返回此前是否处于活动状态
    pub async fn stop(&self) -> Result<bool> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// 切换前后置；未活动时返回 `None`
    pub async fn switch_source(&self) -> Result<Option<SourceMode>> {
        self.request(|reply| Command::Switch { reply }).await?
    }

    /// 手动检测一次，返回请求编号；已有请求在途时为 `NotReady`
    pub async fn manual_detect(&self) -> Result<u64> {
        self.request(|reply| Command::Detect { reply }).await?
    }

    pub async fn set_auto_detect(&self, enabled: bool) -> Result<bool> {
        self.request(|reply| Command::AutoDetect {
            enabled: Some(enabled),
            reply,
        })
        .await
    }

    /// 翻转自动检测，返回新状态
    pub async fn toggle_auto_detect(&self) -> Result<bool> {
        self.request(|reply| Command::AutoDetect {
            enabled: None,
            reply,
        })
        .await
    }

    pub async fn status(&self) -> Result<SchedulerStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// 本地结果历史 (最新在前)
    pub async fn history(&self) -> Result<Vec<DetectionResult>> {
        self.request(|reply| Command::History { reply }).await
    }

    /// 停止采集并结束消息循环
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
