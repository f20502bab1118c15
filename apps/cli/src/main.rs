//! FloorWatch CLI - 交互式检测终端

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fw_capture::{provider_from_config, CaptureSession, DeviceIndicator, FrameEncoder};
use fw_core::{DetectionResult, FloorWatchConfig, SourceMode};
use fw_detect::DetectionClient;
use fw_scheduler::{
    ChannelSink, DetectionScheduler, ResultHistory, SchedulerEvent, SchedulerHandle, SessionEvent,
};

/// 脏污告警列表保留条数
const ALERT_CAPACITY: usize = 10;

struct Shell {
    handle: SchedulerHandle,
    client: Arc<DetectionClient>,
    indicator: DeviceIndicator,
    alerts: Arc<Mutex<ResultHistory>>,
    interval_ms: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "floorwatch_cli=info,fw_scheduler=warn,fw_detect=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FLOORWATCH_CONFIG").ok())
        .map(PathBuf::from);
    let config = FloorWatchConfig::load(config_path.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    let indicator = DeviceIndicator::new();
    let provider = provider_from_config(&config.camera, indicator.clone());
    let session = CaptureSession::new(provider, &config.capture);
    let encoder = FrameEncoder::new(&config.capture, config.api.transport);
    let client = Arc::new(DetectionClient::new(&config.api)?);
    let (sink, mut events) = ChannelSink::new();

    let (scheduler, handle) = DetectionScheduler::new(
        session,
        encoder,
        client.clone(),
        Box::new(sink),
        &config.scheduler,
    );
    let scheduler_task = tokio::spawn(scheduler.with_request_timeout(config.api.timeout()).run());

    let alerts = Arc::new(Mutex::new(ResultHistory::new(ALERT_CAPACITY)));
    let feed = alerts.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event, &feed);
        }
    });

    println!("FloorWatch CLI v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "Detection service: {} ({:?} upload)",
        client.base_url(),
        client.transport()
    );
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let shell = Shell {
        handle,
        client,
        indicator,
        alerts,
        interval_ms: config.scheduler.interval_ms,
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("fw> ");
        io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some((&command, args)) = parts.split_first() else {
            continue;
        };

        match shell.execute(command, args).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("error: {e}"),
        }
    }

    shell.handle.shutdown().await?;
    scheduler_task.await?;
    println!("Goodbye!");
    Ok(())
}

impl Shell {
    /// 执行一条命令，返回 `false` 表示退出
    async fn execute(&self, command: &str, args: &[&str]) -> anyhow::Result<bool> {
        match command {
            "help" => {
                println!("Available commands:");
                println!("  help                  - Show this help message");
                println!("  start [front|rear]    - Acquire the camera");
                println!("  stop                  - Release the camera");
                println!("  switch                - Switch between front and rear camera");
                println!("  detect                - Classify the current frame once");
                println!("  auto [on|off]         - Toggle periodic detection");
                println!("  status                - Show scheduler status");
                println!("  history               - Show recent local results");
                println!("  alerts                - Show recent dirty-floor alerts");
                println!("  remote-history [n]    - Show the last n server-side events");
                println!("  health                - Probe the detection service");
                println!("  clear                 - Clear the screen");
                println!("  quit / exit           - Exit the CLI");
            }
            "start" => {
                let mode = args
                    .first()
                    .map(|arg| arg.parse::<SourceMode>())
                    .transpose()?;
                let mode = self.handle.start(mode).await?;
                println!("Camera started ({mode})");
            }
            "stop" => {
                if self.handle.stop().await? {
                    println!("Camera stopped");
                } else {
                    println!("Camera is not running");
                }
            }
            "switch" => match self.handle.switch_source().await? {
                Some(mode) => println!("Switched to {mode} camera"),
                None => println!("Camera is not running"),
            },
            "detect" => {
                let request_id = self.handle.manual_detect().await?;
                println!("Detection #{request_id} dispatched");
            }
            "auto" => {
                let enabled = match args.first().copied() {
                    Some("on") => self.handle.set_auto_detect(true).await?,
                    Some("off") => self.handle.set_auto_detect(false).await?,
                    Some(other) => anyhow::bail!("expected 'on' or 'off', got '{other}'"),
                    None => self.handle.toggle_auto_detect().await?,
                };
                if enabled {
                    println!("Auto-detect on (every {} ms)", self.interval_ms);
                } else {
                    println!("Auto-detect off");
                }
            }
            "status" => {
                let status = self.handle.status().await?;
                println!("{}", serde_json::to_string_pretty(&status)?);
                println!(
                    "Camera indicator: {}",
                    if self.indicator.is_on() { "on" } else { "off" }
                );
            }
            "history" => {
                let history = self.handle.history().await?;
                if history.is_empty() {
                    println!("No results yet");
                }
                for result in &history {
                    println!("  {}", format_result(result));
                }
            }
            "alerts" => {
                let alerts = match self.alerts.lock() {
                    Ok(feed) => feed.to_vec(),
                    Err(_) => anyhow::bail!("alert feed is unavailable"),
                };
                if alerts.is_empty() {
                    println!("No dirty-floor alerts");
                }
                for result in &alerts {
                    println!("  {}", format_result(result));
                }
            }
            "remote-history" => {
                let limit = match args.first() {
                    Some(arg) => arg.parse::<u32>()?,
                    None => 10,
                };
                let items = self.client.history(limit, 0).await?;
                if items.is_empty() {
                    println!("No server-side events");
                }
                for item in &items {
                    let confidence = item
                        .confidence
                        .map(|c| format!("{:.1}%", c * 100.0))
                        .unwrap_or_else(|| "-".to_string());
                    let created = item
                        .created_at
                        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "  #{:<6} {:<6} {:>7}  {}  {}",
                        item.id,
                        if item.is_dirty { "dirty" } else { "clean" },
                        confidence,
                        created,
                        item.source.as_deref().unwrap_or("-"),
                    );
                }
            }
            "health" => {
                let health = self.client.health().await?;
                println!(
                    "Service {}: {}",
                    health.service.as_deref().unwrap_or("detector"),
                    health.status
                );
            }
            "clear" => {
                print!("\x1B[2J\x1B[1;1H");
            }
            "quit" | "exit" => return Ok(false),
            _ => {
                println!("Unknown command: {}", command);
                println!("Type 'help' for available commands.");
            }
        }
        Ok(true)
    }
}

fn format_result(result: &DetectionResult) -> String {
    format!(
        "#{} {} ({:.1}%) at {}",
        result.id,
        result.label(),
        result.confidence * 100.0,
        result.created_at.format("%H:%M:%S")
    )
}

/// 打印调度事件；脏污结果同时记入告警列表
fn print_event(event: &SchedulerEvent, alerts: &Mutex<ResultHistory>) {
    match event {
        SchedulerEvent::Result(result) if result.is_dirty => {
            if let Ok(mut feed) = alerts.lock() {
                feed.push(result.clone());
            }
            println!("\n[dirty] {}", format_result(result))
        }
        SchedulerEvent::Result(result) => println!("\n[result] {}", format_result(result)),
        SchedulerEvent::Error(error) => println!("\n[error] {}: {}", error.kind().as_str(), error),
        SchedulerEvent::Session(SessionEvent::Started { mode, device, .. }) => {
            println!("\n[camera] {mode} camera active ({device})")
        }
        SchedulerEvent::Session(SessionEvent::Stopped { .. }) => println!("\n[camera] released"),
        SchedulerEvent::Session(SessionEvent::AutoDetect { enabled }) => {
            println!("\n[auto] {}", if *enabled { "enabled" } else { "disabled" })
        }
    }
}
