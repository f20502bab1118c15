//! FloorWatch Daemon - Headless 定时检测守护进程

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fw_capture::{provider_from_config, CaptureSession, DeviceIndicator, FrameEncoder};
use fw_core::FloorWatchConfig;
use fw_detect::DetectionClient;
use fw_scheduler::{ChannelSink, DetectionScheduler, SchedulerEvent, SessionEvent};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "floorwatch_daemon=debug,fw_scheduler=info,fw_capture=info,fw_detect=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("FloorWatch Daemon starting...");

    // 加载配置
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FLOORWATCH_CONFIG").ok())
        .map(PathBuf::from);
    let config = FloorWatchConfig::load(config_path.as_deref())
        .context("failed to load configuration")?;
    tracing::info!(
        base_url = %config.api.base_url,
        transport = ?config.api.transport,
        interval_ms = config.scheduler.interval_ms,
        "Configuration loaded"
    );

    // 检测客户端 + 冷启动预热
    let client = Arc::new(DetectionClient::new(&config.api)?);
    match client.health().await {
        Ok(health) if health.is_healthy() => {
            tracing::info!(service = ?health.service, "Detection service is healthy")
        }
        Ok(health) => tracing::warn!(status = %health.status, "Detection service reports degraded status"),
        Err(e) => tracing::warn!(error = %e, "Detection service not reachable yet, continuing"),
    }

    // 采集会话
    let indicator = DeviceIndicator::new();
    let provider = provider_from_config(&config.camera, indicator.clone());
    tracing::info!(provider = provider.name(), "Camera provider initialized");
    let session = CaptureSession::new(provider, &config.capture);
    let encoder = FrameEncoder::new(&config.capture, config.api.transport);

    // 调度器
    let (sink, mut events) = ChannelSink::new();
    let (scheduler, handle) = DetectionScheduler::new(
        session,
        encoder,
        client.clone(),
        Box::new(sink),
        &config.scheduler,
    );
    let scheduler_task = tokio::spawn(scheduler.with_request_timeout(config.api.timeout()).run());

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SchedulerEvent::Result(result) => tracing::info!(
                    id = result.id,
                    label = result.label(),
                    confidence = result.confidence,
                    "Floor is {}",
                    result.label()
                ),
                SchedulerEvent::Error(e) if e.is_transient() => tracing::warn!(
                    kind = e.kind().as_str(),
                    error = %e,
                    "Detection attempt failed, retrying next cycle"
                ),
                SchedulerEvent::Error(e) => {
                    tracing::error!(kind = e.kind().as_str(), error = %e, "Detection attempt failed")
                }
                SchedulerEvent::Session(SessionEvent::Started { mode, device, generation }) => {
                    tracing::info!(%mode, %device, generation, "Camera active")
                }
                SchedulerEvent::Session(event) => tracing::debug!(?event, "Session changed"),
            }
        }
    });

    handle
        .start(None)
        .await
        .context("failed to start capture session")?;
    handle.set_auto_detect(true).await?;

    tracing::info!("FloorWatch Daemon is ready!");
    tracing::info!("Press Ctrl+C to shutdown...");

    // 等待关闭信号
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    let status = handle.status().await?;
    tracing::info!(
        dispatched = status.dispatched,
        discarded = status.discarded,
        skipped_ticks = status.skipped_ticks,
        history = status.history_len,
        "Detection summary"
    );
    handle.shutdown().await?;
    scheduler_task.await?;

    if indicator.is_on() {
        tracing::warn!("Camera indicator still lit after shutdown");
    }
    Ok(())
}
