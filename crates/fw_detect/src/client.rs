//! 检测客户端
//!
//! 每次调用恰好一次网络往返，不重试；超时、连接失败统一映射为 `Network`。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use fw_core::config::sanitize_base_url;
use fw_core::{ApiConfig, DetectionResult, EncodedFrame, FloorWatchError, Result, Transport};

use crate::wire::{self, FrameRequest, HealthStatus, HistoryItem};

const DETECT_PATH: &str = "/detect/frame";
const HEALTH_PATH: &str = "/health";
const HISTORY_PATH: &str = "/history";
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 帧分类能力
///
/// 调度器只依赖此 trait，测试中可替换为内存实现。
#[async_trait]
pub trait Detector: Send + Sync + 'static {
    /// 对一帧做一次分类
    async fn detect(&self, frame: EncodedFrame) -> Result<DetectionResult>;
}

/// HTTP 检测客户端
#[derive(Debug, Clone)]
pub struct DetectionClient {
    base_url: String,
    transport: Transport,
    notes: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl DetectionClient {
    /// 创建新客户端
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = sanitize_base_url(&config.base_url)?;
        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(MAX_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| FloorWatchError::Config(format!("http client: {e}")))?;

        tracing::debug!(base_url = %base_url, transport = ?config.transport, "detection client ready");
        Ok(Self {
            base_url,
            transport: config.transport,
            notes: config.notes.clone(),
            timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 上传一帧并解析分类结果
    pub async fn detect_frame(&self, frame: &EncodedFrame) -> Result<DetectionResult> {
        let url = self.url(DETECT_PATH);
        let request = match self.transport {
            Transport::Json => {
                let image_base64 = frame.payload.to_base64();
                self.client.post(&url).json(&FrameRequest {
                    image_base64: &image_base64,
                    notes: self.notes.as_deref(),
                })
            }
            Transport::Multipart => {
                let part = Part::bytes(frame.payload.to_jpeg_bytes()?)
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|e| FloorWatchError::Encoding(format!("multipart part: {e}")))?;
                let mut form = Form::new().part("file", part);
                if let Some(notes) = &self.notes {
                    form = form.text("notes", notes.clone());
                }
                self.client.post(&url).multipart(form)
            }
        };

        let started = std::time::Instant::now();
        let body = self.send(request, &url).await?;
        let result = wire::parse_detection(&body)?;

        tracing::info!(
            id = result.id,
            is_dirty = result.is_dirty,
            confidence = result.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "frame classified"
        );
        Ok(result)
    }

    /// 探测服务健康
    pub async fn health(&self) -> Result<HealthStatus> {
        let url = self.url(HEALTH_PATH);
        let body = self.send(self.client.get(&url), &url).await?;
        serde_json::from_str(&body)
            .map_err(|e| FloorWatchError::MalformedResponse(format!("invalid health response: {e}")))
    }

    /// 拉取服务端检测历史 (按时间倒序)
    pub async fn history(&self, limit: u32, offset: u32) -> Result<Vec<HistoryItem>> {
        let url = self.url(HISTORY_PATH);
        let request = self
            .client
            .get(&url)
            .query(&[("limit", limit), ("offset", offset)]);
        let body = self.send(request, &url).await?;
        wire::parse_history(&body)
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<String> {
        let resp = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(url, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| self.map_transport_error(url, e))?;

        if let Some(err) = wire::classify_status(status.as_u16(), &body) {
            tracing::warn!(url = %url, status = status.as_u16(), error = %err, "detection service rejected request");
            return Err(err);
        }
        Ok(body)
    }

    fn map_transport_error(&self, url: &str, err: reqwest::Error) -> FloorWatchError {
        if err.is_timeout() {
            FloorWatchError::Network(format!(
                "{url}: no response within {}s",
                self.timeout.as_secs()
            ))
        } else if err.is_connect() {
            FloorWatchError::Network(format!("cannot reach {url}: {err}"))
        } else {
            FloorWatchError::Network(format!("{url}: {err}"))
        }
    }
}

#[async_trait]
impl Detector for DetectionClient {
    async fn detect(&self, frame: EncodedFrame) -> Result<DetectionResult> {
        self.detect_frame(&frame).await
    }
}
