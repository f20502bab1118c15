//! 全局配置
//!
//! 加载顺序：内置默认值 -> JSON 配置文件 (可选) -> `FLOORWATCH_*` 环境变量 -> 校验。

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FloorWatchError, Result};
use crate::result::SourceMode;

const ENV_PREFIX: &str = "FLOORWATCH_";

/// 帧上传方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// JSON 体，`image_base64` 文本字段
    #[default]
    Json,
    /// multipart 表单，`file` 二进制字段
    Multipart,
}

impl FromStr for Transport {
    type Err = FloorWatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Transport::Json),
            "multipart" => Ok(Transport::Multipart),
            other => Err(FloorWatchError::Config(format!("unknown transport: {other}"))),
        }
    }
}

/// 检测服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// 服务根地址
    pub base_url: String,
    /// 单次请求超时 (秒)，冷启动后端需要 >= 30
    pub timeout_secs: u64,
    /// 上传方式
    pub transport: Transport,
    /// 随帧附带的备注
    pub notes: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            transport: Transport::Json,
            notes: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 采集与编码配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 光栅目标宽度
    pub width: u32,
    /// 光栅目标高度
    pub height: u32,
    /// 编码质量 (0, 1]
    pub quality: f32,
    /// 默认视频源
    pub source_mode: SourceMode,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            quality: 0.9,
            source_mode: SourceMode::Rear,
        }
    }
}

/// 调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 自动检测周期 (毫秒)
    pub interval_ms: u64,
    /// 保留的结果条数
    pub history_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            history_capacity: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// 摄像头来源
///
/// 任一图片路径存在时使用图片文件摄像头，否则使用测试图摄像头。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub front_image: Option<PathBuf>,
    pub rear_image: Option<PathBuf>,
}

impl CameraConfig {
    pub fn uses_still_images(&self) -> bool {
        self.front_image.is_some() || self.rear_image.is_some()
    }
}

/// FloorWatch 总配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorWatchConfig {
    pub api: ApiConfig,
    pub capture: CaptureConfig,
    pub scheduler: SchedulerConfig,
    pub camera: CameraConfig,
}

impl FloorWatchConfig {
    /// 从默认值、可选配置文件与进程环境变量加载
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.finalize()
    }

    /// 从 JSON 文件加载 (未校验)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FloorWatchError::Config(format!("read {} failed: {e}", path.display()))
        })?;
        Self::from_json_str(&content)
    }

    /// 从 JSON 文本解析 (未校验)
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// 用环境变量覆盖字段
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("API_BASE") {
            self.api.base_url = v;
        }
        if let Some(v) = get("TIMEOUT_SECS") {
            self.api.timeout_secs = parse_env("TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("TRANSPORT") {
            self.api.transport = v.parse()?;
        }
        if let Some(v) = get("NOTES") {
            self.api.notes = if v.trim().is_empty() { None } else { Some(v) };
        }
        if let Some(v) = get("CAPTURE_WIDTH") {
            self.capture.width = parse_env("CAPTURE_WIDTH", &v)?;
        }
        if let Some(v) = get("CAPTURE_HEIGHT") {
            self.capture.height = parse_env("CAPTURE_HEIGHT", &v)?;
        }
        if let Some(v) = get("CAPTURE_QUALITY") {
            self.capture.quality = parse_env("CAPTURE_QUALITY", &v)?;
        }
        if let Some(v) = get("SOURCE") {
            self.capture.source_mode = v.parse()?;
        }
        if let Some(v) = get("INTERVAL_MS") {
            self.scheduler.interval_ms = parse_env("INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("HISTORY_CAPACITY") {
            self.scheduler.history_capacity = parse_env("HISTORY_CAPACITY", &v)?;
        }
        if let Some(v) = get("FRONT_IMAGE") {
            self.camera.front_image = Some(PathBuf::from(v));
        }
        if let Some(v) = get("REAR_IMAGE") {
            self.camera.rear_image = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// 规范化服务地址并校验
    pub fn finalize(mut self) -> Result<Self> {
        self.api.base_url = sanitize_base_url(&self.api.base_url)?;
        self.validate()?;
        Ok(self)
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<()> {
        if self.api.timeout_secs == 0 {
            return Err(FloorWatchError::Config("api.timeout_secs must be > 0".to_string()));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(FloorWatchError::Config(
                "capture.width and capture.height must be > 0".to_string(),
            ));
        }
        if !(self.capture.quality > 0.0 && self.capture.quality <= 1.0) {
            return Err(FloorWatchError::Config(format!(
                "capture.quality must be in (0, 1], got {}",
                self.capture.quality
            )));
        }
        if self.scheduler.interval_ms == 0 {
            return Err(FloorWatchError::Config("scheduler.interval_ms must be > 0".to_string()));
        }
        if self.scheduler.history_capacity == 0 {
            return Err(FloorWatchError::Config(
                "scheduler.history_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        FloorWatchError::Config(format!("{ENV_PREFIX}{name}: invalid value {value:?}"))
    })
}

/// 规范化服务根地址
///
/// 去掉末尾斜杠；非本机地址的 `http://` 一律升级为 `https://`。
pub fn sanitize_base_url(url: &str) -> Result<String> {
    let mut sanitized = url.trim().trim_end_matches('/').to_string();
    if sanitized.is_empty() {
        return Err(FloorWatchError::Config("api.base_url is empty".to_string()));
    }

    let is_local = ["localhost", "127.0.0.1", "[::1]", "0.0.0.0"]
        .iter()
        .any(|host| sanitized.contains(host));

    if let Some(rest) = sanitized.strip_prefix("http://") {
        if !is_local {
            tracing::warn!(url = %sanitized, "upgrading non-local http base url to https");
            sanitized = format!("https://{rest}");
        }
    } else if !sanitized.starts_with("https://") {
        let scheme = if is_local { "http" } else { "https" };
        sanitized = format!("{scheme}://{sanitized}");
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FloorWatchConfig::default().finalize().unwrap();
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.scheduler.history_capacity, 10);
        assert_eq!(config.scheduler.interval(), Duration::from_secs(5));
        assert_eq!(config.api.base_url, "http://localhost:8000");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = FloorWatchConfig::from_json_str(
            r#"{ "capture": { "quality": 0.5 }, "api": { "transport": "multipart" } }"#,
        )
        .unwrap();
        assert_eq!(config.capture.quality, 0.5);
        assert_eq!(config.capture.height, 480);
        assert_eq!(config.api.transport, Transport::Multipart);
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FLOORWATCH_API_BASE", "https://detector.example.com/"),
            ("FLOORWATCH_INTERVAL_MS", "2500"),
            ("FLOORWATCH_SOURCE", "front"),
            ("FLOORWATCH_NOTES", "lobby"),
            ("FLOORWATCH_REAR_IMAGE", "/srv/floor/rear.jpg"),
        ]
        .into_iter()
        .collect();

        let mut config = FloorWatchConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        let config = config.finalize().unwrap();

        assert_eq!(config.api.base_url, "https://detector.example.com");
        assert_eq!(config.scheduler.interval_ms, 2500);
        assert_eq!(config.capture.source_mode, SourceMode::Front);
        assert_eq!(config.api.notes.as_deref(), Some("lobby"));
        assert!(config.camera.uses_still_images());
        assert!(config.camera.front_image.is_none());
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = FloorWatchConfig::default();
        let err = config
            .apply_env(|key| (key == "FLOORWATCH_CAPTURE_WIDTH").then(|| "wide".to_string()))
            .unwrap_err();
        assert!(matches!(err, FloorWatchError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = FloorWatchConfig::default();
        config.capture.quality = 1.5;
        assert!(config.validate().is_err());

        let mut config = FloorWatchConfig::default();
        config.scheduler.history_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sanitize_base_url() {
        assert_eq!(
            sanitize_base_url("http://api.example.com//").unwrap(),
            "https://api.example.com"
        );
        assert_eq!(
            sanitize_base_url(" http://localhost:8000/ ").unwrap(),
            "http://localhost:8000"
        );
        assert_eq!(
            sanitize_base_url("127.0.0.1:9000").unwrap(),
            "http://127.0.0.1:9000"
        );
        assert!(sanitize_base_url("  ").is_err());
    }
}
