//! 全局错误处理机制

use std::fmt;

use thiserror::Error;

/// 设备访问失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAccessReason {
    /// 用户或系统拒绝授权
    PermissionDenied,
    /// 设备存在但当前无法打开
    Unavailable,
    /// 没有与请求的源模式匹配的设备
    NoMatchingDevice,
}

impl fmt::Display for DeviceAccessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceAccessReason::PermissionDenied => "permission denied",
            DeviceAccessReason::Unavailable => "device unavailable",
            DeviceAccessReason::NoMatchingDevice => "no matching device",
        };
        f.write_str(s)
    }
}

/// FloorWatch 统一错误类型
///
/// 所有变体都携带可读消息并且可以 `Clone`，以便通过结果通道向上层传递。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FloorWatchError {
    #[error("Device access error ({reason}): {message}")]
    DeviceAccess {
        reason: DeviceAccessReason,
        message: String,
    },

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Detection service unavailable (HTTP {status}): {detail}")]
    ServiceUnavailable { status: u16, detail: String },

    #[error("Detection request rejected (HTTP {status}): {detail}")]
    Request { status: u16, detail: String },

    #[error("Malformed detection response: {0}")]
    MalformedResponse(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Capture session is inactive")]
    Inactive,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

/// 错误分类 (用于日志字段与调用方分支判断)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DeviceAccess,
    Capture,
    Encoding,
    Network,
    ServiceUnavailable,
    Request,
    MalformedResponse,
    NotReady,
    Inactive,
    Config,
    Channel,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DeviceAccess => "device_access",
            ErrorKind::Capture => "capture",
            ErrorKind::Encoding => "encoding",
            ErrorKind::Network => "network",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Request => "request",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::Inactive => "inactive",
            ErrorKind::Config => "config",
            ErrorKind::Channel => "channel",
        }
    }
}

impl FloorWatchError {
    /// 构造设备访问错误
    pub fn device_access(reason: DeviceAccessReason, message: impl Into<String>) -> Self {
        FloorWatchError::DeviceAccess {
            reason,
            message: message.into(),
        }
    }

    /// 获取错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            FloorWatchError::DeviceAccess { .. } => ErrorKind::DeviceAccess,
            FloorWatchError::Capture(_) => ErrorKind::Capture,
            FloorWatchError::Encoding(_) => ErrorKind::Encoding,
            FloorWatchError::Network(_) => ErrorKind::Network,
            FloorWatchError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            FloorWatchError::Request { .. } => ErrorKind::Request,
            FloorWatchError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            FloorWatchError::NotReady(_) => ErrorKind::NotReady,
            FloorWatchError::Inactive => ErrorKind::Inactive,
            FloorWatchError::Config(_) => ErrorKind::Config,
            FloorWatchError::Channel(_) => ErrorKind::Channel,
        }
    }

    /// 是否为可恢复的检测失败 (下一轮周期会自然重试)
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network | ErrorKind::ServiceUnavailable | ErrorKind::MalformedResponse
        )
    }
}

impl From<serde_json::Error> for FloorWatchError {
    fn from(err: serde_json::Error) -> Self {
        FloorWatchError::Config(err.to_string())
    }
}

/// 统一 Result 类型别名
pub type Result<T> = std::result::Result<T, FloorWatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = FloorWatchError::device_access(DeviceAccessReason::PermissionDenied, "blocked");
        assert_eq!(err.kind(), ErrorKind::DeviceAccess);
        assert!(err.to_string().contains("permission denied"));

        let err = FloorWatchError::ServiceUnavailable {
            status: 504,
            detail: "gateway timeout".to_string(),
        };
        assert_eq!(err.kind().as_str(), "service_unavailable");
        assert!(err.is_transient());
    }

    #[test]
    fn test_request_error_is_not_transient() {
        let err = FloorWatchError::Request {
            status: 422,
            detail: "image_base64 missing".to_string(),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("422"));
    }
}
