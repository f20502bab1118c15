//! 检测结果与视频源模式

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FloorWatchError;

/// 一次远程分类的结果 (创建后不可变)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// 服务端事件 ID
    pub id: i64,
    /// 是否判定为脏
    pub is_dirty: bool,
    /// 置信度 [0, 1]
    pub confidence: f32,
    /// 服务端创建时间
    pub created_at: DateTime<Utc>,
}

impl DetectionResult {
    /// 创建新结果，置信度被钳制到 [0, 1]
    pub fn new(id: i64, is_dirty: bool, confidence: f32, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            is_dirty,
            confidence: confidence.clamp(0.0, 1.0),
            created_at,
        }
    }

    /// 人类可读的状态标签
    pub fn label(&self) -> &'static str {
        if self.is_dirty {
            "dirty"
        } else {
            "clean"
        }
    }
}

/// 视频源模式 (前置 / 后置)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Front,
    #[default]
    Rear,
}

impl SourceMode {
    /// 相反的源模式
    pub fn opposite(self) -> Self {
        match self {
            SourceMode::Front => SourceMode::Rear,
            SourceMode::Rear => SourceMode::Front,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Front => "front",
            SourceMode::Rear => "rear",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceMode {
    type Err = FloorWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "front" | "user" => Ok(SourceMode::Front),
            "rear" | "back" | "environment" => Ok(SourceMode::Rear),
            other => Err(FloorWatchError::Config(format!(
                "unknown source mode: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_mode_opposite() {
        assert_eq!(SourceMode::Front.opposite(), SourceMode::Rear);
        assert_eq!(SourceMode::Rear.opposite().opposite(), SourceMode::Rear);
    }

    #[test]
    fn test_source_mode_parse() {
        assert_eq!("Front".parse::<SourceMode>().unwrap(), SourceMode::Front);
        assert_eq!("environment".parse::<SourceMode>().unwrap(), SourceMode::Rear);
        assert!("side".parse::<SourceMode>().is_err());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let result = DetectionResult::new(1, true, 1.7, Utc::now());
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.label(), "dirty");
    }
}
