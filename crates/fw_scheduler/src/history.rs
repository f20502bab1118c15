//! 检测结果历史 (最新在前，固定容量)

use std::collections::VecDeque;

use fw_core::DetectionResult;

/// 有界结果历史
#[derive(Debug, Clone)]
pub struct ResultHistory {
    entries: VecDeque<DetectionResult>,
    capacity: usize,
}

impl ResultHistory {
    /// 创建新历史，容量至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 插入到最前，超出容量时淘汰并返回最旧的一条
    pub fn push(&mut self, result: DetectionResult) -> Option<DetectionResult> {
        self.entries.push_front(result);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn latest(&self) -> Option<&DetectionResult> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectionResult> {
        self.entries.iter()
    }

    /// 快照 (最新在前)
    pub fn to_vec(&self) -> Vec<DetectionResult> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ResultHistory {
    fn default() -> Self {
        Self::new(10)
    }
}
