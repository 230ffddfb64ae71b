//! 有界日志缓冲区
//!
//! - 仅追加，id 在驻留记录中唯一
//! - 满载时按写入顺序淘汰最旧记录（FIFO）
//! - 快照为时间点拷贝，之后的追加不影响已返回的快照

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::error::{CapacityEvictionNotice, MonitorError};
use super::model::LogRecord;

/// 缓冲区统计
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStats {
    /// 当前驻留记录数
    pub len: usize,
    /// 容量
    pub capacity: usize,
    /// 累计追加数
    pub total_appended: u64,
    /// 累计淘汰数
    pub total_evicted: u64,
}

struct BufferInner {
    records: VecDeque<Arc<LogRecord>>,
    ids: HashSet<String>,
    total_appended: u64,
    total_evicted: u64,
}

impl BufferInner {
    /// 调用方需保证 id 不重复
    fn push(&mut self, record: LogRecord, capacity: usize) -> Option<CapacityEvictionNotice> {
        let mut notice = None;
        if self.records.len() >= capacity {
            if let Some(evicted) = self.records.pop_front() {
                self.ids.remove(&evicted.id);
                self.total_evicted += 1;
                tracing::debug!(evicted_id = %evicted.id, capacity, "缓冲区已满，淘汰最旧日志");
                notice = Some(CapacityEvictionNotice {
                    evicted_id: evicted.id.clone(),
                    capacity,
                });
            }
        }
        self.ids.insert(record.id.clone());
        self.records.push_back(Arc::new(record));
        self.total_appended += 1;
        notice
    }
}

/// 日志缓冲区（所有日志记录的唯一所有者）
pub struct LogBuffer {
    capacity: usize,
    inner: Mutex<BufferInner>,
}

impl LogBuffer {
    /// 创建缓冲区，容量至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(BufferInner {
                records: VecDeque::with_capacity(capacity),
                ids: HashSet::with_capacity(capacity),
                total_appended: 0,
                total_evicted: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// 追加单条记录
    pub fn append(&self, record: LogRecord) -> Result<Option<CapacityEvictionNotice>, MonitorError> {
        let mut inner = self.inner.lock();
        if inner.ids.contains(&record.id) {
            return Err(MonitorError::DuplicateId(record.id));
        }
        Ok(inner.push(record, self.capacity))
    }

    /// 批量追加（全部成功或全部拒绝）
    ///
    /// 先对驻留 id 和批内 id 做完整检查，遇到第一个重复即拒绝整批，缓冲区保持不变。
    pub fn append_batch(
        &self,
        records: Vec<LogRecord>,
    ) -> Result<Vec<CapacityEvictionNotice>, MonitorError> {
        let mut inner = self.inner.lock();

        {
            let mut batch_ids = HashSet::with_capacity(records.len());
            for record in &records {
                if inner.ids.contains(&record.id) || !batch_ids.insert(record.id.as_str()) {
                    tracing::warn!(id = %record.id, batch_size = records.len(), "批量追加遇到重复 id，整批拒绝");
                    return Err(MonitorError::DuplicateId(record.id.clone()));
                }
            }
        }

        let notices = records
            .into_iter()
            .filter_map(|record| inner.push(record, self.capacity))
            .collect();
        Ok(notices)
    }

    /// 时间点快照（按写入顺序）
    pub fn snapshot(&self) -> Vec<Arc<LogRecord>> {
        self.inner.lock().records.iter().cloned().collect()
    }

    /// 清空缓冲区，返回清除的记录数
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.records.len();
        inner.records.clear();
        inner.ids.clear();
        count
    }

    pub fn stats(&self) -> BufferStats {
        let inner = self.inner.lock();
        BufferStats {
            len: inner.records.len(),
            capacity: self.capacity,
            total_appended: inner.total_appended,
            total_evicted: inner.total_evicted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::model::LogLevel;

    fn record(id: usize) -> LogRecord {
        LogRecord::new(
            id.to_string(),
            "2025-01-13T10:00:00Z",
            LogLevel::Info,
            format!("message {}", id),
        )
    }

    fn ids(buffer: &LogBuffer) -> Vec<String> {
        buffer.snapshot().iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_append_and_snapshot_order() {
        let buffer = LogBuffer::new(10);
        for i in 1..=3 {
            assert!(buffer.append(record(i)).unwrap().is_none());
        }
        assert_eq!(ids(&buffer), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let buffer = LogBuffer::new(10);
        buffer.append(record(1)).unwrap();

        assert!(matches!(
            buffer.append(record(1)),
            Err(MonitorError::DuplicateId(id)) if id == "1"
        ));
        assert_eq!(buffer.len(), 1);
    }

    /// 1000 容量缓冲区写入 1..=1005，应保留 6..=1005
    #[test]
    fn test_fifo_eviction_keeps_last_capacity() {
        let buffer = LogBuffer::new(1000);
        let mut notices = Vec::new();
        for i in 1..=1005 {
            if let Some(notice) = buffer.append(record(i)).unwrap() {
                notices.push(notice);
            }
        }

        let snapshot = ids(&buffer);
        assert_eq!(snapshot.len(), 1000);
        assert_eq!(snapshot.first().map(String::as_str), Some("6"));
        assert_eq!(snapshot.last().map(String::as_str), Some("1005"));

        let evicted: Vec<&str> = notices.iter().map(|n| n.evicted_id.as_str()).collect();
        assert_eq!(evicted, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(buffer.stats().total_evicted, 5);
    }

    #[test]
    fn test_evicted_id_can_be_reused() {
        let buffer = LogBuffer::new(2);
        buffer.append(record(1)).unwrap();
        buffer.append(record(2)).unwrap();
        buffer.append(record(3)).unwrap();

        assert!(buffer.append(record(1)).is_ok());
        assert_eq!(ids(&buffer), vec!["3", "1"]);
    }

    #[test]
    fn test_batch_is_atomic_on_duplicate() {
        let buffer = LogBuffer::new(10);
        buffer.append(record(1)).unwrap();

        // 与驻留记录冲突
        let result = buffer.append_batch(vec![record(2), record(3), record(1)]);
        assert!(matches!(result, Err(MonitorError::DuplicateId(_))));
        assert_eq!(ids(&buffer), vec!["1"]);

        // 批内冲突
        let result = buffer.append_batch(vec![record(4), record(4)]);
        assert!(matches!(result, Err(MonitorError::DuplicateId(_))));
        assert_eq!(ids(&buffer), vec!["1"]);
        assert_eq!(buffer.stats().total_appended, 1);
    }

    #[test]
    fn test_batch_larger_than_capacity() {
        let buffer = LogBuffer::new(3);
        let notices = buffer
            .append_batch((1..=5).map(record).collect())
            .unwrap();

        assert_eq!(notices.len(), 2);
        assert_eq!(ids(&buffer), vec!["3", "4", "5"]);
    }

    #[test]
    fn test_snapshot_isolated_from_later_appends() {
        let buffer = LogBuffer::new(2);
        buffer.append(record(1)).unwrap();
        buffer.append(record(2)).unwrap();

        let snapshot = buffer.snapshot();
        buffer.append(record(3)).unwrap();

        let snapshot_ids: Vec<&str> = snapshot.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(snapshot_ids, vec!["1", "2"]);
        assert_eq!(ids(&buffer), vec!["2", "3"]);
    }

    #[test]
    fn test_clear() {
        let buffer = LogBuffer::new(5);
        buffer.append_batch((1..=3).map(record).collect()).unwrap();

        assert_eq!(buffer.clear(), 3);
        assert!(buffer.is_empty());
        assert!(buffer.append(record(1)).is_ok());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let buffer = LogBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
    }

    /// 并发追加与快照：每个快照都是连续、有序、不超过容量的 id 序列
    #[test]
    fn test_concurrent_append_and_snapshot() {
        const TOTAL: usize = 5_000;
        let buffer = LogBuffer::new(100);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..TOTAL {
                    buffer.append(record(i)).unwrap();
                }
            });
            scope.spawn(|| {
                for _ in 0..500 {
                    let seen: Vec<usize> = buffer
                        .snapshot()
                        .iter()
                        .map(|r| r.id.parse().unwrap())
                        .collect();
                    assert!(seen.len() <= 100);
                    assert!(seen.windows(2).all(|w| w[1] == w[0] + 1), "snapshot {:?}", seen);
                }
            });
        });

        let stats = buffer.stats();
        assert_eq!(stats.len, 100);
        assert_eq!(stats.total_appended, TOTAL as u64);
        assert_eq!(stats.total_evicted, (TOTAL - 100) as u64);
        assert_eq!(ids(&buffer).first().map(String::as_str), Some("4900"));
    }
}
