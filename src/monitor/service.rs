//! 日志监控服务
//!
//! 持有唯一的日志缓冲区，对外提供写入、快照、聚合、搜索与流式开关。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::aggregate::{AggregateFilters, AggregateResult, Aggregator};
use super::buffer::{BufferStats, LogBuffer};
use super::error::MonitorError;
use super::generator::{self, GeneratorHandle, LogGenerator};
use super::model::{LogRecord, RawLogRecord};
use super::parser;
use super::search::{self, SearchOptions, SearchResult};
use super::types::IngestResponse;

/// 服务配置
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub search_limit: usize,
    pub generator_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            search_limit: search::DEFAULT_SEARCH_LIMIT,
            generator_interval: Duration::from_secs(2),
        }
    }
}

pub struct MonitorService {
    buffer: Arc<LogBuffer>,
    aggregator: Aggregator,
    settings: MonitorSettings,
    generator: Mutex<Option<GeneratorHandle>>,
}

impl MonitorService {
    pub fn new(buffer: Arc<LogBuffer>, aggregator: Aggregator, settings: MonitorSettings) -> Self {
        Self {
            buffer,
            aggregator,
            settings,
            generator: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn buffer(&self) -> &Arc<LogBuffer> {
        &self.buffer
    }

    /// 预填充模拟日志
    pub fn seed(&self, count: usize, now: DateTime<Utc>) -> Result<usize, MonitorError> {
        if count == 0 {
            return Ok(0);
        }
        let records = LogGenerator::new().seed(count, now);
        self.buffer.append_batch(records)?;
        tracing::info!(count, "已预填充模拟日志");
        Ok(count)
    }

    /// 写入一批入站日志（全部成功或全部拒绝）
    ///
    /// 未携带 id 的记录在此分配 `log-<uuid>`，未携带时间戳的记录使用写入时间
    pub fn ingest(&self, raws: Vec<RawLogRecord>) -> Result<IngestResponse, MonitorError> {
        let received_at = Utc::now().to_rfc3339();
        let records = raws
            .into_iter()
            .map(|mut raw| {
                if raw.id.is_none() {
                    raw.id = Some(format!("log-{}", uuid::Uuid::new_v4()));
                }
                if raw.timestamp.trim().is_empty() {
                    raw.timestamp = received_at.clone();
                }
                LogRecord::try_from(raw)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let notices = self.buffer.append_batch(records)?;

        if let Some(first) = notices.first() {
            tracing::debug!(
                evicted = notices.len(),
                capacity = first.capacity,
                oldest_evicted = %first.evicted_id,
                "写入日志触发容量淘汰"
            );
        }

        Ok(IngestResponse {
            accepted: ids.len(),
            evicted: notices.len(),
            ids,
        })
    }

    /// 解析并写入纯文本日志
    pub fn ingest_text(&self, text: &str, now: DateTime<Utc>) -> Result<IngestResponse, MonitorError> {
        let raws = parser::parse_text(text, now);
        tracing::info!(lines = raws.len(), "解析上传日志");
        self.ingest(raws)
    }

    /// 当前缓冲区快照
    pub fn snapshot(&self) -> Vec<Arc<LogRecord>> {
        self.buffer.snapshot()
    }

    /// 对当前快照做聚合
    pub fn stats(&self, now: DateTime<Utc>, filters: &AggregateFilters) -> AggregateResult {
        let snapshot = self.snapshot();
        self.aggregator.aggregate(&snapshot, now, filters)
    }

    /// 搜索当前快照，结果上限不超过服务配置
    pub fn search(&self, query: &str, mut options: SearchOptions) -> SearchResult {
        options.limit = options.limit.min(self.settings.search_limit);
        let snapshot = self.snapshot();
        search::search(&snapshot, query, &options)
    }

    pub fn buffer_stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    pub fn clear(&self) -> usize {
        let count = self.buffer.clear();
        tracing::info!(count, "日志缓冲区已清空");
        count
    }

    pub fn generator_interval(&self) -> Duration {
        self.settings.generator_interval
    }

    pub async fn is_streaming(&self) -> bool {
        self.generator
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 开启或关闭模拟日志流，返回最新状态
    pub async fn set_streaming(&self, enabled: bool) -> bool {
        let mut slot = self.generator.lock().await;
        match (enabled, slot.take()) {
            (true, Some(handle)) if !handle.is_finished() => {
                *slot = Some(handle);
            }
            (true, _) => {
                *slot = Some(generator::spawn(
                    self.buffer.clone(),
                    self.settings.generator_interval,
                ));
            }
            (false, Some(handle)) => handle.stop().await,
            (false, None) => {}
        }
        slot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::model::LogLevel;

    fn service(capacity: usize) -> MonitorService {
        MonitorService::new(
            Arc::new(LogBuffer::new(capacity)),
            Aggregator::default(),
            MonitorSettings::default(),
        )
    }

    fn raw(id: Option<&str>, level: &str, message: &str) -> RawLogRecord {
        RawLogRecord {
            id: id.map(str::to_string),
            timestamp: "2025-01-13T10:00:00Z".to_string(),
            level: level.to_string(),
            message: message.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ingest_assigns_missing_ids() {
        let service = service(10);
        let response = service
            .ingest(vec![raw(None, "error", "db timeout"), raw(Some("fixed"), "INFO", "ok")])
            .unwrap();

        assert_eq!(response.accepted, 2);
        assert_eq!(response.evicted, 0);
        assert!(response.ids[0].starts_with("log-"));
        assert_eq!(response.ids[1], "fixed");
        assert_eq!(service.snapshot()[0].level, LogLevel::Error);
    }

    #[test]
    fn test_ingest_fills_missing_timestamp() {
        let service = service(10);
        let mut record = raw(Some("a"), "INFO", "ok");
        record.timestamp = String::new();
        service.ingest(vec![record]).unwrap();

        assert!(service.snapshot()[0].parsed_timestamp().is_some());
    }

    #[test]
    fn test_ingest_rejects_whole_request_on_invalid_record() {
        let service = service(10);
        let result = service.ingest(vec![raw(Some("a"), "INFO", "ok"), raw(Some("b"), "FATAL", "boom")]);

        assert!(matches!(result, Err(MonitorError::Validation(_))));
        assert!(service.buffer().is_empty());
    }

    #[test]
    fn test_ingest_duplicate_rejected() {
        let service = service(10);
        service.ingest(vec![raw(Some("a"), "INFO", "ok")]).unwrap();

        let result = service.ingest(vec![raw(Some("b"), "INFO", "ok"), raw(Some("a"), "INFO", "again")]);
        assert!(matches!(result, Err(MonitorError::DuplicateId(_))));
        assert_eq!(service.buffer().len(), 1);
    }

    #[test]
    fn test_ingest_reports_evictions() {
        let service = service(2);
        let response = service
            .ingest(vec![
                raw(Some("1"), "INFO", "a"),
                raw(Some("2"), "INFO", "b"),
                raw(Some("3"), "INFO", "c"),
            ])
            .unwrap();
        assert_eq!(response.evicted, 1);
    }

    #[test]
    fn test_ingest_text_and_stats() {
        let service = service(10);
        let now: DateTime<Utc> = "2025-01-13T12:00:00Z".parse().unwrap();
        service
            .ingest_text("ERROR db timeout\nERROR db timeout\nINFO ok\n", now)
            .unwrap();

        let stats = service.stats(now, &AggregateFilters::default());
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.level_counts.error, 2);
        assert_eq!(stats.error_groups.len(), 1);
        assert_eq!(stats.error_groups[0].count, 2);
    }

    #[test]
    fn test_search_limit_capped_by_settings() {
        let service = MonitorService::new(
            Arc::new(LogBuffer::new(100)),
            Aggregator::default(),
            MonitorSettings {
                search_limit: 5,
                ..MonitorSettings::default()
            },
        );
        let now: DateTime<Utc> = "2025-01-13T12:00:00Z".parse().unwrap();
        service.seed(20, now).unwrap();

        let result = service.search("", SearchOptions::default());
        assert_eq!(result.records.len(), 5);
        assert!(result.truncated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_toggle() {
        let service = service(100);
        assert!(!service.is_streaming().await);

        assert!(service.set_streaming(true).await);
        // 重复开启不会启动第二个任务
        assert!(service.set_streaming(true).await);
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(service.buffer().len(), 2);

        assert!(!service.set_streaming(false).await);
        assert!(!service.is_streaming().await);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(service.buffer().len(), 2);
    }
}
