//! 模拟日志生成器
//!
//! 开启流式模式时按固定间隔向缓冲区追加一条随机日志。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::buffer::LogBuffer;
use super::model::{LogLevel, LogRecord};

const SOURCES: &[&str] = &["nginx", "apache", "application", "database", "auth"];
const PATHS: &[&str] = &[
    "/api/users",
    "/login",
    "/dashboard",
    "/api/orders",
    "/static/css",
    "/api/search",
];
const IPS: &[&str] = &[
    "192.168.1.100",
    "10.0.0.15",
    "172.16.0.22",
    "203.0.113.45",
    "198.51.100.12",
];
const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE"];
const STATUS_CODES: &[u16] = &[200, 201, 400, 401, 403, 404, 500, 502, 503];
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const ERROR_MESSAGES: &[&str] = &[
    "Database connection failed",
    "Authentication error occurred",
    "Failed to process request",
    "Internal server error",
    "Memory allocation failed",
];
const WARN_MESSAGES: &[&str] = &[
    "High memory usage detected",
    "Slow query performance",
    "Deprecated API endpoint used",
    "Rate limit approaching",
    "Cache miss occurred",
];
const INFO_MESSAGES: &[&str] = &[
    "User login successful",
    "Request processed successfully",
    "File uploaded successfully",
    "Cache invalidated",
    "Backup completed",
];
const DEBUG_MESSAGES: &[&str] = &[
    "Processing user request",
    "Database query executed",
    "Cache lookup performed",
    "Session validated",
    "API endpoint called",
];

/// 预填充数据覆盖的时间跨度
const SEED_SPAN_SECS: i64 = 7 * 24 * 60 * 60;

fn messages_for(level: LogLevel) -> &'static [&'static str] {
    match level {
        LogLevel::Error => ERROR_MESSAGES,
        LogLevel::Warn => WARN_MESSAGES,
        LogLevel::Info => INFO_MESSAGES,
        LogLevel::Debug => DEBUG_MESSAGES,
    }
}

/// 随机日志生成器
pub struct LogGenerator {
    rng: fastrand::Rng,
}

impl Default for LogGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl LogGenerator {
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    #[cfg(test)]
    fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[self.rng.usize(..items.len())]
    }

    /// 生成一条指定时间的随机日志
    pub fn record_at(&mut self, timestamp: DateTime<Utc>) -> LogRecord {
        let level = self.pick(&LogLevel::ALL);
        let message = self.pick(messages_for(level));
        let request_id = format!("req-{}", self.rng.u32(..100_000));

        LogRecord::new(
            format!("log-{}", uuid::Uuid::new_v4()),
            timestamp.to_rfc3339(),
            level,
            message,
        )
        .with_source(self.pick(SOURCES))
        .with_ip(self.pick(IPS))
        .with_path(self.pick(PATHS))
        .with_method(self.pick(METHODS))
        .with_status_code(self.pick(STATUS_CODES))
        .with_response_time(self.rng.u64(50..2050))
        .with_user_agent(USER_AGENT)
        .with_detail("requestId", serde_json::Value::String(request_id))
    }

    /// 生成过去 7 天内随机分布的日志，按时间升序
    pub fn seed(&mut self, count: usize, now: DateTime<Utc>) -> Vec<LogRecord> {
        let mut stamped: Vec<(DateTime<Utc>, LogRecord)> = (0..count)
            .map(|_| {
                let ts = now - TimeDelta::seconds(self.rng.i64(0..SEED_SPAN_SECS));
                (ts, self.record_at(ts))
            })
            .collect();
        stamped.sort_by_key(|(ts, _)| *ts);
        stamped.into_iter().map(|(_, record)| record).collect()
    }
}

/// 生成器任务句柄
///
/// 调用 `stop` 或丢弃句柄都会结束后台任务
pub struct GeneratorHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl GeneratorHandle {
    /// 停止生成并等待任务退出
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            tracing::warn!("模拟日志任务异常退出: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// 启动模拟日志流
pub fn spawn(buffer: Arc<LogBuffer>, interval: Duration) -> GeneratorHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut generator = LogGenerator::new();
        let mut ticker = tokio::time::interval(interval);
        // 第一次 tick 立即返回，跳过以保证间隔
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let record = generator.record_at(Utc::now());
                    let id = record.id.clone();
                    if let Err(e) = buffer.append(record) {
                        tracing::warn!(id = %id, "模拟日志追加失败: {}", e);
                    }
                }
            }
        }
        tracing::info!("模拟日志流已停止");
    });

    tracing::info!(interval_ms = interval.as_millis() as u64, "模拟日志流已启动");
    GeneratorHandle { stop_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_has_all_fields() {
        let mut generator = LogGenerator::with_seed(7);
        let now: DateTime<Utc> = "2025-01-13T12:00:00Z".parse().unwrap();
        let record = generator.record_at(now);

        assert!(record.id.starts_with("log-"));
        assert_eq!(record.parsed_timestamp(), Some(now));
        assert!(messages_for(record.level).contains(&record.message.as_str()));
        assert!(record.source.is_some());
        assert!(record.ip.is_some());
        assert!(record.path.is_some());
        assert!(STATUS_CODES.contains(&record.status_code.unwrap()));
        let rt = record.response_time.unwrap();
        assert!((50..2050).contains(&rt));
        assert!(record.details.contains_key("requestId"));
    }

    #[test]
    fn test_seed_sorted_within_last_week() {
        let mut generator = LogGenerator::with_seed(42);
        let now: DateTime<Utc> = "2025-01-13T12:00:00Z".parse().unwrap();
        let records = generator.seed(200, now);

        assert_eq!(records.len(), 200);
        let stamps: Vec<DateTime<Utc>> = records
            .iter()
            .map(|r| r.parsed_timestamp().unwrap())
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert!(stamps.iter().all(|ts| *ts <= now && *ts > now - TimeDelta::days(7)));

        // id 唯一，可整批写入缓冲区
        let buffer = LogBuffer::new(1000);
        assert!(buffer.append_batch(records).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_appends_until_stopped() {
        let buffer = Arc::new(LogBuffer::new(100));
        let handle = spawn(buffer.clone(), Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(6_500)).await;
        let appended = buffer.len();
        assert_eq!(appended, 3);

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(buffer.len(), appended);
    }
}
