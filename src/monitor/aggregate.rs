//! 日志聚合
//!
//! 纯函数：对快照单次扫描，输出级别统计、Top-N、错误分组、小时分布与异常信号。
//! 不读取系统时钟，"当前时间"由调用方传入。

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::anomaly::{self, AnomalySignal, AnomalyThresholds, ErrorWindows};
use super::extract;
use super::model::{LogLevel, LogRecord};

/// Top-N 列表长度
pub const TOP_N: usize = 5;

/// 聚合前的过滤条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateFilters {
    pub level: Option<LogLevel>,
    pub source: Option<String>,
    /// 仅统计该时间之后（含）的记录，时间戳无法解析的记录被排除
    pub since: Option<DateTime<Utc>>,
}

impl AggregateFilters {
    /// `source` 与 Top-N 统计一致，按解析后的有效来源比较
    fn matches(&self, record: &LogRecord, source: Option<&str>) -> bool {
        if self.level.is_some_and(|level| level != record.level) {
            return false;
        }
        if let Some(ref expected) = self.source {
            if source != Some(expected.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            return record.parsed_timestamp().is_some_and(|ts| ts >= since);
        }
        true
    }
}

/// 各级别计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    #[serde(rename = "ERROR")]
    pub error: u64,
    #[serde(rename = "WARN")]
    pub warn: u64,
    #[serde(rename = "INFO")]
    pub info: u64,
    #[serde(rename = "DEBUG")]
    pub debug: u64,
}

impl LevelCounts {
    fn add(&mut self, level: LogLevel) {
        match level {
            LogLevel::Error => self.error += 1,
            LogLevel::Warn => self.warn += 1,
            LogLevel::Info => self.info += 1,
            LogLevel::Debug => self.debug += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.error + self.warn + self.info + self.debug
    }
}

/// Top-N 条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopEntry<T> {
    pub value: T,
    pub count: u64,
}

/// 错误分组：按 (level, message) 去重
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorGroup {
    /// 由分组键派生，跨聚合稳定
    pub id: String,
    pub level: LogLevel,
    pub message: String,
    pub count: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_source: Option<String>,
}

/// 由分组键计算分组 id（SHA-256 前 16 位十六进制）
pub fn group_id(level: LogLevel, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(level.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(message.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// 小时分布桶
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourBucket {
    /// 两位小时标签 "00".."23"（UTC）
    pub label: String,
    pub count: u64,
    pub error_count: u64,
}

/// 响应时间统计
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimeStats {
    pub samples: u64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

/// IP 网段分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IpZone {
    Internal,
    Private,
    Loopback,
    External,
}

impl IpZone {
    /// 无法解析为 IP 地址时返回 None
    pub fn classify(ip: &str) -> Option<IpZone> {
        let zone = match ip.trim().parse::<IpAddr>().ok()? {
            IpAddr::V4(v4) if v4.is_loopback() => IpZone::Loopback,
            IpAddr::V4(v4) if v4.octets()[..2] == [192, 168] => IpZone::Internal,
            IpAddr::V4(v4) if v4.is_private() => IpZone::Private,
            IpAddr::V6(v6) if v6.is_loopback() => IpZone::Loopback,
            _ => IpZone::External,
        };
        Some(zone)
    }
}

/// 聚合结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub total_count: u64,
    pub level_counts: LevelCounts,
    /// 0.0 - 1.0，空数据时为 0
    pub error_rate: f64,
    pub top_ips: Vec<TopEntry<String>>,
    pub top_paths: Vec<TopEntry<String>>,
    pub top_sources: Vec<TopEntry<String>>,
    pub top_status_codes: Vec<TopEntry<u16>>,
    pub error_groups: Vec<ErrorGroup>,
    pub hourly: Vec<HourBucket>,
    pub anomalies: Vec<AnomalySignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<ResponseTimeStats>,
    pub ip_zones: Vec<TopEntry<IpZone>>,
}

/// 按首次出现顺序计数，排序时保持稳定
struct Counter<K> {
    index: HashMap<K, usize>,
    entries: Vec<TopEntry<K>>,
}

impl<K: Eq + Hash + Clone> Counter<K> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn add(&mut self, key: K) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].count += 1,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push(TopEntry { value: key, count: 1 });
            }
        }
    }

    /// 按次数降序，次数相同保持首次出现顺序
    fn ranked(self) -> Vec<TopEntry<K>> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries
    }

    fn top(self, n: usize) -> Vec<TopEntry<K>> {
        let mut entries = self.ranked();
        entries.truncate(n);
        entries
    }

    fn into_entries(self) -> Vec<TopEntry<K>> {
        self.entries
    }
}

fn owned(entries: Vec<TopEntry<&str>>) -> Vec<TopEntry<String>> {
    entries
        .into_iter()
        .map(|e| TopEntry {
            value: e.value.to_string(),
            count: e.count,
        })
        .collect()
}

/// 聚合过程中的错误分组
struct GroupAcc<'a> {
    id: String,
    level: LogLevel,
    message: &'a str,
    count: u64,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    sample_source: Option<&'a str>,
}

impl GroupAcc<'_> {
    fn observe(&mut self, timestamp: Option<DateTime<Utc>>) {
        self.count += 1;
        if let Some(ts) = timestamp {
            self.first_seen = Some(self.first_seen.map_or(ts, |first| first.min(ts)));
            self.last_seen = Some(self.last_seen.map_or(ts, |last| last.max(ts)));
        }
    }

    fn finish(self) -> ErrorGroup {
        ErrorGroup {
            id: self.id,
            level: self.level,
            message: self.message.to_string(),
            count: self.count,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            sample_source: self.sample_source.map(str::to_string),
        }
    }
}

/// 聚合器
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    thresholds: AnomalyThresholds,
}

impl Aggregator {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// 聚合一组记录
    pub fn aggregate(
        &self,
        records: &[Arc<LogRecord>],
        now: DateTime<Utc>,
        filters: &AggregateFilters,
    ) -> AggregateResult {
        let mut level_counts = LevelCounts::default();
        let mut ips = Counter::new();
        let mut paths = Counter::new();
        let mut sources = Counter::new();
        let mut status_codes = Counter::new();
        let mut zones = Counter::new();
        let mut group_index: HashMap<(LogLevel, &str), usize> = HashMap::new();
        let mut groups: Vec<GroupAcc<'_>> = Vec::new();
        let mut hours: BTreeMap<u32, (u64, u64)> = BTreeMap::new();
        let mut windows = ErrorWindows::new(now, self.thresholds.window);
        let mut response_times: Vec<u64> = Vec::new();

        for record in records {
            let fields = extract::resolve(record);
            if !filters.matches(record, fields.source) {
                continue;
            }
            level_counts.add(record.level);

            if let Some(ip) = fields.ip {
                ips.add(ip);
                if let Some(zone) = IpZone::classify(ip) {
                    zones.add(zone);
                }
            }
            if let Some(path) = fields.path {
                paths.add(path);
            }
            if let Some(source) = fields.source {
                sources.add(source);
            }
            if let Some(code) = fields.status_code {
                status_codes.add(code);
            }
            if let Some(ms) = fields.response_time {
                response_times.push(ms);
            }

            let timestamp = record.parsed_timestamp();

            let group = if record.level.is_problem() {
                let key = (record.level, record.message.as_str());
                let i = *group_index.entry(key).or_insert_with(|| {
                    groups.push(GroupAcc {
                        id: group_id(record.level, &record.message),
                        level: record.level,
                        message: &record.message,
                        count: 0,
                        first_seen: None,
                        last_seen: None,
                        sample_source: fields.source,
                    });
                    groups.len() - 1
                });
                groups[i].observe(timestamp);
                Some(i)
            } else {
                None
            };

            // 时间戳无法解析的记录不参与小时分布与异常检测
            let Some(ts) = timestamp else {
                continue;
            };
            let bucket = hours.entry(ts.hour()).or_insert((0, 0));
            bucket.0 += 1;
            if record.level == LogLevel::Error {
                bucket.1 += 1;
                if let Some(i) = group {
                    windows.observe(ts, &groups[i].id);
                }
            }
        }

        let total_count = level_counts.total();
        let error_rate = if total_count > 0 {
            level_counts.error as f64 / total_count as f64
        } else {
            0.0
        };

        let mut error_groups: Vec<ErrorGroup> = groups.into_iter().map(GroupAcc::finish).collect();
        // 最近出现的排在前面，无有效时间戳的分组排在最后
        error_groups.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));

        let anomalies = anomaly::detect(&error_groups, &windows, now, &self.thresholds);

        let hourly = hours
            .into_iter()
            .map(|(hour, (count, error_count))| HourBucket {
                label: format!("{:02}", hour),
                count,
                error_count,
            })
            .collect();

        let response_time = summarize_response_times(&response_times);

        tracing::debug!(
            total = total_count,
            error_groups = error_groups.len(),
            anomalies = anomalies.len(),
            "日志聚合完成"
        );

        AggregateResult {
            total_count,
            level_counts,
            error_rate,
            top_ips: owned(ips.top(TOP_N)),
            top_paths: owned(paths.top(TOP_N)),
            top_sources: owned(sources.top(TOP_N)),
            top_status_codes: status_codes.top(TOP_N),
            error_groups,
            hourly,
            anomalies,
            response_time,
            ip_zones: zones.into_entries(),
        }
    }
}

fn summarize_response_times(samples: &[u64]) -> Option<ResponseTimeStats> {
    let min_ms = *samples.iter().min()?;
    let max_ms = *samples.iter().max()?;
    let sum: u64 = samples.iter().sum();
    Some(ResponseTimeStats {
        samples: samples.len() as u64,
        avg_ms: sum as f64 / samples.len() as f64,
        min_ms,
        max_ms,
    })
}
