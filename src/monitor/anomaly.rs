//! 基于时间窗口比较的异常检测
//!
//! 最近窗口 `(now - w, now]` 与前一窗口 `(now - 2w, now - w]` 比较，
//! 三类检测相互独立，按 spike、new_error、frequency 顺序输出。

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::aggregate::ErrorGroup;
use crate::common::truncate_with_ellipsis;

/// 描述中引用错误消息的最大字节数
const DESCRIPTION_MESSAGE_MAX_BYTES: usize = 80;

/// 异常检测阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyThresholds {
    /// 窗口长度
    pub window: TimeDelta,
    /// 最近窗口错误数超过前一窗口的倍数时判定为突增
    pub spike_factor: u64,
    /// 错误分组次数超过该值时判定为高频
    pub frequency_threshold: u64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            window: TimeDelta::hours(1),
            spike_factor: 2,
            frequency_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Spike,
    NewError,
    Frequency,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Spike => "spike",
            AnomalyType::NewError => "new_error",
            AnomalyType::Frequency => "frequency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
        }
    }
}

/// 异常信号（每次聚合重新推导，不持久化）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalySignal {
    #[serde(rename = "type")]
    pub kind: AnomalyType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub affected_count: u64,
    pub related_group_ids: Vec<String>,
}

/// ERROR 级别记录在两个相邻窗口中的计数
#[derive(Debug, Clone)]
pub struct ErrorWindows {
    last_start: DateTime<Utc>,
    previous_start: DateTime<Utc>,
    now: DateTime<Utc>,
    /// 最近窗口错误数
    pub last: u64,
    /// 前一窗口错误数
    pub previous: u64,
    /// 最近窗口内出现过的错误分组 id（按首次出现顺序去重）
    pub last_group_ids: Vec<String>,
}

impl ErrorWindows {
    pub fn new(now: DateTime<Utc>, window: TimeDelta) -> Self {
        let last_start = now - window;
        Self {
            last_start,
            previous_start: last_start - window,
            now,
            last: 0,
            previous: 0,
            last_group_ids: Vec::new(),
        }
    }

    /// 记录一条 ERROR 级别日志
    pub fn observe(&mut self, timestamp: DateTime<Utc>, group_id: &str) {
        if timestamp > self.last_start && timestamp <= self.now {
            self.last += 1;
            if !self.last_group_ids.iter().any(|id| id == group_id) {
                self.last_group_ids.push(group_id.to_string());
            }
        } else if timestamp > self.previous_start && timestamp <= self.last_start {
            self.previous += 1;
        }
    }
}

/// 根据错误分组与窗口计数推导异常信号
pub fn detect(
    groups: &[ErrorGroup],
    windows: &ErrorWindows,
    now: DateTime<Utc>,
    thresholds: &AnomalyThresholds,
) -> Vec<AnomalySignal> {
    let mut signals = Vec::new();
    let window_minutes = thresholds.window.num_minutes();

    // 前一窗口为 0 时不判定突增（避免除零语义）
    if windows.previous > 0 && windows.last > thresholds.spike_factor.saturating_mul(windows.previous) {
        signals.push(AnomalySignal {
            kind: AnomalyType::Spike,
            severity: Severity::High,
            title: "错误率突增".to_string(),
            description: format!(
                "最近 {} 分钟出现 {} 条错误，前一窗口为 {} 条",
                window_minutes, windows.last, windows.previous
            ),
            affected_count: windows.last,
            related_group_ids: windows.last_group_ids.clone(),
        });
    }

    let new_since = now - thresholds.window;
    let new_groups: Vec<&ErrorGroup> = groups
        .iter()
        .filter(|g| g.first_seen.is_some_and(|first| first >= new_since))
        .collect();
    if let Some(signal) = group_signal(
        AnomalyType::NewError,
        "出现新的错误模式",
        &new_groups,
        |first, total| {
            format!(
                "最近 {} 分钟首次出现 {} 类错误（如 \"{}\"）",
                window_minutes, total, first
            )
        },
    ) {
        signals.push(signal);
    }

    let frequent_groups: Vec<&ErrorGroup> = groups
        .iter()
        .filter(|g| g.count > thresholds.frequency_threshold)
        .collect();
    if let Some(signal) = group_signal(
        AnomalyType::Frequency,
        "错误频率异常",
        &frequent_groups,
        |first, total| {
            format!(
                "{} 类错误出现次数超过 {} 次（如 \"{}\"）",
                total, thresholds.frequency_threshold, first
            )
        },
    ) {
        signals.push(signal);
    }

    if !signals.is_empty() {
        tracing::debug!(
            count = signals.len(),
            last_window_errors = windows.last,
            previous_window_errors = windows.previous,
            "检测到异常信号"
        );
    }

    signals
}

/// 由一组错误分组构造 medium 级别信号，分组为空时返回 None
fn group_signal(
    kind: AnomalyType,
    title: &str,
    groups: &[&ErrorGroup],
    describe: impl Fn(&str, usize) -> String,
) -> Option<AnomalySignal> {
    let first = groups.first()?;
    let example = truncate_with_ellipsis(&first.message, DESCRIPTION_MESSAGE_MAX_BYTES);
    Some(AnomalySignal {
        kind,
        severity: Severity::Medium,
        title: title.to_string(),
        description: describe(example.as_str(), groups.len()),
        affected_count: groups.iter().map(|g| g.count).sum(),
        related_group_ids: groups.iter().map(|g| g.id.clone()).collect(),
    })
}
