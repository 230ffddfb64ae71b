//! 纯文本日志解析（上传文件按行拆分）

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::model::{RawLogRecord, parse_timestamp};

/// 上传日志的来源标记
pub const UPLOAD_SOURCE: &str = "upload";

/// 行首时间戳：RFC3339 或 `YYYY-MM-DD HH:MM:SS`
static LEADING_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[?(\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?))\]?",
    )
    .expect("timestamp pattern is valid")
});

static LEVEL_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(error|warn|warning|debug)\b").expect("level pattern is valid")
});

/// 解析单行日志，空行返回 None
///
/// 级别取行内第一个出现的 ERROR/WARN/DEBUG 单词（大小写不敏感），否则为 INFO。
/// 未带时间戳时使用 `now`。
pub fn parse_line(line: &str, now: DateTime<Utc>) -> Option<RawLogRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let timestamp = LEADING_TIMESTAMP
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_timestamp(m.as_str()))
        .unwrap_or(now);

    let level = LEVEL_WORD
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
        .unwrap_or_else(|| "INFO".to_string());

    Some(RawLogRecord {
        id: None,
        timestamp: timestamp.to_rfc3339(),
        level,
        message: line.to_string(),
        source: Some(UPLOAD_SOURCE.to_string()),
        ..Default::default()
    })
}

/// 按行解析整段文本
pub fn parse_text(text: &str, now: DateTime<Utc>) -> Vec<RawLogRecord> {
    text.lines().filter_map(|line| parse_line(line, now)).collect()
}
