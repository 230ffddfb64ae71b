//! 从日志消息中尽力提取结构化字段
//!
//! 支持 `key: value` 与 `key=value` 两种写法，key 大小写不敏感。
//! 提取失败时字段保持缺失，不使用任何占位值。

use std::sync::LazyLock;

use regex::Regex;

use super::model::LogRecord;

static IP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ip|address)\s*[:=]\s*(\d{1,3}(?:\.\d{1,3}){3})\b")
        .expect("ip pattern is valid")
});

static PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:path|endpoint|route)\s*[:=]\s*([^\s,;]+)")
        .expect("path pattern is valid")
});

static STATUS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bstatus(?:_?code)?\s*[:=]\s*(\d{3})\b").expect("status pattern is valid")
});

static SOURCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:service|source|component)\s*[:=]\s*([^\s,;]+)")
        .expect("source pattern is valid")
});

static RESPONSE_TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:response_?time|rt)\s*[:=]\s*(\d+)").expect("response time pattern is valid")
});

/// 单条记录的有效字段（结构化字段优先，缺失时取消息中提取的值）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedFields<'a> {
    pub ip: Option<&'a str>,
    pub path: Option<&'a str>,
    pub source: Option<&'a str>,
    pub status_code: Option<u16>,
    pub response_time: Option<u64>,
}

fn capture<'a>(pattern: &Regex, message: &'a str) -> Option<&'a str> {
    pattern
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn extract_ip(message: &str) -> Option<&str> {
    let ip = capture(&IP_PATTERN, message)?;
    // 每一段都必须在 0..=255
    ip.split('.')
        .all(|octet| octet.parse::<u8>().is_ok())
        .then_some(ip)
}

pub fn extract_path(message: &str) -> Option<&str> {
    capture(&PATH_PATTERN, message)
}

pub fn extract_status_code(message: &str) -> Option<u16> {
    capture(&STATUS_PATTERN, message)
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..=599).contains(code))
}

pub fn extract_source(message: &str) -> Option<&str> {
    capture(&SOURCE_PATTERN, message)
}

pub fn extract_response_time(message: &str) -> Option<u64> {
    capture(&RESPONSE_TIME_PATTERN, message).and_then(|ms| ms.parse().ok())
}

/// 解析记录的有效字段，不修改记录本身
pub fn resolve(record: &LogRecord) -> ResolvedFields<'_> {
    let message = record.message.as_str();
    ResolvedFields {
        ip: record.ip.as_deref().or_else(|| extract_ip(message)),
        path: record.path.as_deref().or_else(|| extract_path(message)),
        source: record.source.as_deref().or_else(|| extract_source(message)),
        status_code: record.status_code.or_else(|| extract_status_code(message)),
        response_time: record
            .response_time
            .or_else(|| extract_response_time(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::model::LogLevel;

    #[test]
    fn test_extract_key_value_forms() {
        let message = "request failed status: 500 ip=10.0.0.15 path: /api/orders service=checkout rt=350";

        assert_eq!(extract_status_code(message), Some(500));
        assert_eq!(extract_ip(message), Some("10.0.0.15"));
        assert_eq!(extract_path(message), Some("/api/orders"));
        assert_eq!(extract_source(message), Some("checkout"));
        assert_eq!(extract_response_time(message), Some(350));
    }

    #[test]
    fn test_extract_case_insensitive_keys() {
        assert_eq!(extract_status_code("STATUS=404"), Some(404));
        assert_eq!(extract_ip("IP: 192.168.1.100"), Some("192.168.1.100"));
        assert_eq!(extract_path("Endpoint=/login,"), Some("/login"));
        assert_eq!(extract_response_time("Response_Time: 42"), Some(42));
    }

    #[test]
    fn test_extract_failures_stay_absent() {
        assert_eq!(extract_status_code("status: ok"), None);
        assert_eq!(extract_status_code("status: 999"), None);
        assert_eq!(extract_ip("ip: 300.1.1.1"), None);
        assert_eq!(extract_ip("no address here"), None);
        assert_eq!(extract_path("nothing to see"), None);
        assert_eq!(extract_source("plain message"), None);
    }

    #[test]
    fn test_resolve_prefers_structured_fields() {
        let record = LogRecord::new(
            "log-1",
            "2025-01-13T10:30:00Z",
            LogLevel::Error,
            "upstream error status: 502 ip: 10.0.0.1 path: /api/live",
        )
        .with_status_code(500)
        .with_source("nginx");

        let fields = resolve(&record);
        assert_eq!(fields.status_code, Some(500));
        assert_eq!(fields.source, Some("nginx"));
        assert_eq!(fields.ip, Some("10.0.0.1"));
        assert_eq!(fields.path, Some("/api/live"));
        assert_eq!(fields.response_time, None);
        // 记录本身不被改写
        assert!(record.ip.is_none());
    }
}
