//! Monitor API 请求/响应类型

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use super::model::RawLogRecord;

/// 写入请求体：单条或数组
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IngestBody {
    Many(Vec<RawLogRecord>),
    One(Box<RawLogRecord>),
}

impl IngestBody {
    pub fn into_records(self) -> Vec<RawLogRecord> {
        match self {
            IngestBody::Many(records) => records,
            IngestBody::One(record) => vec![*record],
        }
    }
}

/// 写入响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub accepted: usize,
    pub evicted: usize,
    pub ids: Vec<String>,
}

/// 搜索查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub q: Option<String>,
    #[serde(default)]
    pub regex: bool,
    pub start: Option<String>,
    pub end: Option<String>,
    pub source: Option<String>,
    pub level: Option<String>,
    pub limit: Option<usize>,
}

/// 统计查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub level: Option<String>,
    pub source: Option<String>,
    /// 时间范围：1h / 24h / 7d / 30d
    pub range: Option<String>,
}

/// 解析时间范围参数
pub fn parse_time_range(range: &str) -> Option<TimeDelta> {
    match range.trim() {
        "1h" => Some(TimeDelta::hours(1)),
        "24h" => Some(TimeDelta::hours(24)),
        "7d" => Some(TimeDelta::days(7)),
        "30d" => Some(TimeDelta::days(30)),
        _ => None,
    }
}

/// 流式开关请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStreamingRequest {
    pub enabled: bool,
}

/// 流式状态响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingResponse {
    pub enabled: bool,
    pub interval_secs: u64,
}

/// RAG 问答请求
#[derive(Debug, Serialize, Deserialize)]
pub struct RagQueryRequest {
    pub query: String,
}

/// RAG 问答响应
#[derive(Debug, Serialize, Deserialize)]
pub struct RagQueryResponse {
    pub response: String,
}

/// 通用成功响应
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_body_single_or_many() {
        let one: IngestBody =
            serde_json::from_str(r#"{"level": "error", "message": "db timeout"}"#).unwrap();
        assert_eq!(one.into_records().len(), 1);

        let many: IngestBody = serde_json::from_str(
            r#"[
                {"id": "a", "level": "INFO", "message": "ok", "statusCode": 200},
                {"level": "WARN", "message": "slow", "details": {"userId": "user-1"}}
            ]"#,
        )
        .unwrap();
        let records = many.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status_code, Some(200));
        assert!(records[1].id.is_none());
        assert_eq!(records[1].details["userId"], "user-1");
    }

    #[test]
    fn test_time_range() {
        assert_eq!(parse_time_range("24h"), Some(TimeDelta::hours(24)));
        assert_eq!(parse_time_range("7d"), Some(TimeDelta::days(7)));
        assert!(parse_time_range("1y").is_none());
    }
}
