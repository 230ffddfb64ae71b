//! Monitor API HTTP 处理器

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection, StringRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use super::{
    aggregate::AggregateFilters,
    model::{LogLevel, parse_timestamp},
    router::MonitorState,
    search::{DateRange, SearchOptions, SourceFilter},
    types::{
        IngestBody, RagQueryRequest, RagQueryResponse, SearchQuery, SetStreamingRequest,
        StatsQuery, StreamingResponse, SuccessResponse, parse_time_range,
    },
};

fn error_response(status: StatusCode, error_type: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": {"type": error_type, "message": message.into()}
        })),
    )
        .into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, "invalid_request_error", message)
}

/// 提取器拒绝（请求体或查询参数格式错误）统一渲染为 JSON 错误
fn rejection_response(status: StatusCode, body_text: String) -> Response {
    tracing::debug!("请求格式错误: {}", body_text);
    error_response(status, "invalid_request_error", body_text)
}

macro_rules! extract_or_reject {
    ($extracted:expr) => {
        match $extracted {
            Ok(value) => value,
            Err(rejection) => {
                return rejection_response(rejection.status(), rejection.body_text());
            }
        }
    };
}

/// 解析可选的时间参数，非法时返回错误信息
fn parse_bound(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => parse_timestamp(v)
            .map(Some)
            .ok_or_else(|| format!("{} 不是合法的时间: {}", name, v)),
    }
}

/// 解析可选的级别参数，"all" 或空表示不过滤
fn parse_level(value: Option<&str>) -> Result<Option<LogLevel>, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("all") => Ok(None),
        Some(v) => v.parse::<LogLevel>().map(Some).map_err(|e| e.to_string()),
    }
}

/// POST /api/logs
/// 写入单条或多条日志
pub async fn ingest_logs(
    State(state): State<MonitorState>,
    payload: Result<Json<IngestBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(payload) = extract_or_reject!(payload);
    match state.service.ingest(payload.into_records()) {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(e) => {
            tracing::warn!("日志写入被拒绝: {}", e);
            (e.status_code(), Json(e.to_body())).into_response()
        }
    }
}

/// POST /api/logs/upload
/// 上传纯文本日志
pub async fn upload_logs(
    State(state): State<MonitorState>,
    body: Result<String, StringRejection>,
) -> impl IntoResponse {
    let body = extract_or_reject!(body);
    if body.trim().is_empty() {
        return bad_request("上传内容为空");
    }
    match state.service.ingest_text(&body, Utc::now()) {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(e) => (e.status_code(), Json(e.to_body())).into_response(),
    }
}

/// GET /api/logs
/// 搜索日志
pub async fn search_logs(
    State(state): State<MonitorState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> impl IntoResponse {
    let Query(query) = extract_or_reject!(query);
    let date_range = match (
        parse_bound("start", query.start.as_deref()),
        parse_bound("end", query.end.as_deref()),
    ) {
        (Ok(start), Ok(end)) => DateRange { start, end },
        (Err(msg), _) | (_, Err(msg)) => return bad_request(msg),
    };
    let level = match parse_level(query.level.as_deref()) {
        Ok(level) => level,
        Err(msg) => return bad_request(msg),
    };

    let mut options = SearchOptions {
        use_regex: query.regex,
        date_range,
        source_filter: query
            .source
            .as_deref()
            .map(SourceFilter::parse)
            .unwrap_or_default(),
        level,
        ..SearchOptions::default()
    };
    if let Some(limit) = query.limit {
        options.limit = limit;
    }

    let result = state
        .service
        .search(query.q.as_deref().unwrap_or_default(), options);
    Json(result).into_response()
}

/// DELETE /api/logs
/// 清空缓冲区
pub async fn clear_logs(State(state): State<MonitorState>) -> impl IntoResponse {
    let count = state.service.clear();
    Json(SuccessResponse::new(format!("已清空 {} 条日志", count)))
}

/// GET /api/stats
/// 聚合统计与异常信号
pub async fn get_stats(
    State(state): State<MonitorState>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> impl IntoResponse {
    let Query(query) = extract_or_reject!(query);
    let now = Utc::now();
    let level = match parse_level(query.level.as_deref()) {
        Ok(level) => level,
        Err(msg) => return bad_request(msg),
    };
    let since = match query.range.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        None => None,
        Some(range) => match parse_time_range(range) {
            Some(delta) => Some(now - delta),
            None => return bad_request(format!("不支持的时间范围: {}", range)),
        },
    };
    let source = match query.source.as_deref().map(SourceFilter::parse) {
        Some(SourceFilter::Named(name)) => Some(name),
        _ => None,
    };

    let filters = AggregateFilters {
        level,
        source,
        since,
    };
    Json(state.service.stats(now, &filters)).into_response()
}

/// GET /api/buffer
/// 缓冲区状态
pub async fn get_buffer_stats(State(state): State<MonitorState>) -> impl IntoResponse {
    Json(state.service.buffer_stats())
}

/// GET /api/streaming
/// 获取模拟日志流状态
pub async fn get_streaming(State(state): State<MonitorState>) -> impl IntoResponse {
    Json(StreamingResponse {
        enabled: state.service.is_streaming().await,
        interval_secs: state.service.generator_interval().as_secs(),
    })
}

/// PUT /api/streaming
/// 开启或关闭模拟日志流
pub async fn set_streaming(
    State(state): State<MonitorState>,
    payload: Result<Json<SetStreamingRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(payload) = extract_or_reject!(payload);
    let enabled = state.service.set_streaming(payload.enabled).await;
    Json(StreamingResponse {
        enabled,
        interval_secs: state.service.generator_interval().as_secs(),
    })
    .into_response()
}

/// POST /api/query
/// 转发到 RAG 服务
pub async fn rag_query(
    State(state): State<MonitorState>,
    payload: Result<Json<RagQueryRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(payload) = extract_or_reject!(payload);
    let query = payload.query.trim();
    if query.is_empty() {
        return bad_request("query 不能为空");
    }
    match state.rag.query(query).await {
        Ok(response) => Json(RagQueryResponse { response }).into_response(),
        Err(e) => {
            tracing::error!("RAG 查询失败: {:#}", e);
            error_response(StatusCode::BAD_GATEWAY, "upstream_error", format!("RAG 查询失败: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bound() {
        assert_eq!(parse_bound("start", None), Ok(None));
        assert_eq!(parse_bound("start", Some("  ")), Ok(None));
        assert!(parse_bound("start", Some("2025-01-13T10:00:00Z")).unwrap().is_some());
        assert!(parse_bound("end", Some("yesterday")).is_err());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("all")), Ok(None));
        assert_eq!(parse_level(Some("warning")), Ok(Some(LogLevel::Warn)));
        assert!(parse_level(Some("fatal")).is_err());
    }
}
