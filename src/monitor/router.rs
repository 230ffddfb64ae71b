//! Monitor API 路由配置

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use super::{
    handlers::{
        clear_logs, get_buffer_stats, get_stats, get_streaming, ingest_logs, rag_query,
        search_logs, set_streaming, upload_logs,
    },
    service::MonitorService,
};
use crate::common::auth;
use crate::rag::RagClient;

/// Monitor API 共享状态
#[derive(Clone)]
pub struct MonitorState {
    pub service: Arc<MonitorService>,
    pub rag: Arc<RagClient>,
    /// 未配置时不做认证
    pub admin_api_key: Option<String>,
}

impl MonitorState {
    pub fn new(service: Arc<MonitorService>, rag: RagClient, admin_api_key: Option<String>) -> Self {
        Self {
            service,
            rag: Arc::new(rag),
            admin_api_key: admin_api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

/// API Key 认证中间件
pub async fn api_key_middleware(
    State(state): State<MonitorState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_api_key.as_deref() else {
        return next.run(request).await;
    };

    match auth::extract_api_key(&request) {
        Some(key) if auth::constant_time_eq(&key, expected) => next.run(request).await,
        _ => {
            let error = serde_json::json!({
                "error": {
                    "type": "authentication_error",
                    "message": "Invalid or missing API key"
                }
            });
            (StatusCode::UNAUTHORIZED, Json(error)).into_response()
        }
    }
}

/// 创建 Monitor API 路由
///
/// # 端点
/// - `POST /logs` - 写入日志（单条或数组）
/// - `GET /logs` - 搜索日志
/// - `DELETE /logs` - 清空缓冲区
/// - `POST /logs/upload` - 上传纯文本日志
/// - `GET /stats` - 聚合统计与异常信号
/// - `GET /buffer` - 缓冲区状态
/// - `GET /streaming` / `PUT /streaming` - 模拟日志流
/// - `POST /query` - RAG 问答
///
/// # 认证
/// 配置了 Admin API Key 时需要认证，支持：
/// - `x-api-key` header
/// - `Authorization: Bearer <token>` header
pub fn create_monitor_router(state: MonitorState) -> Router {
    Router::new()
        .route(
            "/logs",
            get(search_logs).post(ingest_logs).delete(clear_logs),
        )
        .route("/logs/upload", post(upload_logs))
        .route("/stats", get(get_stats))
        .route("/buffer", get(get_buffer_stats))
        .route("/streaming", get(get_streaming).put(set_streaming))
        .route("/query", post(rag_query))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .with_state(state)
}
