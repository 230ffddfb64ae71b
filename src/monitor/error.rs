//! 日志监控错误类型

use axum::http::StatusCode;

/// 日志监控核心错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    /// 记录格式非法（缺少 id、未知级别等）
    #[error("invalid log record: {0}")]
    Validation(String),
    /// 缓冲区中已存在相同 id 的记录
    #[error("duplicate log id: {0}")]
    DuplicateId(String),
    /// 搜索正则编译失败（搜索会回退到子串匹配）
    #[error("invalid search pattern '{pattern}': {reason}")]
    PatternCompile { pattern: String, reason: String },
}

impl MonitorError {
    /// 错误类型标识（用于 API 错误响应）
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::Validation(_) => "validation_error",
            MonitorError::DuplicateId(_) => "duplicate_id_error",
            MonitorError::PatternCompile { .. } => "pattern_compile_error",
        }
    }

    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            MonitorError::Validation(_) | MonitorError::PatternCompile { .. } => {
                StatusCode::BAD_REQUEST
            }
            MonitorError::DuplicateId(_) => StatusCode::CONFLICT,
        }
    }

    /// 转换为 API 错误响应体
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {"type": self.kind(), "message": self.to_string()}
        })
    }
}

/// 缓冲区满时淘汰最旧记录的通知（非错误）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityEvictionNotice {
    /// 被淘汰的记录 id
    pub evicted_id: String,
    /// 缓冲区容量
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_and_status() {
        let err = MonitorError::DuplicateId("log-1".to_string());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let body = err.to_body();
        assert_eq!(body["error"]["type"], "duplicate_id_error");
        assert_eq!(body["error"]["message"], "duplicate log id: log-1");

        let err = MonitorError::PatternCompile {
            pattern: "(".to_string(),
            reason: "unclosed group".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_body()["error"]["type"], "pattern_compile_error");
    }
}
