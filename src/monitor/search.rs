//! 日志搜索与过滤
//!
//! 正则模式下编译失败会回退到子串匹配，并在结果中记录编译错误。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use super::error::MonitorError;
use super::model::{LogLevel, LogRecord};

/// 默认结果上限（限制前端渲染成本）
pub const DEFAULT_SEARCH_LIMIT: usize = 1000;

/// 时间范围（闭区间，两端可选）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// 设置了任一端点时，时间戳无法解析的记录不匹配
    fn contains(&self, record: &LogRecord) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(ts) = record.parsed_timestamp() else {
            return false;
        };
        self.start.is_none_or(|start| ts >= start) && self.end.is_none_or(|end| ts <= end)
    }
}

/// 来源过滤
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SourceFilter {
    #[default]
    All,
    Named(String),
}

impl SourceFilter {
    /// "all" 或空字符串表示不过滤
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            SourceFilter::All
        } else {
            SourceFilter::Named(value.to_string())
        }
    }

    fn matches(&self, record: &LogRecord) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Named(name) => record.source.as_deref() == Some(name.as_str()),
        }
    }
}

/// 搜索选项
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub use_regex: bool,
    pub date_range: DateRange,
    pub source_filter: SourceFilter,
    pub level: Option<LogLevel>,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            use_regex: false,
            date_range: DateRange::default(),
            source_filter: SourceFilter::All,
            level: None,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// 搜索结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub records: Vec<Arc<LogRecord>>,
    /// 截断前的匹配总数
    pub total_matches: usize,
    pub truncated: bool,
    /// 正则编译失败时的错误信息（已回退到子串匹配）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_error: Option<String>,
}

enum Matcher {
    Any,
    Regex(Regex),
    Substring(String),
}

impl Matcher {
    fn matches(&self, record: &LogRecord) -> bool {
        let fields = [
            Some(record.message.as_str()),
            record.source.as_deref(),
            record.ip.as_deref(),
            record.path.as_deref(),
        ];
        match self {
            Matcher::Any => true,
            Matcher::Regex(regex) => fields.into_iter().flatten().any(|f| regex.is_match(f)),
            Matcher::Substring(needle) => fields
                .into_iter()
                .flatten()
                .any(|f| f.to_lowercase().contains(needle.as_str())),
        }
    }
}

/// 编译大小写不敏感的搜索正则
pub fn compile_pattern(query: &str) -> Result<Regex, MonitorError> {
    RegexBuilder::new(query)
        .case_insensitive(true)
        .build()
        .map_err(|e| MonitorError::PatternCompile {
            pattern: query.to_string(),
            reason: e.to_string(),
        })
}

/// 搜索日志，保持输入顺序，结果截断到 `options.limit`
pub fn search(records: &[Arc<LogRecord>], query: &str, options: &SearchOptions) -> SearchResult {
    let mut pattern_error = None;
    let matcher = if query.is_empty() {
        Matcher::Any
    } else if options.use_regex {
        match compile_pattern(query) {
            Ok(regex) => Matcher::Regex(regex),
            Err(e) => {
                tracing::warn!("搜索正则编译失败，回退到子串匹配: {}", e);
                pattern_error = Some(e.to_string());
                Matcher::Substring(query.to_lowercase())
            }
        }
    } else {
        Matcher::Substring(query.to_lowercase())
    };

    let mut matched: Vec<Arc<LogRecord>> = records
        .iter()
        .filter(|r| options.date_range.contains(r))
        .filter(|r| options.source_filter.matches(r))
        .filter(|r| options.level.is_none_or(|level| level == r.level))
        .filter(|r| matcher.matches(r))
        .cloned()
        .collect();

    let total_matches = matched.len();
    let truncated = total_matches > options.limit;
    matched.truncate(options.limit);

    SearchResult {
        records: matched,
        total_matches,
        truncated,
        pattern_error,
    }
}
