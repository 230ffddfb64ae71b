//! 日志监控模块
//!
//! 有界日志缓冲区、聚合与异常检测、日志搜索，以及对外的 HTTP API

pub mod aggregate;
pub mod anomaly;
pub mod buffer;
pub mod error;
pub mod extract;
pub mod generator;
pub mod model;
pub mod parser;
pub mod search;
pub mod service;
mod handlers;
mod router;
mod types;

pub use aggregate::Aggregator;
pub use anomaly::AnomalyThresholds;
pub use buffer::LogBuffer;
pub use router::{MonitorState, create_monitor_router};
pub use service::{MonitorService, MonitorSettings};
