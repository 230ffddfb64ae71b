//! 异常告警 Webhook
//!
//! 后台任务定期重新聚合，新出现的异常类型通过 HTTP POST 发送到配置的 webhook URL。
//! 支持自定义 JSON 模板，通过变量占位符渲染最终 payload。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::http_client::build_client;
use crate::monitor::aggregate::AggregateFilters;
use crate::monitor::anomaly::{AnomalySignal, AnomalyType};
use crate::monitor::service::MonitorService;

/// Webhook 请求超时（秒）
const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// 内置默认 payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultPayload<'a> {
    pub event: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub severity: &'static str,
    pub title: &'a str,
    pub description: &'a str,
    pub affected_count: u64,
    pub related_group_ids: &'a [String],
    pub timestamp: String,
}

/// 一次待发送的告警
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub signal: AnomalySignal,
    pub detected_at: DateTime<Utc>,
}

struct SendContext {
    url: String,
    /// 用户自定义 JSON 模板（None 时使用内置默认格式）
    template: Option<String>,
    client: reqwest::Client,
}

/// 告警通知器
///
/// 通过 mpsc channel 异步发送，可从同步代码安全调用。
pub struct AlertNotifier {
    sender: mpsc::Sender<AlertEvent>,
}

impl AlertNotifier {
    /// 创建通知器并启动后台消费任务
    pub fn new(url: String, template: Option<String>, proxy_url: Option<&str>) -> anyhow::Result<Self> {
        let client = build_client(proxy_url, WEBHOOK_TIMEOUT_SECS)?;
        let (tx, rx) = mpsc::channel(64);
        let ctx = SendContext {
            url,
            template,
            client,
        };
        tokio::spawn(Self::consume_loop(ctx, rx));
        Ok(Self { sender: tx })
    }

    /// 投递告警（非阻塞）
    pub fn notify(&self, event: AlertEvent) {
        if let Err(e) = self.sender.try_send(event) {
            tracing::warn!("告警投递失败（channel 已满或已关闭）: {}", e);
        }
    }

    async fn consume_loop(ctx: SendContext, mut rx: mpsc::Receiver<AlertEvent>) {
        while let Some(event) = rx.recv().await {
            let kind = event.signal.kind.as_str();
            let body = render_body(ctx.template.as_deref(), &event.signal, event.detected_at);
            let request = ctx
                .client
                .post(&ctx.url)
                .header("Content-Type", "application/json")
                .body(body);

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(kind, "异常告警已发送");
                }
                Ok(resp) => {
                    tracing::warn!(kind, "异常告警发送失败: HTTP {}", resp.status());
                }
                Err(e) => {
                    tracing::warn!(kind, "异常告警发送失败: {}", e);
                }
            }
        }
        tracing::debug!("告警消费循环已退出");
    }
}

/// 转义为 JSON 字符串内容（不含两侧引号），用于模板替换
fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// 渲染 webhook body
///
/// 有自定义模板时做变量替换，否则使用内置默认 JSON
pub fn render_body(template: Option<&str>, signal: &AnomalySignal, detected_at: DateTime<Utc>) -> String {
    let timestamp = detected_at.to_rfc3339();

    match template {
        Some(tpl) if !tpl.trim().is_empty() => tpl
            .replace("{{type}}", signal.kind.as_str())
            .replace("{{severity}}", signal.severity.as_str())
            .replace("{{title}}", &json_escape(&signal.title))
            .replace("{{description}}", &json_escape(&signal.description))
            .replace("{{affected_count}}", &signal.affected_count.to_string())
            .replace("{{timestamp}}", &timestamp),
        _ => {
            let payload = DefaultPayload {
                event: "anomaly_detected",
                kind: signal.kind.as_str(),
                severity: signal.severity.as_str(),
                title: &signal.title,
                description: &signal.description,
                affected_count: signal.affected_count,
                related_group_ids: &signal.related_group_ids,
                timestamp,
            };
            serde_json::to_string(&payload).unwrap_or_default()
        }
    }
}

/// 记录上一轮处于触发状态的异常类型，只放行新出现的
#[derive(Debug, Default)]
pub struct AlertTracker {
    active: HashSet<AnomalyType>,
}

impl AlertTracker {
    /// 返回本轮新触发的信号，并更新触发状态
    pub fn newly_fired(&mut self, signals: &[AnomalySignal]) -> Vec<AnomalySignal> {
        let fresh = signals
            .iter()
            .filter(|s| !self.active.contains(&s.kind))
            .cloned()
            .collect();
        self.active = signals.iter().map(|s| s.kind).collect();
        fresh
    }
}

/// 启动异常告警任务
pub fn start_alert_task(
    service: Arc<MonitorService>,
    notifier: AlertNotifier,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tracker = AlertTracker::default();
        let mut ticker = tokio::time::interval(interval);
        let filters = AggregateFilters::default();

        loop {
            ticker.tick().await;
            let now = Utc::now();
            let result = service.stats(now, &filters);
            for signal in tracker.newly_fired(&result.anomalies) {
                tracing::info!(kind = signal.kind.as_str(), "检测到新的异常: {}", signal.title);
                notifier.notify(AlertEvent {
                    signal,
                    detected_at: now,
                });
            }
        }
    })
}
