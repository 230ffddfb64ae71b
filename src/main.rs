mod common;
mod http_client;
mod model;
mod monitor;
mod rag;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{Router, http::HeaderValue};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use model::config::Config;
use monitor::{
    Aggregator, AnomalyThresholds, LogBuffer, MonitorService, MonitorSettings, MonitorState,
    create_monitor_router,
};
use rag::RagClient;
use webhook::AlertNotifier;

/// 实时日志监控与异常检测服务
#[derive(Parser, Debug)]
#[command(name = "logpulse", version, about)]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听地址（覆盖配置文件）
    #[arg(long)]
    host: Option<String>,

    /// 监听端口（覆盖配置文件）
    #[arg(long)]
    port: Option<u16>,

    /// 启动时开启模拟日志流
    #[arg(long)]
    streaming: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = args
        .config
        .unwrap_or_else(|| Config::default_config_path().to_string());
    let fresh = !std::path::Path::new(&config_path).exists();
    let mut config = Config::load(&config_path)?;
    if fresh {
        match config.save() {
            Ok(()) => tracing::info!("已写入默认配置: {}", config_path),
            Err(e) => tracing::warn!("写入默认配置失败: {:#}", e),
        }
    } else if let Some(path) = config.config_path() {
        tracing::info!("已加载配置: {}", path.display());
    }

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.streaming |= args.streaming;
    config.validate()?;

    let buffer = Arc::new(LogBuffer::new(config.buffer_capacity));
    tracing::info!(capacity = buffer.capacity(), "日志缓冲区已创建");
    let aggregator = Aggregator::new(AnomalyThresholds {
        spike_factor: config.spike_factor,
        frequency_threshold: config.alert_threshold,
        ..AnomalyThresholds::default()
    });
    let settings = MonitorSettings {
        search_limit: config.search_limit,
        generator_interval: Duration::from_secs(config.generator_interval_secs),
    };
    let service = Arc::new(MonitorService::new(buffer, aggregator, settings));

    service.seed(config.seed_count, chrono::Utc::now())?;
    if config.streaming {
        service.set_streaming(true).await;
    }

    if let Some(url) = config
        .alert_webhook_url
        .clone()
        .filter(|u| !u.trim().is_empty())
    {
        let notifier = AlertNotifier::new(
            url.clone(),
            config.alert_webhook_body.clone(),
            config.proxy_url.as_deref(),
        )?;
        webhook::start_alert_task(
            service.clone(),
            notifier,
            Duration::from_secs(config.alert_interval_secs),
        );
        tracing::info!("异常告警已启用: {}", url);
    }

    let rag = RagClient::new(config.rag_api_url.clone(), config.proxy_url.as_deref())?;
    tracing::info!("RAG 服务地址: {}", rag.url());

    if config.admin_api_key.is_none() {
        tracing::warn!("未配置 adminApiKey，API 不做认证");
    }
    let state = MonitorState::new(service, rag, config.admin_api_key.clone());

    let app = Router::new()
        .nest("/api", create_monitor_router(state))
        .layer(cors_layer(&config.cors_origins));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听 {} 失败", addr))?;
    tracing::info!("启动 HTTP 服务器: http://{}", addr);
    tracing::info!("API 端点:");
    tracing::info!("  POST   /api/logs");
    tracing::info!("  GET    /api/logs");
    tracing::info!("  GET    /api/stats");
    tracing::info!("  PUT    /api/streaming");
    tracing::info!("  POST   /api/query");

    axum::serve(listener, app).await?;
    Ok(())
}

/// 按配置的来源构建 CORS，包含 "*" 时放开全部来源
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("忽略非法的 CORS 来源: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}
