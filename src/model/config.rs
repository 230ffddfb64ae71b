use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// LogPulse 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// 日志缓冲区容量（超出后按写入顺序淘汰最旧记录）
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// 启动时是否开启模拟日志流
    #[serde(default)]
    pub streaming: bool,

    /// 模拟日志生成间隔（秒）
    #[serde(default = "default_generator_interval_secs")]
    pub generator_interval_secs: u64,

    /// 启动时预填充的模拟日志条数（0 表示不预填充）
    #[serde(default = "default_seed_count")]
    pub seed_count: usize,

    /// 搜索结果上限
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// 高频错误阈值：错误分组次数超过该值时触发 frequency 告警
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u64,

    /// 错误突增倍数：最近一小时错误数超过前一小时的该倍数时触发 spike 告警
    #[serde(default = "default_spike_factor")]
    pub spike_factor: u64,

    /// Admin API 密钥（可选，配置后所有 API 需要认证）
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_api_key: Option<String>,

    /// RAG 问答后端地址
    #[serde(default = "default_rag_api_url")]
    pub rag_api_url: String,

    /// HTTP 代理地址（可选）
    /// 支持格式: http://host:port, https://host:port, socks5://host:port
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    /// 异常告警 Webhook URL（可选）
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_webhook_url: Option<String>,

    /// Webhook 通知 JSON 模板（可选，支持变量占位符）
    /// 可用变量: {{type}}, {{severity}}, {{title}}, {{description}},
    ///          {{affected_count}}, {{timestamp}}
    /// 未配置时使用内置默认格式
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_webhook_body: Option<String>,

    /// 异常检测巡检间隔（秒）
    #[serde(default = "default_alert_interval_secs")]
    pub alert_interval_secs: u64,

    /// 允许跨域访问的前端地址
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// 配置文件路径（运行时元数据，不写入 JSON）
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_buffer_capacity() -> usize {
    1000
}

fn default_generator_interval_secs() -> u64 {
    2
}

fn default_seed_count() -> usize {
    500
}

fn default_search_limit() -> usize {
    1000
}

fn default_alert_threshold() -> u64 {
    10
}

fn default_spike_factor() -> u64 {
    2
}

fn default_rag_api_url() -> String {
    "http://127.0.0.1:8000/query".to_string()
}

fn default_alert_interval_secs() -> u64 {
    60
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            buffer_capacity: default_buffer_capacity(),
            streaming: false,
            generator_interval_secs: default_generator_interval_secs(),
            seed_count: default_seed_count(),
            search_limit: default_search_limit(),
            alert_threshold: default_alert_threshold(),
            spike_factor: default_spike_factor(),
            admin_api_key: None,
            rag_api_url: default_rag_api_url(),
            proxy_url: None,
            alert_webhook_url: None,
            alert_webhook_body: None,
            alert_interval_secs: default_alert_interval_secs(),
            cors_origins: default_cors_origins(),
            config_path: None,
        }
    }
}

impl Config {
    /// 获取默认配置文件路径
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // 配置文件不存在，返回默认配置
            let mut config = Self::default();
            config.config_path = Some(path.to_path_buf());
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// 校验配置取值
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.buffer_capacity == 0 {
            anyhow::bail!("bufferCapacity 必须大于 0");
        }
        if self.generator_interval_secs == 0 {
            anyhow::bail!("generatorIntervalSecs 必须大于 0");
        }
        if self.search_limit == 0 {
            anyhow::bail!("searchLimit 必须大于 0");
        }
        if self.alert_interval_secs == 0 {
            anyhow::bail!("alertIntervalSecs 必须大于 0");
        }
        if self.spike_factor == 0 {
            anyhow::bail!("spikeFactor 必须大于 0");
        }
        Ok(())
    }

    /// 获取配置文件路径（如果有）
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// 将当前配置写回原始配置文件
    pub fn save(&self) -> anyhow::Result<()> {
        let path = self
            .config_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("配置文件路径未知，无法保存配置"))?;

        let content = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.buffer_capacity, 1000);
        assert_eq!(config.search_limit, 1000);
        assert_eq!(config.alert_threshold, 10);
        assert_eq!(config.spike_factor, 2);
        assert!(!config.streaming);
        assert_eq!(config.rag_api_url, "http://127.0.0.1:8000/query");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_camel_case_fields() {
        let json = r#"{
            "bufferCapacity": 50,
            "streaming": true,
            "adminApiKey": "secret",
            "alertWebhookUrl": "http://hooks.local/alert"
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.buffer_capacity, 50);
        assert!(config.streaming);
        assert_eq!(config.admin_api_key.as_deref(), Some("secret"));
        assert_eq!(
            config.alert_webhook_url.as_deref(),
            Some("http://hooks.local/alert")
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = Config {
            buffer_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_spike_factor_rejected() {
        let config = Config {
            spike_factor: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("logpulse-missing-{}.json", uuid::Uuid::new_v4()));
        let config = Config::load(&path).unwrap();

        assert_eq!(config.buffer_capacity, 1000);
        assert_eq!(config.config_path(), Some(path.as_path()));
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!("logpulse-config-{}.json", uuid::Uuid::new_v4()));
        let mut config = Config::load(&path).unwrap();
        config.port = 9090;
        config.save().unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.port, 9090);
        // 未设置的可选字段不写入文件
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("adminApiKey"));

        let _ = std::fs::remove_file(&path);
    }
}
