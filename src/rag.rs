//! RAG 问答客户端
//!
//! 将自然语言问题转发给外部 RAG 服务：`POST {url}` `{"query": ...}` → `{"response": ...}`

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::http_client::build_client;

/// RAG 请求超时（秒）
const RAG_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct RagRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct RagResponse {
    response: String,
}

pub struct RagClient {
    url: String,
    client: reqwest::Client,
}

impl RagClient {
    pub fn new(url: impl Into<String>, proxy_url: Option<&str>) -> anyhow::Result<Self> {
        Ok(Self {
            url: url.into(),
            client: build_client(proxy_url, RAG_TIMEOUT_SECS)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// 发送问题并返回回答文本
    pub async fn query(&self, text: &str) -> anyhow::Result<String> {
        tracing::debug!(url = %self.url, "发送 RAG 查询");

        let resp = self
            .client
            .post(&self.url)
            .json(&RagRequest { query: text })
            .send()
            .await
            .context("RAG 请求发送失败")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("RAG 服务返回 HTTP {}: {}", status, body);
        }

        let parsed: RagResponse = resp.json().await.context("RAG 响应解析失败")?;
        Ok(parsed.response)
    }
}
