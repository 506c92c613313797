//! Webhook 配置来源
//!
//! 配置由外部持久化，分发时每次重新读取，不做缓存。

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// 用户配置的一个 webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// URL 或 `wecom://` / `bark://` 简写
    pub url: String,
}

impl WebhookConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self { id: id.into(), title: String::new(), url: url.into() }
    }
}

/// 按所有者查询 webhook 配置
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn get_webhooks(&self, owner_id: i32) -> Result<Vec<WebhookConfig>>;
}

/// 内存存储
#[derive(Debug, Default)]
pub struct InMemoryWebhookStore {
    hooks: RwLock<HashMap<i32, Vec<WebhookConfig>>>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 覆盖某个用户的全部 webhook
    pub fn set(&self, owner_id: i32, hooks: Vec<WebhookConfig>) {
        let mut map = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        map.insert(owner_id, hooks);
    }

    pub fn add(&self, owner_id: i32, hook: WebhookConfig) {
        let mut map = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        map.entry(owner_id).or_default().push(hook);
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn get_webhooks(&self, owner_id: i32) -> Result<Vec<WebhookConfig>> {
        let map = self.hooks.read().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(&owner_id).cloned().unwrap_or_default())
    }
}

/// JSON 文件存储，格式为 `{"<owner_id>": [{"id", "title", "url"}]}`
#[derive(Debug, Clone)]
pub struct JsonFileWebhookStore {
    path: PathBuf,
}

impl JsonFileWebhookStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WebhookStore for JsonFileWebhookStore {
    async fn get_webhooks(&self, owner_id: i32) -> Result<Vec<WebhookConfig>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut all: HashMap<String, Vec<WebhookConfig>> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(all.remove(&owner_id.to_string()).unwrap_or_default())
    }
}
