//! RAW JSON webhook 渠道

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::event::NotificationEvent;
use crate::notification::channel::{ensure_success, parse_target, DeliveryAdapter};
use crate::notification::guard::OutboundGuard;
use crate::notification::payload::{PayloadConverter, RawPayload};
use crate::notification::target::WebhookKind;

/// RAW JSON webhook 渠道
pub struct RawChannel {
    client: Client,
    guard: Arc<dyn OutboundGuard>,
    converter: Arc<dyn PayloadConverter>,
}

impl RawChannel {
    pub fn new(client: Client, guard: Arc<dyn OutboundGuard>, converter: Arc<dyn PayloadConverter>) -> Self {
        Self { client, guard, converter }
    }

    /// 构建请求体（失败时该目标直接跳过）
    pub fn prepare(&self, target: &str, event: &NotificationEvent) -> Result<RawPayload> {
        self.converter.convert(event, target)
    }

    /// POST 已构建的请求体
    pub async fn post(&self, payload: &RawPayload) -> Result<()> {
        let url = parse_target(&payload.url)?;
        self.guard.check(&url).await?;

        let resp = self.client.post(url).json(payload).send().await?;
        let resp = ensure_success("webhook", resp).await?;
        debug!(channel = "raw", status = resp.status().as_u16(), "Webhook accepted");
        Ok(())
    }
}

#[async_trait]
impl DeliveryAdapter for RawChannel {
    fn kind(&self) -> WebhookKind {
        WebhookKind::Raw
    }

    async fn deliver(&self, target: &str, event: &NotificationEvent) -> Result<()> {
        let payload = self.prepare(target, event)?;
        self.post(&payload).await
    }
}
