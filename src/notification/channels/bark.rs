//! Bark 推送渠道
//!
//! 支持直接粘贴 `https://api.day.app/{key}`，也支持自建 bark-server 根地址。
//!
//! 优先 POST `<origin>/push` JSON，避免正文空格被编码成 `%20`；
//! 并非所有自建服务都实现了该端点，失败或没有设备 key 时退回
//! GET `<path>/<title>/<body>`。设置 `MEMOS_BARK_FORCE_GET=true` 可跳过 JSON 路径以便诊断。

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::error::{NotifyError, Result};
use crate::event::NotificationEvent;
use crate::notification::channel::{ensure_success, notification_body, parse_target, DeliveryAdapter};
use crate::notification::guard::OutboundGuard;
use crate::notification::target::{extract_device_key, WebhookKind};

#[derive(Debug, Serialize)]
struct BarkPush<'a> {
    device_key: &'a str,
    title: &'a str,
    body: &'a str,
}

/// Bark 推送渠道
pub struct BarkChannel {
    client: Client,
    guard: Arc<dyn OutboundGuard>,
    force_get: bool,
}

impl BarkChannel {
    pub fn new(client: Client, guard: Arc<dyn OutboundGuard>) -> Self {
        Self { client, guard, force_get: false }
    }

    /// 只走 GET 兜底路径
    pub fn with_force_get(mut self, force_get: bool) -> Self {
        self.force_get = force_get;
        self
    }

    /// POST `<origin>/push`，2xx 返回 true；其他情况交给 GET 兜底
    async fn try_push_json(&self, base: &Url, device_key: &str, title: &str, body: &str) -> bool {
        let mut push_url = base.clone();
        push_url.set_path("/push");
        push_url.set_query(None);
        push_url.set_fragment(None);

        let payload = BarkPush { device_key, title, body };
        let result = self
            .client
            .post(push_url)
            .header("Content-Type", "application/json; charset=utf-8")
            .body(serde_json::to_vec(&payload).unwrap_or_default())
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                debug!(status = resp.status().as_u16(), "Bark /push rejected, falling back to GET");
                false
            }
            Err(e) => {
                debug!(error = %e, "Bark /push failed, falling back to GET");
                false
            }
        }
    }

    /// GET `<path>/<title>/<body>`
    async fn push_path(&self, mut url: Url, title: &str, body: &str) -> Result<()> {
        url.path_segments_mut()
            .map_err(|_| NotifyError::validation("bark url cannot be a base"))?
            .pop_if_empty()
            .push(title)
            .push(body);

        let resp = self.client.get(url).send().await?;
        ensure_success("bark", resp).await?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryAdapter for BarkChannel {
    fn kind(&self) -> WebhookKind {
        WebhookKind::Bark
    }

    async fn deliver(&self, target: &str, event: &NotificationEvent) -> Result<()> {
        let url = parse_target(target)?;
        self.guard.check(&url).await?;

        let title = event.activity.title().trim().to_string();
        let body = notification_body(event).trim().to_string();

        if !self.force_get {
            if let Some(key) = extract_device_key(url.path()) {
                if self.try_push_json(&url, key, &title, &body).await {
                    return Ok(());
                }
            }
        }

        self.push_path(url, &title, &body).await
    }
}
