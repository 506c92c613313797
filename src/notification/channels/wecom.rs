//! 企业微信群机器人渠道

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{NotifyError, Result};
use crate::event::NotificationEvent;
use crate::notification::channel::{ensure_success, notification_body, parse_target, DeliveryAdapter};
use crate::notification::guard::OutboundGuard;
use crate::notification::target::WebhookKind;

#[derive(Debug, Serialize)]
struct WeComMessage<'a> {
    msgtype: &'static str,
    markdown: WeComMarkdown<'a>,
}

#[derive(Debug, Serialize)]
struct WeComMarkdown<'a> {
    content: &'a str,
}

/// 企业微信响应（HTTP 200 也可能携带错误码）
#[derive(Debug, Default, Deserialize)]
struct WeComResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// 企业微信群机器人渠道
pub struct WeComChannel {
    client: Client,
    guard: Arc<dyn OutboundGuard>,
}

impl WeComChannel {
    pub fn new(client: Client, guard: Arc<dyn OutboundGuard>) -> Self {
        Self { client, guard }
    }

    /// markdown 正文：加粗标题 + 推送正文
    pub fn format_content(event: &NotificationEvent) -> String {
        format!("**{}**\n{}", event.activity.title(), notification_body(event))
    }
}

#[async_trait]
impl DeliveryAdapter for WeComChannel {
    fn kind(&self) -> WebhookKind {
        WebhookKind::WeCom
    }

    async fn deliver(&self, target: &str, event: &NotificationEvent) -> Result<()> {
        let url = parse_target(target)?;
        self.guard.check(&url).await?;

        let content = Self::format_content(event);
        let message = WeComMessage {
            msgtype: "markdown",
            markdown: WeComMarkdown { content: &content },
        };
        let resp = self.client.post(url).json(&message).send().await?;
        let resp = ensure_success("wecom", resp).await?;

        // 非 JSON 响应按成功处理
        let body: WeComResponse = resp.json().await.unwrap_or_default();
        if body.errcode != 0 {
            return Err(NotifyError::Provider(format!(
                "wecom errcode: {}, errmsg: {}",
                body.errcode, body.errmsg
            )));
        }
        Ok(())
    }
}
