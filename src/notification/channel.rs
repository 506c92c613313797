//! 投递渠道 trait 定义

use async_trait::async_trait;
use reqwest::Response;
use url::Url;

use super::summarizer::summarize_order;
use super::target::WebhookKind;
use crate::error::{NotifyError, Result};
use crate::event::NotificationEvent;

/// 错误响应最多保留的字节数
pub const MAX_ERROR_BODY_BYTES: usize = 512;
/// 无摘要时正文截断长度（按字符）
pub const FALLBACK_BODY_CHARS: usize = 64;

/// 协议适配器：只负责构造请求和解释响应，重试/熔断由 Governor 处理
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    /// 渠道类型（用于日志）
    fn kind(&self) -> WebhookKind;

    /// 投递一次
    async fn deliver(&self, target: &str, event: &NotificationEvent) -> Result<()>;
}

/// 解析用户配置的目标地址
pub fn parse_target(target: &str) -> Result<Url> {
    if target.trim().is_empty() {
        return Err(NotifyError::validation("empty webhook url"));
    }
    Ok(Url::parse(target.trim())?)
}

/// 推送正文：优先点菜摘要，其次 snippet，最后截断的正文
pub fn notification_body(event: &NotificationEvent) -> String {
    if let Some(summary) = summarize_order(&event.memo.content) {
        return summary;
    }
    if !event.memo.snippet.is_empty() {
        return event.memo.snippet.clone();
    }
    truncate_chars(&event.memo.content, FALLBACK_BODY_CHARS)
}

/// 按字符截断，超长时追加 `...`
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// 非 2xx 转为 `NotifyError::Status`，附带最多 512 字节的响应体
pub async fn ensure_success(channel: &'static str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = read_snippet(resp).await;
    Err(NotifyError::Status { channel, status: status.as_u16(), body })
}

async fn read_snippet(mut resp: Response) -> Option<String> {
    let mut buf: Vec<u8> = Vec::new();
    while buf.len() < MAX_ERROR_BODY_BYTES {
        match resp.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            _ => break,
        }
    }
    buf.truncate(MAX_ERROR_BODY_BYTES);
    let text = String::from_utf8_lossy(&buf).trim().to_string();
    (!text.is_empty()).then_some(text)
}
