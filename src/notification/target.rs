//! 目标分类 - 根据 webhook 地址判断协议类型
//!
//! 纯字符串/URL 判断，不访问网络；无法识别的地址一律按 RAW 处理。

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

const WECOM_PREFIX: &str = "wecom://";
const BARK_PREFIX: &str = "bark://";
const WECOM_API_DOMAIN: &str = "qyapi.weixin.qq.com";
const BARK_OFFICIAL_DOMAIN: &str = "api.day.app";
/// 自建 bark-server 常见的主机名特征
const BARK_HOST_MARKER: &str = "bark";

/// Webhook 协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookKind {
    /// 原始 JSON webhook
    Raw,
    /// 企业微信群机器人
    WeCom,
    /// Bark 推送
    Bark,
}

impl WebhookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::WeCom => "wecom",
            Self::Bark => "bark",
        }
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分类后的投递目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub kind: WebhookKind,
    pub target: String,
}

impl Destination {
    pub fn host_key(&self) -> String {
        host_key(&self.target)
    }
}

/// 判断 webhook 地址的协议类型
pub fn classify(locator: &str) -> Destination {
    let raw = locator.trim();
    if raw.is_empty() {
        return Destination { kind: WebhookKind::Raw, target: String::new() };
    }
    if let Some(rest) = raw.strip_prefix(WECOM_PREFIX) {
        return Destination { kind: WebhookKind::WeCom, target: with_default_scheme(rest) };
    }
    if let Some(rest) = raw.strip_prefix(BARK_PREFIX) {
        return Destination { kind: WebhookKind::Bark, target: with_default_scheme(rest) };
    }

    let kind = Url::parse(raw).map(|u| classify_url(&u)).unwrap_or(WebhookKind::Raw);
    Destination { kind, target: raw.to_string() }
}

fn classify_url(u: &Url) -> WebhookKind {
    let host = u.host_str().unwrap_or("").to_ascii_lowercase();
    if host.contains(WECOM_API_DOMAIN) {
        return WebhookKind::WeCom;
    }
    if host.contains(BARK_OFFICIAL_DOMAIN) || host.contains(BARK_HOST_MARKER) {
        return WebhookKind::Bark;
    }

    let p = u.path().trim_matches('/');
    if p.is_empty() {
        return WebhookKind::Raw;
    }
    // Bark JSON 端点
    if format!("/{}/", p).contains("/push/") {
        return WebhookKind::Bark;
    }
    if extract_device_key(p).is_some() {
        return WebhookKind::Bark;
    }
    WebhookKind::Raw
}

/// `bark://api.day.app/key` 这类简写没有 scheme，补上 https
fn with_default_scheme(rest: &str) -> String {
    if rest.is_empty() || rest.contains("://") {
        rest.to_string()
    } else {
        format!("https://{}", rest)
    }
}

/// 从路径中提取设备 key（首段为 16~64 位字母数字）
pub fn extract_device_key(path: &str) -> Option<&str> {
    let first = path.trim_matches('/').split('/').next()?;
    let looks_like_key = (16..=64).contains(&first.len())
        && first.bytes().all(|b| b.is_ascii_alphanumeric());
    looks_like_key.then_some(first)
}

/// 并发限制与熔断的分组键：目标地址的小写 authority
pub fn host_key(target: &str) -> String {
    match Url::parse(target) {
        Ok(u) => match (u.host_str(), u.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host.to_ascii_lowercase(), port),
            (Some(host), None) => host.to_ascii_lowercase(),
            _ => target.trim().to_string(),
        },
        Err(_) => target.trim().to_string(),
    }
}
