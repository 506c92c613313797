//! 通知分发错误类型
//!
//! 区分配置错误、校验错误、瞬时投递错误、熔断拒绝与取消，
//! 供 Governor 判断是否重试、是否计入熔断失败次数。

use thiserror::Error;

/// 通知分发结果类型
pub type Result<T> = std::result::Result<T, NotifyError>;

/// 通知分发错误
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// 无法加载 webhook 配置（整个事件的分发中止）
    #[error("failed to load webhooks: {0}")]
    Configuration(String),

    /// 资源名不是 `users/{id}`
    #[error("invalid owner reference: {0}")]
    InvalidOwner(String),

    /// 出站目标不合法（scheme、空 host、DNS 失败、内网地址）
    #[error("{0}")]
    Validation(String),

    /// 网络层发送失败
    #[error("http request failed: {0}")]
    Http(String),

    /// 非 2xx 响应
    #[error("{channel} status: {status}{}", body_suffix(.body))]
    Status {
        channel: &'static str,
        status: u16,
        body: Option<String>,
    },

    /// 服务商在 2xx 响应中返回的业务错误（如企业微信 errcode）
    #[error("{0}")]
    Provider(String),

    /// 熔断打开，未发起网络请求
    #[error("circuit open for {host}")]
    CircuitOpen { host: String },

    /// 调用方取消
    #[error("delivery cancelled")]
    Cancelled,

    /// 投递截止时间已到
    #[error("delivery deadline exceeded")]
    DeadlineExceeded,

    /// payload 构建失败
    #[error("convert payload failed: {0}")]
    Conversion(String),
}

fn body_suffix(body: &Option<String>) -> String {
    match body {
        Some(b) if !b.is_empty() => format!(", body: {}", b),
        _ => String::new(),
    }
}

impl NotifyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn http(err: impl std::fmt::Display) -> Self {
        Self::Http(err.to_string())
    }

    pub fn circuit_open(host: impl Into<String>) -> Self {
        Self::CircuitOpen { host: host.into() }
    }

    /// 是否为可重试的瞬时错误
    ///
    /// 校验错误重试也不会改变结果；熔断、取消、超时由 Governor 直接终止。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. } | Self::Provider(_))
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// HTTP 客户端内部（重定向策略、DNS 解析）拦截出站地址时携带的错误
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DisallowedTarget(pub String);

/// 沿错误链查找 [`DisallowedTarget`]
fn find_disallowed<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a DisallowedTarget> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<DisallowedTarget>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        match find_disallowed(&err) {
            Some(blocked) => Self::Validation(blocked.0.clone()),
            None => Self::Http(err.to_string()),
        }
    }
}

impl From<url::ParseError> for NotifyError {
    fn from(err: url::ParseError) -> Self {
        Self::Validation(format!("invalid url: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(NotifyError::http("connection reset").is_retryable());
        assert!(NotifyError::Status { channel: "webhook", status: 502, body: None }.is_retryable());
        assert!(NotifyError::Provider("wecom errcode: 93000".into()).is_retryable());

        assert!(!NotifyError::validation("disallowed target ip: 127.0.0.1").is_retryable());
        assert!(!NotifyError::circuit_open("bark.example.com").is_retryable());
        assert!(!NotifyError::Cancelled.is_retryable());
        assert!(!NotifyError::DeadlineExceeded.is_retryable());
        assert!(!NotifyError::Conversion("bad creator".into()).is_retryable());
    }

    #[test]
    fn test_status_display_with_body() {
        let err = NotifyError::Status {
            channel: "bark",
            status: 400,
            body: Some("device key not found".to_string()),
        };
        assert_eq!(err.to_string(), "bark status: 400, body: device key not found");

        let err = NotifyError::Status { channel: "bark", status: 500, body: None };
        assert_eq!(err.to_string(), "bark status: 500");
    }

    #[derive(Debug, Error)]
    #[error("connect failed")]
    struct Wrapper(#[source] Box<dyn std::error::Error + Send + Sync>);

    #[test]
    fn test_find_disallowed_in_source_chain() {
        let inner: Box<dyn std::error::Error + Send + Sync> =
            Box::new(DisallowedTarget("disallowed target ip: 10.0.0.1".into()));
        let err = Wrapper(inner);
        let found = find_disallowed(&err).map(|d| d.0.as_str());
        assert_eq!(found, Some("disallowed target ip: 10.0.0.1"));

        let err = Wrapper("connection refused".into());
        assert!(find_disallowed(&err).is_none());
    }

    #[test]
    fn test_circuit_open_is_distinguishable() {
        let err = NotifyError::circuit_open("api.day.app");
        assert!(err.is_circuit_open());
        assert_eq!(err.to_string(), "circuit open for api.day.app");
        assert!(!NotifyError::http("timeout").is_circuit_open());
    }
}
