//! 通知分发服务 - 为每个目标异步投递，不阻塞、也不受触发请求取消的影响

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::channel::DeliveryAdapter;
use super::channels::{BarkChannel, RawChannel, WeComChannel};
use super::governor::{DeliveryContext, DeliveryGovernor, DeliveryReport, HostRegistry};
use super::store::{WebhookConfig, WebhookStore};
use super::target::{classify, Destination, WebhookKind};
use crate::config::DispatchConfig;
use crate::error::{NotifyError, Result};
use crate::event::{parse_owner_id, ActivityType, Memo, NotificationEvent};

/// 测试投递默认正文
pub const DEFAULT_TEST_CONTENT: &str = "Webhook test from Memos";
const TEST_CREATOR: &str = "users/0";

pub(crate) struct ServiceInner {
    pub(crate) store: Arc<dyn WebhookStore>,
    pub(crate) governor: DeliveryGovernor,
    pub(crate) raw: RawChannel,
    pub(crate) wecom: WeComChannel,
    pub(crate) bark: BarkChannel,
    pub(crate) config: DispatchConfig,
}

/// 通知分发服务
#[derive(Clone)]
pub struct NotificationService {
    inner: Arc<ServiceInner>,
}

impl NotificationService {
    pub(crate) fn from_inner(inner: ServiceInner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        self.inner.governor.registry()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// 按 memo 创建者的 webhook 配置分发通知
    ///
    /// 只返回配置查询的错误；各目标的投递结果只写日志。
    /// 返回已调度的目标数。丢弃返回的 future 不会中断查询或投递。
    pub async fn dispatch(&self, memo: Memo, activity: ActivityType) -> Result<usize> {
        let owner_id = parse_owner_id(&memo.creator)?;
        let event = NotificationEvent::new(activity, memo);
        let inner = self.inner.clone();

        tokio::spawn(async move { inner.fetch_and_fan_out(owner_id, event).await })
            .await
            .map_err(|e| NotifyError::Configuration(format!("dispatch task failed: {}", e)))?
    }

    /// 同步测试单个 webhook，原样返回最终错误
    pub async fn test_dispatch(&self, webhook: &WebhookConfig, content: &str) -> Result<()> {
        self.test_dispatch_report(webhook, content).await?.into_result()
    }

    /// 同 [`Self::test_dispatch`]，返回每次尝试的明细
    pub async fn test_dispatch_report(&self, webhook: &WebhookConfig, content: &str) -> Result<DeliveryReport> {
        let content = if content.trim().is_empty() { DEFAULT_TEST_CONTENT } else { content };
        let event = NotificationEvent::new(ActivityType::Test, Memo::new(TEST_CREATOR, content));
        let dest = classify(&webhook.url);
        self.inner.deliver(dest, &event).await
    }
}

impl ServiceInner {
    async fn fetch_and_fan_out(self: Arc<Self>, owner_id: i32, event: NotificationEvent) -> Result<usize> {
        let hooks = match tokio::time::timeout(self.config.fetch_timeout(), self.store.get_webhooks(owner_id)).await {
            Ok(Ok(hooks)) => hooks,
            Ok(Err(e)) => return Err(NotifyError::Configuration(format!("{:#}", e))),
            Err(_) => {
                return Err(NotifyError::Configuration(format!(
                    "webhook lookup timed out after {}ms",
                    self.config.fetch_timeout_ms
                )))
            }
        };

        if hooks.is_empty() {
            info!(creator_id = owner_id, activity = %event.activity, "No user webhooks to dispatch");
            return Ok(0);
        }

        let count = hooks.len();
        for hook in hooks {
            let inner = self.clone();
            let event = event.clone();
            tokio::spawn(async move {
                let dest = classify(&hook.url);
                let kind = dest.kind;
                let target = dest.target.clone();
                let start = Instant::now();
                match inner.deliver(dest, &event).await {
                    Ok(report) => log_report(kind, &target, start, &report),
                    Err(e) => warn!(channel = %kind, url = %target, error = %e, "Webhook skipped"),
                }
            });
        }
        Ok(count)
    }

    /// 占用 host 槽位，在独立的截止时间内完成一个目标的投递
    async fn deliver(&self, dest: Destination, event: &NotificationEvent) -> Result<DeliveryReport> {
        let host_key = dest.host_key();
        let _permit = self.governor.registry().acquire(&host_key).await?;
        let ctx = DeliveryContext::with_timeout(self.config.delivery_deadline());
        let target = dest.target.as_str();

        let report = match dest.kind {
            WebhookKind::Raw => {
                let payload = self.raw.prepare(target, event)?;
                self.governor.run(&host_key, &ctx, || self.raw.post(&payload)).await
            }
            WebhookKind::WeCom => {
                self.governor.run(&host_key, &ctx, || self.wecom.deliver(target, event)).await
            }
            WebhookKind::Bark => {
                self.governor.run(&host_key, &ctx, || self.bark.deliver(target, event)).await
            }
        };
        Ok(report)
    }
}

fn log_report(kind: WebhookKind, target: &str, start: Instant, report: &DeliveryReport) {
    let latency_ms = start.elapsed().as_millis() as u64;
    match &report.result {
        Ok(()) => info!(
            channel = %kind,
            url = %target,
            latency_ms,
            attempts = report.tries(),
            "Webhook dispatched"
        ),
        Err(e) => warn!(
            channel = %kind,
            url = %target,
            latency_ms,
            attempts = report.tries(),
            circuit_open = e.is_circuit_open(),
            error = %e,
            "Webhook dispatch failed"
        ),
    }
}
