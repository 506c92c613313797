//! 通知服务构建器

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use tracing::info;

use super::channels::{BarkChannel, RawChannel, WeComChannel};
use super::dispatcher::{NotificationService, ServiceInner};
use super::governor::{DeliveryGovernor, HostRegistry, RetryPolicy};
use super::guard::{guarded_client, DnsGuard, OutboundGuard};
use super::payload::{MemoPayloadConverter, PayloadConverter};
use super::store::WebhookStore;
use crate::config::DispatchConfig;

/// 通知服务构建器
pub struct NotificationBuilder {
    store: Arc<dyn WebhookStore>,
    config: DispatchConfig,
    guard: Arc<dyn OutboundGuard>,
    converter: Arc<dyn PayloadConverter>,
    registry: Option<Arc<HostRegistry>>,
    client: Option<Client>,
}

impl NotificationBuilder {
    pub fn new(store: Arc<dyn WebhookStore>) -> Self {
        Self {
            store,
            config: DispatchConfig::default(),
            guard: Arc::new(DnsGuard),
            converter: Arc::new(MemoPayloadConverter),
            registry: None,
            client: None,
        }
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// 替换出站校验（默认 [`DnsGuard`]）
    pub fn guard(mut self, guard: Arc<dyn OutboundGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn converter(mut self, converter: Arc<dyn PayloadConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// 共享已有的 host 注册表（多个服务实例共用并发与熔断状态）
    pub fn registry(mut self, registry: Arc<HostRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 使用自带的 HTTP 客户端
    ///
    /// 自带客户端不会自动获得重定向校验与受控解析，需要时用
    /// [`redirect_policy`](super::guard::redirect_policy) 和
    /// [`GuardedResolver`](super::guard::GuardedResolver) 自行配置。
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<NotificationService> {
        let client = match self.client {
            Some(c) => c,
            None => guarded_client(self.config.http_timeout()).context("Failed to create HTTP client")?,
        };
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(HostRegistry::from_config(&self.config)));
        let governor = DeliveryGovernor::new(registry, RetryPolicy::from_config(&self.config));

        info!(
            max_per_host = self.config.max_concurrent_per_host,
            bark_force_get = self.config.bark_force_get,
            "Notification service ready"
        );

        Ok(NotificationService::from_inner(ServiceInner {
            store: self.store,
            governor,
            raw: RawChannel::new(client.clone(), self.guard.clone(), self.converter),
            wecom: WeComChannel::new(client.clone(), self.guard.clone()),
            bark: BarkChannel::new(client, self.guard).with_force_get(self.config.bark_force_get),
            config: self.config,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::store::InMemoryWebhookStore;

    #[test]
    fn test_builder_shares_registry() {
        let registry = Arc::new(HostRegistry::new(1, 3, std::time::Duration::from_secs(60)));
        let service = NotificationBuilder::new(Arc::new(InMemoryWebhookStore::new()))
            .registry(registry.clone())
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(service.registry(), &registry));
    }

    #[test]
    fn test_builder_defaults_from_config() {
        let config = DispatchConfig { max_concurrent_per_host: 4, ..Default::default() };
        let service = NotificationBuilder::new(Arc::new(InMemoryWebhookStore::new()))
            .config(config)
            .build()
            .unwrap();
        assert_eq!(service.registry().available_slots("x.example"), 4);
    }
}
