//! 通知分发 - 把 memo 事件投递到用户配置的 webhook
//!
//! 数据流：
//! ```text
//! event ─▶ NotificationService ─▶ [每个目标] classify ─▶ OutboundGuard ─▶ 渠道适配器 ─▶ 网络
//!                                              └──────── DeliveryGovernor 包裹每次投递 ───────┘
//! ```
//!
//! # 使用示例
//! ```ignore
//! use std::sync::Arc;
//! use memo_notifier::notification::{InMemoryWebhookStore, NotificationBuilder, WebhookConfig};
//! use memo_notifier::{ActivityType, Memo};
//!
//! let store = Arc::new(InMemoryWebhookStore::new());
//! store.add(1, WebhookConfig::new("w1", "bark://api.day.app/yourdevicekey1234"));
//!
//! let service = NotificationBuilder::new(store).build()?;
//! service.dispatch(Memo::new("users/1", "hello"), ActivityType::Created).await?;
//! ```

pub mod builder;
pub mod channel;
pub mod channels;
pub mod circuit;
pub mod dispatcher;
pub mod governor;
pub mod guard;
pub mod payload;
pub mod store;
pub mod summarizer;
pub mod target;

pub use builder::NotificationBuilder;
pub use channel::DeliveryAdapter;
pub use channels::{BarkChannel, RawChannel, WeComChannel};
pub use circuit::{CircuitBreakerRegistry, CircuitState};
pub use dispatcher::{NotificationService, DEFAULT_TEST_CONTENT};
pub use governor::{
    AttemptOutcome, DeliveryAttempt, DeliveryContext, DeliveryGovernor, DeliveryReport, HostRegistry, RetryPolicy,
};
pub use guard::{guarded_client, is_disallowed_ip, redirect_policy, DnsGuard, GuardedResolver, OutboundGuard};
pub use payload::{MemoPayloadConverter, PayloadConverter, RawPayload};
pub use store::{InMemoryWebhookStore, JsonFileWebhookStore, WebhookConfig, WebhookStore};
pub use summarizer::{summarize_order, summarize_order_detailed, OrderItem, OrderSummary, SummaryStyle};
pub use target::{classify, extract_device_key, host_key, Destination, WebhookKind};
