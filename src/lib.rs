//! Memo Notifier - memo 事件的出站 webhook 分发（RAW / 企业微信 / Bark）

pub mod config;
pub mod error;
pub mod event;
pub mod notification;

pub use config::DispatchConfig;
pub use error::{DisallowedTarget, NotifyError, Result};
pub use event::{parse_owner_id, ActivityType, Memo, NotificationEvent};
pub use notification::{
    classify, DeliveryReport, HostRegistry, NotificationBuilder, NotificationService, WebhookConfig, WebhookKind,
    WebhookStore,
};
