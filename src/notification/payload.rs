//! RAW webhook 请求体

use serde::Serialize;

use crate::error::{NotifyError, Result};
use crate::event::{parse_owner_id, ActivityType, Memo, NotificationEvent};

/// RAW webhook 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPayload {
    /// 投递地址
    pub url: String,
    pub activity_type: ActivityType,
    /// `users/{id}`
    pub creator: String,
    pub memo: Memo,
}

/// 事件 → RAW 请求体的转换（由外部提供）
pub trait PayloadConverter: Send + Sync {
    fn convert(&self, event: &NotificationEvent, target: &str) -> Result<RawPayload>;
}

/// 默认转换：校验创建者并原样带上 memo
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoPayloadConverter;

impl PayloadConverter for MemoPayloadConverter {
    fn convert(&self, event: &NotificationEvent, target: &str) -> Result<RawPayload> {
        let creator_id = parse_owner_id(&event.memo.creator)
            .map_err(|e| NotifyError::Conversion(format!("invalid memo creator: {}", e)))?;
        Ok(RawPayload {
            url: target.to_string(),
            activity_type: event.activity.clone(),
            creator: format!("users/{}", creator_id),
            memo: event.memo.clone(),
        })
    }
}
