//! Memo 通知事件

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{NotifyError, Result};

/// 活动类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityType {
    Created,
    Updated,
    Deleted,
    /// 手动触发的连通性测试
    Test,
    /// 未知类型，原样透传
    Other(String),
}

impl ActivityType {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "memos.memo.created" => Self::Created,
            "memos.memo.updated" => Self::Updated,
            "memos.memo.deleted" => Self::Deleted,
            "memos.webhook.test" => Self::Test,
            _ => Self::Other(s.to_string()),
        }
    }

    /// 线上使用的活动标识
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "memos.memo.created",
            Self::Updated => "memos.memo.updated",
            Self::Deleted => "memos.memo.deleted",
            Self::Test => "memos.webhook.test",
            Self::Other(s) => s,
        }
    }

    /// 推送标题
    pub fn title(&self) -> &str {
        match self {
            Self::Created => "Memo Created",
            Self::Updated => "Memo Updated",
            Self::Deleted => "Memo Deleted",
            Self::Test => "Webhook Test",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActivityType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActivityType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// Memo 内容（由外部存储提供）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memo {
    /// 资源名，如 `memos/123`
    #[serde(default)]
    pub name: String,
    /// 创建者，`users/{id}`
    pub creator: String,
    /// 正文
    #[serde(default)]
    pub content: String,
    /// 摘要
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_time: Option<DateTime<Utc>>,
}

impl Memo {
    pub fn new(creator: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            creator: creator.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }
}

/// 一次通知事件（构造后不可变）
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub activity: ActivityType,
    pub memo: Memo,
}

impl NotificationEvent {
    pub fn new(activity: ActivityType, memo: Memo) -> Self {
        Self { activity, memo }
    }
}

/// 解析 `users/{id}`
pub fn parse_owner_id(name: &str) -> Result<i32> {
    let mut parts = name.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("users"), Some(id), None) => id
            .parse::<i32>()
            .map_err(|_| NotifyError::InvalidOwner(format!("invalid user id: {}", id))),
        _ => Err(NotifyError::InvalidOwner(format!(
            "invalid user resource name: {}",
            name
        ))),
    }
}
