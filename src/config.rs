//! 分发配置
//!
//! 读取优先级（后者覆盖前者）：
//! 1. 内置默认值
//! 2. 配置文件 `~/.config/memo-notifier/config.json`
//! 3. 环境变量 `MEMOS_BARK_FORCE_GET`、`MEMO_NOTIFIER_HTTP_TIMEOUT_SECS`、`MEMO_NOTIFIER_MAX_PER_HOST`

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// 强制 Bark 走 GET 兜底路径（诊断用）
pub const ENV_BARK_FORCE_GET: &str = "MEMOS_BARK_FORCE_GET";
/// 单次 HTTP 请求超时（秒）
pub const ENV_HTTP_TIMEOUT_SECS: &str = "MEMO_NOTIFIER_HTTP_TIMEOUT_SECS";
/// 每个 host 的并发上限
pub const ENV_MAX_PER_HOST: &str = "MEMO_NOTIFIER_MAX_PER_HOST";

/// 通知分发配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 单次 HTTP 请求超时（秒）
    pub http_timeout_secs: u64,
    /// 查询 webhook 配置的超时（毫秒）
    pub fetch_timeout_ms: u64,
    /// 单个目标整个投递（含重试）的截止时间（秒）
    pub delivery_deadline_secs: u64,
    /// 每个 host 同时在途的投递数
    pub max_concurrent_per_host: usize,
    /// 连续失败多少次后打开熔断
    pub circuit_failure_threshold: u32,
    /// 熔断冷却时间（秒）
    pub circuit_cooldown_secs: u64,
    /// 重试退避步长（毫秒），长度即最大重试次数
    pub backoff_ms: Vec<u64>,
    /// 跳过 Bark `/push` JSON 路径
    pub bark_force_get: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 10,
            fetch_timeout_ms: 2_000,
            delivery_deadline_secs: 30,
            max_concurrent_per_host: 2,
            circuit_failure_threshold: 3,
            circuit_cooldown_secs: 60,
            backoff_ms: vec![500, 1_000, 2_000],
            bark_force_get: false,
        }
    }
}

impl DispatchConfig {
    /// 默认配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/memo-notifier/config.json"))
    }

    /// 从配置文件和环境变量自动加载
    pub fn auto_load() -> Self {
        let mut config = Self::default_path()
            .filter(|p| p.exists())
            .and_then(|p| match Self::from_file(&p) {
                Ok(c) => {
                    debug!(path = %p.display(), "Loaded dispatch config file");
                    Some(c)
                }
                Err(e) => {
                    warn!(path = %p.display(), error = %e, "Ignoring unreadable dispatch config");
                    None
                }
            })
            .unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// 从 JSON 文件读取（缺省字段取默认值）
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 用环境变量覆盖配置
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_BARK_FORCE_GET) {
            self.bark_force_get = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(secs) = lookup(ENV_HTTP_TIMEOUT_SECS).and_then(|v| v.trim().parse().ok()) {
            self.http_timeout_secs = secs;
        }
        if let Some(n) = lookup(ENV_MAX_PER_HOST)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            self.max_concurrent_per_host = n;
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn delivery_deadline(&self) -> Duration {
        Duration::from_secs(self.delivery_deadline_secs)
    }

    pub fn circuit_cooldown(&self) -> Duration {
        Duration::from_secs(self.circuit_cooldown_secs)
    }

    pub fn backoffs(&self) -> Vec<Duration> {
        self.backoff_ms.iter().map(|ms| Duration::from_millis(*ms)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.max_concurrent_per_host, 2);
        assert_eq!(config.circuit_failure_threshold, 3);
        assert_eq!(config.circuit_cooldown(), Duration::from_secs(60));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(2));
        assert_eq!(config.delivery_deadline(), Duration::from_secs(30));
        assert_eq!(
            config.backoffs(),
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2)
            ]
        );
        assert!(!config.bark_force_get);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_BARK_FORCE_GET, "TRUE"),
            (ENV_HTTP_TIMEOUT_SECS, "5"),
            (ENV_MAX_PER_HOST, "0"),
        ]
        .into_iter()
        .collect();

        let mut config = DispatchConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert!(config.bark_force_get);
        assert_eq!(config.http_timeout_secs, 5);
        // 0 不是合法的并发上限，保持默认
        assert_eq!(config.max_concurrent_per_host, 2);
    }

    #[test]
    fn test_force_get_only_accepts_true() {
        let mut config = DispatchConfig::default();
        config.apply_env(|k| (k == ENV_BARK_FORCE_GET).then(|| "1".to_string()));
        assert!(!config.bark_force_get);
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"circuit_cooldown_secs": 5, "bark_force_get": true}"#).unwrap();

        let config = DispatchConfig::from_file(&path).unwrap();
        assert_eq!(config.circuit_cooldown_secs, 5);
        assert!(config.bark_force_get);
        assert_eq!(config.max_concurrent_per_host, 2);
    }
}
