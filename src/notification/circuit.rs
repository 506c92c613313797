//! 按 host 的熔断器
//!
//! ```text
//!   Closed ──(连续 3 次失败)──▶ Open ──(冷却 1 分钟后的下一次检查)──▶ Closed
//! ```
//!
//! 没有半开探测状态：`open_until` 过期后 `is_open` 直接返回 false。
//! 成功或熔断打开时失败计数都会清零。

use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// 单个 host 的熔断状态
#[derive(Debug, Clone, Default)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub open_until: Option<Instant>,
}

/// 熔断器注册表（每个 host 一把锁，互不争用）
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    failure_threshold: u32,
    cooldown: Duration,
    circuits: DashMap<String, Arc<Mutex<CircuitState>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            circuits: DashMap::new(),
        }
    }

    fn state(&self, key: &str) -> Arc<Mutex<CircuitState>> {
        if let Some(state) = self.circuits.get(key) {
            return state.clone();
        }
        self.circuits.entry(key.to_string()).or_default().clone()
    }

    fn with_state<R>(&self, key: &str, f: impl FnOnce(&mut CircuitState) -> R) -> R {
        let state = self.state(key);
        let mut guard = match state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// 熔断是否打开
    pub fn is_open(&self, key: &str) -> bool {
        self.with_state(key, |s| s.open_until.is_some_and(|until| Instant::now() < until))
    }

    /// 记录一次失败；达到阈值时打开熔断并清零计数
    pub fn record_failure(&self, key: &str) {
        let threshold = self.failure_threshold;
        let cooldown = self.cooldown;
        let tripped = self.with_state(key, |s| {
            s.consecutive_failures += 1;
            if s.consecutive_failures >= threshold {
                s.open_until = Some(Instant::now() + cooldown);
                s.consecutive_failures = 0;
                true
            } else {
                false
            }
        });
        if tripped {
            warn!(host = %key, cooldown_secs = cooldown.as_secs(), "Circuit opened");
        }
    }

    /// 记录一次成功：清零计数并关闭熔断
    pub fn record_success(&self, key: &str) {
        self.with_state(key, |s| {
            s.consecutive_failures = 0;
            s.open_until = None;
        });
    }

    /// 当前状态快照
    pub fn snapshot(&self, key: &str) -> CircuitState {
        self.with_state(key, |s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(3, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_on_third_failure_and_resets_counter() {
        let cb = registry();
        cb.record_failure("a.example");
        cb.record_failure("a.example");
        assert!(!cb.is_open("a.example"));
        assert_eq!(cb.snapshot("a.example").consecutive_failures, 2);

        cb.record_failure("a.example");
        assert!(cb.is_open("a.example"));
        assert_eq!(cb.snapshot("a.example").consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_after_cooldown() {
        let cb = registry();
        for _ in 0..3 {
            cb.record_failure("a.example");
        }
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cb.is_open("a.example"));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cb.is_open("a.example"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets() {
        let cb = registry();
        cb.record_failure("a.example");
        cb.record_failure("a.example");
        cb.record_success("a.example");
        cb.record_failure("a.example");
        assert!(!cb.is_open("a.example"));
        assert_eq!(cb.snapshot("a.example").consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let cb = registry();
        for _ in 0..3 {
            cb.record_failure("down.example");
        }
        assert!(cb.is_open("down.example"));
        assert!(!cb.is_open("up.example"));
    }
}
