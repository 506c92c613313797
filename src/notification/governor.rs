//! 投递治理 - 按 host 限制并发、带抖动的退避重试、熔断
//!
//! 状态全部挂在显式注入的 [`HostRegistry`] 上，没有进程级全局变量。

use dashmap::DashMap;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::circuit::CircuitBreakerRegistry;
use crate::config::DispatchConfig;
use crate::error::{NotifyError, Result};

/// 按 host 分组的并发槽位与熔断状态
#[derive(Debug)]
pub struct HostRegistry {
    slots_per_host: usize,
    slots: DashMap<String, Arc<Semaphore>>,
    circuits: CircuitBreakerRegistry,
}

impl HostRegistry {
    pub fn new(slots_per_host: usize, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            slots_per_host: slots_per_host.max(1),
            slots: DashMap::new(),
            circuits: CircuitBreakerRegistry::new(failure_threshold, cooldown),
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(
            config.max_concurrent_per_host,
            config.circuit_failure_threshold,
            config.circuit_cooldown(),
        )
    }

    fn semaphore(&self, key: &str) -> Arc<Semaphore> {
        if let Some(sem) = self.slots.get(key) {
            return sem.clone();
        }
        self.slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.slots_per_host)))
            .clone()
    }

    /// 获取一个并发槽位，permit 释放时归还
    pub async fn acquire(&self, key: &str) -> Result<OwnedSemaphorePermit> {
        self.semaphore(key)
            .acquire_owned()
            .await
            .map_err(|_| NotifyError::Cancelled)
    }

    /// 当前空闲槽位数
    pub fn available_slots(&self, key: &str) -> usize {
        self.semaphore(key).available_permits()
    }

    pub fn circuits(&self) -> &CircuitBreakerRegistry {
        &self.circuits
    }
}

/// 退避策略：固定步长 + `[0, step/2)` 均匀抖动
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub backoffs: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoffs: vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
            ],
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self { backoffs: config.backoffs() }
    }

    /// 总尝试次数（首次 + 重试）
    pub fn max_attempts(&self) -> usize {
        self.backoffs.len() + 1
    }

    /// 第 `retry` 次重试前的等待时间（从 0 开始）
    pub fn delay(&self, retry: usize) -> Duration {
        let step = self.backoffs.get(retry).copied().unwrap_or_default();
        let half = u64::try_from(step.as_millis() / 2).unwrap_or(u64::MAX);
        if half == 0 {
            return step;
        }
        step + Duration::from_millis(rand::rng().random_range(0..half))
    }
}

/// 单次投递的上下文：独立截止时间 + 取消信号
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    deadline: Instant,
    cancel: CancellationToken,
}

impl DeliveryContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { deadline: Instant::now() + timeout, cancel: CancellationToken::new() }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// 单次尝试结果
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success,
    TransientFailure(String),
    PermanentFailure(String),
    CircuitRejected,
}

/// 一次投递尝试
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    /// 从 1 开始
    pub index: usize,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
}

/// 一个目标整个重试序列的结果
#[derive(Debug)]
pub struct DeliveryReport {
    pub host_key: String,
    pub attempts: Vec<DeliveryAttempt>,
    pub result: Result<()>,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// 实际发起的网络尝试次数（不含熔断拒绝）
    pub fn tries(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.outcome != AttemptOutcome::CircuitRejected)
            .count()
    }

    pub fn into_result(self) -> Result<()> {
        self.result
    }
}

/// 投递治理器
#[derive(Debug, Clone)]
pub struct DeliveryGovernor {
    registry: Arc<HostRegistry>,
    policy: RetryPolicy,
}

impl DeliveryGovernor {
    pub fn new(registry: Arc<HostRegistry>, policy: RetryPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    /// 带重试与熔断地执行一次投递
    ///
    /// 熔断只在进入重试循环前检查一次；每次瞬时失败立即计入熔断计数，
    /// 所以熔断可能在重试用完之前就打开。校验类错误不重试也不计数。
    pub async fn run<F, Fut>(&self, host_key: &str, ctx: &DeliveryContext, mut op: F) -> DeliveryReport
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let circuits = self.registry.circuits();
        let mut attempts = Vec::new();
        let report = |attempts, result| DeliveryReport { host_key: host_key.to_string(), attempts, result };

        if circuits.is_open(host_key) {
            attempts.push(DeliveryAttempt {
                index: 1,
                elapsed: Duration::ZERO,
                outcome: AttemptOutcome::CircuitRejected,
            });
            return report(attempts, Err(NotifyError::circuit_open(host_key)));
        }

        let max_attempts = self.policy.max_attempts();
        let mut last_err = NotifyError::Cancelled;
        for index in 1..=max_attempts {
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => Err(NotifyError::Cancelled),
                r = tokio::time::timeout_at(ctx.deadline, op()) => r.unwrap_or(Err(NotifyError::DeadlineExceeded)),
            };
            let elapsed = started.elapsed();

            match result {
                Ok(()) => {
                    circuits.record_success(host_key);
                    attempts.push(DeliveryAttempt { index, elapsed, outcome: AttemptOutcome::Success });
                    return report(attempts, Ok(()));
                }
                Err(e) if e.is_retryable() => {
                    circuits.record_failure(host_key);
                    debug!(host = %host_key, attempt = index, error = %e, "Delivery attempt failed");
                    attempts.push(DeliveryAttempt {
                        index,
                        elapsed,
                        outcome: AttemptOutcome::TransientFailure(e.to_string()),
                    });
                    last_err = e;
                }
                Err(e) => {
                    if matches!(e, NotifyError::DeadlineExceeded) {
                        circuits.record_failure(host_key);
                    }
                    attempts.push(DeliveryAttempt {
                        index,
                        elapsed,
                        outcome: AttemptOutcome::PermanentFailure(e.to_string()),
                    });
                    return report(attempts, Err(e));
                }
            }

            if index == max_attempts {
                break;
            }
            let delay = self.policy.delay(index - 1);
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return report(attempts, Err(NotifyError::Cancelled)),
                _ = tokio::time::sleep_until(ctx.deadline) => {
                    return report(attempts, Err(NotifyError::DeadlineExceeded))
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        report(attempts, Err(last_err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_delay_bounds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        for _ in 0..100 {
            let d = policy.delay(0);
            assert!(d >= Duration::from_millis(500) && d < Duration::from_millis(750), "{d:?}");
            let d = policy.delay(2);
            assert!(d >= Duration::from_secs(2) && d < Duration::from_secs(3), "{d:?}");
        }
    }

    #[test]
    fn test_registry_from_config() {
        let registry = HostRegistry::from_config(&DispatchConfig::default());
        assert_eq!(registry.available_slots("a.example"), 2);
    }

    #[tokio::test]
    async fn test_slot_released_on_drop() {
        let registry = HostRegistry::new(2, 3, Duration::from_secs(60));
        let p1 = registry.acquire("a.example").await.unwrap();
        let _p2 = registry.acquire("a.example").await.unwrap();
        assert_eq!(registry.available_slots("a.example"), 0);
        assert_eq!(registry.available_slots("b.example"), 2);
        drop(p1);
        assert_eq!(registry.available_slots("a.example"), 1);
    }
}
