//! 投递治理测试：重试次数、退避时长、熔断开合、截止时间与取消
//!
//! 全部使用暂停的 tokio 时钟，退避与冷却不真实等待。

use memo_notifier::notification::{AttemptOutcome, DeliveryContext, DeliveryGovernor, RetryPolicy};
use memo_notifier::{HostRegistry, NotifyError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const HOST: &str = "hooks.example.com";

fn governor() -> DeliveryGovernor {
    let registry = Arc::new(HostRegistry::new(2, 3, Duration::from_secs(60)));
    DeliveryGovernor::new(registry, RetryPolicy::default())
}

fn ctx() -> DeliveryContext {
    DeliveryContext::with_timeout(Duration::from_secs(30))
}

/// 每次调用计数，前 `failures` 次返回 `err`
fn flaky(
    calls: Arc<AtomicUsize>,
    failures: usize,
    err: NotifyError,
) -> impl FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = memo_notifier::Result<()>> + Send>> {
    move || {
        let calls = calls.clone();
        let err = err.clone();
        Box::pin(async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                Err(err)
            } else {
                Ok(())
            }
        })
    }
}

// ==================== 重试 ====================

mod retry_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_four_tries() {
        let gov = governor();
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();

        let report = gov.run(HOST, &ctx(), flaky(calls.clone(), usize::MAX, NotifyError::http("reset"))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(report.tries(), 4);
        assert!(matches!(report.result, Err(NotifyError::Http(_))));
        assert!(report
            .attempts
            .iter()
            .all(|a| matches!(a.outcome, AttemptOutcome::TransientFailure(_))));

        // 500ms + 1s + 2s，外加最多一半的抖动
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(5250), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let gov = governor();
        let calls = Arc::new(AtomicUsize::new(0));
        let err = NotifyError::Status { channel: "webhook", status: 502, body: None };

        let report = gov.run(HOST, &ctx(), flaky(calls.clone(), 2, err)).await;

        assert!(report.is_success());
        assert_eq!(report.tries(), 3);
        assert_eq!(report.attempts.last().map(|a| &a.outcome), Some(&AttemptOutcome::Success));
        // 成功后计数清零
        assert_eq!(gov.registry().circuits().snapshot(HOST).consecutive_failures, 0);
        assert!(!gov.registry().circuits().is_open(HOST));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_error_not_retried() {
        let gov = governor();
        let calls = Arc::new(AtomicUsize::new(0));

        let report = gov
            .run(HOST, &ctx(), flaky(calls.clone(), usize::MAX, NotifyError::validation("disallowed target ip: 10.0.0.1")))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(report.attempts[0].outcome, AttemptOutcome::PermanentFailure(_)));
        assert_eq!(report.into_result().unwrap_err().to_string(), "disallowed target ip: 10.0.0.1");
        assert_eq!(gov.registry().circuits().snapshot(HOST).consecutive_failures, 0);
    }
}

// ==================== 熔断 ====================

mod circuit_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_and_rejects_without_calling() {
        let gov = governor();
        let calls = Arc::new(AtomicUsize::new(0));

        // 第一次投递的 4 次尝试都失败，第 3 次失败时熔断打开
        let report = gov.run(HOST, &ctx(), flaky(calls.clone(), usize::MAX, NotifyError::http("boom"))).await;
        assert_eq!(report.tries(), 4);
        assert!(gov.registry().circuits().is_open(HOST));

        // 熔断期间直接拒绝，不发起请求
        let before = calls.load(Ordering::SeqCst);
        let rejected = gov.run(HOST, &ctx(), flaky(calls.clone(), 0, NotifyError::http("x"))).await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
        assert_eq!(rejected.tries(), 0);
        assert_eq!(rejected.attempts[0].outcome, AttemptOutcome::CircuitRejected);
        let err = rejected.into_result().unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(err.to_string(), "circuit open for hooks.example.com");

        // 其他 host 不受影响
        let other = gov.run("other.example.com", &ctx(), flaky(calls.clone(), 0, NotifyError::http("x"))).await;
        assert!(other.is_success());

        // 冷却结束后恢复
        tokio::time::advance(Duration::from_secs(61)).await;
        let recovered = gov.run(HOST, &ctx(), flaky(Arc::new(AtomicUsize::new(0)), 0, NotifyError::http("x"))).await;
        assert!(recovered.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alternating_failures_below_threshold_stay_closed() {
        let gov = governor();
        for _ in 0..3 {
            let report = gov
                .run(HOST, &ctx(), flaky(Arc::new(AtomicUsize::new(0)), 2, NotifyError::http("flap")))
                .await;
            assert!(report.is_success());
        }
        assert!(!gov.registry().circuits().is_open(HOST));
    }
}

// ==================== 截止时间与取消 ====================

mod deadline_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_hits_deadline() {
        let gov = governor();
        let ctx = DeliveryContext::with_timeout(Duration::from_secs(5));

        let report = gov
            .run(HOST, &ctx, || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(report.result, Err(NotifyError::DeadlineExceeded)));
        assert_eq!(report.tries(), 1);
        assert_eq!(gov.registry().circuits().snapshot(HOST).consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_backoff_short() {
        let gov = governor();
        let ctx = DeliveryContext::with_timeout(Duration::from_millis(1200));
        let started = Instant::now();

        let report = gov
            .run(HOST, &ctx, flaky(Arc::new(AtomicUsize::new(0)), usize::MAX, NotifyError::http("down")))
            .await;

        assert!(matches!(report.result, Err(NotifyError::DeadlineExceeded)));
        assert!(report.tries() < 4);
        assert!(started.elapsed() <= Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_attempt() {
        let gov = governor();
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        token.cancel();
        let ctx = ctx().with_cancel(token);

        let report = gov.run(HOST, &ctx, flaky(calls.clone(), 0, NotifyError::http("x"))).await;

        assert!(matches!(report.result, Err(NotifyError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let gov = governor();
        let token = CancellationToken::new();
        let ctx = ctx().with_cancel(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let report = gov
            .run(HOST, &ctx, flaky(Arc::new(AtomicUsize::new(0)), usize::MAX, NotifyError::http("down")))
            .await;
        canceller.await.unwrap();

        assert!(matches!(report.result, Err(NotifyError::Cancelled)));
        assert_eq!(report.tries(), 1);
    }
}
