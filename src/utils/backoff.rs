//! # 重试退避状态机
//!
//! 把重试作为显式控制流建模：尝试计数与下一次延迟都可检视，
//! 不依赖异常驱动的循环

use std::time::Duration;

/// 重试策略：预算与延迟参数
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    max_attempts: u32,
    /// 首次重试前的基础延迟
    base_delay: Duration,
    /// 延迟上限
    max_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// 不做任何重试的策略
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 开始一轮新的重试调度
    #[must_use]
    pub fn schedule(&self) -> RetrySchedule {
        RetrySchedule {
            policy: *self,
            attempts_done: 0,
        }
    }
}

/// 一轮操作的退避状态
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    /// 已完成（失败）的尝试次数
    attempts_done: u32,
}

impl RetrySchedule {
    /// 已失败的尝试次数
    #[must_use]
    pub const fn attempts_done(&self) -> u32 {
        self.attempts_done
    }

    /// 记录一次失败并给出下一次重试前的延迟
    ///
    /// 返回 `None` 表示预算已耗尽，调用方应放弃该记录
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts_done += 1;
        if self.attempts_done >= self.policy.max_attempts {
            return None;
        }

        let exponent = self.attempts_done.saturating_sub(1).min(32);
        let base_ms = self.policy.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << exponent);
        let capped = Duration::from_millis(delay_ms).min(self.policy.max_delay);
        Some(capped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100), Duration::from_millis(350));
        let mut schedule = policy.schedule();

        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(200)));
        // 400ms 被上限压到 350ms
        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(350)));
        assert_eq!(schedule.next_delay(), None);
        assert_eq!(schedule.attempts_done(), 4);
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let mut schedule = RetryPolicy::none().schedule();
        assert_eq!(schedule.next_delay(), None);
    }

    #[test]
    fn budget_is_finite() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(1));
        let mut schedule = policy.schedule();
        let mut delays = 0;
        while schedule.next_delay().is_some() {
            delays += 1;
        }
        assert_eq!(delays, 2);
    }
}
