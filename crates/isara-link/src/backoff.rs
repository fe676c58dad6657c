//! 重连退避策略

use std::time::Duration;

/// 指数退避
///
/// 每次失败后延迟乘以 `factor`，上限 `max`；连接成功后调用 [`Backoff::reset`]。
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        let factor = if factor.is_finite() && factor >= 1.0 { factor } else { 1.0 };
        Self {
            initial,
            max: max.max(initial),
            factor,
            current: initial,
        }
    }

    /// 返回本次应等待的时间，并推进到下一次
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = self.current.as_secs_f64() * self.factor;
        self.current = Duration::from_secs_f64(next.min(self.max.as_secs_f64()));
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), std::f64::consts::E)
    }
}
