use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RateLimitConfig;

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Formats a wait as `Xm Ys`, or `Ys` under a minute.
pub fn format_wait(wait: Duration) -> String {
    let minutes = wait.as_secs() / 60;
    let seconds = wait.as_secs() % 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Request budget per client IP across the whole API.
pub struct IpRateLimiter {
    per_ip: Arc<KeyedLimiter>,
}

/// Bursts of up to `max_requests`, refilled one slot every
/// `window_secs / max_requests`. A fresh client can therefore make close to
/// twice `max_requests` within its first window; the steady rate is
/// `max_requests` per window.
fn quota(config: &RateLimitConfig) -> Quota {
    let max = NonZeroU32::new(config.max_requests.max(1)).unwrap_or(NonZeroU32::MIN);
    let window = Duration::from_secs(config.window_secs.max(1));
    Quota::with_period(window / max.get())
        .unwrap_or_else(|| Quota::per_second(max))
        .allow_burst(max)
}

impl IpRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            per_ip: Arc::new(RateLimiter::dashmap(quota(config))),
        }
    }

    pub fn check_ip_limit(&self, ip: IpAddr) -> Result<(), String> {
        match self.per_ip.check_key(&ip) {
            Ok(_) => Ok(()),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                Err(format!(
                    "Too many requests from this IP, please try again in {}.",
                    format_wait(wait_time)
                ))
            }
        }
    }

    /// Drops state for clients whose budget has fully refilled.
    pub fn retain_recent(&self) {
        self.per_ip.retain_recent();
    }
}

impl Default for IpRateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_wait_times() {
        assert_eq!(format_wait(Duration::from_secs(42)), "42s");
        assert_eq!(format_wait(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn quota_bursts_to_max_and_refills_over_the_window() {
        let q = quota(&RateLimitConfig {
            max_requests: 100,
            window_secs: 900,
        });
        assert_eq!(q.burst_size().get(), 100);
        assert_eq!(q.replenish_interval(), Duration::from_secs(9));

        let floor = quota(&RateLimitConfig {
            max_requests: 0,
            window_secs: 0,
        });
        assert_eq!(floor.burst_size().get(), 1);
        assert_eq!(floor.replenish_interval(), Duration::from_secs(1));
    }

    #[test]
    fn limits_each_ip_separately() {
        let limiter = IpRateLimiter::new(&RateLimitConfig {
            max_requests: 2,
            window_secs: 900,
        });
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check_ip_limit(a).is_ok());
        assert!(limiter.check_ip_limit(a).is_ok());
        let err = limiter.check_ip_limit(a).unwrap_err();
        assert!(err.starts_with("Too many requests from this IP"));
        assert!(err.ends_with("s."));

        assert!(limiter.check_ip_limit(b).is_ok());
    }
}
