//! Per-kind warning cooldown tracker

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Lets one message of each kind through per cooldown interval.
#[derive(Debug)]
pub struct RateLimiter<K> {
    cooldown: Duration,
    last_emitted: HashMap<K, Instant>,
}

impl<K: Eq + Hash> RateLimiter<K> {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_emitted: HashMap::new(),
        }
    }

    /// Returns true (and starts a new cooldown) when `kind` may be emitted now.
    pub fn allow(&mut self, kind: K) -> bool {
        self.allow_at(kind, Instant::now())
    }

    fn allow_at(&mut self, kind: K, now: Instant) -> bool {
        match self.last_emitted.get(&kind) {
            Some(last) if now.saturating_duration_since(*last) < self.cooldown => false,
            _ => {
                self.last_emitted.insert(kind, now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_first_message() {
        let mut limiter = RateLimiter::new(Duration::from_secs(5));
        assert!(limiter.allow("queue_full"));
    }

    #[test]
    fn suppresses_within_cooldown() {
        let mut limiter = RateLimiter::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(limiter.allow_at("queue_full", t0));
        assert!(!limiter.allow_at("queue_full", t0 + Duration::from_secs(1)));
        assert!(limiter.allow_at("queue_full", t0 + Duration::from_secs(6)));
    }

    #[test]
    fn kinds_are_independent() {
        let mut limiter = RateLimiter::new(Duration::from_secs(5));
        assert!(limiter.allow("queue_full"));
        assert!(limiter.allow("queue_closed"));
    }

    #[test]
    fn zero_cooldown_always_allows() {
        let mut limiter = RateLimiter::new(Duration::ZERO);
        assert!(limiter.allow("queue_full"));
        assert!(limiter.allow("queue_full"));
    }
}
