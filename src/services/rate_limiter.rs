//! Karma-tiered sliding-window rate limiter.
//!
//! Windows live in a concurrent map keyed by `(limit_type, agent)`.
//! The effective ceiling for an authenticated agent is
//! `floor(base_max * tier_multiplier(karma))`.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::KarmaTier;

/// Per-type limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    pub max: u32,
    pub window_secs: u64,
}

impl LimitConfig {
    pub const fn new(max: u32, window_secs: u64) -> Self {
        Self { max, window_secs }
    }
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub tier: KarmaTier,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    limit_type: String,
    agent_id: Option<Uuid>,
}

pub struct RateLimiter {
    limits: HashMap<String, LimitConfig>,
    windows: DashMap<WindowKey, VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(limits: HashMap<String, LimitConfig>) -> Self {
        Self { limits, windows: DashMap::new() }
    }

    /// Check and record one hit. `agent` carries `(id, karma)` for
    /// authenticated requests; anonymous callers get the base ceiling.
    pub fn check(
        &self,
        limit_type: &str,
        agent: Option<(Uuid, i64)>,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let Some(config) = self.limits.get(limit_type) else {
            // Unconfigured limit types pass through.
            return RateLimitDecision {
                allowed: true,
                remaining: u32::MAX,
                reset_at: now,
                tier: KarmaTier::Newcomer,
            };
        };

        let tier = agent.map_or(KarmaTier::Newcomer, |(_, karma)| KarmaTier::from_karma(karma));
        let effective_max = (f64::from(config.max) * tier.multiplier()).floor() as u32;
        let window = Duration::seconds(config.window_secs as i64);
        let key = WindowKey {
            limit_type: limit_type.to_string(),
            agent_id: agent.map(|(id, _)| id),
        };

        let mut entry = self.windows.entry(key).or_default();
        let cutoff = now - window;
        while entry.front().is_some_and(|t| *t <= cutoff) {
            entry.pop_front();
        }

        let used = entry.len() as u32;
        let reset_at = entry.front().map_or(now, |oldest| *oldest + window);

        if used >= effective_max {
            return RateLimitDecision { allowed: false, remaining: 0, reset_at, tier };
        }

        entry.push_back(now);
        RateLimitDecision {
            allowed: true,
            remaining: effective_max - used - 1,
            reset_at: if entry.len() == 1 { now + window } else { reset_at },
            tier,
        }
    }

    /// Check, surfacing `RateLimited` with retry-after on exhaustion.
    pub fn enforce(
        &self,
        limit_type: &str,
        agent: Option<(Uuid, i64)>,
    ) -> DomainResult<RateLimitDecision> {
        let now = Utc::now();
        let decision = self.check(limit_type, agent, now);
        if decision.allowed {
            Ok(decision)
        } else {
            let retry_after = (decision.reset_at - now).num_seconds().max(1) as u64;
            Err(DomainError::RateLimited { retry_after_secs: retry_after })
        }
    }
}

/// Default limit table for the coordinator's operation classes.
pub fn default_limits() -> HashMap<String, LimitConfig> {
    HashMap::from([
        ("register".to_string(), LimitConfig::new(30, 3600)),
        ("commit".to_string(), LimitConfig::new(60, 3600)),
        ("review".to_string(), LimitConfig::new(30, 3600)),
        ("merge_request".to_string(), LimitConfig::new(20, 3600)),
        ("task".to_string(), LimitConfig::new(30, 3600)),
        ("council".to_string(), LimitConfig::new(30, 3600)),
        ("query".to_string(), LimitConfig::new(600, 3600)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(HashMap::from([("op".to_string(), LimitConfig::new(max, window_secs))]))
    }

    #[test]
    fn test_window_exhaustion_and_reset() {
        let limiter = limiter(2, 60);
        let agent = Some((Uuid::new_v4(), 0));
        let t0 = Utc::now();

        let d1 = limiter.check("op", agent, t0);
        assert!(d1.allowed);
        assert_eq!(d1.remaining, 1);

        let d2 = limiter.check("op", agent, t0 + Duration::seconds(1));
        assert!(d2.allowed);
        assert_eq!(d2.remaining, 0);

        let d3 = limiter.check("op", agent, t0 + Duration::seconds(2));
        assert!(!d3.allowed);
        assert_eq!(d3.reset_at, t0 + Duration::seconds(60));

        // The window slides: after the first hit ages out there is room.
        let d4 = limiter.check("op", agent, t0 + Duration::seconds(61));
        assert!(d4.allowed);
    }

    #[test]
    fn test_tier_multiplier_raises_ceiling() {
        let limiter = limiter(10, 60);
        let t0 = Utc::now();

        // Elite tier (>= 10000 karma) gets 10x the base ceiling.
        let elite = Some((Uuid::new_v4(), 10_000));
        let d = limiter.check("op", elite, t0);
        assert!(d.allowed);
        assert_eq!(d.tier, KarmaTier::Elite);
        assert_eq!(d.remaining, 99);

        // Member tier gets floor(10 * 1.5) = 15.
        let member = Some((Uuid::new_v4(), 150));
        let d = limiter.check("op", member, t0);
        assert_eq!(d.tier, KarmaTier::Member);
        assert_eq!(d.remaining, 14);
    }

    #[test]
    fn test_windows_are_isolated_per_agent_and_type() {
        let mut limits = HashMap::new();
        limits.insert("a".to_string(), LimitConfig::new(1, 60));
        limits.insert("b".to_string(), LimitConfig::new(1, 60));
        let limiter = RateLimiter::new(limits);
        let t0 = Utc::now();

        let agent1 = Some((Uuid::new_v4(), 0));
        let agent2 = Some((Uuid::new_v4(), 0));

        assert!(limiter.check("a", agent1, t0).allowed);
        assert!(!limiter.check("a", agent1, t0).allowed);
        // Different agent, same type: independent window.
        assert!(limiter.check("a", agent2, t0).allowed);
        // Same agent, different type: independent window.
        assert!(limiter.check("b", agent1, t0).allowed);
    }

    #[test]
    fn test_enforce_surfaces_retry_after() {
        let limiter = limiter(1, 60);
        let agent = Some((Uuid::new_v4(), 0));
        assert!(limiter.enforce("op", agent).is_ok());
        let err = limiter.enforce("op", agent).unwrap_err();
        match err {
            DomainError::RateLimited { retry_after_secs } => {
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unconfigured_type_passes() {
        let limiter = limiter(1, 60);
        let d = limiter.check("other", None, Utc::now());
        assert!(d.allowed);
    }
}
