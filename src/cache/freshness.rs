//! Freshness classification for cached feed records.
//!
//! A record moves through three windows measured from the moment its content
//! was generated:
//!
//! ```text
//! 0 ─────── fresh_ttl ─────── hard_ttl ───────▶ age
//!   Fresh               Stale            Miss
//! ```
//!
//! The backing store is written with `ttl = hard_ttl`, so in practice a live
//! record is either fresh or stale and a miss means the key is gone.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Outcome of classifying a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Serve as-is, no side effects.
    Fresh,
    /// Serve as-is and regenerate in the background.
    Stale,
    /// Regenerate before answering.
    Miss,
}

/// What a cache read observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Absent,
    Present { stored_at: Option<i64> },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("fresh ttl ({fresh:?}) must be shorter than hard ttl ({hard:?})")]
    FreshNotInsideHard { fresh: Duration, hard: Duration },
}

/// Fresh and hard expiry thresholds for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessWindow {
    fresh_ttl: Duration,
    hard_ttl: Duration,
}

impl FreshnessWindow {
    pub fn new(fresh_ttl: Duration, hard_ttl: Duration) -> Result<Self, WindowError> {
        if fresh_ttl >= hard_ttl {
            return Err(WindowError::FreshNotInsideHard {
                fresh: fresh_ttl,
                hard: hard_ttl,
            });
        }
        Ok(Self {
            fresh_ttl,
            hard_ttl,
        })
    }

    pub fn fresh_ttl(&self) -> Duration {
        self.fresh_ttl
    }

    pub fn hard_ttl(&self) -> Duration {
        self.hard_ttl
    }

    /// Length of the stale-while-revalidate window.
    pub fn stale_window(&self) -> Duration {
        self.hard_ttl - self.fresh_ttl
    }

    pub fn directive(&self) -> CacheDirective {
        CacheDirective {
            max_age: self.fresh_ttl.as_secs(),
            stale_while_revalidate: self.stale_window().as_secs(),
        }
    }

    /// Classify a lookup at `now_ms` (epoch milliseconds).
    ///
    /// A record without a generation timestamp is served as fresh and never
    /// schedules a refresh.
    pub fn classify(&self, now_ms: i64, lookup: Lookup) -> Freshness {
        let stored_at = match lookup {
            Lookup::Absent => return Freshness::Miss,
            Lookup::Present { stored_at: None } => return Freshness::Fresh,
            Lookup::Present {
                stored_at: Some(stored_at),
            } => stored_at,
        };

        let age = i128::from(now_ms) - i128::from(stored_at);
        if age <= self.fresh_ttl.as_millis() as i128 {
            Freshness::Fresh
        } else if age < self.hard_ttl.as_millis() as i128 {
            Freshness::Stale
        } else {
            Freshness::Miss
        }
    }
}

/// `Cache-Control` values derived from a [`FreshnessWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDirective {
    pub max_age: u64,
    pub stale_while_revalidate: u64,
}

impl fmt::Display for CacheDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "public, max-age={}, stale-while-revalidate={}",
            self.max_age, self.stale_while_revalidate
        )
    }
}
