//! Retry building blocks: backoff delays, `Retry-After` parsing and an
//! injectable sleep.
//!
//! The executor never sleeps directly. It goes through a [`Sleeper`], so tests
//! can substitute [`RecordingSleeper`] and assert the exact pauses without
//! waiting for them.
//!
//! # Example
//!
//! ```
//! use issue_sync::retry::Backoff;
//! use issue_sync::config::RetryConfig;
//! use std::time::Duration;
//!
//! let config = RetryConfig {
//!     initial_delay: Duration::from_secs(1),
//!     max_delay: Duration::from_secs(3),
//!     backoff_multiplier: 2.0,
//!     jitter: false,
//!     ..Default::default()
//! };
//! let mut backoff = Backoff::new(&config);
//! assert_eq!(backoff.next_delay(), Duration::from_secs(1));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(2));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(3));
//! ```

use crate::config::RetryConfig;
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::sync::Mutex;
use std::time::Duration;

/// Suspends the calling task for a backoff delay
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Pause for `delay`
    async fn sleep(&self, delay: Duration);
}

/// Production sleeper backed by the tokio timer
///
/// Only the calling task is suspended, so concurrent callers back off independently.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Sleeper that returns immediately and remembers every requested delay
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in call order
    pub fn delays(&self) -> Vec<Duration> {
        match self.delays.lock() {
            Ok(delays) => delays.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        match self.delays.lock() {
            Ok(mut delays) => delays.push(delay),
            Err(poisoned) => poisoned.into_inner().push(delay),
        }
        tokio::task::yield_now().await;
    }
}

/// Exponential delay progression for failures other than rate limiting
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    /// Start a new progression at the configured initial delay
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            current: config.initial_delay,
            max: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Delay to wait now; advances the progression for the next call
    pub fn next_delay(&mut self) -> Duration {
        let delay = if self.jitter {
            add_jitter(self.current)
        } else {
            self.current
        };
        // Overflow or a nonsensical multiplier pins the progression at the cap
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |next| next.min(self.max));
        delay
    }
}

/// Read the server-requested pause from a `Retry-After` header
///
/// Accepts delta-seconds and HTTP dates. Returns `None` when the header is
/// absent or unparsable.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    let wait = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
