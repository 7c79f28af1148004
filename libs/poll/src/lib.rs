//! Polling primitives for eventually-consistent assertions.
//!
//! The systems under test (deployment director, discovery agent, DNS) only
//! converge eventually, so every assertion in the suites is a bounded retry:
//!
//! - **Probe**: an async closure that observes the current state.
//! - **Matcher**: a predicate over the observed value.
//! - **Eventually**: runs the probe until the matcher succeeds or the
//!   timeout elapses.
//!
//! # Invariants
//!
//! - The probe always runs at least once, even with a zero timeout
//! - A probe error counts as a failed attempt, never as a fatal error
//! - No attempt starts later than `timeout` after the first one

use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

mod matcher;

pub use matcher::{be_empty, consist_of, equal, BeEmpty, ConsistOf, Equal, Matcher};

/// Default time budget for a single eventual assertion.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay between attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Stand-in deadline for budgets too large to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Polling errors.
#[derive(Debug, Error)]
pub enum PollError {
    /// The matcher never succeeded within the time budget.
    #[error("timed out after {elapsed:?} ({attempts} attempts) waiting for {description}: expected {expected}, last observed {last}")]
    Timeout {
        description: String,
        expected: String,
        elapsed: Duration,
        attempts: u32,
        last: Observation,
    },

    /// A duration string could not be parsed.
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

impl PollError {
    /// Returns true if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// The outcome of the most recent probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The probe returned a value that did not match.
    Value(String),

    /// The probe itself failed.
    Error(String),
}

impl Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{}", v),
            Self::Error(e) => write!(f, "error: {}", e),
        }
    }
}

/// A bounded retry with a fixed timeout and interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eventually {
    /// Total time budget.
    pub timeout: Duration,

    /// Delay between attempts.
    pub interval: Duration,
}

impl Default for Eventually {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl Eventually {
    /// Create a new poller.
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Create a poller from duration strings such as `"1m"` and `"10s"`.
    pub fn parse(timeout: &str, interval: &str) -> Result<Self, PollError> {
        Ok(Self {
            timeout: parse_duration(timeout)?,
            interval: parse_duration(interval)?,
        })
    }

    /// Poll `probe` until its value satisfies `matcher`.
    ///
    /// Returns the first matching value, or [`PollError::Timeout`] carrying the
    /// last observation once the budget is spent.
    pub async fn should<T, E, F, Fut, M>(
        &self,
        description: &str,
        mut probe: F,
        matcher: M,
    ) -> Result<T, PollError>
    where
        T: Debug,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        M: Matcher<T>,
    {
        let start = Instant::now();
        let deadline = instant_after(start, self.timeout);
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let last = match probe().await {
                Ok(value) if matcher.matches(&value) => {
                    debug!(
                        description,
                        attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "condition satisfied"
                    );
                    return Ok(value);
                }
                Ok(value) => {
                    debug!(description, attempts, observed = ?value, "condition not yet satisfied");
                    Observation::Value(format!("{:?}", value))
                }
                Err(e) => {
                    debug!(description, attempts, error = %e, "probe failed");
                    Observation::Error(e.to_string())
                }
            };

            let now = Instant::now();
            if now >= deadline {
                let elapsed = now.duration_since(start);
                warn!(
                    description,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    last = %last,
                    "condition not satisfied before timeout"
                );
                return Err(PollError::Timeout {
                    description: description.to_string(),
                    expected: matcher.describe(),
                    elapsed,
                    attempts,
                    last,
                });
            }

            tokio::time::sleep_until(instant_after(now, self.interval).min(deadline)).await;
        }
    }
}

/// `instant + duration`, saturating at a far-future instant.
fn instant_after(instant: Instant, duration: Duration) -> Instant {
    instant
        .checked_add(duration)
        .unwrap_or_else(|| instant + FAR_FUTURE)
}

/// Parse a Go-style duration string (`"1m"`, `"10s"`, `"1m30s"`, `"250ms"`).
pub fn parse_duration(s: &str) -> Result<Duration, PollError> {
    let input = s.trim();
    if input.is_empty() {
        return Err(PollError::InvalidDuration("empty duration".to_string()));
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = input;

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| PollError::InvalidDuration(format!("missing unit in {:?}", s)))?;
        if digits == 0 {
            return Err(PollError::InvalidDuration(format!(
                "expected a number in {:?}",
                s
            )));
        }

        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| PollError::InvalidDuration(format!("number out of range in {:?}", s)))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let out_of_range = || PollError::InvalidDuration(format!("{:?} is out of range", s));
        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(out_of_range)?),
            "h" => Duration::from_secs(value.checked_mul(60 * 60).ok_or_else(out_of_range)?),
            other => {
                return Err(PollError::InvalidDuration(format!(
                    "unknown unit {:?} in {:?}",
                    other, s
                )))
            }
        };
        total = total.checked_add(part).ok_or_else(out_of_range)?;
    }

    Ok(total)
}
