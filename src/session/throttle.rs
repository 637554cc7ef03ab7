//! Per-email login failure counting and lockout.
//!
//! The counter lives behind [`LoginAttemptStore`] so the in-memory map can be
//! swapped for a shared store without touching the login flow.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use crate::config::LockoutConfig;
use crate::error::SessionError;

/// Failure bookkeeping for one email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    /// Consecutive failures since the last success or expired lockout
    pub failures: u32,
    pub last_attempt: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}

pub trait LoginAttemptStore: Send + Sync {
    fn get(&self, email: &str) -> Option<LoginAttempt>;
    /// Count one more failure, creating the entry on first use.
    fn increment(&self, email: &str, now: DateTime<Utc>) -> LoginAttempt;
    fn lock(&self, email: &str, until: DateTime<Utc>);
    fn reset(&self, email: &str);
}

/// Process-lifetime attempt store
#[derive(Debug, Default)]
pub struct InMemoryAttemptStore {
    entries: DashMap<String, LoginAttempt>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl LoginAttemptStore for InMemoryAttemptStore {
    fn get(&self, email: &str) -> Option<LoginAttempt> {
        self.entries.get(email).map(|e| e.value().clone())
    }

    fn increment(&self, email: &str, now: DateTime<Utc>) -> LoginAttempt {
        let mut entry = self
            .entries
            .entry(email.to_string())
            .or_insert_with(|| LoginAttempt {
                failures: 0,
                last_attempt: now,
                locked_until: None,
            });
        entry.failures += 1;
        entry.last_attempt = now;
        entry.value().clone()
    }

    fn lock(&self, email: &str, until: DateTime<Utc>) {
        if let Some(mut entry) = self.entries.get_mut(email) {
            entry.locked_until = Some(until);
        }
    }

    fn reset(&self, email: &str) {
        self.entries.remove(email);
    }
}

/// Lockout policy on top of an attempt store.
pub struct LoginThrottle {
    store: Arc<dyn LoginAttemptStore>,
    max_failures: u32,
    lockout: Duration,
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Whole minutes left, rounded up so "0 minutes" is never shown.
fn minutes_until(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (until - now).num_seconds().max(1);
    (secs + 59) / 60
}

impl LoginThrottle {
    pub fn new(store: Arc<dyn LoginAttemptStore>, config: &LockoutConfig) -> Self {
        Self {
            store,
            max_failures: config.max_failed_attempts.max(1),
            lockout: Duration::seconds(config.lockout_secs as i64),
        }
    }

    /// Same policy, different backing store.
    pub fn with_store(self, store: Arc<dyn LoginAttemptStore>) -> Self {
        Self { store, ..self }
    }

    /// Fails with `Throttled` while a lockout is active. An expired lockout
    /// starts the count over.
    pub fn check(&self, email: &str, now: DateTime<Utc>) -> Result<(), SessionError> {
        let email = normalize(email);
        let Some(attempt) = self.store.get(&email) else {
            return Ok(());
        };

        match attempt.locked_until {
            Some(until) if now < until => Err(SessionError::Throttled {
                remaining_minutes: minutes_until(until, now),
            }),
            Some(_) => {
                self.store.reset(&email);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Count a failed attempt. Returns the lockout deadline when this failure
    /// trips the lock.
    pub fn record_failure(&self, email: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let email = normalize(email);
        let attempt = self.store.increment(&email, now);
        if attempt.failures >= self.max_failures {
            let until = now + self.lockout;
            self.store.lock(&email, until);
            tracing::warn!(
                email = %email,
                failures = attempt.failures,
                locked_until = %until,
                "Login locked after repeated failures"
            );
            return Some(until);
        }
        None
    }

    pub fn record_success(&self, email: &str) {
        self.store.reset(&normalize(email));
    }

    pub fn failures(&self, email: &str) -> u32 {
        self.store
            .get(&normalize(email))
            .map(|a| a.failures)
            .unwrap_or(0)
    }

    pub fn lockout_minutes(&self) -> i64 {
        (self.lockout.num_seconds() + 59) / 60
    }
}
