//! Credential pool shared by every request the syncer makes.
//!
//! The pool walks its tokens in order. When the cursor wraps back to the
//! first token the pool is `Exhausted` until a backoff wait resets it.
//!
//! Two locks are involved:
//! - a short synchronous lock over cursor/exhausted/epoch, never held across
//!   an `.await`, so reads stay cheap while a backoff is sleeping;
//! - an async backoff gate held for the duration of a reset wait. Callers
//!   that find the pool exhausted while the gate is held queue on it instead
//!   of failing.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RotatorError {
    #[error("credential pool must contain at least one non-blank token")]
    EmptyPool,
}

/// An API token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Observable pool state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Active(usize),
    Exhausted,
}

/// A credential handed out together with the pool position it came from.
#[derive(Debug, Clone)]
pub struct Lease {
    pub credential: Credential,
    pub index: usize,
    pub epoch: u64,
}

#[derive(Debug)]
struct RotatorState {
    cursor: usize,
    exhausted: bool,
    /// Bumped on every rotation and reset.
    epoch: u64,
}

impl RotatorState {
    fn pool_state(&self) -> PoolState {
        if self.exhausted {
            PoolState::Exhausted
        } else {
            PoolState::Active(self.cursor)
        }
    }
}

pub struct CredentialRotator {
    pool: Vec<Credential>,
    state: Mutex<RotatorState>,
    backoff_gate: tokio::sync::Mutex<()>,
}

impl fmt::Debug for CredentialRotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRotator")
            .field("pool_size", &self.pool.len())
            .field("state", &self.state())
            .finish()
    }
}

impl CredentialRotator {
    /// Builds a rotator over `tokens`, dropping blank entries.
    pub fn new<I, S>(tokens: I) -> Result<Self, RotatorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool: Vec<Credential> = tokens
            .into_iter()
            .map(Into::<String>::into)
            .filter(|t| !t.trim().is_empty())
            .map(Credential::new)
            .collect();

        if pool.is_empty() {
            return Err(RotatorError::EmptyPool);
        }

        Ok(Self {
            pool,
            state: Mutex::new(RotatorState {
                cursor: 0,
                exhausted: false,
                epoch: 0,
            }),
            backoff_gate: tokio::sync::Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RotatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn state(&self) -> PoolState {
        self.lock().pool_state()
    }

    pub fn is_exhausted(&self) -> bool {
        self.lock().exhausted
    }

    /// The credential at the cursor, or `None` while exhausted.
    pub fn current(&self) -> Option<Credential> {
        self.lease().map(|lease| lease.credential)
    }

    /// Non-blocking lease of the current credential.
    pub fn lease(&self) -> Option<Lease> {
        let state = self.lock();
        if state.exhausted {
            return None;
        }
        Some(Lease {
            credential: self.pool[state.cursor].clone(),
            index: state.cursor,
            epoch: state.epoch,
        })
    }

    /// Lease a credential, waiting out an in-flight backoff if there is one.
    ///
    /// Rate-limit rotations that exhaust the pool happen under the backoff
    /// gate, so an exhausted pool seen here is either being reset (the gate
    /// is held) or was exhausted through [`Self::rotate_on_failure`] with
    /// nobody resetting it, in which case this returns `None`.
    pub async fn acquire(&self) -> Option<Lease> {
        if let Some(lease) = self.lease() {
            return Some(lease);
        }

        debug!("credential pool exhausted, waiting for in-flight backoff");
        let _guard = self.backoff_gate.lock().await;
        self.lease()
    }

    /// Advance to the next credential. Wrapping to the first one exhausts the pool.
    pub fn rotate_on_failure(&self) -> PoolState {
        let mut state = self.lock();
        Self::rotate_locked(&mut state, self.pool.len())
    }

    /// Rotate only if `lease` still describes the current position.
    ///
    /// Concurrent callers failing on the same credential rotate once.
    fn rotate_after(&self, lease: &Lease) -> PoolState {
        let mut state = self.lock();
        if state.epoch != lease.epoch {
            debug!(
                lease_epoch = lease.epoch,
                current_epoch = state.epoch,
                "credential already rotated by another caller"
            );
            return state.pool_state();
        }
        Self::rotate_locked(&mut state, self.pool.len())
    }

    fn rotate_locked(state: &mut RotatorState, pool_size: usize) -> PoolState {
        if state.exhausted {
            return PoolState::Exhausted;
        }

        state.cursor = (state.cursor + 1) % pool_size;
        state.epoch += 1;
        counter!("github_credential_rotations_total").increment(1);

        if state.cursor == 0 {
            state.exhausted = true;
            warn!(pool_size, "all credentials rate limited, pool exhausted");
        } else {
            info!(cursor = state.cursor, "rotated to next credential");
        }

        state.pool_state()
    }

    /// Sleep for `duration`; the caller decides when the wait is warranted.
    pub async fn wait_for_reset(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// `Exhausted -> Active(0)`. No-op while active.
    pub fn reset_exhaustion(&self) {
        let mut state = self.lock();
        if state.exhausted {
            state.cursor = 0;
            state.exhausted = false;
            state.epoch += 1;
            info!("credential pool reset after backoff");
        }
    }

    /// Rotate away from a rate-limited `lease`; if that exhausts the pool,
    /// sleep `backoff` and reset it before returning.
    ///
    /// Runs entirely under the backoff gate, so other callers never observe
    /// an exhausted pool without a reset in progress. A stale lease (someone
    /// else already rotated or reset) changes nothing.
    pub async fn rotate_after_rate_limit(&self, lease: &Lease, backoff: Duration) -> PoolState {
        let _guard = self.backoff_gate.lock().await;
        if self.rotate_after(lease) != PoolState::Exhausted {
            return self.state();
        }

        warn!(
            backoff_ms = backoff.as_millis() as u64,
            "backing off until rate limit resets"
        );
        counter!("github_rate_limit_backoffs_total").increment(1);
        histogram!("github_rate_limit_backoff_seconds").record(backoff.as_secs_f64());

        self.wait_for_reset(backoff).await;
        self.reset_exhaustion();
        self.state()
    }
}
