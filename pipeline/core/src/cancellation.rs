// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Propagate-once cancellation with optional deadlines.
//!
//! [`CancelToken`] is the owning handle: it is the only thing that can cancel
//! explicitly, and dropping it cancels. Everyone else holds a cloneable,
//! read-only [`CancelSignal`]. Both are thin wrappers over
//! `tokio_util::sync::CancellationToken`, which supplies the wake-up side;
//! the tri-state bookkeeping lives in an atomic next to it.

use crate::{CancelReason, Timer, TokioTimer};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const ACTIVE: u8 = 0;
const CANCELLED: u8 = 1;
const EXPIRED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Active,
    Cancelled,
    Expired,
}

impl TokenState {
    pub fn is_done(self) -> bool {
        self != TokenState::Active
    }

    pub fn reason(self) -> Option<CancelReason> {
        match self {
            TokenState::Active => None,
            TokenState::Cancelled => Some(CancelReason::Cancelled),
            TokenState::Expired => Some(CancelReason::Expired),
        }
    }
}

#[derive(Debug)]
struct TokenInner {
    state: AtomicU8,
    deadline: Option<Instant>,
    token: CancellationToken,
    parent: Option<Arc<TokenInner>>,
}

impl TokenInner {
    fn new(
        deadline: Option<Instant>,
        token: CancellationToken,
        parent: Option<Arc<TokenInner>>,
    ) -> Self {
        Self {
            state: AtomicU8::new(ACTIVE),
            deadline,
            token,
            parent,
        }
    }

    /// Moves the token out of `ACTIVE`. Only the first caller wins; later
    /// calls, and calls on a token already released by its parent, do nothing.
    fn transition(&self, to: u8) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let won = self
            .state
            .compare_exchange(ACTIVE, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.token.cancel();
        }
        won
    }

    fn state(&self) -> TokenState {
        match self.state.load(Ordering::Acquire) {
            CANCELLED => TokenState::Cancelled,
            EXPIRED => TokenState::Expired,
            _ if self.token.is_cancelled() => self
                .parent
                .as_ref()
                .map(|parent| parent.state())
                .filter(|state| state.is_done())
                .unwrap_or(TokenState::Cancelled),
            _ => TokenState::Active,
        }
    }
}

/// Owning cancellation handle. Not cloneable: hand out [`CancelSignal`]s to
/// readers instead.
#[derive(Debug)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Creates an active token. With a deadline, a timer task is armed on the
    /// current tokio runtime that expires the token when it elapses.
    pub fn new(deadline: Option<Duration>) -> Self {
        Self::with_timer(deadline, TokioTimer)
    }

    pub fn with_timer<T: Timer>(deadline: Option<Duration>, timer: T) -> Self {
        Self::build(CancellationToken::new(), None, deadline, timer)
    }

    /// Derives a token that becomes done when `parent` does. Cancelling or
    /// expiring the child leaves the parent untouched.
    pub fn child_of(parent: &CancelSignal, deadline: Option<Duration>) -> Self {
        Self::child_of_with_timer(parent, deadline, TokioTimer)
    }

    pub fn child_of_with_timer<T: Timer>(
        parent: &CancelSignal,
        deadline: Option<Duration>,
        timer: T,
    ) -> Self {
        Self::build(
            parent.inner.token.child_token(),
            Some(parent.inner.clone()),
            deadline,
            timer,
        )
    }

    fn build<T: Timer>(
        token: CancellationToken,
        parent: Option<Arc<TokenInner>>,
        deadline: Option<Duration>,
        timer: T,
    ) -> Self {
        // A deadline past the clock's range never fires: no deadline at all.
        let deadline = deadline.and_then(|duration| {
            Instant::now()
                .checked_add(duration)
                .map(|expires_at| (duration, expires_at))
        });
        let inner = Arc::new(TokenInner::new(
            deadline.map(|(_, expires_at)| expires_at),
            token,
            parent,
        ));

        if let Some((duration, expires_at)) = deadline {
            let armed = inner.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = armed.token.cancelled() => {}
                    _ = timer.sleep_until(expires_at) => {
                        if armed.transition(EXPIRED) {
                            debug!(deadline_ms = duration.as_millis() as u64, "token deadline expired");
                        }
                    }
                }
            });
        }

        Self { inner }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        if self.inner.transition(CANCELLED) {
            debug!("token cancelled");
        }
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            inner: self.inner.clone(),
        }
    }

    pub fn state(&self) -> TokenState {
        self.inner.state()
    }

    pub fn is_done(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub async fn wait_done(&self) {
        self.inner.token.cancelled().await
    }
}

impl Drop for CancelToken {
    fn drop(&mut self) {
        self.inner.transition(CANCELLED);
    }
}

/// Read-only view of a [`CancelToken`]. Cheap to clone; every clone observes
/// the same transition at the same time.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    inner: Arc<TokenInner>,
}

impl CancelSignal {
    pub fn state(&self) -> TokenState {
        self.inner.state()
    }

    pub fn is_done(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Resolves once the token is done. Cancel safe, so it can sit in a
    /// `tokio::select!` next to channel operations.
    pub async fn wait_done(&self) {
        self.inner.token.cancelled().await
    }
}
