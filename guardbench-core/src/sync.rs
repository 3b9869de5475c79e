// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Cancellation token and countdown latch.
//!
//! The orchestrator blocks on a [`CountdownLatch`] during pool warm-up and
//! again for every fan-out/fan-in join. Both waits take
//! a [`CancelToken`] so that `stop()` turns into a typed abort instead of a
//! thread interrupt.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use crate::error::AbortReason;

struct LatchShared {
    remaining: AtomicU64,
    lock: Mutex<()>,
    zero: Condvar,
}

impl LatchShared {
    fn wake(&self) {
        let _guard = self.lock.lock();
        self.zero.notify_all();
    }
}

/// A one-shot counter that releases waiters when it reaches zero.
///
/// Counting down is lock-free except for the final decrement, which takes
/// the latch mutex to publish the wake-up.
#[derive(Clone)]
pub struct CountdownLatch {
    shared: Arc<LatchShared>,
}

impl CountdownLatch {
    pub fn new(count: u64) -> Self {
        Self {
            shared: Arc::new(LatchShared {
                remaining: AtomicU64::new(count),
                lock: Mutex::new(()),
                zero: Condvar::new(),
            }),
        }
    }

    /// Decrement the counter. No-op once it is already zero.
    pub fn count_down(&self) {
        let prev = self
            .shared
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        if prev == Ok(1) {
            self.shared.wake();
        }
    }

    pub fn count(&self) -> u64 {
        self.shared.remaining.load(Ordering::Acquire)
    }

    /// Block until the counter reaches zero. Not cancellable.
    pub fn wait(&self) {
        let mut guard = self.shared.lock.lock();
        while self.count() != 0 {
            self.shared.zero.wait(&mut guard);
        }
    }

    /// Block until the counter reaches zero or `token` is cancelled.
    ///
    /// A latch that already reached zero wins over a cancelled token.
    pub fn wait_cancellable(&self, token: &CancelToken) -> Result<(), AbortReason> {
        token.register(&self.shared);

        let mut guard = self.shared.lock.lock();
        loop {
            if self.count() == 0 {
                return Ok(());
            }
            if let Some(reason) = token.reason() {
                return Err(reason);
            }
            self.shared.zero.wait(&mut guard);
        }
    }
}

impl std::fmt::Debug for CountdownLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownLatch")
            .field("remaining", &self.count())
            .finish()
    }
}

#[derive(Default)]
struct TokenShared {
    cancelled: AtomicBool,
    reason: Mutex<Option<AbortReason>>,
    waiters: Mutex<Vec<Weak<LatchShared>>>,
}

/// Explicit cancellation handle shared between the runner and its waits.
#[derive(Clone, Default)]
pub struct CancelToken {
    shared: Arc<TokenShared>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel with `reason`, waking every latch currently waiting on this token.
    ///
    /// Returns false if the token was already cancelled; the first reason is kept.
    pub fn cancel(&self, reason: AbortReason) -> bool {
        {
            let mut slot = self.shared.reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
            self.shared.cancelled.store(true, Ordering::Release);
        }

        let waiters = mem::take(&mut *self.shared.waiters.lock());
        for latch in waiters.iter().filter_map(Weak::upgrade) {
            latch.wake();
        }

        tracing::debug!(reason = %reason, "Cancellation requested");
        true
    }

    /// Cheap check used on the hot path by worker tasks.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<AbortReason> {
        *self.shared.reason.lock()
    }

    fn register(&self, latch: &Arc<LatchShared>) {
        let mut waiters = self.shared.waiters.lock();
        waiters.retain(|w| w.strong_count() > 0);
        waiters.push(Arc::downgrade(latch));
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .finish()
    }
}
