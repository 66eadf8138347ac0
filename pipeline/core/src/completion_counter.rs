// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
struct CounterInner {
    expected: usize,
    finished: AtomicUsize,
    all_done: watch::Sender<bool>,
}

/// Counting barrier shared by a fixed set of producers.
///
/// Each producer owns one [`CompletionToken`] and reports completion by
/// dropping it, so a producer that panics still counts. The barrier flips to
/// "all done" exactly once, when the last token goes away.
#[derive(Debug, Clone)]
pub struct CompletionCounter {
    inner: Arc<CounterInner>,
}

impl CompletionCounter {
    /// Sets up the barrier for `producers` producers and returns one token per
    /// producer. No other tokens can ever be issued.
    pub fn setup(producers: usize) -> (Self, Vec<CompletionToken>) {
        let (all_done, _) = watch::channel(producers == 0);
        let inner = Arc::new(CounterInner {
            expected: producers,
            finished: AtomicUsize::new(0),
            all_done,
        });

        let tokens = (0..producers)
            .map(|producer_id| CompletionToken {
                producer_id,
                inner: inner.clone(),
            })
            .collect();

        (Self { inner }, tokens)
    }

    /// Barrier for a single producer.
    pub fn single() -> (Self, CompletionToken) {
        let inner = Arc::new(CounterInner {
            expected: 1,
            finished: AtomicUsize::new(0),
            all_done: watch::channel(false).0,
        });
        let token = CompletionToken {
            producer_id: 0,
            inner: inner.clone(),
        };
        (Self { inner }, token)
    }

    pub fn expected(&self) -> usize {
        self.inner.expected
    }

    pub fn finished(&self) -> usize {
        self.inner.finished.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        *self.inner.all_done.borrow()
    }

    /// Resolves once every producer has finished. Returns immediately if that
    /// already happened.
    pub async fn wait_all(&self) {
        let mut all_done = self.inner.all_done.subscribe();
        // The sender lives in `inner`, which we hold, so this cannot fail.
        let _ = all_done.wait_for(|done| *done).await;
    }
}

/// A producer's share of a [`CompletionCounter`].
#[derive(Debug)]
pub struct CompletionToken {
    producer_id: usize,
    inner: Arc<CounterInner>,
}

impl CompletionToken {
    pub fn producer_id(&self) -> usize {
        self.producer_id
    }

    /// Reports completion. Equivalent to dropping the token.
    pub fn complete(self) {}
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        let finished = self.inner.finished.fetch_add(1, Ordering::AcqRel) + 1;
        if finished == self.inner.expected {
            self.inner.all_done.send_replace(true);
        }
    }
}
