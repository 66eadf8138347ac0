// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use tokio::time::Instant;

/// Clock used to arm token deadlines. Tests swap in a timer they fire by hand.
#[async_trait::async_trait]
pub trait Timer: Send + Sync + 'static {
    /// Resolves at `deadline`, or right away if it has already passed.
    async fn sleep_until(&self, deadline: Instant);
}

/// Timer backed by the tokio runtime's clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait::async_trait]
impl Timer for TokioTimer {
    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}
