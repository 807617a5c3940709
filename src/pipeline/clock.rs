//! Injectable waiting.
//!
//! The pipeline has three suspension points: the poll interval after upload,
//! the rate-limit cooldown, and the pacing delay between documents. All of
//! them go through a [`Sleeper`] so tests can count and inspect waits without
//! spending real time.

use async_trait::async_trait;
use std::time::Duration;

/// Something that can suspend the current task for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real waiting on the Tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Returns immediately and remembers every requested duration.
    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        calls: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn calls(&self) -> Vec<Duration> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count_of(&self, d: Duration) -> usize {
            self.calls().iter().filter(|&&c| c == d).count()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.calls.lock().unwrap().push(duration);
        }
    }
}
