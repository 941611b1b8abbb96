//! One-shot countdown latch.

use parking_lot::Mutex;
use tokio::sync::watch;

/// Gate that opens once `count_down` has been called `count` times.
///
/// Counting down past zero is ignored. Reaching zero wakes every waiter; waiters are
/// scheduled by the runtime rather than run inline, so releasing the latch from inside
/// a reply callback never re-enters the waiting code.
pub struct CountDownLatch {
    count: Mutex<usize>,
    released: watch::Sender<bool>,
}

impl CountDownLatch {
    pub fn new(count: usize) -> Self {
        let (released, _) = watch::channel(count == 0);
        Self {
            count: Mutex::new(count),
            released,
        }
    }

    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    pub fn count_down(&self) {
        let mut count = self.count.lock();
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.released.send_replace(true);
        }
    }

    /// Count down until the latch opens.
    pub fn drain(&self) {
        while self.count() > 0 {
            self.count_down();
        }
    }

    pub async fn wait(&self) {
        let mut released = self.released.subscribe();
        // The sender lives as long as `self`, so this only returns once released.
        let _ = released.wait_for(|open| *open).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_zero_latch_is_open() {
        let latch = CountDownLatch::new(0);
        latch.wait().await;
        assert_eq!(latch.count(), 0);
    }

    #[tokio::test]
    async fn test_waiters_release_after_last_count_down() {
        let latch = Arc::new(CountDownLatch::new(2));
        let waiter = {
            let latch = Arc::clone(&latch);
            tokio::spawn(async move { latch.wait().await })
        };

        latch.count_down();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        latch.count_down();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("latch should release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_count_down_below_zero_is_ignored() {
        let latch = CountDownLatch::new(1);
        latch.count_down();
        latch.count_down();
        assert_eq!(latch.count(), 0);
        latch.wait().await;
    }

    #[tokio::test]
    async fn test_drain_opens_latch() {
        let latch = CountDownLatch::new(5);
        latch.count_down();
        latch.drain();
        assert_eq!(latch.count(), 0);
        latch.wait().await;
    }

    proptest::proptest! {
        #[test]
        fn prop_count_never_underflows(initial in 0usize..32, calls in 0usize..64) {
            let latch = CountDownLatch::new(initial);
            for _ in 0..calls {
                latch.count_down();
            }
            proptest::prop_assert_eq!(latch.count(), initial.saturating_sub(calls));
            proptest::prop_assert_eq!(*latch.released.borrow(), calls >= initial);
        }
    }
}
