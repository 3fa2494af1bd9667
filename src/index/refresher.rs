//! Background index refresh driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::CacheError;
use crate::traits::RefreshIndex;

/// Drives [`RefreshIndex::refresh`] on a fixed schedule.
///
/// The driver refreshes once immediately on spawn (so readers waiting on
/// a fresh [`SnapshotIndex`](crate::index::SnapshotIndex) are released
/// promptly) and then once per interval. Refresh errors do not stop the
/// schedule; each is reported to the supplied handler and logged.
///
/// The background task is aborted when the refresher is dropped or
/// [`shutdown`](IntervalRefresher::shutdown) is called.
///
/// # Example
///
/// ```no_run
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use std::time::Duration;
/// use readthrough::index::{IndexSourceFn, IntervalRefresher, SnapshotIndex};
///
/// let source = Arc::new(IndexSourceFn::new(|| async {
///     Ok(HashMap::<String, Vec<u64>>::new())
/// }));
/// let index = Arc::new(SnapshotIndex::new(source));
///
/// let refresher = IntervalRefresher::spawn(
///     index,
///     Duration::from_secs(30),
///     |err| eprintln!("index refresh failed: {err}"),
/// );
/// // … the index stays fresh until `refresher` is dropped.
/// # drop(refresher);
/// # }
/// ```
#[derive(Debug)]
pub struct IntervalRefresher {
    task: JoinHandle<()>,
}

impl IntervalRefresher {
    /// Spawns the background refresh task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        index: Arc<dyn RefreshIndex>,
        interval: Duration,
        on_error: impl Fn(&CacheError) + Send + Sync + 'static,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // The first tick fires immediately.
                ticker.tick().await;
                if let Err(err) = index.refresh().await {
                    tracing::warn!(error = %err, "background index refresh failed");
                    on_error(&err);
                }
            }
        });
        Self { task }
    }

    /// Stops the background task.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for IntervalRefresher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct CountingIndex {
        refreshes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RefreshIndex for CountingIndex {
        async fn refresh(&self) -> Result<(), CacheError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CacheError::source(std::io::Error::other("nope")))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_immediately_and_then_on_the_interval() {
        let index = Arc::new(CountingIndex {
            refreshes: AtomicUsize::new(0),
            fail: false,
        });
        let refresher = IntervalRefresher::spawn(
            Arc::clone(&index) as Arc<dyn RefreshIndex>,
            Duration::from_secs(10),
            |_err| {},
        );

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(index.refreshes.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(index.refreshes.load(Ordering::SeqCst), 3);

        refresher.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_reported_and_do_not_stop_the_schedule() {
        let index = Arc::new(CountingIndex {
            refreshes: AtomicUsize::new(0),
            fail: true,
        });
        let errors = Arc::new(AtomicUsize::new(0));
        let errors_in_handler = Arc::clone(&errors);
        let _refresher = IntervalRefresher::spawn(
            Arc::clone(&index) as Arc<dyn RefreshIndex>,
            Duration::from_secs(5),
            move |_err| {
                errors_in_handler.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(index.refreshes.load(Ordering::SeqCst), 3);
        assert_eq!(errors.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_refresher_stops_the_task() {
        let index = Arc::new(CountingIndex {
            refreshes: AtomicUsize::new(0),
            fail: false,
        });
        let refresher = IntervalRefresher::spawn(
            Arc::clone(&index) as Arc<dyn RefreshIndex>,
            Duration::from_secs(5),
            |_err| {},
        );

        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(refresher);
        let seen = index.refreshes.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(index.refreshes.load(Ordering::SeqCst), seen);
    }
}
