use std::{future::Future, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A periodic task that runs `tick` every `period`, starting one period from
/// now, until it is stopped or `tick` reports its owner gone.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub(crate) fn start<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Option<Fut> + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => (),
                }

                let Some(tick) = tick() else { break };
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick => (),
                }
            }
            trace!("heartbeat stopped");
        });

        Heartbeat {
            cancel,
            handle: Some(handle),
        }
    }

    /// Cancels the task and waits until it has finished.
    pub(crate) async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let heartbeat = Heartbeat::start(Duration::from_millis(100), move || {
            let counter = counter.clone();
            Some(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        heartbeat.stop().await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_owner_is_gone() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let heartbeat = Heartbeat::start(Duration::from_millis(100), move || {
            (counter.fetch_add(1, Ordering::SeqCst) == 0).then(|| async {})
        });

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(heartbeat
            .handle
            .as_ref()
            .map_or(false, |handle| handle.is_finished()));

        // stopping a finished heartbeat returns at once
        heartbeat.stop().await;
    }
}
