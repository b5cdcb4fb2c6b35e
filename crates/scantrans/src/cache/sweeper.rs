//! Periodic removal of expired translation cache entries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::translation_cache::TranslationCache;

/// Runs [`TranslationCache::sweep`] on an interval, or on demand via
/// [`CacheSweeper::trigger`].
pub struct CacheSweeper {
    cache: Arc<TranslationCache>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    trigger_tx: broadcast::Sender<()>,
}

impl CacheSweeper {
    pub fn new(cache: Arc<TranslationCache>, interval: Duration) -> Self {
        let (trigger_tx, _) = broadcast::channel(4);
        Self {
            cache,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            trigger_tx,
        }
    }

    /// Spawns the sweep loop on the current tokio runtime.
    pub fn start(&self) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;
        let mut trigger_rx = self.trigger_tx.subscribe();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await; // first tick completes immediately

            loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                tokio::select! {
                    _ = timer.tick() => {},
                    Ok(()) = trigger_rx.recv() => {
                        tracing::debug!("Manual cache sweep triggered");
                    },
                }

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                match cache.sweep().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Swept expired cache entries"),
                    Err(e) => tracing::warn!(error = %e, "Cache sweep failed"),
                }
            }
            tracing::debug!("Cache sweeper stopped");
        })
    }

    /// Requests a sweep without waiting for the next interval.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.send(());
    }

    /// Signals the loop to exit and wakes it up.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.trigger_tx.send(());
    }
}
