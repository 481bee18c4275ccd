//! Library cleanup strategies.
//!
//! When the last volume referencing a library is removed, the manager hands
//! a cleanup callback to a [`CleanupStrategy`].  The immediate strategy runs
//! it inline; the delayed strategy waits, so a rolling update that re-links
//! the library within the window keeps the store entry instead of paying
//! for a re-download.
//!
//! The callback itself must be self-checking: it re-acquires the library
//! lock and re-consults the reference count before deleting anything.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{error, info};

use super::LibraryError;

/// Cleanup callback for a library.  Receives the library ID and re-checks
/// whether cleanup is still needed.
pub type CleanupFn = Arc<dyn Fn(String) -> BoxFuture<'static, Result<(), LibraryError>> + Send + Sync>;

/// How libraries are cleaned up once no volume references them.
pub enum CleanupStrategy {
    /// Execute cleanup as soon as the last reference is released.
    Immediate,
    /// Wait for a configurable delay; a re-link within the window keeps the
    /// library.
    Delayed(DelayedCleanup),
}

impl CleanupStrategy {
    /// The default strategy: clean up immediately.
    pub fn immediate() -> Self {
        Self::Immediate
    }

    /// Clean up after `delay`, with last-schedule-wins semantics per
    /// library.
    pub fn delayed(delay: Duration) -> Self {
        Self::Delayed(DelayedCleanup {
            delay,
            state: Arc::new(StdMutex::new(DelayedState {
                pending: HashMap::new(),
                next_generation: 0,
                stopped: false,
            })),
        })
    }

    /// Called when a library has no more volumes using it.  The callback
    /// runs either inline or after the configured delay.
    pub async fn schedule_cleanup(&self, library_id: &str, cleanup: CleanupFn) {
        match self {
            Self::Immediate => {
                info!(%library_id, "executing cleanup");
                run_cleanup(library_id.to_owned(), &cleanup).await;
            }
            Self::Delayed(delayed) => delayed.schedule(library_id, cleanup).await,
        }
    }

    /// Stop the strategy, executing all pending cleanups before returning.
    /// Cleanups scheduled afterwards execute immediately.
    pub async fn stop(&self) {
        if let Self::Delayed(delayed) = self {
            delayed.stop().await;
        }
    }
}

struct PendingCleanup {
    generation: u64,
    cleanup: CleanupFn,
}

struct DelayedState {
    pending: HashMap<String, PendingCleanup>,
    next_generation: u64,
    stopped: bool,
}

/// Delayed cleanup bookkeeping shared with the timer tasks.
pub struct DelayedCleanup {
    delay: Duration,
    state: Arc<StdMutex<DelayedState>>,
}

impl DelayedCleanup {
    async fn schedule(&self, library_id: &str, cleanup: CleanupFn) {
        let generation = {
            let mut state = self.state.lock().expect("cleanup state mutex poisoned");
            if state.stopped {
                None
            } else {
                // Re-scheduling replaces any pending cleanup for the same
                // library; the superseded timer finds a newer generation and
                // gives up.
                let generation = state.next_generation;
                state.next_generation += 1;
                state.pending.insert(
                    library_id.to_owned(),
                    PendingCleanup {
                        generation,
                        cleanup: Arc::clone(&cleanup),
                    },
                );
                Some(generation)
            }
        };

        let Some(generation) = generation else {
            info!(%library_id, "strategy stopped, executing cleanup immediately");
            run_cleanup(library_id.to_owned(), &cleanup).await;
            return;
        };

        info!(%library_id, delay = ?self.delay, "scheduling cleanup");

        let state = Arc::clone(&self.state);
        let delay = self.delay;
        let library_id = library_id.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let cleanup = {
                let mut state = state.lock().expect("cleanup state mutex poisoned");
                match state.pending.get(&library_id) {
                    Some(pending) if pending.generation == generation => state
                        .pending
                        .remove(&library_id)
                        .map(|pending| pending.cleanup),
                    // Superseded or flushed by stop() in the meantime.
                    _ => None,
                }
            };

            if let Some(cleanup) = cleanup {
                info!(%library_id, "executing scheduled cleanup");
                run_cleanup(library_id, &cleanup).await;
            }
        });
    }

    async fn stop(&self) {
        let pending = {
            let mut state = self.state.lock().expect("cleanup state mutex poisoned");
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.pending.drain().collect::<Vec<_>>()
        };

        for (library_id, pending) in pending {
            info!(%library_id, "stop: executing pending cleanup");
            run_cleanup(library_id, &pending.cleanup).await;
        }
    }
}

async fn run_cleanup(library_id: String, cleanup: &CleanupFn) {
    if let Err(e) = cleanup(library_id.clone()).await {
        error!(%library_id, error = %e, "cleanup failed");
    }
}
