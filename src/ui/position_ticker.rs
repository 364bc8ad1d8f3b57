//! Periodic position refresh for the seek bar.
//!
//! A background thread sends a tick at a fixed interval over an
//! `async_channel`; a task on the GTK main context receives the ticks and
//! runs the refresh callback there, so widgets are only touched from the UI
//! thread.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering::Relaxed},
    },
    thread::{Builder, JoinHandle, sleep},
    time::Duration,
};

use {
    async_channel::{Receiver, TrySendError, bounded},
    libadwaita::glib::MainContext,
    tracing::{debug, warn},
};

/// Owns the tick thread; dropping it stops the ticks.
pub struct PositionTicker {
    /// Cleared to stop the tick thread.
    running: Arc<AtomicBool>,
    /// Tick thread handle, taken on stop.
    handle: Option<JoinHandle<()>>,
}

impl PositionTicker {
    /// Starts ticking and calls `on_tick` on the main context after every
    /// interval.
    ///
    /// # Arguments
    ///
    /// * `interval` - Time between ticks
    /// * `on_tick` - Refresh callback, run on the GTK main thread
    pub fn start<F>(interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (receiver, handle) = spawn_tick_source(interval, Arc::clone(&running));

        MainContext::default().spawn_local(async move {
            while receiver.recv().await.is_ok() {
                on_tick();
            }
            debug!("Position ticks ended");
        });

        Self { running, handle }
    }

    /// Whether the tick thread has been asked to keep going.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Relaxed)
    }

    /// Stops the tick thread. The main-context task ends once the thread
    /// drops its sender.
    pub fn stop(&mut self) {
        if self.running.swap(false, Relaxed) {
            debug!("Stopping position ticker");
        }
        // Detached; the thread exits within one interval.
        self.handle.take();
    }
}

impl Drop for PositionTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns the thread that produces ticks until `running` is cleared or the
/// receiving side goes away.
///
/// A tick is dropped rather than queued when the previous one has not been
/// handled yet.
fn spawn_tick_source(
    interval: Duration,
    running: Arc<AtomicBool>,
) -> (Receiver<()>, Option<JoinHandle<()>>) {
    let (sender, receiver) = bounded(1);

    let spawned = Builder::new()
        .name("position-ticker".to_string())
        .spawn(move || {
            while running.load(Relaxed) {
                sleep(interval);
                if !running.load(Relaxed) {
                    break;
                }
                match sender.try_send(()) {
                    Ok(()) | Err(TrySendError::Full(())) => {}
                    Err(TrySendError::Closed(())) => break,
                }
            }
        });

    match spawned {
        Ok(handle) => (receiver, Some(handle)),
        Err(e) => {
            warn!("Failed to spawn position ticker thread: {e}");
            (receiver, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering::Relaxed},
        },
        time::Duration,
    };

    use crate::ui::position_ticker::spawn_tick_source;

    #[test]
    fn test_ticks_arrive_at_interval() {
        let running = Arc::new(AtomicBool::new(true));
        let (receiver, handle) = spawn_tick_source(Duration::from_millis(5), Arc::clone(&running));

        for _ in 0..3 {
            receiver.recv_blocking().unwrap();
        }

        running.store(false, Relaxed);
        handle.unwrap().join().unwrap();
    }

    #[test]
    fn test_thread_exits_when_receiver_dropped() {
        let running = Arc::new(AtomicBool::new(true));
        let (receiver, handle) = spawn_tick_source(Duration::from_millis(5), Arc::clone(&running));

        drop(receiver);

        handle.unwrap().join().unwrap();
        assert!(running.load(Relaxed));
    }

    #[test]
    fn test_stop_ends_channel() {
        let running = Arc::new(AtomicBool::new(true));
        let (receiver, handle) = spawn_tick_source(Duration::from_millis(5), Arc::clone(&running));

        running.store(false, Relaxed);
        handle.unwrap().join().unwrap();

        // Sender is gone with the thread; buffered ticks drain, then recv fails
        while receiver.try_recv().is_ok() {}
        assert!(receiver.recv_blocking().is_err());
    }
}
