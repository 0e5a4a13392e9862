/*!
 * Background Poller
 * Periodic tick on a dedicated thread with a bounded-time stop
 *
 * The loop waits on a stop channel between ticks, so `stop` wakes it
 * immediately instead of waiting out the interval. A panicking tick is
 * logged and the loop keeps going.
 */

use super::types::{ResourceError, ResourceResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Handle to a running poll loop
pub struct Poller {
    name: String,
    stop_tx: flume::Sender<()>,
    done_rx: flume::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Spawn a thread that calls `tick` every `interval` until stopped
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> ResourceResult<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let (done_tx, done_rx) = flume::bounded::<()>(1);
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(poller = %thread_name, "Poll loop started");
                loop {
                    if catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
                        error!(poller = %thread_name, "Poll tick panicked; continuing");
                    }

                    match stop_rx.recv_timeout(interval) {
                        Err(flume::RecvTimeoutError::Timeout) => continue,
                        // Stop requested or owner dropped
                        _ => break,
                    }
                }
                debug!(poller = %thread_name, "Poll loop exited");
                let _ = done_tx.send(());
            })
            .map_err(|e| ResourceError::Spawn(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            stop_tx,
            done_rx,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the loop and wait up to `timeout` for it to exit
    ///
    /// Returns false if the loop did not exit in time; the thread is then
    /// detached and will exit after its current tick.
    pub fn stop(mut self, timeout: Duration) -> bool {
        let _ = self.stop_tx.try_send(());

        let exited = matches!(
            self.done_rx.recv_timeout(timeout),
            Ok(()) | Err(flume::RecvTimeoutError::Disconnected)
        );

        if let Some(handle) = self.handle.take() {
            if exited {
                if handle.join().is_err() {
                    warn!(poller = %self.name, "Poll thread terminated abnormally");
                }
            } else {
                warn!(
                    poller = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Poll thread did not stop in time; detaching"
                );
            }
        }

        exited
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        // Dropping without stop: signal and detach
        let _ = self.stop_tx.try_send(());
    }
}
