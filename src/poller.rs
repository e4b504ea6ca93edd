//! Recurring poll timer feeding [`ClientEvent::PollTick`] into the client loop.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::events::ClientEvent;

/// Running poll timer. Dropping the handle stops the timer.
#[derive(Debug)]
pub struct PollHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    interval: Duration,
}

impl PollHandle {
    /// Send a tick every `interval` until stopped or the loop goes away.
    pub fn start(interval: Duration, events: Sender<ClientEvent>) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("notification-poll".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if events.send(ClientEvent::PollTick).is_err() {
                                break;
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Poll timer stopped");
            })
            .ok();
        Self {
            stop: Some(stop_tx),
            thread,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop the timer and wait for its thread to exit.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.halt();
    }
}
