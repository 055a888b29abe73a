use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use crate::error::{DeliveryError, InitError};
use super::queue::{Envelope, NotificationQueue};

/// How a dispatcher thread ended.
#[derive(Debug)]
pub enum DispatchExit {
    Shutdown { delivered: u64 },
    DeliveryFailed { delivered: u64, error: DeliveryError },
}

/// Single consumer of one `NotificationQueue`, running on its own OS thread.
///
/// The only way to stop it is the queue's shutdown sentinel; a failed
/// delivery also ends it, without retry.
pub struct Dispatcher {
    name: String,
    handle: Option<JoinHandle<DispatchExit>>,
}

impl Dispatcher {
    pub fn spawn<T, F>(
        name: &str,
        queue: Arc<NotificationQueue<T>>,
        mut deliver: F,
    ) -> Result<Self, InitError>
    where
        T: Send + 'static,
        F: FnMut(u64, T) -> Result<(), DeliveryError> + Send + 'static,
    {
        // std panics on interior NUL in a thread name.
        if name.contains('\0') {
            return Err(InitError::Spawn {
                name: name.escape_debug().to_string(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "thread name contains NUL"),
            });
        }
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || dispatch_loop(&queue, &mut deliver))
            .map_err(|source| InitError::Spawn {
                name: name.to_string(),
                source,
            })?;
        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the thread to exit. `None` if it panicked or was already
    /// joined.
    pub fn join(&mut self) -> Option<DispatchExit> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(exit) => Some(exit),
            Err(_) => {
                error!(dispatcher = %self.name, "dispatcher thread panicked");
                None
            }
        }
    }
}

fn dispatch_loop<T, F>(queue: &NotificationQueue<T>, deliver: &mut F) -> DispatchExit
where
    F: FnMut(u64, T) -> Result<(), DeliveryError>,
{
    info!(queue = queue.name(), "notification dispatcher started");
    let mut delivered = 0;
    loop {
        // The queue monitor is released before delivery runs.
        let entry = queue.next();
        match entry.message {
            Envelope::Shutdown => {
                info!(queue = queue.name(), delivered, "notification dispatcher stopped");
                return DispatchExit::Shutdown { delivered };
            }
            Envelope::Notify(body) => match deliver(entry.sequence, body) {
                Ok(()) => {
                    delivered += 1;
                    debug!(queue = queue.name(), sequence = entry.sequence, "notification delivered");
                }
                Err(error) => {
                    error!(queue = queue.name(), sequence = entry.sequence, %error, "delivery failed, dispatcher exiting");
                    return DispatchExit::DeliveryFailed { delivered, error };
                }
            },
        }
    }
}
