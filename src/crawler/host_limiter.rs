//! Per-host admission control
//!
//! Each host gets its own semaphore with `per_host` permits, created lazily the
//! first time the host is seen. A download holds a [`HostPermit`] for as long
//! as it talks to the host; dropping the permit releases the slot, so the
//! release happens on every exit path of the download task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds concurrent downloads per remote host
#[derive(Debug)]
pub struct HostLimiter {
    /// Maximum in-flight downloads for a single host
    per_host: usize,

    /// Per-host semaphores
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

/// An admission slot for one host, released on drop
#[derive(Debug)]
pub struct HostPermit {
    host: String,
    _permit: OwnedSemaphorePermit,
}

impl HostPermit {
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl HostLimiter {
    /// Creates a limiter admitting at most `per_host` downloads per host
    pub fn new(per_host: usize) -> Self {
        Self {
            per_host,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Waits until the host has a free slot and reserves it
    ///
    /// # Returns
    ///
    /// * `Some(HostPermit)` - The reserved slot
    /// * `None` - The host's semaphore was closed
    pub async fn acquire(&self, host: &str) -> Option<HostPermit> {
        let slots = {
            let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                hosts
                    .entry(host.to_string())
                    .or_insert_with(|| Arc::new(Semaphore::new(self.per_host))),
            )
        };

        let permit = slots.acquire_owned().await.ok()?;
        tracing::trace!("Admitted download for host {}", host);

        Some(HostPermit {
            host: host.to_string(),
            _permit: permit,
        })
    }

    /// Returns the number of downloads currently admitted for a host
    pub fn in_flight(&self, host: &str) -> usize {
        let hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts
            .get(host)
            .map(|slots| self.per_host - slots.available_permits())
            .unwrap_or(0)
    }

    /// Returns the number of hosts currently tracked
    pub fn tracked_hosts(&self) -> usize {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Forgets hosts with no admitted or waiting downloads
    ///
    /// A host is idle when all its permits are available and nobody outside
    /// the map holds its semaphore. Acquirers clone the semaphore under the
    /// map lock, so the check cannot race with a new acquisition.
    pub fn prune_idle(&self) -> usize {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        let before = hosts.len();
        hosts.retain(|_, slots| {
            Arc::strong_count(slots) > 1 || slots.available_permits() < self.per_host
        });
        before - hosts.len()
    }
}
