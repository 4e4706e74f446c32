// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! One-shot readiness signal between the launched application and the router.

use std::sync::Arc;

use tokio::sync::watch;

/// Set once by the application when its inbound loop is live.
///
/// Clones share the same state. Once set, every current and future
/// [`wait`](Self::wait) returns immediately; the signal cannot be reset.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadySignal {
    /// Create an unset signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the signal. Returns `true` only for the call that performed the set.
    pub fn signal(&self) -> bool {
        self.tx.send_if_modified(|set| {
            if *set {
                false
            } else {
                *set = true;
                true
            }
        })
    }

    /// Whether the signal has been set.
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Suspend until the signal is set. Never returns if it never is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel
        let _ = rx.wait_for(|set| *set).await;
    }
}
