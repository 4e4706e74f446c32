// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Launcher trait definitions.
//!
//! Defines the abstract interface for starting the real application once
//! the environment is in place.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::channel::{ChannelError, MessageChannel};
use crate::ready::ReadySignal;
use crate::resolver::LaunchTarget;

/// Errors from launcher operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LaunchError {
    /// The application process could not be started.
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },

    /// A standard stream of the child was not captured.
    #[error("child {0} was not piped")]
    MissingPipe(&'static str),

    /// The application's inbound queue was already claimed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for launcher operations.
pub type Result<T> = std::result::Result<T, LaunchError>;

/// How a launched application ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationExit {
    /// An in-process application returned normally.
    Returned,
    /// An in-process application returned an error or panicked.
    Failed(String),
    /// A child process exited. `None` when killed by a signal.
    Exited { code: Option<i32> },
}

impl fmt::Display for ApplicationExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationExit::Returned => write!(f, "application returned"),
            ApplicationExit::Failed(reason) => write!(f, "application failed: {}", reason),
            ApplicationExit::Exited { code: Some(code) } => {
                write!(f, "application exited with code {}", code)
            }
            ApplicationExit::Exited { code: None } => {
                write!(f, "application terminated by signal")
            }
        }
    }
}

/// Publishes the application's termination to whoever supervises the host.
#[derive(Debug, Clone)]
pub struct ExitNotifier {
    tx: Arc<watch::Sender<Option<ApplicationExit>>>,
}

impl Default for ExitNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ExitNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Record the exit. Only the first report is kept.
    pub fn report(&self, exit: ApplicationExit) {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                false
            } else {
                *slot = Some(exit);
                true
            }
        });
    }

    pub fn exit(&self) -> Option<ApplicationExit> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ApplicationExit>> {
        self.tx.subscribe()
    }
}

/// Everything a launcher wires the application into.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    /// Inbound is consumed by the application, outbound fed by it.
    pub channel: Arc<MessageChannel>,
    /// Set by the application once it is ready to receive.
    pub ready: ReadySignal,
    /// Reports when the application ends.
    pub exit: ExitNotifier,
}

/// Handle for a launched application.
#[derive(Debug, Clone)]
pub struct LaunchHandle {
    /// Unique identifier for this launch (PID for processes, task id otherwise)
    pub handle_id: String,
    /// When the application was started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// PID of the spawned child, if any.
    pub pid: Option<u32>,
}

/// Trait for application launchers.
///
/// A launcher starts the application and returns as soon as it is scheduled.
/// It never waits for readiness; the application sets the context's
/// [`ReadySignal`] itself.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launcher type identifier (e.g., "process", "in-process")
    fn launcher_type(&self) -> &'static str;

    /// Start the application described by `target`.
    async fn launch(&self, target: &LaunchTarget, context: LaunchContext) -> Result<LaunchHandle>;
}
