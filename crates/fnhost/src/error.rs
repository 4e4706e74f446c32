// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for fnhost.

use fnhost_protocol::{ClientError, FrameError};
use thiserror::Error;

use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::loader::ApplicationExit;
use crate::router::RouterError;

/// Result type for worker host operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end the worker host.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection to the platform host failed.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// The duplex stream carried an invalid frame or failed.
    #[error("Stream error: {0}")]
    Frame(#[from] FrameError),

    /// Routing failed.
    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    /// A queue was used after its consumer went away.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The application ended after it had become ready.
    #[error("Application terminated: {0}")]
    ApplicationTerminated(ApplicationExit),

    /// A host task panicked or was cancelled.
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}
