// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! fnhost - worker host for serverless functions
//!
//! The platform starts fnhost as a placeholder worker before it knows which
//! application the worker will run. fnhost completes the bootstrap handshake
//! on the application's behalf, then specializes exactly once: it applies the
//! environment carried by the first reload request, launches the real
//! application, and from the moment the application reports ready it routes
//! every message to it unchanged.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  QUIC duplex  ┌──────────────────────────────────────────┐
//! │  platform host   │◄─────────────►│ WorkerHost                                │
//! └──────────────────┘               │   │                                      │
//!                                    │   ▼                                      │
//!                                    │ MessageRouter ──► EnvironmentApplier     │
//!                                    │   │   │       ──► PathResolver           │
//!                                    │   │   │       ──► Launcher ──► application│
//!                                    │   ▼   ▼                                  │
//!                                    │ MessageChannel (inbound / outbound)      │
//!                                    └──────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fnhost::{MessageRouter, WorkerHost};
//! use fnhost::loader::ProcessLauncher;
//!
//! let router = MessageRouter::builder()
//!     .launcher(Arc::new(ProcessLauncher::default()))
//!     .build()?;
//! let (send, recv) = client.open_duplex().await?;
//! WorkerHost::new(router, "worker-1", "req-1").run(recv, send).await?;
//! ```

pub mod channel;
pub mod config;
pub mod environment;
pub mod error;
pub mod guest;
pub mod host;
pub mod loader;
pub mod message;
pub mod ready;
pub mod resolver;
pub mod router;

pub use channel::MessageChannel;
pub use error::{Error, Result};
pub use host::WorkerHost;
pub use ready::ReadySignal;
pub use router::{Disposition, MessageRouter, SpecializationState};
