// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! fnhost Protocol - QUIC + Protobuf communication layer
//!
//! This crate provides the wire protocol spoken by the worker host:
//! - Worker host and the platform host (one duplex QUIC stream)
//! - Worker host and a launched application (the same frames over stdio)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    fnhost-protocol                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Messages: StreamingMessage (oneof content)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: Protobuf (prost), length-prefixed frames    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: QUIC (quinn) or any AsyncRead/AsyncWrite pair   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use fnhost_protocol::{HostClient, HostClientConfig, worker_proto};
//!
//! let client = HostClient::new(HostClientConfig::default())?;
//! let (mut send, mut recv) = client.open_duplex().await?;
//!
//! let start = worker_proto::StreamingMessage {
//!     request_id: "req-1".to_string(),
//!     content: Some(worker_proto::streaming_message::Content::StartStream(
//!         worker_proto::StartStream { worker_id: "worker-1".to_string() },
//!     )),
//! };
//! send.write_message(&start).await?;
//! let next = recv.read_message().await?;
//! ```

pub mod client;
pub mod frame;

// Re-export generated protobuf types for the worker protocol
pub mod worker_proto {
    include!(concat!(env!("OUT_DIR"), "/fnhost.worker.rs"));
}

// Re-export main types
pub use client::{ClientError, HostClient, HostClientConfig};
pub use frame::{Frame, FrameError, FramedStream, MessageType};
pub use worker_proto::StreamingMessage;
