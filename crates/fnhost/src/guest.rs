// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Helpers for applications launched by [`ProcessLauncher`](crate::loader::ProcessLauncher).
//!
//! A launched application reads frames on stdin and writes frames on stdout.
//! [`serve_stdio`] does the framing, announces readiness, and calls a handler
//! for each message; a returned message is written back.
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> Result<(), fnhost_protocol::FrameError> {
//!     fnhost::guest::serve_stdio(|message| async move { Some(message) }).await
//! }
//! ```
//!
//! The frame limit matches the host's: [`ProcessLauncher`](crate::loader::ProcessLauncher)
//! passes it in [`MAX_FRAME_SIZE_ENV`].

use std::future::Future;

use fnhost_protocol::frame::{MAX_FRAME_SIZE, MAX_WIRE_FRAME_SIZE};
use fnhost_protocol::{FrameError, FramedStream, StreamingMessage};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

use crate::message;

/// Environment variable carrying the host's max message length to a launched application.
pub const MAX_FRAME_SIZE_ENV: &str = "FNHOST_MAX_MESSAGE_LENGTH";

/// Serve on this process's stdin and stdout, with the limit from [`MAX_FRAME_SIZE_ENV`].
pub async fn serve_stdio<H, Fut>(handler: H) -> Result<(), FrameError>
where
    H: FnMut(StreamingMessage) -> Fut,
    Fut: Future<Output = Option<StreamingMessage>>,
{
    let limit = frame_limit(std::env::var(MAX_FRAME_SIZE_ENV).ok().as_deref());
    serve_stdio_with_limit(limit, handler).await
}

pub async fn serve_stdio_with_limit<H, Fut>(limit: usize, handler: H) -> Result<(), FrameError>
where
    H: FnMut(StreamingMessage) -> Fut,
    Fut: Future<Output = Option<StreamingMessage>>,
{
    serve_with_limit(tokio::io::stdin(), tokio::io::stdout(), limit, handler).await
}

/// Serve on an arbitrary reader/writer pair with the default frame limit.
pub async fn serve<R, W, H, Fut>(reader: R, writer: W, handler: H) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: FnMut(StreamingMessage) -> Fut,
    Fut: Future<Output = Option<StreamingMessage>>,
{
    serve_with_limit(reader, writer, MAX_FRAME_SIZE, handler).await
}

/// Serve on an arbitrary reader/writer pair.
///
/// Writes `ApplicationReady` first, then handles messages until the reader
/// reaches end of stream. Frames above `limit` bytes are rejected both ways.
pub async fn serve_with_limit<R, W, H, Fut>(
    reader: R,
    writer: W,
    limit: usize,
    mut handler: H,
) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: FnMut(StreamingMessage) -> Fut,
    Fut: Future<Output = Option<StreamingMessage>>,
{
    let mut reader = FramedStream::new(reader).with_max_frame_size(limit);
    let mut writer = FramedStream::new(writer).with_max_frame_size(limit);

    writer.write_message(&message::application_ready()).await?;

    loop {
        let incoming = match reader.read_message().await {
            Ok(incoming) => incoming,
            Err(FrameError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };
        if let Some(reply) = handler(incoming).await {
            writer.write_message(&reply).await?;
        }
    }
}

fn frame_limit(value: Option<&str>) -> usize {
    let Some(value) = value else {
        return MAX_FRAME_SIZE;
    };
    match value.trim().parse::<usize>() {
        Ok(limit) if limit > 0 => limit.min(MAX_WIRE_FRAME_SIZE),
        _ => {
            warn!(value, "Ignoring invalid {MAX_FRAME_SIZE_ENV}");
            MAX_FRAME_SIZE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnhost_protocol::worker_proto::streaming_message::Content;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_serve_announces_ready_then_replies() {
        let (host_writer, guest_reader) = duplex(4096);
        let (guest_writer, host_reader) = duplex(4096);

        let guest = tokio::spawn(serve(guest_reader, guest_writer, |m: StreamingMessage| async move {
            // Reply to everything except empty messages
            m.content.is_some().then_some(m)
        }));

        let mut to_guest = FramedStream::new(host_writer);
        let mut from_guest = FramedStream::new(host_reader);

        let ready = from_guest.read_message().await.unwrap();
        assert!(matches!(ready.content, Some(Content::ApplicationReady(_))));

        to_guest
            .write_message(&StreamingMessage::default())
            .await
            .unwrap();
        to_guest
            .write_message(&message::start_stream("req-1", "w"))
            .await
            .unwrap();

        let reply = from_guest.read_message().await.unwrap();
        assert_eq!(reply.request_id, "req-1");

        drop(to_guest);
        guest.await.unwrap().unwrap();
    }

    #[test]
    fn test_frame_limit_from_environment_value() {
        assert_eq!(frame_limit(None), MAX_FRAME_SIZE);
        assert_eq!(frame_limit(Some("1024")), 1024);
        assert_eq!(frame_limit(Some("0")), MAX_FRAME_SIZE);
        assert_eq!(frame_limit(Some("lots")), MAX_FRAME_SIZE);
        assert_eq!(frame_limit(Some("2147483647")), 2_147_483_647);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serve_accepts_frames_above_default_under_raised_limit() {
        use fnhost_protocol::worker_proto::{InvocationRequest, InvocationResponse};

        const LIMIT: usize = 128 * 1024 * 1024;
        let payload_len = MAX_FRAME_SIZE + 1024 * 1024;

        let (host_writer, guest_reader) = duplex(64 * 1024);
        let (guest_writer, host_reader) = duplex(64 * 1024);

        let guest = tokio::spawn(serve_with_limit(
            guest_reader,
            guest_writer,
            LIMIT,
            |m: StreamingMessage| async move {
                let Some(Content::InvocationRequest(inv)) = m.content else {
                    return None;
                };
                Some(StreamingMessage {
                    request_id: m.request_id,
                    content: Some(Content::InvocationResponse(InvocationResponse {
                        invocation_id: inv.invocation_id,
                        payload: inv.payload.len().to_string().into_bytes(),
                        result: Some(message::success()),
                    })),
                })
            },
        ));

        let mut to_guest = FramedStream::new(host_writer).with_max_frame_size(LIMIT);
        let mut from_guest = FramedStream::new(host_reader).with_max_frame_size(LIMIT);
        let _ready = from_guest.read_message().await.unwrap();

        let writer = tokio::spawn(async move {
            to_guest
                .write_message(&StreamingMessage {
                    request_id: "big".to_string(),
                    content: Some(Content::InvocationRequest(InvocationRequest {
                        invocation_id: "big".to_string(),
                        function_id: "echo".to_string(),
                        payload: vec![7u8; payload_len],
                    })),
                })
                .await
                .unwrap();
            to_guest
        });

        let reply = from_guest.read_message().await.unwrap();
        let Some(Content::InvocationResponse(response)) = reply.content else {
            panic!("expected invocation response");
        };
        assert_eq!(response.payload, payload_len.to_string().into_bytes());

        drop(writer.await.unwrap());
        guest.await.unwrap().unwrap();
    }
}
