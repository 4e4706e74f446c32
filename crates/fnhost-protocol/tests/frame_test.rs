// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Frame encoding/decoding tests for fnhost-protocol.

use bytes::{BufMut, BytesMut};
use fnhost_protocol::frame::{Frame, FrameError, HEADER_SIZE, MessageType};
use fnhost_protocol::worker_proto::{
    EnvironmentVariable, FunctionEnvironmentReloadRequest, streaming_message::Content,
};
use fnhost_protocol::{FramedStream, StreamingMessage};

fn reload_request() -> StreamingMessage {
    StreamingMessage {
        request_id: "reload-1".to_string(),
        content: Some(Content::FunctionEnvironmentReloadRequest(
            FunctionEnvironmentReloadRequest {
                environment_variables: vec![
                    EnvironmentVariable {
                        name: "B".to_string(),
                        value: "2".to_string(),
                    },
                    EnvironmentVariable {
                        name: "A".to_string(),
                        value: "1".to_string(),
                    },
                    EnvironmentVariable {
                        name: "B".to_string(),
                        value: "3".to_string(),
                    },
                ],
                function_app_directory: "/app".to_string(),
            },
        )),
    }
}

#[test]
fn test_reload_request_keeps_variable_order_through_frame() {
    let frame = Frame::stream_data(&reload_request()).unwrap();
    let decoded = Frame::decode_from_bytes(frame.encode()).unwrap();
    let message = decoded.into_message().unwrap();

    let Some(Content::FunctionEnvironmentReloadRequest(reload)) = message.content else {
        panic!("expected reload request");
    };
    let names: Vec<_> = reload
        .environment_variables
        .iter()
        .map(|v| (v.name.as_str(), v.value.as_str()))
        .collect();
    assert_eq!(names, vec![("B", "2"), ("A", "1"), ("B", "3")]);
}

#[test]
fn test_empty_message_encodes_to_header_only() {
    let frame = Frame::stream_data(&StreamingMessage::default()).unwrap();
    assert_eq!(frame.encode().len(), HEADER_SIZE);
}

#[test]
fn test_decode_from_bytes_ignores_trailing_data() {
    let mut bytes = BytesMut::new();
    bytes.put_u32(0);
    bytes.put_u16(MessageType::StreamData as u16);
    bytes.put(&[99, 99][..]);

    let frame = Frame::decode_from_bytes(bytes.freeze()).unwrap();
    assert_eq!(frame.message_type, MessageType::StreamData);
    assert_eq!(frame.into_message().unwrap(), StreamingMessage::default());
}

#[tokio::test]
async fn test_framed_stream_write_respects_configured_limit() {
    let (writer, _reader) = tokio::io::duplex(1024);
    let mut writer = FramedStream::new(writer).with_max_frame_size(8);

    let result = writer.write_message(&reload_request()).await;
    assert!(matches!(result, Err(FrameError::FrameTooLarge { limit: 8, .. })));
}

#[tokio::test]
async fn test_eof_at_header_boundary_is_connection_closed() {
    let (writer, reader) = tokio::io::duplex(1024);
    drop(writer);
    let mut reader = FramedStream::new(reader);

    let result = reader.read_message().await;
    assert!(matches!(result, Err(FrameError::ConnectionClosed)));
}

#[tokio::test]
async fn test_truncated_header_is_io_error() {
    use tokio::io::AsyncWriteExt;

    let (mut writer, reader) = tokio::io::duplex(1024);
    writer.write_all(&[0, 0, 0]).await.unwrap();
    drop(writer);
    let mut reader = FramedStream::new(reader);

    let result = reader.read_message().await;
    assert!(matches!(
        result,
        Err(FrameError::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof
    ));
}

#[tokio::test]
async fn test_header_split_across_writes_is_reassembled() {
    use tokio::io::AsyncWriteExt;

    let encoded = Frame::stream_data(&reload_request()).unwrap().encode();
    let (mut writer, reader) = tokio::io::duplex(64 * 1024);
    let mut reader = FramedStream::new(reader);

    let read = tokio::spawn(async move { reader.read_message().await });
    writer.write_all(&encoded[..2]).await.unwrap();
    writer.flush().await.unwrap();
    tokio::task::yield_now().await;
    writer.write_all(&encoded[2..]).await.unwrap();

    let message = read.await.unwrap().unwrap();
    assert_eq!(message, reload_request());
}
