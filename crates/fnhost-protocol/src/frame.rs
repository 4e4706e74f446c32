// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire format for stream framing.
//!
//! The duplex stream to the platform host, and the stdio pipes of a launched
//! application, carry a sequence of frames:
//! - 4 bytes: message length (big-endian)
//! - 2 bytes: message type
//! - N bytes: protobuf payload

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::worker_proto::StreamingMessage;

/// Default maximum frame size (64 MB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Largest payload the 4-byte length prefix can describe.
pub const MAX_WIRE_FRAME_SIZE: usize = u32::MAX as usize;

/// Frame header size (4 bytes length + 2 bytes type)
pub const HEADER_SIZE: usize = 6;

/// Message types for the wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    /// Request message
    Request = 1,
    /// Response message
    Response = 2,
    /// Start of a streaming response
    StreamStart = 3,
    /// One message on a long-lived duplex stream
    StreamData = 4,
    /// End of a streaming response
    StreamEnd = 5,
    /// Error response
    Error = 6,
}

impl TryFrom<u16> for MessageType {
    type Error = FrameError;

    fn try_from(value: u16) -> Result<Self, <Self as TryFrom<u16>>::Error> {
        match value {
            1 => Ok(MessageType::Request),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::StreamStart),
            4 => Ok(MessageType::StreamData),
            5 => Ok(MessageType::StreamEnd),
            6 => Ok(MessageType::Error),
            _ => Err(FrameError::InvalidMessageType(value)),
        }
    }
}

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {size} bytes (max: {limit})")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("invalid message type: {0}")]
    InvalidMessageType(u16),

    #[error("unexpected message type: {0:?}")]
    UnexpectedMessageType(MessageType),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("connection closed")]
    ConnectionClosed,
}

/// A framed message with type and payload
#[derive(Debug, Clone)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Bytes,
}

impl Frame {
    /// Create a stream data frame carrying one streaming message
    pub fn stream_data<M: Message>(msg: &M) -> Result<Self, FrameError> {
        Self::new(MessageType::StreamData, msg)
    }

    /// Create a new frame with the given type and message
    pub fn new<M: Message>(message_type: MessageType, msg: &M) -> Result<Self, FrameError> {
        Self::with_limit(message_type, msg, MAX_FRAME_SIZE)
    }

    /// Create a new frame, rejecting payloads above `limit` bytes
    pub fn with_limit<M: Message>(
        message_type: MessageType,
        msg: &M,
        limit: usize,
    ) -> Result<Self, FrameError> {
        let limit = limit.min(MAX_WIRE_FRAME_SIZE);
        let payload = msg.encode_to_vec();
        if payload.len() > limit {
            return Err(FrameError::FrameTooLarge {
                size: payload.len(),
                limit,
            });
        }
        Ok(Self {
            message_type,
            payload: Bytes::from(payload),
        })
    }

    /// Decode the payload as a protobuf message
    pub fn decode<M: Message + Default>(&self) -> Result<M, FrameError> {
        Ok(M::decode(self.payload.clone())?)
    }

    /// Decode the payload as a streaming message, requiring a `StreamData` frame
    pub fn into_message(self) -> Result<StreamingMessage, FrameError> {
        match self.message_type {
            MessageType::StreamData => self.decode(),
            other => Err(FrameError::UnexpectedMessageType(other)),
        }
    }

    /// Encode the frame to bytes for wire transmission
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u32(self.payload.len() as u32);
        buf.put_u16(self.message_type as u16);
        buf.put(self.payload.clone());
        buf.freeze()
    }

    /// Decode a frame from bytes
    pub fn decode_from_bytes(mut bytes: Bytes) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete frame header",
            )));
        }

        let length = bytes.get_u32() as usize;
        let message_type = MessageType::try_from(bytes.get_u16())?;

        if length > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge {
                size: length,
                limit: MAX_FRAME_SIZE,
            });
        }

        if bytes.len() < length {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete frame payload",
            )));
        }

        let payload = bytes.split_to(length);
        Ok(Self {
            message_type,
            payload,
        })
    }
}

/// Write a frame to an async writer
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), FrameError> {
    let encoded = frame.encode();
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a frame from an async reader
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, FrameError> {
    read_frame_with_limit(reader, MAX_FRAME_SIZE).await
}

/// Read a frame from an async reader, rejecting payloads above `limit` bytes
pub async fn read_frame_with_limit<R: AsyncRead + Unpin>(
    reader: &mut R,
    limit: usize,
) -> Result<Frame, FrameError> {
    // Read header; only EOF before its first byte is a clean close
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(FrameError::ConnectionClosed);
            }
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete frame header",
            )));
        }
        filled += n;
    }

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let message_type = MessageType::try_from(u16::from_be_bytes([header[4], header[5]]))?;

    if length > limit {
        return Err(FrameError::FrameTooLarge {
            size: length,
            limit,
        });
    }

    // Read payload
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(Frame {
        message_type,
        payload: Bytes::from(payload),
    })
}

/// Framed codec for encoding/decoding frames on one half of a stream
pub struct FramedStream<S> {
    stream: S,
    max_frame_size: usize,
}

impl<S> FramedStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Override the maximum accepted frame size
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + Unpin> FramedStream<S> {
    /// Read the next frame from the stream
    pub async fn read_frame(&mut self) -> Result<Frame, FrameError> {
        read_frame_with_limit(&mut self.stream, self.max_frame_size).await
    }

    /// Read the next streaming message
    pub async fn read_message(&mut self) -> Result<StreamingMessage, FrameError> {
        self.read_frame().await?.into_message()
    }
}

impl<S: AsyncWrite + Unpin> FramedStream<S> {
    /// Write a frame to the stream
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), FrameError> {
        write_frame(&mut self.stream, frame).await
    }

    /// Write one streaming message as a `StreamData` frame
    pub async fn write_message(&mut self, message: &StreamingMessage) -> Result<(), FrameError> {
        let frame = Frame::with_limit(MessageType::StreamData, message, self.max_frame_size)?;
        self.write_frame(&frame).await
    }
}
