// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The two ordered hand-off queues between the router, the application and the transport.
//!
//! ```text
//!   transport ──► router ──► inbound  ──► application
//!   transport ◄── drain  ◄── outbound ◄── application / router
//! ```
//!
//! Both queues are unbounded and FIFO. Each has exactly one consumer, taken
//! once with [`MessageChannel::take_inbound`] / [`MessageChannel::take_outbound`].
//! The channel keeps its own senders, so a consumer never sees the queue end
//! while the channel is alive.

use std::fmt;
use std::sync::Mutex;

use fnhost_protocol::StreamingMessage;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Which of the two queues an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to application.
    Inbound,
    /// Application or router to host.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Channel errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The consumer of the queue was dropped.
    #[error("{0} queue consumer is gone")]
    ConsumerGone(Direction),

    /// The single consumer of the queue was already handed out.
    #[error("{0} queue consumer already taken")]
    AlreadyTaken(Direction),
}

/// Process-wide bridge holding the inbound and outbound queues.
#[derive(Debug)]
pub struct MessageChannel {
    inbound_tx: UnboundedSender<StreamingMessage>,
    outbound_tx: UnboundedSender<StreamingMessage>,
    inbound_rx: Mutex<Option<UnboundedReceiver<StreamingMessage>>>,
    outbound_rx: Mutex<Option<UnboundedReceiver<StreamingMessage>>>,
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageChannel {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            outbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_rx: Mutex::new(Some(outbound_rx)),
        }
    }

    /// Append a message for the application. Never blocks.
    pub fn enqueue_inbound(&self, message: StreamingMessage) -> Result<(), ChannelError> {
        self.inbound_tx
            .send(message)
            .map_err(|_| ChannelError::ConsumerGone(Direction::Inbound))
    }

    /// Append a message for the platform host. Never blocks.
    pub fn enqueue_outbound(&self, message: StreamingMessage) -> Result<(), ChannelError> {
        self.outbound_tx
            .send(message)
            .map_err(|_| ChannelError::ConsumerGone(Direction::Outbound))
    }

    /// Hand out the single inbound consumer (the application).
    pub fn take_inbound(&self) -> Result<Consumer, ChannelError> {
        Self::take(&self.inbound_rx, Direction::Inbound)
    }

    /// Hand out the single outbound consumer (the transport drain).
    pub fn take_outbound(&self) -> Result<Consumer, ChannelError> {
        Self::take(&self.outbound_rx, Direction::Outbound)
    }

    fn take(
        slot: &Mutex<Option<UnboundedReceiver<StreamingMessage>>>,
        direction: Direction,
    ) -> Result<Consumer, ChannelError> {
        let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.take()
            .map(|rx| Consumer { rx })
            .ok_or(ChannelError::AlreadyTaken(direction))
    }
}

/// The single consumer side of one queue.
#[derive(Debug)]
pub struct Consumer {
    rx: UnboundedReceiver<StreamingMessage>,
}

impl Consumer {
    /// Suspend until the next message is available, in FIFO order.
    ///
    /// Returns `None` only once every sender, including the channel's own, is gone.
    pub async fn next(&mut self) -> Option<StreamingMessage> {
        self.rx.recv().await
    }

    /// Take the next message if one is already queued.
    pub fn try_next(&mut self) -> Option<StreamingMessage> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn message(id: &str) -> StreamingMessage {
        StreamingMessage {
            request_id: id.to_string(),
            content: None,
        }
    }

    #[tokio::test]
    async fn test_queues_are_fifo_and_independent() {
        let channel = MessageChannel::new();
        channel.enqueue_inbound(message("in-1")).unwrap();
        channel.enqueue_outbound(message("out-1")).unwrap();
        channel.enqueue_inbound(message("in-2")).unwrap();

        let mut inbound = channel.take_inbound().unwrap();
        let mut outbound = channel.take_outbound().unwrap();

        assert_eq!(inbound.next().await.unwrap().request_id, "in-1");
        assert_eq!(inbound.next().await.unwrap().request_id, "in-2");
        assert_eq!(outbound.next().await.unwrap().request_id, "out-1");
        assert!(inbound.try_next().is_none());
    }

    #[test]
    fn test_consumer_can_only_be_taken_once() {
        let channel = MessageChannel::new();
        let _inbound = channel.take_inbound().unwrap();
        assert_eq!(
            channel.take_inbound().unwrap_err(),
            ChannelError::AlreadyTaken(Direction::Inbound)
        );
        assert!(channel.take_outbound().is_ok());
    }

    #[test]
    fn test_enqueue_after_consumer_dropped() {
        let channel = MessageChannel::new();
        drop(channel.take_outbound().unwrap());
        assert_eq!(
            channel.enqueue_outbound(message("late")).unwrap_err(),
            ChannelError::ConsumerGone(Direction::Outbound)
        );
    }

    #[tokio::test]
    async fn test_consumer_suspends_until_message_arrives() {
        let channel = Arc::new(MessageChannel::new());
        let mut inbound = channel.take_inbound().unwrap();

        let producer = {
            let channel = channel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                channel.enqueue_inbound(message("delayed")).unwrap();
            })
        };

        assert_eq!(inbound.next().await.unwrap().request_id, "delayed");
        producer.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_keep_per_producer_order() {
        let channel = Arc::new(MessageChannel::new());
        let mut outbound = channel.take_outbound().unwrap();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let channel = channel.clone();
                tokio::spawn(async move {
                    for i in 0..100 {
                        channel
                            .enqueue_outbound(message(&format!("{}:{}", p, i)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        let mut last_seen = [-1i64; 4];
        for _ in 0..400 {
            let id = outbound.next().await.unwrap().request_id;
            let (p, i) = id.split_once(':').unwrap();
            let (p, i): (usize, i64) = (p.parse().unwrap(), i.parse().unwrap());
            assert!(i > last_seen[p], "producer {} reordered", p);
            last_seen[p] = i;
        }
        assert_eq!(last_seen, [99; 4]);
    }
}
