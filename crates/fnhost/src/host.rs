// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The worker host loop over one duplex stream.
//!
//! ```text
//!   stream reader ──► pump_inbound ──► MessageRouter::dispatch
//!   stream writer ◄── drain_outbound ◄── outbound queue
//! ```
//!
//! The first frame written is always `StartStream`. The loop ends when the
//! platform closes the stream, when either half fails, or when the
//! application dies after it became ready.

use std::sync::Arc;
use std::time::Duration;

use fnhost_protocol::{FrameError, FramedStream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use crate::channel::Consumer;
use crate::error::{Error, Result};
use crate::message;
use crate::router::MessageRouter;

/// Upper bound on the final outbound flush when the host stops.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects a [`MessageRouter`] to the platform host's duplex stream.
pub struct WorkerHost {
    router: Arc<MessageRouter>,
    worker_id: String,
    request_id: String,
}

impl WorkerHost {
    pub fn new(
        router: Arc<MessageRouter>,
        worker_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            router,
            worker_id: worker_id.into(),
            request_id: request_id.into(),
        }
    }

    /// Run until the stream closes or the host has to stop.
    ///
    /// Returns `Ok(())` when the platform closed the stream cleanly.
    #[instrument(skip_all, fields(worker_id = %self.worker_id))]
    pub async fn run<R, W>(&self, reader: FramedStream<R>, mut writer: FramedStream<W>) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let outbound = self.router.channel().take_outbound()?;

        writer
            .write_message(&message::start_stream(&self.request_id, &self.worker_id))
            .await?;
        info!(request_id = %self.request_id, "Stream started");

        let (stop_drain, stop) = oneshot::channel();
        let mut drain = tokio::spawn(drain_outbound(writer, outbound, stop));
        let mut drain_done = false;
        let mut pump = tokio::spawn(pump_inbound(reader, Arc::clone(&self.router)));
        let mut exits = self.router.exit_notifier().subscribe();
        let mut watching_exit = true;

        let outcome = loop {
            tokio::select! {
                result = &mut pump => break result.map_err(Error::from).and_then(|r| r),
                result = &mut drain => {
                    drain_done = true;
                    break match result {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(e.into()),
                        Err(e) => Err(e.into()),
                    };
                }
                changed = exits.changed(), if watching_exit => {
                    if changed.is_err() {
                        watching_exit = false;
                        continue;
                    }
                    let Some(exit) = exits.borrow_and_update().clone() else {
                        continue;
                    };
                    if self.router.ready().is_set() {
                        error!(%exit, "Application terminated");
                        break Err(Error::ApplicationTerminated(exit));
                    }
                    warn!(%exit, "Application terminated before reporting ready, specialization cannot complete");
                    watching_exit = false;
                }
            }
        };

        pump.abort();
        if !drain_done {
            // Flush what is already queued before giving up the stream
            let _ = stop_drain.send(());
            match tokio::time::timeout(FLUSH_TIMEOUT, &mut drain).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => debug!(error = %e, "Final outbound flush failed"),
                Ok(Err(e)) => debug!(error = %e, "Outbound drain ended abnormally"),
                Err(_) => {
                    warn!("Timed out flushing outbound messages");
                    drain.abort();
                }
            }
        }
        outcome
    }
}

async fn pump_inbound<R>(mut reader: FramedStream<R>, router: Arc<MessageRouter>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let message = match reader.read_message().await {
            Ok(message) => message,
            Err(FrameError::ConnectionClosed) => {
                info!("Platform host closed the stream");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let disposition = router.dispatch(message).await?;
        debug!(?disposition, "Message routed");
    }
}

async fn drain_outbound<W>(
    mut writer: FramedStream<W>,
    mut outbound: Consumer,
    mut stop: oneshot::Receiver<()>,
) -> std::result::Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => {
                while let Some(message) = outbound.try_next() {
                    writer.write_message(&message).await?;
                }
                return Ok(());
            }
            next = outbound.next() => {
                let Some(message) = next else {
                    return Ok(());
                };
                writer.write_message(&message).await?;
                debug!(
                    request_id = %message.request_id,
                    kind = message::content_name(&message),
                    "Message sent"
                );
            }
        }
    }
}
