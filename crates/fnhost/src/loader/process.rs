// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Launches the application as a child process speaking frames over stdio.
//!
//! The child inherits the host environment (including the overrides applied
//! at specialization) and runs in its application directory. Its stderr goes
//! straight to the host's stderr. On stdout it must first write an
//! `ApplicationReady` frame; every later stdout frame is forwarded to the
//! platform host unchanged.

use std::process::Stdio;

use async_trait::async_trait;
use fnhost_protocol::frame::MAX_FRAME_SIZE;
use fnhost_protocol::worker_proto::streaming_message::Content;
use fnhost_protocol::{FrameError, FramedStream};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, error, info, warn};

use super::traits::{
    ApplicationExit, LaunchContext, LaunchError, LaunchHandle, Launcher, Result,
};
use crate::channel::Consumer;
use crate::guest::MAX_FRAME_SIZE_ENV;
use crate::resolver::LaunchTarget;

/// Configuration for [`ProcessLauncher`].
#[derive(Debug, Clone)]
pub struct ProcessLauncherConfig {
    /// Largest frame exchanged with the child.
    pub max_frame_size: usize,
}

impl Default for ProcessLauncherConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Launcher that spawns the application executable.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    config: ProcessLauncherConfig,
}

impl ProcessLauncher {
    pub fn new(config: ProcessLauncherConfig) -> Self {
        Self { config }
    }

    fn command(&self, target: &LaunchTarget) -> Command {
        let mut cmd = Command::new(&target.program);
        cmd.args(&target.arguments)
            .current_dir(&target.working_dir)
            .env(MAX_FRAME_SIZE_ENV, self.config.max_frame_size.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    fn launcher_type(&self) -> &'static str {
        "process"
    }

    async fn launch(&self, target: &LaunchTarget, context: LaunchContext) -> Result<LaunchHandle> {
        let inbound = context.channel.take_inbound()?;

        let mut child =
            self.command(target)
                .spawn()
                .map_err(|source| LaunchError::SpawnFailed {
                    program: target.program.display().to_string(),
                    source,
                })?;

        let pid = child.id();
        let stdin = child.stdin.take().ok_or(LaunchError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(LaunchError::MissingPipe("stdout"))?;

        info!(
            pid = ?pid,
            program = %target.program.display(),
            "Application process started"
        );

        tokio::spawn(supervise(
            child,
            stdin,
            stdout,
            inbound,
            context,
            self.config.max_frame_size,
        ));

        Ok(LaunchHandle {
            handle_id: pid.map(|p| p.to_string()).unwrap_or_default(),
            started_at: chrono::Utc::now(),
            pid,
        })
    }
}

/// Bridge the child's stdio to the channel until it exits, then report the exit.
async fn supervise(
    mut child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    inbound: Consumer,
    context: LaunchContext,
    max_frame_size: usize,
) {
    let reader = FramedStream::new(stdout).with_max_frame_size(max_frame_size);
    let writer = FramedStream::new(stdin).with_max_frame_size(max_frame_size);

    let stdout_pump = tokio::spawn(pump_stdout(reader, context.clone()));
    let stdin_pump = tokio::spawn(pump_stdin(writer, inbound, context.clone()));

    let exit = match child.wait().await {
        Ok(status) => ApplicationExit::Exited {
            code: status.code(),
        },
        Err(e) => {
            error!(error = %e, "Failed to wait for application process");
            ApplicationExit::Failed(e.to_string())
        }
    };

    stdin_pump.abort();
    // Drain whatever the child wrote before exiting
    if let Err(e) = stdout_pump.await {
        debug!(error = %e, "stdout pump ended abnormally");
    }

    warn!(%exit, "Application process ended");
    context.exit.report(exit);
}

async fn pump_stdout(mut reader: FramedStream<ChildStdout>, context: LaunchContext) {
    loop {
        let message = match reader.read_message().await {
            Ok(message) => message,
            Err(FrameError::ConnectionClosed) => {
                debug!("Application closed stdout");
                return;
            }
            Err(e) => {
                error!(error = %e, "Invalid frame from application");
                return;
            }
        };

        if let Some(Content::ApplicationReady(_)) = message.content {
            if context.ready.signal() {
                info!("Application reported ready");
            } else {
                debug!("Ignoring repeated ApplicationReady");
            }
            continue;
        }

        if !context.ready.is_set() {
            warn!("Application wrote a message before ApplicationReady");
        }
        if let Err(e) = context.channel.enqueue_outbound(message) {
            error!(error = %e, "Dropping application output");
            return;
        }
    }
}

async fn pump_stdin(
    mut writer: FramedStream<ChildStdin>,
    mut inbound: Consumer,
    context: LaunchContext,
) {
    context.ready.wait().await;
    while let Some(message) = inbound.next().await {
        if let Err(e) = writer.write_message(&message).await {
            error!(error = %e, "Failed to write to application stdin");
            return;
        }
    }
}
