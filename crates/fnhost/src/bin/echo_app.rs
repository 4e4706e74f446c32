// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Minimal function application for exercising the process launcher.
//!
//! - reload request: answered with a successful reload response
//! - invocation request: answered with an invocation response; the payload is
//!   echoed, except for function id `env`, where the payload names an
//!   environment variable and the reply carries its value
//! - anything else: written back unchanged

use fnhost::message::{self, WorkerInfo};
use fnhost_protocol::StreamingMessage;
use fnhost_protocol::worker_proto::streaming_message::Content;
use fnhost_protocol::worker_proto::{InvocationRequest, InvocationResponse};
use tracing::{debug, info};

fn invoke(request_id: &str, invocation: InvocationRequest) -> StreamingMessage {
    let payload = if invocation.function_id == "env" {
        let name = String::from_utf8_lossy(&invocation.payload).into_owned();
        std::env::var(name).unwrap_or_default().into_bytes()
    } else {
        invocation.payload
    };

    StreamingMessage {
        request_id: request_id.to_string(),
        content: Some(Content::InvocationResponse(InvocationResponse {
            invocation_id: invocation.invocation_id,
            payload,
            result: Some(message::success()),
        })),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fnhost_echo_app=info".into()),
        )
        .init();

    info!(cwd = ?std::env::current_dir().ok(), "Echo application starting");
    let info = WorkerInfo {
        runtime_name: "fnhost-echo-app".to_string(),
        ..Default::default()
    };

    fnhost::guest::serve_stdio(|incoming: StreamingMessage| {
        let info = info.clone();
        async move {
            debug!(kind = message::content_name(&incoming), "Received message");
            let request_id = incoming.request_id.clone();
            match incoming.content {
                Some(Content::FunctionEnvironmentReloadRequest(_)) => {
                    Some(message::reload_response(&request_id, &info))
                }
                Some(Content::InvocationRequest(invocation)) => Some(invoke(&request_id, invocation)),
                content => Some(StreamingMessage {
                    request_id,
                    content,
                }),
            }
        }
    })
    .await?;

    info!("Stdin closed, echo application exiting");
    Ok(())
}
