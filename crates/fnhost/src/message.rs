// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message classification and the host's synthesized responses.

use std::collections::HashMap;

use fnhost_protocol::StreamingMessage;
use fnhost_protocol::worker_proto::{
    ApplicationReady, FunctionEnvironmentReloadRequest, FunctionEnvironmentReloadResponse,
    FunctionMetadataResponse, StartStream, StatusResult, WorkerInitResponse, WorkerMetadata,
    status_result::Status, streaming_message::Content,
};

/// Routing category of an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    WorkerInit,
    FunctionsMetadata,
    EnvironmentReload,
    Other,
}

impl MessageKind {
    /// Whether the router answers this kind itself before specialization.
    pub fn is_bootstrap(self) -> bool {
        matches!(self, MessageKind::WorkerInit | MessageKind::FunctionsMetadata)
    }
}

/// The reload request carried by `message`, if it is one.
pub fn reload_request(message: &StreamingMessage) -> Option<&FunctionEnvironmentReloadRequest> {
    match &message.content {
        Some(Content::FunctionEnvironmentReloadRequest(reload)) => Some(reload),
        _ => None,
    }
}

pub fn classify(message: &StreamingMessage) -> MessageKind {
    match &message.content {
        Some(Content::WorkerInitRequest(_)) => MessageKind::WorkerInit,
        Some(Content::FunctionsMetadataRequest(_)) => MessageKind::FunctionsMetadata,
        Some(Content::FunctionEnvironmentReloadRequest(_)) => MessageKind::EnvironmentReload,
        _ => MessageKind::Other,
    }
}

/// Short name of the content variant, for logs.
pub fn content_name(message: &StreamingMessage) -> &'static str {
    match &message.content {
        None => "empty",
        Some(Content::StartStream(_)) => "start_stream",
        Some(Content::WorkerInitRequest(_)) => "worker_init_request",
        Some(Content::WorkerInitResponse(_)) => "worker_init_response",
        Some(Content::FunctionsMetadataRequest(_)) => "functions_metadata_request",
        Some(Content::FunctionMetadataResponse(_)) => "function_metadata_response",
        Some(Content::FunctionEnvironmentReloadRequest(_)) => "function_environment_reload_request",
        Some(Content::FunctionEnvironmentReloadResponse(_)) => {
            "function_environment_reload_response"
        }
        Some(Content::InvocationRequest(_)) => "invocation_request",
        Some(Content::InvocationResponse(_)) => "invocation_response",
        Some(Content::ApplicationReady(_)) => "application_ready",
    }
}

/// Identity reported in synthesized responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub worker_version: String,
    pub runtime_name: String,
    pub runtime_version: String,
}

impl Default for WorkerInfo {
    fn default() -> Self {
        Self {
            worker_version: env!("CARGO_PKG_VERSION").to_string(),
            runtime_name: "fnhost".to_string(),
            runtime_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl WorkerInfo {
    fn metadata(&self) -> WorkerMetadata {
        WorkerMetadata {
            runtime_name: self.runtime_name.clone(),
            runtime_version: self.runtime_version.clone(),
            worker_version: self.worker_version.clone(),
            worker_bitness: std::env::consts::ARCH.to_string(),
        }
    }
}

pub fn success() -> StatusResult {
    let mut status = StatusResult::default();
    status.set_status(Status::Success);
    status
}

fn wrap(request_id: &str, content: Content) -> StreamingMessage {
    StreamingMessage {
        request_id: request_id.to_string(),
        content: Some(content),
    }
}

pub fn start_stream(request_id: &str, worker_id: &str) -> StreamingMessage {
    wrap(
        request_id,
        Content::StartStream(StartStream {
            worker_id: worker_id.to_string(),
        }),
    )
}

/// Successful worker-init response, correlated by `request_id`.
pub fn init_response(request_id: &str, info: &WorkerInfo) -> StreamingMessage {
    wrap(
        request_id,
        Content::WorkerInitResponse(WorkerInitResponse {
            worker_version: info.worker_version.clone(),
            capabilities: HashMap::new(),
            result: Some(success()),
            worker_metadata: Some(info.metadata()),
        }),
    )
}

/// Successful metadata response asking the platform to index functions itself.
pub fn metadata_response(request_id: &str) -> StreamingMessage {
    wrap(
        request_id,
        Content::FunctionMetadataResponse(FunctionMetadataResponse {
            function_metadata_results: Vec::new(),
            result: Some(success()),
            use_default_metadata_indexing: true,
        }),
    )
}

pub fn reload_response(request_id: &str, info: &WorkerInfo) -> StreamingMessage {
    wrap(
        request_id,
        Content::FunctionEnvironmentReloadResponse(FunctionEnvironmentReloadResponse {
            worker_metadata: Some(info.metadata()),
            capabilities: HashMap::new(),
            result: Some(success()),
        }),
    )
}

pub fn application_ready() -> StreamingMessage {
    wrap("", Content::ApplicationReady(ApplicationReady {}))
}

/// The host's own answer to a bootstrap message, or `None` for anything else.
pub fn bootstrap_response(message: &StreamingMessage, info: &WorkerInfo) -> Option<StreamingMessage> {
    match classify(message) {
        MessageKind::WorkerInit => Some(init_response(&message.request_id, info)),
        MessageKind::FunctionsMetadata => Some(metadata_response(&message.request_id)),
        _ => None,
    }
}
