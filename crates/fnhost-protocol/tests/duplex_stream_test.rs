// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Loopback QUIC test: the worker opens the duplex stream and both sides exchange messages.

use std::net::SocketAddr;
use std::sync::Arc;

use fnhost_protocol::worker_proto::{StartStream, WorkerInitRequest, streaming_message::Content};
use fnhost_protocol::{FramedStream, HostClient, HostClientConfig, StreamingMessage};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

fn loopback_server() -> quinn::Endpoint {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der: CertificateDer<'static> = cert.cert.der().clone();
    let key_der: PrivateKeyDer<'static> =
        PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der()).into();

    let server_config = quinn::ServerConfig::with_single_cert(vec![cert_der], key_der).unwrap();
    quinn::Endpoint::server(server_config, SocketAddr::from(([127, 0, 0, 1], 0))).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplex_stream_exchanges_messages_in_order() {
    let server = loopback_server();
    let server_addr = server.local_addr().unwrap();

    let platform = tokio::spawn(async move {
        let incoming = server.accept().await.unwrap();
        let connection = incoming.await.unwrap();
        let (send, recv) = connection.accept_bi().await.unwrap();
        let mut send = FramedStream::new(send);
        let mut recv = FramedStream::new(recv);

        let start = recv.read_message().await.unwrap();

        let init = StreamingMessage {
            request_id: "init-1".to_string(),
            content: Some(Content::WorkerInitRequest(WorkerInitRequest {
                host_version: "4.1".to_string(),
                ..Default::default()
            })),
        };
        send.write_message(&init).await.unwrap();

        // Keep the connection open until the worker has read the reply
        let _ = recv.read_message().await;
        start
    });

    let client = HostClient::new(HostClientConfig {
        server_addr,
        dangerous_skip_cert_verification: true,
        connect_timeout_ms: 5_000,
        ..Default::default()
    })
    .unwrap();

    let (mut send, mut recv) = client.open_duplex().await.unwrap();
    assert!(client.is_connected().await);

    let start = StreamingMessage {
        request_id: "req-1".to_string(),
        content: Some(Content::StartStream(StartStream {
            worker_id: "worker-1".to_string(),
        })),
    };
    send.write_message(&start).await.unwrap();

    let reply = recv.read_message().await.unwrap();
    assert_eq!(reply.request_id, "init-1");
    assert!(matches!(reply.content, Some(Content::WorkerInitRequest(_))));

    send.into_inner().finish().unwrap();

    let received = platform.await.unwrap();
    assert_eq!(received, start);

    client.close().await;
    assert!(!client.is_connected().await);
}
