// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC client for connecting the worker host to the platform host.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{ClientConfig, Connection, Endpoint, RecvStream, SendStream, TransportConfig};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::frame::{FrameError, FramedStream, MAX_FRAME_SIZE};

/// Errors that can occur in the QUIC client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("connect error: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("no connection established")]
    NotConnected,

    #[error("connection timed out after {0}ms")]
    Timeout(u64),
}

/// Configuration for the QUIC client
#[derive(Debug, Clone)]
pub struct HostClientConfig {
    /// Platform host address to connect to
    pub server_addr: SocketAddr,
    /// Server name for TLS verification (use "localhost" for local dev)
    pub server_name: String,
    /// Skip certificate verification (for development only!)
    pub dangerous_skip_cert_verification: bool,
    /// Keep-alive interval in milliseconds (0 to disable)
    pub keep_alive_interval_ms: u64,
    /// Idle timeout in milliseconds
    pub idle_timeout_ms: u64,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Largest frame accepted or sent on the duplex stream
    pub max_frame_size: usize,
}

impl Default for HostClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 7071)),
            server_name: "localhost".to_string(),
            dangerous_skip_cert_verification: false,
            keep_alive_interval_ms: 10_000,
            // Workers sit idle between invocations for long stretches
            idle_timeout_ms: 600_000,
            connect_timeout_ms: 10_000,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// QUIC client holding the single connection to the platform host
pub struct HostClient {
    endpoint: Endpoint,
    connection: Mutex<Option<Connection>>,
    config: HostClientConfig,
}

impl HostClient {
    /// Create a new client with the given configuration
    pub fn new(config: HostClientConfig) -> Result<Self, ClientError> {
        let bind_addr = if config.server_addr.is_ipv6() {
            SocketAddr::from(([0u16; 8], 0))
        } else {
            SocketAddr::from(([0, 0, 0, 0], 0))
        };
        let mut endpoint = Endpoint::client(bind_addr)?;

        let client_config = Self::build_client_config(&config)?;
        endpoint.set_default_client_config(client_config);

        Ok(Self {
            endpoint,
            connection: Mutex::new(None),
            config,
        })
    }

    fn build_client_config(config: &HostClientConfig) -> Result<ClientConfig, ClientError> {
        let crypto = if config.dangerous_skip_cert_verification {
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
                .with_no_client_auth()
        } else {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        };

        let mut transport = TransportConfig::default();
        if config.keep_alive_interval_ms > 0 {
            transport.keep_alive_interval(Some(Duration::from_millis(
                config.keep_alive_interval_ms,
            )));
        }
        let idle_timeout = Duration::from_millis(config.idle_timeout_ms)
            .try_into()
            .map_err(|e| ClientError::InvalidConfig(format!("idle timeout: {}", e)))?;
        transport.max_idle_timeout(Some(idle_timeout));

        let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| ClientError::Tls(e.to_string()))?;
        let mut client_config = ClientConfig::new(Arc::new(quic_crypto));
        client_config.transport_config(Arc::new(transport));

        Ok(client_config)
    }

    /// Connect to the platform host
    #[instrument(skip(self), fields(addr = %self.config.server_addr))]
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut conn_guard = self.connection.lock().await;

        if let Some(ref conn) = *conn_guard
            && conn.close_reason().is_none()
        {
            debug!("reusing existing connection");
            return Ok(());
        }

        info!("connecting to platform host");

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let connecting = self
            .endpoint
            .connect(self.config.server_addr, &self.config.server_name)?;

        let connection = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| ClientError::Timeout(self.config.connect_timeout_ms))??;

        info!("connected to platform host");
        *conn_guard = Some(connection);
        Ok(())
    }

    /// Get the current connection, connecting if necessary
    async fn get_connection(&self) -> Result<Connection, ClientError> {
        self.connect().await?;
        let conn_guard = self.connection.lock().await;
        conn_guard.clone().ok_or(ClientError::NotConnected)
    }

    /// Open the duplex message stream.
    ///
    /// Returns the outbound (send) and inbound (receive) halves, each framed
    /// with the configured maximum frame size.
    pub async fn open_duplex(
        &self,
    ) -> Result<(FramedStream<SendStream>, FramedStream<RecvStream>), ClientError> {
        let conn = self.get_connection().await?;
        let (send, recv) = conn.open_bi().await?;
        let max = self.config.max_frame_size;
        Ok((
            FramedStream::new(send).with_max_frame_size(max),
            FramedStream::new(recv).with_max_frame_size(max),
        ))
    }

    /// Close the connection gracefully
    pub async fn close(&self) {
        let mut conn_guard = self.connection.lock().await;
        if let Some(conn) = conn_guard.take() {
            conn.close(0u32.into(), b"worker closing");
        }
    }

    /// Check if the client is currently connected
    pub async fn is_connected(&self) -> bool {
        let conn_guard = self.connection.lock().await;
        if let Some(ref conn) = *conn_guard {
            conn.close_reason().is_none()
        } else {
            false
        }
    }
}

impl Drop for HostClient {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.connection.try_lock()
            && let Some(conn) = guard.take()
        {
            conn.close(0u32.into(), b"worker dropped");
        }
    }
}

/// Certificate verifier that skips all verification (for development only!)
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> HostClientConfig {
        HostClientConfig {
            dangerous_skip_cert_verification: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = HostClientConfig::default();
        assert_eq!(config.server_addr, "127.0.0.1:7071".parse().unwrap());
        assert_eq!(config.server_name, "localhost");
        assert!(!config.dangerous_skip_cert_verification);
        assert_eq!(config.keep_alive_interval_ms, 10_000);
        assert_eq!(config.idle_timeout_ms, 600_000);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.max_frame_size, MAX_FRAME_SIZE);
    }

    #[tokio::test]
    async fn test_client_initial_not_connected() {
        let client = HostClient::new(local_config()).unwrap();
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn test_client_connect_timeout() {
        let config = HostClientConfig {
            server_addr: "127.0.0.1:59998".parse().unwrap(),
            connect_timeout_ms: 100,
            ..local_config()
        };
        let client = HostClient::new(config).unwrap();
        assert!(client.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_open_duplex_without_server() {
        let config = HostClientConfig {
            server_addr: "127.0.0.1:59997".parse().unwrap(),
            connect_timeout_ms: 100,
            ..local_config()
        };
        let client = HostClient::new(config).unwrap();
        assert!(client.open_duplex().await.is_err());
    }

    #[tokio::test]
    async fn test_close_without_connection() {
        let client = HostClient::new(local_config()).unwrap();
        client.close().await;
        assert!(!client.is_connected().await);
    }

    #[test]
    fn test_client_error_display() {
        assert_eq!(
            format!("{}", ClientError::NotConnected),
            "no connection established"
        );
        assert_eq!(
            format!("{}", ClientError::Timeout(5000)),
            "connection timed out after 5000ms"
        );
    }

    #[test]
    fn test_build_client_config_variants() {
        assert!(HostClient::build_client_config(&HostClientConfig::default()).is_ok());
        assert!(HostClient::build_client_config(&local_config()).is_ok());
        let no_keepalive = HostClientConfig {
            keep_alive_interval_ms: 0,
            ..local_config()
        };
        assert!(HostClient::build_client_config(&no_keepalive).is_ok());
    }
}
