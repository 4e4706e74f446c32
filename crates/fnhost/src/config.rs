// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the fnhost binary.
//!
//! The platform host starts the worker with its endpoint and identifiers on
//! the command line. Each flag falls back to an `FNHOST_*` environment
//! variable, and a `.env` file is loaded first when present.

use std::net::{SocketAddr, ToSocketAddrs};

use clap::Parser;
use fnhost_protocol::HostClientConfig;
use fnhost_protocol::frame::{MAX_FRAME_SIZE, MAX_WIRE_FRAME_SIZE};

use crate::router::{DEFAULT_BOOTSTRAP_CONCURRENCY, RouterConfig};

/// Worker host configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "fnhost")]
#[command(about = "Worker host for serverless functions: bootstrap, specialization and message routing")]
#[command(version)]
pub struct Config {
    /// Platform host name or address
    #[arg(long, env = "FNHOST_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Platform host port
    #[arg(long, env = "FNHOST_PORT")]
    pub port: u16,

    /// Identifier announced in the StartStream message
    #[arg(long = "worker-id", alias = "workerId", env = "FNHOST_WORKER_ID")]
    pub worker_id: String,

    /// Request identifier of the StartStream message
    #[arg(long = "request-id", alias = "requestId", env = "FNHOST_REQUEST_ID")]
    pub request_id: String,

    /// Largest message accepted or sent, in bytes
    #[arg(
        long = "max-message-length",
        alias = "grpcMaxMessageLength",
        env = "FNHOST_MAX_MESSAGE_LENGTH",
        default_value_t = MAX_FRAME_SIZE
    )]
    pub max_message_length: usize,

    /// TLS server name of the platform host
    #[arg(long, env = "FNHOST_SERVER_NAME", default_value = "localhost")]
    pub server_name: String,

    /// Skip TLS certificate verification (development only)
    #[arg(long, env = "FNHOST_SKIP_CERT_VERIFICATION")]
    pub skip_cert_verification: bool,

    /// Outstanding bootstrap responses built concurrently
    #[arg(long, env = "FNHOST_BOOTSTRAP_CONCURRENCY", default_value_t = DEFAULT_BOOTSTRAP_CONCURRENCY)]
    pub bootstrap_concurrency: usize,

    /// Connection timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub connect_timeout_ms: u64,
}

impl Config {
    /// Load `.env` if present, then parse the command line.
    ///
    /// Exits the process with usage text on malformed arguments.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_length == 0 {
            return Err(ConfigError::ZeroMessageLength);
        }
        if self.max_message_length > MAX_WIRE_FRAME_SIZE {
            return Err(ConfigError::MessageLengthTooLarge {
                length: self.max_message_length,
                limit: MAX_WIRE_FRAME_SIZE,
            });
        }
        if self.bootstrap_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.worker_id.is_empty() {
            return Err(ConfigError::Empty("worker-id"));
        }
        Ok(())
    }

    /// Resolve `host:port` to the first address it maps to.
    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ConfigError::UnresolvableHost {
                host: self.host.clone(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| ConfigError::UnresolvableHost {
                host: self.host.clone(),
                reason: "no addresses".to_string(),
            })
    }

    pub fn client_config(&self) -> Result<HostClientConfig, ConfigError> {
        Ok(HostClientConfig {
            server_addr: self.server_addr()?,
            server_name: self.server_name.clone(),
            dangerous_skip_cert_verification: self.skip_cert_verification,
            connect_timeout_ms: self.connect_timeout_ms,
            max_frame_size: self.max_message_length,
            ..Default::default()
        })
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            bootstrap_concurrency: self.bootstrap_concurrency,
            ..Default::default()
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The maximum message length is zero.
    #[error("max message length must be greater than zero")]
    ZeroMessageLength,
    /// The maximum message length does not fit the frame length prefix.
    #[error("max message length {length} exceeds the frame limit of {limit} bytes")]
    MessageLengthTooLarge { length: usize, limit: usize },
    /// The bootstrap concurrency is zero.
    #[error("bootstrap concurrency must be greater than zero")]
    ZeroConcurrency,
    /// A required value is empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),
    /// The platform host name did not resolve.
    #[error("cannot resolve host {host}: {reason}")]
    UnresolvableHost { host: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["fnhost"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--port", "7071", "--worker-id", "w-1", "--request-id", "r-1"]);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7071);
        assert_eq!(config.max_message_length, MAX_FRAME_SIZE);
        assert_eq!(config.server_name, "localhost");
        assert!(!config.skip_cert_verification);
        assert_eq!(config.bootstrap_concurrency, DEFAULT_BOOTSTRAP_CONCURRENCY);
        assert_eq!(config.connect_timeout_ms, 10_000);
        config.validate().unwrap();
    }

    #[test]
    fn test_platform_style_aliases() {
        let config = parse(&[
            "--host",
            "127.0.0.1",
            "--port",
            "50051",
            "--workerId",
            "w-2",
            "--requestId",
            "r-2",
            "--grpcMaxMessageLength",
            "1024",
        ]);
        assert_eq!(config.worker_id, "w-2");
        assert_eq!(config.request_id, "r-2");
        assert_eq!(config.max_message_length, 1024);
    }

    #[test]
    fn test_missing_port_is_rejected() {
        assert!(Config::try_parse_from(["fnhost", "--worker-id", "w", "--request-id", "r"]).is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = parse(&["--port", "1", "--worker-id", "w", "--request-id", "r"]);
        config.max_message_length = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroMessageLength)));

        config.max_message_length = MAX_WIRE_FRAME_SIZE;
        config.validate().unwrap();

        config.max_message_length = 10;
        config.bootstrap_concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroConcurrency)));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_message_length_above_length_prefix_is_rejected() {
        let config = parse(&[
            "--port",
            "1",
            "--worker-id",
            "w",
            "--request-id",
            "r",
            "--max-message-length",
            "4294967296",
        ]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MessageLengthTooLarge {
                length: 4_294_967_296,
                ..
            })
        ));
    }

    #[test]
    fn test_client_config_carries_limits() {
        let config = parse(&[
            "--port",
            "7071",
            "--worker-id",
            "w",
            "--request-id",
            "r",
            "--max-message-length",
            "4096",
            "--skip-cert-verification",
        ]);
        let client = config.client_config().unwrap();
        assert_eq!(client.server_addr, "127.0.0.1:7071".parse().unwrap());
        assert_eq!(client.max_frame_size, 4096);
        assert!(client.dangerous_skip_cert_verification);
        assert_eq!(config.router_config().bootstrap_concurrency, DEFAULT_BOOTSTRAP_CONCURRENCY);
    }
}
