// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the server process.
//!
//! Misconfiguration is fatal: [`Config::from_env`] errors terminate the
//! process with exit code 1 before anything is started.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("{present} is set but {missing} is not")]
    IncompletePair { present: &'static str, missing: &'static str },
}

/// Object-store connection settings.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
    /// Metadata operations (list, stat, delete) deadline.
    pub metadata_timeout: Duration,
    /// Data operations (read, write) deadline.
    pub data_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_file: String,
    pub key_file: String,
}

/// Worker transport TLS material (CA plus client identity).
#[derive(Debug, Clone)]
pub struct WorkerTlsConfig {
    pub ca_file: String,
    pub cert_file: String,
    pub key_file: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// host:port for the HTTP surface.
    pub listen_addr: SocketAddr,
    /// Absent means stateless mode: health endpoint only, no background work.
    pub database_url: Option<String>,
    pub s3: Option<S3Config>,
    /// More than one address enables round-robin dispatch.
    pub worker_addrs: Vec<String>,
    pub query_addr: Option<String>,
    pub branch_catalog_url: Option<String>,
    /// When false, this replica never runs background workers.
    pub scheduler_enabled: bool,
    pub api_key: Option<String>,
    pub tls: Option<TlsConfig>,
    pub cors_origins: Vec<String>,
    /// Per-IP token bucket, requests per second; 0 disables.
    pub rate_limit: u32,
    pub worker_tls: Option<WorkerTlsConfig>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn timeout_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = match var("LISTEN_ADDR") {
            None => SocketAddr::from(([127, 0, 0, 1], 8080)),
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "LISTEN_ADDR", value: raw })?,
        };

        let s3 = match (var("S3_ENDPOINT"), var("S3_BUCKET")) {
            (Some(endpoint), Some(bucket)) => Some(S3Config {
                endpoint,
                bucket,
                access_key: var("S3_ACCESS_KEY").unwrap_or_default(),
                secret_key: var("S3_SECRET_KEY").unwrap_or_default(),
                use_ssl: var("S3_USE_SSL").as_deref() == Some("true"),
                metadata_timeout: timeout_var("S3_METADATA_TIMEOUT", Duration::from_secs(10))?,
                data_timeout: timeout_var("S3_DATA_TIMEOUT", Duration::from_secs(60))?,
            }),
            (Some(_), None) => {
                return Err(ConfigError::IncompletePair {
                    present: "S3_ENDPOINT",
                    missing: "S3_BUCKET",
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::IncompletePair {
                    present: "S3_BUCKET",
                    missing: "S3_ENDPOINT",
                })
            }
            (None, None) => None,
        };

        let tls = match (var("TLS_CERT_FILE"), var("TLS_KEY_FILE")) {
            (Some(cert_file), Some(key_file)) => Some(TlsConfig { cert_file, key_file }),
            (Some(_), None) => {
                return Err(ConfigError::IncompletePair {
                    present: "TLS_CERT_FILE",
                    missing: "TLS_KEY_FILE",
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::IncompletePair {
                    present: "TLS_KEY_FILE",
                    missing: "TLS_CERT_FILE",
                })
            }
            (None, None) => None,
        };

        let worker_tls = match (var("GRPC_TLS_CA"), var("GRPC_TLS_CERT"), var("GRPC_TLS_KEY")) {
            (Some(ca_file), Some(cert_file), Some(key_file)) => {
                Some(WorkerTlsConfig { ca_file, cert_file, key_file })
            }
            (None, None, None) => None,
            (ca, cert, _key) => {
                let missing = if ca.is_none() {
                    "GRPC_TLS_CA"
                } else if cert.is_none() {
                    "GRPC_TLS_CERT"
                } else {
                    "GRPC_TLS_KEY"
                };
                return Err(ConfigError::IncompletePair { present: "GRPC_TLS_*", missing });
            }
        };

        let rate_limit = match var("RATE_LIMIT") {
            None => 0,
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "RATE_LIMIT", value: raw })?,
        };

        Ok(Self {
            listen_addr,
            database_url: var("DATABASE_URL"),
            s3,
            worker_addrs: var("WORKER_ADDRS").map(|v| split_csv(&v)).unwrap_or_default(),
            query_addr: var("QUERY_ADDR"),
            branch_catalog_url: var("BRANCH_CATALOG_URL"),
            scheduler_enabled: var("SCHEDULER_ENABLED").as_deref() != Some("false"),
            api_key: var("API_KEY"),
            tls,
            cors_origins: var("CORS_ORIGINS").map(|v| split_csv(&v)).unwrap_or_default(),
            rate_limit,
            worker_tls,
        })
    }

    /// Stateless replicas serve health and nothing else.
    pub fn is_stateless(&self) -> bool {
        self.database_url.is_none()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
