// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor worker transport.
//!
//! The kernel's view of a worker is three calls: dispatch, cancel, and the
//! capacity it advertised at connect time. Progress flows back through the
//! dispatcher's completion entry point (driven by the HTTP surface), so the
//! transport stays one-directional.

use crate::config::WorkerTlsConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smelt_core::{PipelineRef, RunId};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker transport error: {0}")]
    Transport(String),

    #[error("worker returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("worker TLS material unreadable: {0}")]
    Tls(String),
}

/// Reply to a dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchReply {
    Accepted,
    WorkerBusy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub run_id: RunId,
    pub pipeline: PipelineRef,
    /// Object-store paths of the pipeline's source artifacts.
    pub code_refs: Vec<String>,
}

#[async_trait]
pub trait WorkerClient: Send + Sync {
    fn endpoint(&self) -> &str;

    /// Warm-pool capacity the worker advertised at connect time.
    fn capacity(&self) -> u32;

    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReply, WorkerError>;

    async fn cancel(&self, run_id: &RunId) -> Result<(), WorkerError>;
}

#[derive(Deserialize)]
struct CapacityBody {
    capacity: Option<u32>,
}

/// HTTP worker transport. TLS material (CA + client identity) comes from
/// the worker transport TLS settings when present.
pub struct HttpWorkerClient {
    endpoint: String,
    capacity: u32,
    client: reqwest::Client,
}

impl HttpWorkerClient {
    /// Connect to a worker: build the client, then ask for its warm-pool
    /// capacity. An unreachable worker still yields a usable client with
    /// the default capacity of 1.
    pub async fn connect(
        endpoint: &str,
        tls: Option<&WorkerTlsConfig>,
    ) -> Result<Self, WorkerError> {
        let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(5));
        if let Some(tls) = tls {
            let ca = std::fs::read(&tls.ca_file).map_err(|e| WorkerError::Tls(e.to_string()))?;
            let cert =
                std::fs::read(&tls.cert_file).map_err(|e| WorkerError::Tls(e.to_string()))?;
            let key = std::fs::read(&tls.key_file).map_err(|e| WorkerError::Tls(e.to_string()))?;
            let mut identity = cert;
            identity.extend_from_slice(&key);
            builder = builder
                .add_root_certificate(
                    reqwest::Certificate::from_pem(&ca)
                        .map_err(|e| WorkerError::Tls(e.to_string()))?,
                )
                .identity(
                    reqwest::Identity::from_pem(&identity)
                        .map_err(|e| WorkerError::Tls(e.to_string()))?,
                );
        }
        let client = builder.build().map_err(|e| WorkerError::Transport(e.to_string()))?;

        let capacity = match client
            .get(format!("{}/capacity", endpoint.trim_end_matches('/')))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response
                .json::<CapacityBody>()
                .await
                .ok()
                .and_then(|b| b.capacity)
                .unwrap_or(1),
            Err(error) => {
                tracing::warn!(endpoint, %error, "worker unreachable at connect; assuming capacity 1");
                1
            }
        };

        Ok(Self { endpoint: endpoint.trim_end_matches('/').to_string(), capacity, client })
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReply, WorkerError> {
        let response = self
            .client
            .post(format!("{}/dispatch", self.endpoint))
            .json(request)
            .send()
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            200 | 202 => Ok(DispatchReply::Accepted),
            409 | 429 => Ok(DispatchReply::WorkerBusy),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(WorkerError::Status { status, body })
            }
        }
    }

    async fn cancel(&self, run_id: &RunId) -> Result<(), WorkerError> {
        let response = self
            .client
            .post(format!("{}/cancel/{}", self.endpoint, run_id))
            .send()
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(WorkerError::Status { status, body })
        }
    }
}

#[cfg(test)]
pub mod mock {
    //! Programmable in-memory worker for dispatcher and scheduler tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Clone)]
    pub struct MockWorker {
        endpoint: String,
        capacity: u32,
        state: Arc<Mutex<MockState>>,
    }

    #[derive(Default)]
    struct MockState {
        /// Scripted replies consumed per dispatch; empty means Accepted.
        replies: VecDeque<Result<DispatchReply, String>>,
        pub dispatched: Vec<RunId>,
        pub cancelled: Vec<RunId>,
    }

    impl MockWorker {
        pub fn new(capacity: u32) -> Self {
            Self {
                endpoint: "mock://worker".into(),
                capacity,
                state: Arc::new(Mutex::new(MockState::default())),
            }
        }

        pub fn named(capacity: u32, endpoint: &str) -> Self {
            Self { endpoint: endpoint.into(), ..Self::new(capacity) }
        }

        pub fn push_reply(&self, reply: Result<DispatchReply, String>) {
            self.state.lock().replies.push_back(reply);
        }

        pub fn dispatched(&self) -> Vec<RunId> {
            self.state.lock().dispatched.clone()
        }

        pub fn cancelled(&self) -> Vec<RunId> {
            self.state.lock().cancelled.clone()
        }
    }

    #[async_trait]
    impl WorkerClient for MockWorker {
        fn endpoint(&self) -> &str {
            &self.endpoint
        }

        fn capacity(&self) -> u32 {
            self.capacity
        }

        async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReply, WorkerError> {
            let mut state = self.state.lock();
            let reply = state.replies.pop_front().unwrap_or(Ok(DispatchReply::Accepted));
            match reply {
                Ok(reply) => {
                    if reply == DispatchReply::Accepted {
                        state.dispatched.push(request.run_id);
                    }
                    Ok(reply)
                }
                Err(message) => Err(WorkerError::Transport(message)),
            }
        }

        async fn cancel(&self, run_id: &RunId) -> Result<(), WorkerError> {
            self.state.lock().cancelled.push(*run_id);
            Ok(())
        }
    }
}
