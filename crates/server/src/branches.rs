// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Branch-catalog client.
//!
//! The catalog is an external service that versions table state per run;
//! the kernel only lists branches and deletes the orphans whose runs are
//! gone or terminal.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("branch catalog error: {0}")]
    Transport(String),

    #[error("branch catalog returned {status}")]
    Status { status: u16 },
}

#[async_trait]
pub trait BranchCatalog: Send + Sync {
    async fn list_branches(&self) -> Result<Vec<String>, CatalogError>;
    async fn delete_branch(&self, name: &str) -> Result<(), CatalogError>;
}

#[derive(Deserialize)]
struct BranchList {
    branches: Vec<BranchInfo>,
}

#[derive(Deserialize)]
struct BranchInfo {
    name: String,
}

pub struct HttpBranchCatalog {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBranchCatalog {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl BranchCatalog for HttpBranchCatalog {
    async fn list_branches(&self) -> Result<Vec<String>, CatalogError> {
        let response = self
            .client
            .get(format!("{}/branches", self.base_url))
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CatalogError::Status { status: response.status().as_u16() });
        }
        let list: BranchList =
            response.json().await.map_err(|e| CatalogError::Transport(e.to_string()))?;
        Ok(list.branches.into_iter().map(|b| b.name).collect())
    }

    async fn delete_branch(&self, name: &str) -> Result<(), CatalogError> {
        let response = self
            .client
            .delete(format!("{}/branches/{}", self.base_url, name))
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        if response.status().is_success() || response.status().as_u16() == 404 {
            Ok(())
        } else {
            Err(CatalogError::Status { status: response.status().as_u16() })
        }
    }
}

/// Stands in when no catalog is configured; the orphan-branch task becomes
/// a no-op.
pub struct NullBranchCatalog;

#[async_trait]
impl BranchCatalog for NullBranchCatalog {
    async fn list_branches(&self) -> Result<Vec<String>, CatalogError> {
        Ok(Vec::new())
    }

    async fn delete_branch(&self, _name: &str) -> Result<(), CatalogError> {
        Ok(())
    }
}

#[cfg(test)]
pub mod mem {
    //! In-memory branch catalog for reaper tests.

    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct MemBranchCatalog {
        branches: Arc<Mutex<Vec<String>>>,
    }

    impl MemBranchCatalog {
        pub fn with_branches(names: &[&str]) -> Self {
            Self { branches: Arc::new(Mutex::new(names.iter().map(|s| s.to_string()).collect())) }
        }

        pub fn branches(&self) -> Vec<String> {
            self.branches.lock().clone()
        }
    }

    #[async_trait]
    impl BranchCatalog for MemBranchCatalog {
        async fn list_branches(&self) -> Result<Vec<String>, CatalogError> {
            Ok(self.branches.lock().clone())
        }

        async fn delete_branch(&self, name: &str) -> Result<(), CatalogError> {
            self.branches.lock().retain(|b| b != name);
            Ok(())
        }
    }
}
