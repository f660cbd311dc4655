//! Audit Log

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;
use tracing::warn;

use crate::{
    domain::audit::records::AuditEntry,
    store::{DocumentStore, StoreError},
};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to write audit entry")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct StoreAuditLog {
    store: Arc<dyn DocumentStore>,
}

impl StoreAuditLog {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl Debug for StoreAuditLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StoreAuditLog").finish_non_exhaustive()
    }
}

#[async_trait]
impl AuditLog for StoreAuditLog {
    #[tracing::instrument(
        name = "audit.log.record",
        skip(self, entry),
        fields(action = %entry.action, target_ref = %entry.target_ref),
        err
    )]
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.store.append_audit(entry).await.map_err(Into::into)
    }

    async fn entries(&self, target_ref: Option<String>) -> Result<Vec<AuditEntry>, AuditError> {
        self.store.list_audit(target_ref).await.map_err(Into::into)
    }
}

#[automock]
#[async_trait]
/// Append-only trail of staff and redemption actions.
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Entries in append order, optionally for one target only.
    async fn entries(&self, target_ref: Option<String>) -> Result<Vec<AuditEntry>, AuditError>;
}

/// Record `entry`; a failed audit write never fails the operation it describes.
pub(crate) async fn record_quietly(audit: &dyn AuditLog, entry: AuditEntry) {
    let action = entry.action.clone();

    if let Err(error) = audit.record(entry).await {
        warn!(%action, %error, "audit entry dropped");
    }
}
