//! Remote group store contract.
//!
//! The management API owns groups and their member references. The reconciler
//! only talks to it through [`GroupStore`], which keeps the HTTP client and the
//! in-memory store interchangeable.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::payload::{GroupSnapshot, SetGroupRequest};

/// Error code the management API returns for a missing object.
pub const OBJECT_NOT_FOUND_CODE: &str = "generic_err_object_not_found";

/// Returns true if a remote error code means "object not found".
pub fn is_object_not_found(code: &str) -> bool {
    code == OBJECT_NOT_FOUND_CODE
}

/// Errors reported by a [`GroupStore`].
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The call could not be completed.
    #[error("transport: {0}")]
    Transport(String),

    /// The call completed and the store reported failure.
    #[error("{message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },

    /// The store answered with a body that does not decode.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Create a rejection carrying the "object not found" code.
    pub fn not_found(message: impl Into<String>) -> Self {
        StoreError::Rejected {
            code: Some(OBJECT_NOT_FOUND_CODE.to_string()),
            message: message.into(),
        }
    }

    /// Whether this error is the structured "object not found" rejection.
    pub fn is_object_not_found(&self) -> bool {
        match self {
            StoreError::Rejected {
                code: Some(code), ..
            } => is_object_not_found(code),
            _ => false,
        }
    }
}

/// Remote group operations consumed by the reconciler.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// `set-group`: modify an existing group and return its full new state.
    async fn upsert_group(&self, request: &SetGroupRequest) -> Result<GroupSnapshot, StoreError>;

    /// `show-group`: fetch a group by uid.
    async fn fetch_group(&self, uid: &str) -> Result<GroupSnapshot, StoreError>;

    /// `delete-group`: delete a group by uid.
    async fn delete_group(&self, uid: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: GroupStore + ?Sized> GroupStore for Arc<T> {
    async fn upsert_group(&self, request: &SetGroupRequest) -> Result<GroupSnapshot, StoreError> {
        (**self).upsert_group(request).await
    }

    async fn fetch_group(&self, uid: &str) -> Result<GroupSnapshot, StoreError> {
        (**self).fetch_group(uid).await
    }

    async fn delete_group(&self, uid: &str) -> Result<(), StoreError> {
        (**self).delete_group(uid).await
    }
}
