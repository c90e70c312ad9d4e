//! Reconciler error types.

use thiserror::Error;

use crate::ident::ResourceId;
use crate::store::StoreError;

/// Errors surfaced by lifecycle operations.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The management API could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The management API completed the call but reported failure.
    #[error("{0}")]
    UpstreamRejected(String),

    /// The remote change went through but the new member is not in the response.
    #[error("member '{member}' not found in set-group response for group '{group}'")]
    AmbiguousOrMissingMember { group: String, member: String },

    /// A network-member resource resolved to an object that is not a network object.
    #[error("member '{member}' has type '{object_type}', which is not a network object")]
    NotANetworkObject { member: String, object_type: String },

    #[error("invalid resource identifier '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: String },

    #[error("invalid desired state: {0}")]
    InvalidState(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The relation was created remotely but reading it back failed.
    #[error("membership {id} was created but could not be read back: {source}")]
    ReadAfterCreate {
        id: ResourceId,
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Identifier of a relation that exists remotely despite the error.
    pub fn created_id(&self) -> Option<&ResourceId> {
        match self {
            ReconcileError::ReadAfterCreate { id, .. } => Some(id),
            _ => None,
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transport(msg) => ReconcileError::Transport(msg),
            StoreError::Rejected { code, message } => {
                if !message.is_empty() {
                    ReconcileError::UpstreamRejected(message)
                } else if let Some(code) = code {
                    ReconcileError::UpstreamRejected(format!("request rejected ({})", code))
                } else {
                    ReconcileError::UpstreamRejected("request rejected".to_string())
                }
            }
            StoreError::Malformed(msg) => ReconcileError::MalformedResponse(msg),
        }
    }
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_keeps_remote_message_verbatim() {
        let err: ReconcileError = StoreError::Rejected {
            code: Some("generic_err_invalid_parameter".to_string()),
            message: "Requested object [web-srv] not found".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Requested object [web-srv] not found");
    }

    #[test]
    fn test_rejection_without_message_falls_back_to_code() {
        let err: ReconcileError = StoreError::Rejected {
            code: Some("err_locked".to_string()),
            message: String::new(),
        }
        .into();
        assert!(matches!(err, ReconcileError::UpstreamRejected(ref m) if m.contains("err_locked")));
    }

    #[test]
    fn test_transport_error_maps_to_transport() {
        let err: ReconcileError = StoreError::Transport("connection refused".to_string()).into();
        assert!(matches!(err, ReconcileError::Transport(_)));
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn test_read_after_create_keeps_identifier() {
        let id = ResourceId::member("g-1", "m-1").unwrap();
        let err = ReconcileError::ReadAfterCreate {
            id: id.clone(),
            source: Box::new(StoreError::Transport("connection reset".to_string()).into()),
        };
        assert_eq!(err.created_id(), Some(&id));
        assert_eq!(
            err.to_string(),
            "membership g-1/m-1 was created but could not be read back: transport error: connection reset"
        );
        assert!(std::error::Error::source(&err).is_some());
        assert!(ReconcileError::InvalidState("x".to_string()).created_id().is_none());
    }
}
