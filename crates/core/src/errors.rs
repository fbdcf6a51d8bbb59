use thiserror::Error;

use crate::domain::identity::UserId;
use crate::panel::PanelTransitionError;
use crate::ports::{RemoteError, StoreError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("no usable credential for user {0}")]
    CredentialMissing(UserId),
    #[error("remote rejected the credential of user {0}")]
    CredentialInvalid(UserId),
    #[error(transparent)]
    Remote(RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("local state is inconsistent: {0}")]
    LocalInconsistency(String),
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(error) => error.is_retryable(),
            Self::Store(StoreError::Backend(_)) => true,
            _ => false,
        }
    }

    /// The user has to authorize again before anything else can succeed.
    pub fn needs_reauthorization(&self) -> bool {
        matches!(self, Self::CredentialMissing(_) | Self::CredentialInvalid(_))
    }
}

/// Errors shaped for the person on the other side of the chat.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("authorization required: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "That action is not available here any more.",
            Self::Unauthorized { .. } => "Please authorize again to continue.",
            Self::ServiceUnavailable { .. } => {
                "The board service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "Something went wrong. Please try again.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl CoreError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self {
            Self::CredentialMissing(_) | Self::CredentialInvalid(_) => {
                InterfaceError::Unauthorized { message, correlation_id }
            }
            Self::Remote(RemoteError::NotFound(_))
            | Self::Remote(RemoteError::PermissionDenied(_))
            | Self::Remote(RemoteError::Rejected { .. })
            | Self::LocalInconsistency(_) => InterfaceError::BadRequest { message, correlation_id },
            Self::Remote(RemoteError::Transient(_)) | Self::Store(StoreError::Backend(_)) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Remote(_) | Self::Store(_) => InterfaceError::Internal { message, correlation_id },
        }
    }
}

impl From<PanelTransitionError> for InterfaceError {
    fn from(value: PanelTransitionError) -> Self {
        Self::BadRequest { message: value.to_string(), correlation_id: "unassigned".to_owned() }
    }
}
