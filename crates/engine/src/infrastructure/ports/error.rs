//! Error types shared by the port traits.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("storage error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound
        } else {
            StoreError::Io(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("publish failed on {subject}: {reason}")]
    Publish { subject: String, reason: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token expired")]
    Expired,
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template not found: {entity_type}/{template_id}")]
    NotFound {
        entity_type: String,
        template_id: String,
    },
    #[error("template parse error in {template_id}: {reason}")]
    Parse {
        template_id: String,
        reason: String,
    },
    #[error("template store error: {0}")]
    Io(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InterpreterError {
    #[error("interpreter unavailable: {0}")]
    Unavailable(String),
    #[error("interpreter request failed: {0}")]
    RequestFailed(String),
    #[error("invalid interpreter response: {0}")]
    InvalidResponse(String),
}
