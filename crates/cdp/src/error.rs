//! Error taxonomy for the driver.
//!
//! Flat hierarchy, one variant per failure class callers actually branch
//! on. Transport failures are fatal and never retried; protocol errors
//! surface to the caller of `send` unless an ignore-errors send was used.

use thiserror::Error;

use pipecdp_dom::DomError;

pub type Result<T> = std::result::Result<T, CdpError>;

#[derive(Debug, Error)]
pub enum CdpError {
    /// The pipe to the browser broke or could not be set up. Fatal.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The connection shut down while a call was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote answered with an error object.
    #[error("protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    /// Command issued on a tab with no bound session id.
    #[error("target {0} not attached")]
    NotAttached(String),

    /// The session or node this handle pointed at no longer exists.
    #[error("stale reference: {0}")]
    StaleReference(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl CdpError {
    /// Whether a protocol error means the session disappeared mid-flight.
    pub fn is_session_gone(&self) -> bool {
        match self {
            CdpError::Protocol { code, message } => {
                *code == -32001 || message.contains("Session with given id not found")
            }
            _ => false,
        }
    }

    /// Fold the backend's "session vanished" condition into the uniform
    /// stale-reference kind so callers never match on error text.
    pub(crate) fn normalize_stale(self, target_id: &str) -> Self {
        if self.is_session_gone() {
            CdpError::StaleReference(format!("target {target_id} is no longer available"))
        } else {
            self
        }
    }
}

impl From<DomError> for CdpError {
    fn from(err: DomError) -> Self {
        match err {
            DomError::NodeNotFound(id) => CdpError::NotFound(format!("node {id} not in document")),
            DomError::StaleDocument { .. } => CdpError::StaleReference(err.to_string()),
            DomError::ParseError(e) => CdpError::Json(e),
        }
    }
}
