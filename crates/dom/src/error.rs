//! Error types for the document cache.
//!
//! Simple, flat hierarchy. The cdp crate translates these into its own
//! taxonomy at the boundary.

use thiserror::Error;

use crate::types::NodeId;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("node {0} not found in document")]
    NodeNotFound(NodeId),

    #[error("stale document: node minted for generation {minted}, cache is at {current}")]
    StaleDocument { minted: u64, current: u64 },

    #[error("parse error: {0}")]
    ParseError(#[from] serde_json::Error),
}
