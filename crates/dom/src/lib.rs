//! DOM node model for the pipecdp driver.
//!
//! The remote protocol hands back a mutable, recursively nested tree with
//! two id spaces: tree-scoped node ids that any mutation invalidates, and
//! stable backend ids. This crate owns that model:
//!
//! ```text
//! wire JSON → Node (recursive) → Document (flat, generation-tagged)
//!                                    ↓
//!                             FlatNode lookups / worklist walks
//! ```
//!
//! The cdp crate builds a `Document` per tab, drops it on the first
//! mutation event, and refuses lookups minted under an older generation.

pub mod document;
pub mod error;
pub mod types;

pub use document::{Document, FlatNode};
pub use error::{DomError, Result};
pub use types::{BackendNodeId, FrameId, Node, NodeId};
