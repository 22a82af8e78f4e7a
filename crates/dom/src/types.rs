//! Wire-level DOM node types as `DOM.getDocument` reports them.
//!
//! Two id spaces matter here and must never be confused:
//! - `NodeId` is tree-scoped and invalidated by any DOM mutation.
//! - `BackendNodeId` is stable for the lifetime of the real node.

use serde::{Deserialize, Serialize};

/// Tree-scoped node identifier. Mutation-sensitive.
pub type NodeId = i64;

/// Stable node identifier, survives tree rebuilds.
pub type BackendNodeId = i64;

/// Frame identifier from the remote protocol.
pub type FrameId = String;

/// A DOM node exactly as the wire delivers it: a recursive tree with
/// regular children, shadow roots, and (for iframes) an embedded
/// content document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub node_id: NodeId,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    pub backend_node_id: BackendNodeId,
    pub node_type: i64,
    pub node_name: String,
    #[serde(default)]
    pub node_value: String,
    /// Flat alternating name/value pairs, as the protocol encodes them.
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub shadow_roots: Vec<Node>,
    /// Present iff this node is an iframe with a same-process document.
    #[serde(default)]
    pub content_document: Option<Box<Node>>,
    #[serde(default)]
    pub frame_id: Option<FrameId>,
}

impl Node {
    /// DOM nodeType 1.
    pub fn is_element(&self) -> bool {
        self.node_type == 1
    }

    /// Whether this node embeds another document.
    pub fn is_frame_host(&self) -> bool {
        self.content_document.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_wire_node() {
        let node: Node = serde_json::from_value(json!({
            "nodeId": 1,
            "backendNodeId": 10,
            "nodeType": 9,
            "nodeName": "#document",
        }))
        .unwrap();

        assert_eq!(node.node_id, 1);
        assert_eq!(node.backend_node_id, 10);
        assert!(node.children.is_empty());
        assert!(node.shadow_roots.is_empty());
        assert!(node.content_document.is_none());
        assert!(!node.is_element());
    }

    #[test]
    fn parses_nested_content_document() {
        let node: Node = serde_json::from_value(json!({
            "nodeId": 5,
            "backendNodeId": 50,
            "nodeType": 1,
            "nodeName": "IFRAME",
            "frameId": "F1",
            "contentDocument": {
                "nodeId": 6,
                "backendNodeId": 60,
                "nodeType": 9,
                "nodeName": "#document",
            }
        }))
        .unwrap();

        assert!(node.is_frame_host());
        assert_eq!(node.content_document.unwrap().node_id, 6);
    }
}
