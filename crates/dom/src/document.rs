//! Flattened, generation-tagged snapshot of one target's DOM tree.
//!
//! The wire tree is recursive and owns its children; lookups and parent
//! walks want a flat map instead. `Document::from_root` flattens with an
//! explicit worklist so arbitrarily deep trees cannot overflow the stack,
//! descending through regular children, shadow roots, and embedded frame
//! documents alike.
//!
//! A `Document` is immutable once built. Staleness is handled one level
//! up: the owning tab drops the whole snapshot and bumps its generation
//! counter the moment a mutation event arrives.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::error::{DomError, Result};
use crate::types::{BackendNodeId, FrameId, Node, NodeId};

/// One node of a flattened document. Children are ids, not owned nodes.
#[derive(Debug, Clone)]
pub struct FlatNode {
    pub node_id: NodeId,
    pub backend_node_id: BackendNodeId,
    pub node_type: i64,
    pub node_name: String,
    pub node_value: String,
    pub parent_id: Option<NodeId>,
    pub children: SmallVec<[NodeId; 4]>,
    pub shadow_roots: SmallVec<[NodeId; 2]>,
    /// The root of the embedded document, iff this node is an iframe.
    pub content_document: Option<NodeId>,
    pub attributes: Option<Vec<String>>,
    pub frame_id: Option<FrameId>,
}

impl FlatNode {
    pub fn is_element(&self) -> bool {
        self.node_type == 1
    }
}

/// An immutable snapshot of one document tree, keyed by tree-scoped
/// node id and tagged with the generation it was built under.
#[derive(Debug)]
pub struct Document {
    root_id: NodeId,
    generation: u64,
    nodes: AHashMap<NodeId, FlatNode>,
}

impl Document {
    /// Flatten a wire tree. Iterative worklist, no recursion.
    pub fn from_root(root: Node, generation: u64) -> Self {
        let root_id = root.node_id;
        let mut nodes = AHashMap::with_capacity(256);
        let mut work: Vec<(Node, Option<NodeId>)> = vec![(root, None)];

        while let Some((node, parent)) = work.pop() {
            let mut flat = FlatNode {
                node_id: node.node_id,
                backend_node_id: node.backend_node_id,
                node_type: node.node_type,
                node_name: node.node_name,
                node_value: node.node_value,
                // Trust the explicit parent over the wire hint; the hint
                // is absent on shadow roots and content documents.
                parent_id: parent.or(node.parent_id),
                children: SmallVec::new(),
                shadow_roots: SmallVec::new(),
                content_document: None,
                attributes: node.attributes,
                frame_id: node.frame_id,
            };

            for child in node.children {
                flat.children.push(child.node_id);
                work.push((child, Some(flat.node_id)));
            }
            for shadow in node.shadow_roots {
                flat.shadow_roots.push(shadow.node_id);
                work.push((shadow, Some(flat.node_id)));
            }
            if let Some(doc) = node.content_document {
                flat.content_document = Some(doc.node_id);
                work.push((*doc, Some(flat.node_id)));
            }

            nodes.insert(flat.node_id, flat);
        }

        Self {
            root_id,
            generation,
            nodes,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&FlatNode> {
        self.nodes.get(&id)
    }

    /// Like `get`, but refuses node ids minted under an older generation
    /// before even looking, so callers cannot silently resolve a node id
    /// that a mutation has since re-assigned.
    pub fn get_checked(&self, id: NodeId, minted: u64) -> Result<&FlatNode> {
        if minted != self.generation {
            return Err(DomError::StaleDocument {
                minted,
                current: self.generation,
            });
        }
        self.nodes.get(&id).ok_or(DomError::NodeNotFound(id))
    }

    /// Resolve a stable backend id against this snapshot.
    pub fn find_by_backend(&self, backend_id: BackendNodeId) -> Option<&FlatNode> {
        self.walk().find(|n| n.backend_node_id == backend_id)
    }

    /// Depth-first worklist traversal over the whole snapshot, shadow
    /// roots and embedded documents included.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            doc: self,
            stack: vec![self.root_id],
        }
    }
}

pub struct Walk<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a FlatNode;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.doc.get(id)?;
        self.stack.extend(node.children.iter().copied());
        self.stack.extend(node.shadow_roots.iter().copied());
        if let Some(doc_id) = node.content_document {
            self.stack.push(doc_id);
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(node_id: NodeId, backend: BackendNodeId, name: &str) -> Node {
        Node {
            node_id,
            parent_id: None,
            backend_node_id: backend,
            node_type: 1,
            node_name: name.to_string(),
            node_value: String::new(),
            attributes: None,
            children: Vec::new(),
            shadow_roots: Vec::new(),
            content_document: None,
            frame_id: None,
        }
    }

    fn sample_tree() -> Node {
        // #document
        //   HTML
        //     DIV (hosts a shadow root with a SPAN)
        //     IFRAME (embeds #document > P)
        let mut shadow = leaf(10, 110, "#document-fragment");
        shadow.node_type = 11;
        shadow.children.push(leaf(11, 111, "SPAN"));

        let mut div = leaf(3, 103, "DIV");
        div.shadow_roots.push(shadow);

        let mut inner_doc = leaf(20, 120, "#document");
        inner_doc.node_type = 9;
        inner_doc.children.push(leaf(21, 121, "P"));

        let mut iframe = leaf(4, 104, "IFRAME");
        iframe.frame_id = Some("F1".to_string());
        iframe.content_document = Some(Box::new(inner_doc));

        let mut html = leaf(2, 102, "HTML");
        html.children.push(div);
        html.children.push(iframe);

        let mut root = leaf(1, 101, "#document");
        root.node_type = 9;
        root.children.push(html);
        root
    }

    #[test]
    fn flattens_across_shadow_roots_and_frames() {
        let doc = Document::from_root(sample_tree(), 0);
        assert_eq!(doc.len(), 8);
        assert_eq!(doc.root_id(), 1);

        // Shadow root hangs off its host.
        assert_eq!(doc.get(10).unwrap().parent_id, Some(3));
        // Embedded document hangs off the iframe element.
        assert_eq!(doc.get(20).unwrap().parent_id, Some(4));
        assert_eq!(doc.get(4).unwrap().content_document, Some(20));
        // Ordinary child links.
        assert_eq!(doc.get(21).unwrap().parent_id, Some(20));
        assert_eq!(doc.get(1).unwrap().parent_id, None);
    }

    #[test]
    fn walk_visits_every_node_once() {
        let doc = Document::from_root(sample_tree(), 0);
        let mut seen: Vec<NodeId> = doc.walk().map(|n| n.node_id).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4, 10, 11, 20, 21]);
    }

    #[test]
    fn find_by_backend_resolves_across_rebuilds() {
        let first = Document::from_root(sample_tree(), 0);
        let span = first.find_by_backend(111).unwrap();
        assert_eq!(span.node_name, "SPAN");

        // A rebuilt tree may renumber node ids; backend ids still hit.
        let mut renumbered = sample_tree();
        renumbered.node_id = 100;
        let second = Document::from_root(renumbered, 1);
        assert!(second.find_by_backend(101).is_some());
    }

    #[test]
    fn get_checked_rejects_stale_generation() {
        let doc = Document::from_root(sample_tree(), 3);
        assert!(doc.get_checked(3, 3).is_ok());

        match doc.get_checked(3, 2) {
            Err(DomError::StaleDocument { minted: 2, current: 3 }) => {}
            other => panic!("expected stale error, got {other:?}"),
        }
        match doc.get_checked(999, 3) {
            Err(DomError::NodeNotFound(999)) => {}
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[test]
    fn deep_tree_does_not_overflow_the_stack() {
        let mut node = leaf(10_000, 20_000, "DIV");
        for i in (0..10_000).rev() {
            let mut parent = leaf(i, 10_000 + i, "DIV");
            parent.children.push(node);
            node = parent;
        }
        let doc = Document::from_root(node, 0);
        assert_eq!(doc.len(), 10_001);
        assert_eq!(doc.walk().count(), 10_001);
    }
}
