//! DOM domain: document retrieval, search, and node-scoped commands.

use serde::{Deserialize, Serialize};

use pipecdp_dom::{Node, NodeId};

use super::runtime::RemoteObject;
use super::{Command, Empty};

#[derive(Debug, Serialize)]
pub struct Enable {}

impl Command for Enable {
    const METHOD: &'static str = "DOM.enable";
    type Response = Empty;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDocument {
    /// -1 means the whole tree.
    pub depth: i64,
    /// Descend into shadow roots and same-process frame documents.
    pub pierce: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDocumentResponse {
    pub root: Node,
}

impl Command for GetDocument {
    const METHOD: &'static str = "DOM.getDocument";
    type Response = GetDocumentResponse;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelector {
    pub node_id: NodeId,
    pub selector: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorResponse {
    /// Zero when nothing matched.
    pub node_id: NodeId,
}

impl Command for QuerySelector {
    const METHOD: &'static str = "DOM.querySelector";
    type Response = QuerySelectorResponse;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorAll {
    pub node_id: NodeId,
    pub selector: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorAllResponse {
    #[serde(default)]
    pub node_ids: Vec<NodeId>,
}

impl Command for QuerySelectorAll {
    const METHOD: &'static str = "DOM.querySelectorAll";
    type Response = QuerySelectorAllResponse;
}

/// Plain-text, CSS, or XPath search in one call; the remote classifies
/// the query itself.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformSearch {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_user_agent_shadow_dom: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformSearchResponse {
    pub search_id: String,
    pub result_count: i64,
}

impl Command for PerformSearch {
    const METHOD: &'static str = "DOM.performSearch";
    type Response = PerformSearchResponse;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSearchResults {
    pub search_id: String,
    pub from_index: i64,
    pub to_index: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSearchResultsResponse {
    #[serde(default)]
    pub node_ids: Vec<NodeId>,
}

impl Command for GetSearchResults {
    const METHOD: &'static str = "DOM.getSearchResults";
    type Response = GetSearchResultsResponse;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscardSearchResults {
    pub search_id: String,
}

impl Command for DiscardSearchResults {
    const METHOD: &'static str = "DOM.discardSearchResults";
    type Response = Empty;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollIntoViewIfNeeded {
    pub node_id: NodeId,
}

impl Command for ScrollIntoViewIfNeeded {
    const METHOD: &'static str = "DOM.scrollIntoViewIfNeeded";
    type Response = Empty;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Focus {
    pub node_id: NodeId,
}

impl Command for Focus {
    const METHOD: &'static str = "DOM.focus";
    type Response = Empty;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBoxModel {
    pub node_id: NodeId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBoxModelResponse {
    pub model: BoxModel,
}

impl Command for GetBoxModel {
    const METHOD: &'static str = "DOM.getBoxModel";
    type Response = GetBoxModelResponse;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveNode {
    pub node_id: NodeId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveNodeResponse {
    pub object: RemoteObject,
}

impl Command for ResolveNode {
    const METHOD: &'static str = "DOM.resolveNode";
    type Response = ResolveNodeResponse;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOuterHtml {
    pub node_id: NodeId,
}

#[derive(Debug, Deserialize)]
pub struct GetOuterHtmlResponse {
    #[serde(rename = "outerHTML")]
    pub outer_html: String,
}

impl Command for GetOuterHtml {
    const METHOD: &'static str = "DOM.getOuterHTML";
    type Response = GetOuterHtmlResponse;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAttributes {
    pub node_id: NodeId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAttributesResponse {
    /// Flat alternating name/value sequence.
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl Command for GetAttributes {
    const METHOD: &'static str = "DOM.getAttributes";
    type Response = GetAttributesResponse;
}

/// Box model as reported by `DOM.getBoxModel`: each box is a quad of
/// eight coordinates.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxModel {
    #[serde(default)]
    pub content: Vec<f64>,
    #[serde(default)]
    pub border: Vec<f64>,
    #[serde(default)]
    pub padding: Vec<f64>,
    #[serde(default)]
    pub margin: Vec<f64>,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl BoxModel {
    /// The content quad, falling back to the border quad when the
    /// content box is degenerate or missing.
    pub fn content_quad(&self) -> Option<Quad> {
        Quad::from_slice(&self.content).or_else(|| Quad::from_slice(&self.border))
    }
}

/// Four corner points, clockwise from top-left:
/// `[x_tl, y_tl, x_tr, y_tr, x_br, y_br, x_bl, y_bl]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    points: [f64; 8],
}

impl Quad {
    pub fn from_slice(raw: &[f64]) -> Option<Self> {
        if raw.len() != 8 {
            return None;
        }
        let mut points = [0.0; 8];
        points.copy_from_slice(raw);
        Some(Self { points })
    }

    /// Mean of the four x's and the four y's, independently.
    pub fn center(&self) -> (f64, f64) {
        let p = &self.points;
        let x = (p[0] + p[2] + p[4] + p[6]) / 4.0;
        let y = (p[1] + p[3] + p[5] + p[7]) / 4.0;
        (x, y)
    }

    /// Span of the top edge's x coordinates.
    pub fn width(&self) -> f64 {
        (self.points[2] - self.points[0]).abs()
    }

    /// Span of the left edge's y coordinates.
    pub fn height(&self) -> f64 {
        (self.points[7] - self.points[1]).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_geometry() {
        let quad = Quad::from_slice(&[10.0, 20.0, 110.0, 20.0, 110.0, 70.0, 10.0, 70.0]).unwrap();
        assert_eq!(quad.center(), (60.0, 45.0));
        assert_eq!(quad.width(), 100.0);
        assert_eq!(quad.height(), 50.0);
    }

    #[test]
    fn quad_rejects_wrong_length() {
        assert!(Quad::from_slice(&[1.0, 2.0]).is_none());
        assert!(Quad::from_slice(&[]).is_none());
    }

    #[test]
    fn box_model_falls_back_to_border() {
        let model = BoxModel {
            content: vec![],
            border: vec![0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0],
            padding: vec![],
            margin: vec![],
            width: 10.0,
            height: 10.0,
        };
        let quad = model.content_quad().unwrap();
        assert_eq!(quad.width(), 10.0);
    }
}
