//! Element: a handle onto one DOM node in one tab.
//!
//! Handles are minted against a document snapshot and carry its
//! generation. Any mutation event bumps the tab's generation, which
//! makes every outstanding handle stale: interactions then fail with a
//! stale-reference error instead of silently acting on whatever node
//! the browser re-assigned the id to. Recovery is re-finding the
//! element; the stable backend id makes that cheap.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use pipecdp_dom::{BackendNodeId, NodeId};

use crate::error::{CdpError, Result};
use crate::proto::input::{DispatchMouseEvent, InsertText, MouseButton};
use crate::proto::{dom, runtime, Command};
use crate::tab::Tab;

/// Fires an input event so framework listeners see the change, which
/// plain attribute assignment would not.
const SET_VALUE_FN: &str =
    "function(v) { this.value = v; this.dispatchEvent(new Event('input', {bubbles: true})); }";

#[derive(Clone)]
pub struct Element {
    tab: Arc<Tab>,
    node_id: NodeId,
    backend_node_id: Option<BackendNodeId>,
    /// Document generation this handle was minted under.
    generation: u64,
}

impl Element {
    pub(crate) fn new(
        tab: Arc<Tab>,
        node_id: NodeId,
        backend_node_id: Option<BackendNodeId>,
        generation: u64,
    ) -> Self {
        Self {
            tab,
            node_id,
            backend_node_id,
            generation,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn backend_node_id(&self) -> Option<BackendNodeId> {
        self.backend_node_id
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    pub fn is_stale(&self) -> bool {
        self.generation != self.tab.doc_generation()
    }

    fn ensure_fresh(&self) -> Result<()> {
        if self.is_stale() {
            return Err(CdpError::StaleReference(format!(
                "node {} was minted under an older document",
                self.node_id
            )));
        }
        Ok(())
    }

    /// Send a node-scoped command, folding session loss into the
    /// stale-reference kind.
    async fn send<C: Command>(&self, cmd: &C) -> Result<C::Response> {
        self.ensure_fresh()?;
        self.tab
            .send(cmd)
            .await
            .map_err(|e| e.normalize_stale(self.tab.target_id()))
    }

    // Geometry ------------------------------------------------------------------

    /// The element's content quad in viewport coordinates.
    pub async fn position(&self) -> Result<dom::Quad> {
        let resp = self
            .send(&dom::GetBoxModel {
                node_id: self.node_id,
            })
            .await?;
        resp.model.content_quad().ok_or_else(|| {
            CdpError::NotFound(format!("node {} has no usable box model", self.node_id))
        })
    }

    // Interaction ----------------------------------------------------------------

    /// Click the element's center. Returns the top-level tab so callers
    /// can keep driving after a click that navigates, or `None` when
    /// the element had no geometry to click. Staleness propagates;
    /// everything else about a missing box is a non-event.
    pub async fn click(
        &self,
        button: MouseButton,
        click_count: i64,
        delay: Duration,
    ) -> Result<Option<Arc<Tab>>> {
        self.try_scroll().await;
        self.try_focus().await;

        let quad = match self.position().await {
            Ok(quad) => quad,
            Err(err @ CdpError::StaleReference(_)) => return Err(err),
            Err(err) => {
                tracing::debug!(node = self.node_id, %err, "unclickable, no box model");
                return Ok(None);
            }
        };
        let (x, y) = quad.center();

        self.send(&DispatchMouseEvent::pressed(x, y, button, click_count))
            .await?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.send(&DispatchMouseEvent::released(x, y, button, click_count))
            .await?;

        Ok(Some(self.tab.top_level()))
    }

    /// Focus the element and type through the input pipeline, character
    /// handling and key events included.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        self.try_scroll().await;
        self.send(&dom::Focus {
            node_id: self.node_id,
        })
        .await?;
        self.send(&InsertText {
            text: text.to_string(),
        })
        .await?;
        Ok(())
    }

    /// Set an input's value directly and fire an input event. Falls
    /// back to typing when the node cannot be resolved to a JS object.
    pub async fn set_value(&self, value: &str) -> Result<()> {
        let Some(object_id) = self.resolve_object().await? else {
            return self.type_text(value).await;
        };
        self.send(&runtime::CallFunctionOn {
            object_id,
            function_declaration: SET_VALUE_FN.to_string(),
            arguments: vec![runtime::CallArgument {
                value: Some(json!(value)),
            }],
            await_promise: false,
            return_by_value: false,
        })
        .await?;
        Ok(())
    }

    // Content --------------------------------------------------------------------

    /// The element's text content, `None` when the node resolves to
    /// nothing scriptable.
    pub async fn text(&self) -> Result<Option<String>> {
        let Some(object_id) = self.resolve_object().await? else {
            return Ok(None);
        };
        let resp = self
            .send(&runtime::CallFunctionOn {
                object_id,
                function_declaration: "function() { return this.textContent; }".to_string(),
                arguments: Vec::new(),
                await_promise: false,
                return_by_value: true,
            })
            .await?;
        Ok(resp.result.value.and_then(|v| v.as_str().map(String::from)))
    }

    pub async fn html(&self) -> Result<String> {
        let resp = self
            .send(&dom::GetOuterHtml {
                node_id: self.node_id,
            })
            .await?;
        Ok(resp.outer_html)
    }

    /// One attribute's value, `None` when absent.
    pub async fn attribute(&self, name: &str) -> Result<Option<String>> {
        let resp = self
            .send(&dom::GetAttributes {
                node_id: self.node_id,
            })
            .await?;
        Ok(find_attribute(&resp.attributes, name))
    }

    // Structure ------------------------------------------------------------------

    /// CSS query scoped under this element. `None` when nothing matches.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<Element>> {
        let resp = self
            .send(&dom::QuerySelector {
                node_id: self.node_id,
                selector: selector.to_string(),
            })
            .await?;
        if resp.node_id == 0 {
            return Ok(None);
        }
        Ok(Some(self.mint(resp.node_id)))
    }

    pub async fn query_selector_all(&self, selector: &str) -> Result<Vec<Element>> {
        let resp = self
            .send(&dom::QuerySelectorAll {
                node_id: self.node_id,
                selector: selector.to_string(),
            })
            .await?;
        Ok(resp
            .node_ids
            .into_iter()
            .filter(|id| *id != 0)
            .map(|id| self.mint(id))
            .collect())
    }

    /// Poll a scoped CSS query until it matches or the deadline passes.
    pub async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<Element>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.query_selector(selector).await? {
                return Ok(Some(found));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(50).min(timeout)).await;
        }
    }

    /// Parent element via the cached snapshot. Fails stale rather than
    /// resolving against a tree this handle was not minted from.
    pub async fn parent(&self) -> Result<Option<Element>> {
        let doc = self.tab.document().await?;
        let node = doc.get_checked(self.node_id, self.generation)?;
        Ok(node.parent_id.map(|id| {
            let backend = doc.get(id).map(|n| n.backend_node_id);
            Element::new(self.tab.clone(), id, backend, self.generation)
        }))
    }

    // Helpers --------------------------------------------------------------------

    /// Scoped query results are not necessarily in the snapshot, so
    /// their backend id stays unknown.
    fn mint(&self, node_id: NodeId) -> Element {
        Element::new(self.tab.clone(), node_id, None, self.generation)
    }

    /// Scrolling is courtesy, not contract; off-screen elements still
    /// have box models.
    async fn try_scroll(&self) {
        if self.is_stale() {
            return;
        }
        let cmd = dom::ScrollIntoViewIfNeeded {
            node_id: self.node_id,
        };
        if let Err(err) = self.tab.send_lenient(&cmd).await {
            tracing::debug!(node = self.node_id, %err, "scroll into view failed");
        }
    }

    /// Same courtesy for focus; unfocusable elements still get clicked.
    async fn try_focus(&self) {
        if self.is_stale() {
            return;
        }
        let cmd = dom::Focus {
            node_id: self.node_id,
        };
        if let Err(err) = self.tab.send_lenient(&cmd).await {
            tracing::debug!(node = self.node_id, %err, "focus failed");
        }
    }

    /// Resolve this node to a remote JS object id. Protocol refusals
    /// (detached nodes, documents) come back as `None`.
    async fn resolve_object(&self) -> Result<Option<String>> {
        self.ensure_fresh()?;
        let cmd = dom::ResolveNode {
            node_id: self.node_id,
        };
        match self.tab.send(&cmd).await {
            Ok(resp) => Ok(resp.object.object_id),
            Err(CdpError::Protocol { code, message }) => {
                tracing::debug!(node = self.node_id, code, %message, "node not resolvable");
                Ok(None)
            }
            Err(err) => Err(err.normalize_stale(self.tab.target_id())),
        }
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("node_id", &self.node_id)
            .field("backend_node_id", &self.backend_node_id)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Scan the protocol's flat name/value pair list for one attribute.
fn find_attribute(pairs: &[String], name: &str) -> Option<String> {
    pairs
        .chunks_exact(2)
        .find(|pair| pair[0] == name)
        .map(|pair| pair[1].clone())
}
