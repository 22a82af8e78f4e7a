//! Tab: the per-target facade.
//!
//! A `Tab` is the stable identity of one target for the target's whole
//! lifetime. Session attachment is state on the tab, not the tab
//! itself: commands require a live session, identity does not. The tab
//! also owns the generation-tagged document snapshot that element
//! handles are minted against.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;

use pipecdp_dom::Document;

use crate::client::{CdpClient, EventCallback};
use crate::elem::Element;
use crate::error::{CdpError, Result};
use crate::proto::target::{CloseTarget, TargetInfo};
use crate::proto::{dom, page, runtime, CdpEvent, Command, SessionId, TargetId};
use crate::registry::TargetRegistry;

/// How often element polling re-runs its search.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Bound on parent-frame hops; a frame tree deeper than this is a
/// browser bug, not a structure worth following.
const MAX_FRAME_HOPS: usize = 32;

pub struct Tab {
    client: Arc<CdpClient>,
    registry: Weak<TargetRegistry>,
    target_id: TargetId,
    info: RwLock<TargetInfo>,
    session_id: RwLock<Option<SessionId>>,

    handlers: DashMap<String, Vec<(u64, EventCallback)>>,
    handler_seq: AtomicU64,

    /// Cached full-tree snapshot, dropped on any mutation event.
    document: Mutex<Option<Arc<Document>>>,
    /// Bumped on every mutation; element handles carry the generation
    /// they were minted under.
    doc_generation: AtomicU64,

    /// Main frame id from the last navigation, used to resolve frame
    /// ownership across out-of-process iframes.
    last_frame_id: RwLock<Option<String>>,
}

impl Tab {
    pub(crate) fn new(
        client: Arc<CdpClient>,
        registry: Weak<TargetRegistry>,
        info: TargetInfo,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            registry,
            target_id: info.target_id.clone(),
            info: RwLock::new(info),
            session_id: RwLock::new(None),
            handlers: DashMap::new(),
            handler_seq: AtomicU64::new(1),
            document: Mutex::new(None),
            doc_generation: AtomicU64::new(0),
            last_frame_id: RwLock::new(None),
        })
    }

    // Identity and metadata ------------------------------------------------------

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn url(&self) -> String {
        self.info.read().map(|i| i.url.clone()).unwrap_or_default()
    }

    pub fn title(&self) -> String {
        self.info.read().map(|i| i.title.clone()).unwrap_or_default()
    }

    pub fn kind(&self) -> String {
        self.info.read().map(|i| i.kind.clone()).unwrap_or_default()
    }

    pub fn parent_frame_id(&self) -> Option<String> {
        self.info
            .read()
            .ok()
            .and_then(|i| i.parent_frame_id.clone())
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id.read().ok().and_then(|s| s.clone())
    }

    pub fn is_attached(&self) -> bool {
        self.session_id().is_some()
    }

    pub fn last_frame_id(&self) -> Option<String> {
        self.last_frame_id.read().ok().and_then(|f| f.clone())
    }

    pub(crate) fn update_info(&self, info: TargetInfo) {
        if let Ok(mut slot) = self.info.write() {
            *slot = info;
        }
    }

    pub(crate) fn bind_session(&self, session_id: SessionId) {
        if let Ok(mut slot) = self.session_id.write() {
            *slot = Some(session_id);
        }
    }

    /// Node ids minted under the old session are meaningless, so the
    /// snapshot goes with it.
    pub(crate) fn clear_session(&self) {
        if let Ok(mut slot) = self.session_id.write() {
            *slot = None;
        }
        self.invalidate_document();
    }

    // Commands --------------------------------------------------------------------

    /// Send a command in this tab's session. Fails immediately when no
    /// session is attached; attachment may come back later, retrying is
    /// the caller's call.
    pub async fn send<C: Command>(&self, cmd: &C) -> Result<C::Response> {
        let session = self
            .session_id()
            .ok_or_else(|| CdpError::NotAttached(self.target_id.clone()))?;
        self.client.send(cmd, Some(&session)).await
    }

    /// Ignore-errors variant of [`send`](Self::send).
    pub async fn send_lenient<C: Command>(&self, cmd: &C) -> Result<Option<C::Response>> {
        let session = self
            .session_id()
            .ok_or_else(|| CdpError::NotAttached(self.target_id.clone()))?;
        self.client.send_lenient(cmd, Some(&session)).await
    }

    /// Navigate the main frame. With a nonzero timeout, waits that long
    /// for the load event and returns normally either way; load is a
    /// heuristic, not a contract.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let resp = self
            .send(&page::Navigate {
                url: url.to_string(),
            })
            .await?;
        if let Ok(mut slot) = self.last_frame_id.write() {
            *slot = Some(resp.frame_id.clone());
        }
        if let Some(text) = resp.error_text.filter(|t| !t.is_empty()) {
            tracing::warn!(%url, error = %text, "navigation reported an error");
            return Ok(());
        }
        if !timeout.is_zero() && self.wait_for_event("Page.loadEventFired", timeout).await.is_none()
        {
            tracing::debug!(%url, "load event did not arrive in time");
        }
        Ok(())
    }

    /// Evaluate an expression in the page. With `await_promise` a
    /// returned promise resolves before the call comes back.
    pub async fn eval(
        &self,
        expression: &str,
        await_promise: bool,
    ) -> Result<runtime::RemoteObject> {
        let resp = self
            .send(&runtime::Evaluate {
                expression: expression.to_string(),
                await_promise,
                return_by_value: true,
            })
            .await?;
        Ok(resp.result)
    }

    /// Ask the browser to close this target. Best effort; the registry
    /// learns the outcome from the destroy event.
    pub async fn close(&self) {
        let cmd = CloseTarget {
            target_id: self.target_id.clone(),
        };
        if let Err(err) = self.client.send(&cmd, None).await {
            tracing::debug!(target = %self.target_id, %err, "close target failed");
        }
    }

    // Events ------------------------------------------------------------------------

    /// Register a session-scoped event handler. Returns a token for
    /// [`off`](Self::off).
    pub fn on(&self, method: impl Into<String>, callback: EventCallback) -> u64 {
        let token = self.handler_seq.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .entry(method.into())
            .or_default()
            .push((token, callback));
        token
    }

    pub fn off(&self, method: &str, token: u64) -> bool {
        let Some(mut entry) = self.handlers.get_mut(method) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|(t, _)| *t != token);
        before != entry.len()
    }

    pub fn clear_handlers(&self) {
        self.handlers.clear();
    }

    pub fn handler_count(&self, method: &str) -> usize {
        self.handlers.get(method).map(|e| e.len()).unwrap_or(0)
    }

    pub(crate) fn dispatch_event(&self, event: &CdpEvent) {
        let callbacks: Vec<EventCallback> = match self.handlers.get(event.method()) {
            Some(entry) => entry.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return,
        };
        for callback in callbacks {
            callback(event);
        }
    }

    /// Wait for the next event with the given method. `None` on
    /// timeout. The handler deregisters itself either way.
    pub async fn wait_for_event(&self, method: &str, timeout: Duration) -> Option<CdpEvent> {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let token = self.on(method, {
            let slot = slot.clone();
            Arc::new(move |event: &CdpEvent| {
                if let Ok(mut slot) = slot.lock() {
                    if let Some(tx) = slot.take() {
                        let _ = tx.send(event.clone());
                    }
                }
            })
        });

        let result = tokio::time::timeout(timeout, rx).await;
        self.off(method, token);
        match result {
            Ok(Ok(event)) => Some(event),
            _ => None,
        }
    }

    // Document ------------------------------------------------------------------------

    /// Full pierced document snapshot, cached until a mutation event.
    pub async fn document(&self) -> Result<Arc<Document>> {
        self.document_with(-1, true).await
    }

    /// Fetch a snapshot with explicit depth and piercing. Only the full
    /// pierced form is cached; partial trees would give backend-id
    /// resolution false negatives.
    pub async fn document_with(&self, depth: i64, pierce: bool) -> Result<Arc<Document>> {
        let full = depth == -1 && pierce;
        if full {
            if let Ok(cache) = self.document.lock() {
                if let Some(doc) = cache.as_ref() {
                    return Ok(doc.clone());
                }
            }
        }

        // Tag the snapshot with the generation at fetch start. If a
        // mutation lands mid-fetch the generation moves on and this
        // snapshot is already stale, so it must not enter the cache.
        let generation = self.doc_generation.load(Ordering::Acquire);
        let resp = self.send(&dom::GetDocument { depth, pierce }).await?;
        let doc = Arc::new(Document::from_root(resp.root, generation));

        if full && self.doc_generation.load(Ordering::Acquire) == generation {
            if let Ok(mut cache) = self.document.lock() {
                *cache = Some(doc.clone());
            }
        }
        Ok(doc)
    }

    pub(crate) fn invalidate_document(&self) {
        self.doc_generation.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut cache) = self.document.lock() {
            *cache = None;
        }
    }

    pub(crate) fn doc_generation(&self) -> u64 {
        self.doc_generation.load(Ordering::Acquire)
    }

    // Element search --------------------------------------------------------------------

    /// Search this tab and every attached out-of-process iframe it
    /// embeds, against a full pierced snapshot. The query may be plain
    /// text, a CSS selector, or an XPath expression; the browser
    /// classifies it.
    pub async fn find_elems(self: &Arc<Self>, query: &str) -> Result<Vec<Element>> {
        self.find_elems_with(query, -1, true).await
    }

    /// [`find_elems`](Self::find_elems) with explicit snapshot depth
    /// and piercing. Frames that fail to search are skipped.
    pub async fn find_elems_with(
        self: &Arc<Self>,
        query: &str,
        depth: i64,
        pierce: bool,
    ) -> Result<Vec<Element>> {
        let mut found = self.search_here(query, depth, pierce).await?;

        if let Some(registry) = self.registry.upgrade() {
            for frame in registry.tabs() {
                if frame.kind() != "iframe"
                    || !frame.is_attached()
                    || Arc::ptr_eq(&frame, self)
                    || !frame.is_embedded_in(self)
                {
                    continue;
                }
                match frame.search_here(query, depth, pierce).await {
                    Ok(elems) => found.extend(elems),
                    Err(err) => {
                        tracing::debug!(frame = %frame.target_id(), %err, "frame search failed")
                    }
                }
            }
        }
        Ok(found)
    }

    /// First match of [`find_elems`](Self::find_elems), if any.
    pub async fn find_elem(self: &Arc<Self>, query: &str) -> Result<Option<Element>> {
        Ok(self.find_elems(query).await?.into_iter().next())
    }

    /// Search this tab's own document only.
    pub(crate) async fn search_here(
        self: &Arc<Self>,
        query: &str,
        depth: i64,
        pierce: bool,
    ) -> Result<Vec<Element>> {
        let doc = self.document_with(depth, pierce).await?;
        let search = self
            .send(&dom::PerformSearch {
                query: query.to_string(),
                include_user_agent_shadow_dom: Some(true),
            })
            .await?;

        let node_ids = if search.result_count > 0 {
            self.send(&dom::GetSearchResults {
                search_id: search.search_id.clone(),
                from_index: 0,
                to_index: search.result_count,
            })
            .await?
            .node_ids
        } else {
            Vec::new()
        };

        // Browser-side search state is worth releasing but not failing over.
        let _ = self
            .send_lenient(&dom::DiscardSearchResults {
                search_id: search.search_id,
            })
            .await;

        Ok(node_ids
            .into_iter()
            .map(|node_id| {
                let backend = doc.get(node_id).map(|n| n.backend_node_id);
                Element::new(self.clone(), node_id, backend, doc.generation())
            })
            .collect())
    }

    /// CSS query against the document root.
    pub async fn query_selector(self: &Arc<Self>, selector: &str) -> Result<Option<Element>> {
        let doc = self.document().await?;
        let resp = self
            .send(&dom::QuerySelector {
                node_id: doc.root_id(),
                selector: selector.to_string(),
            })
            .await?;
        if resp.node_id == 0 {
            return Ok(None);
        }
        let backend = doc.get(resp.node_id).map(|n| n.backend_node_id);
        Ok(Some(Element::new(
            self.clone(),
            resp.node_id,
            backend,
            doc.generation(),
        )))
    }

    pub async fn query_selector_all(self: &Arc<Self>, selector: &str) -> Result<Vec<Element>> {
        let doc = self.document().await?;
        let resp = self
            .send(&dom::QuerySelectorAll {
                node_id: doc.root_id(),
                selector: selector.to_string(),
            })
            .await?;
        Ok(resp
            .node_ids
            .into_iter()
            .filter(|id| *id != 0)
            .map(|node_id| {
                let backend = doc.get(node_id).map(|n| n.backend_node_id);
                Element::new(self.clone(), node_id, backend, doc.generation())
            })
            .collect())
    }

    /// Poll [`find_elems`](Self::find_elems) until something matches or
    /// the deadline passes. An empty result at the deadline is the
    /// answer, not an error.
    pub async fn wait_for_elems(self: &Arc<Self>, query: &str, timeout: Duration) -> Result<Vec<Element>> {
        self.wait_for_elems_with(query, timeout, -1, true).await
    }

    /// [`wait_for_elems`](Self::wait_for_elems) with explicit snapshot
    /// depth and piercing.
    pub async fn wait_for_elems_with(
        self: &Arc<Self>,
        query: &str,
        timeout: Duration,
        depth: i64,
        pierce: bool,
    ) -> Result<Vec<Element>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = self.find_elems_with(query, depth, pierce).await?;
            if !found.is_empty() || tokio::time::Instant::now() >= deadline {
                return Ok(found);
            }
            tokio::time::sleep(POLL_INTERVAL.min(timeout)).await;
        }
    }

    pub async fn wait_for_elem(self: &Arc<Self>, query: &str, timeout: Duration) -> Result<Option<Element>> {
        Ok(self.wait_for_elems(query, timeout).await?.into_iter().next())
    }

    // Frame structure ----------------------------------------------------------------------

    /// The page tab at the top of this tab's frame chain. A tab with no
    /// parent frame is its own top level.
    pub fn top_level(self: &Arc<Self>) -> Arc<Tab> {
        let Some(registry) = self.registry.upgrade() else {
            return self.clone();
        };
        let mut current = self.clone();
        for _ in 0..MAX_FRAME_HOPS {
            let Some(parent_frame) = current.parent_frame_id() else {
                return current;
            };
            match registry.frame_owner(&parent_frame) {
                Some(owner) if !Arc::ptr_eq(&owner, &current) => current = owner,
                _ => return current,
            }
        }
        current
    }

    /// Whether `ancestor` appears in this tab's parent-frame chain.
    pub fn is_embedded_in(self: &Arc<Self>, ancestor: &Arc<Tab>) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut current = self.clone();
        for _ in 0..MAX_FRAME_HOPS {
            let Some(parent_frame) = current.parent_frame_id() else {
                return false;
            };
            match registry.frame_owner(&parent_frame) {
                Some(owner) => {
                    if Arc::ptr_eq(&owner, ancestor) {
                        return true;
                    }
                    if Arc::ptr_eq(&owner, &current) {
                        return false;
                    }
                    current = owner;
                }
                None => return false,
            }
        }
        false
    }
}

impl std::fmt::Debug for Tab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tab")
            .field("target_id", &self.target_id)
            .field("kind", &self.kind())
            .field("url", &self.url())
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{rig, target_info, Rig};
    use serde_json::{json, Value};

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn minimal_tree() -> Value {
        json!({
            "nodeId": 1,
            "backendNodeId": 101,
            "nodeType": 9,
            "nodeName": "#document",
            "nodeValue": "",
            "children": [{
                "nodeId": 2,
                "parentId": 1,
                "backendNodeId": 102,
                "nodeType": 1,
                "nodeName": "DIV",
                "nodeValue": "",
                "children": [],
            }],
        })
    }

    #[tokio::test]
    async fn wait_for_event_times_out_and_deregisters() {
        let Rig {
            registry, mut fake, ..
        } = rig(false);
        fake.attach_target("T1", "S1", "page").await;
        settle().await;
        let tab = registry.tab("T1").unwrap();

        let got = tab
            .wait_for_event("Page.loadEventFired", Duration::from_millis(100))
            .await;
        assert!(got.is_none());
        assert_eq!(tab.handler_count("Page.loadEventFired"), 0);
    }

    #[tokio::test]
    async fn wait_for_event_delivers_and_deregisters() {
        let Rig {
            registry, mut fake, ..
        } = rig(false);
        fake.attach_target("T1", "S1", "page").await;
        settle().await;
        let tab = registry.tab("T1").unwrap();

        let waiter = {
            let tab = tab.clone();
            tokio::spawn(async move {
                tab.wait_for_event("Page.loadEventFired", Duration::from_secs(2))
                    .await
            })
        };
        settle().await;
        fake.event("Page.loadEventFired", json!({"timestamp": 7.5}), Some("S1"))
            .await;

        match waiter.await.unwrap() {
            Some(CdpEvent::LoadEventFired(e)) => assert_eq!(e.timestamp, 7.5),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(tab.handler_count("Page.loadEventFired"), 0);
    }

    #[tokio::test]
    async fn navigate_records_frame_and_waits_for_load() {
        let Rig {
            registry, mut fake, ..
        } = rig(false);
        fake.attach_target("T1", "S1", "page").await;
        settle().await;
        let tab = registry.tab("T1").unwrap();

        let nav = {
            let tab = tab.clone();
            tokio::spawn(async move {
                tab.navigate("https://example.test/", Duration::from_secs(2))
                    .await
            })
        };

        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "Page.navigate");
        assert_eq!(cmd["sessionId"], "S1");
        fake.respond(
            cmd["id"].as_u64().unwrap(),
            json!({"frameId": "F1", "loaderId": "L1"}),
        )
        .await;
        settle().await;
        fake.event("Page.loadEventFired", json!({"timestamp": 1.0}), Some("S1"))
            .await;

        nav.await.unwrap().unwrap();
        assert_eq!(tab.last_frame_id().as_deref(), Some("F1"));
    }

    #[tokio::test]
    async fn document_is_cached_until_mutation() {
        let Rig {
            registry, mut fake, ..
        } = rig(false);
        fake.attach_target("T1", "S1", "page").await;
        settle().await;
        let tab = registry.tab("T1").unwrap();

        let fetch = {
            let tab = tab.clone();
            tokio::spawn(async move { tab.document().await })
        };
        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "DOM.getDocument");
        assert_eq!(cmd["params"], json!({"depth": -1, "pierce": true}));
        fake.respond(cmd["id"].as_u64().unwrap(), json!({"root": minimal_tree()}))
            .await;
        let first = fetch.await.unwrap().unwrap();

        // Second call is served from cache, no wire exchange.
        let second = tab.document().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        fake.event("DOM.documentUpdated", json!({}), Some("S1")).await;
        settle().await;

        let fetch = {
            let tab = tab.clone();
            tokio::spawn(async move { tab.document().await })
        };
        let cmd = fake.next_command().await;
        fake.respond(cmd["id"].as_u64().unwrap(), json!({"root": minimal_tree()}))
            .await;
        let third = fetch.await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.generation(), first.generation() + 1);
    }

    #[tokio::test]
    async fn find_elems_runs_the_search_protocol() {
        let Rig {
            registry, mut fake, ..
        } = rig(false);
        fake.attach_target("T1", "S1", "page").await;
        settle().await;
        let tab = registry.tab("T1").unwrap();

        let search = {
            let tab = tab.clone();
            tokio::spawn(async move { tab.find_elems("div").await })
        };

        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "DOM.getDocument");
        fake.respond(cmd["id"].as_u64().unwrap(), json!({"root": minimal_tree()}))
            .await;

        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "DOM.performSearch");
        assert_eq!(cmd["params"]["query"], "div");
        fake.respond(
            cmd["id"].as_u64().unwrap(),
            json!({"searchId": "s1", "resultCount": 1}),
        )
        .await;

        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "DOM.getSearchResults");
        assert_eq!(cmd["params"], json!({"searchId": "s1", "fromIndex": 0, "toIndex": 1}));
        fake.respond(cmd["id"].as_u64().unwrap(), json!({"nodeIds": [2]}))
            .await;

        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "DOM.discardSearchResults");
        fake.respond(cmd["id"].as_u64().unwrap(), json!({})).await;

        let found = search.await.unwrap().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node_id(), 2);
        assert_eq!(found[0].backend_node_id(), Some(102));
    }

    #[tokio::test]
    async fn empty_search_skips_result_fetch() {
        let Rig {
            registry, mut fake, ..
        } = rig(false);
        fake.attach_target("T1", "S1", "page").await;
        settle().await;
        let tab = registry.tab("T1").unwrap();

        let search = {
            let tab = tab.clone();
            tokio::spawn(async move { tab.find_elems(".missing").await })
        };

        let cmd = fake.next_command().await;
        fake.respond(cmd["id"].as_u64().unwrap(), json!({"root": minimal_tree()}))
            .await;
        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "DOM.performSearch");
        fake.respond(
            cmd["id"].as_u64().unwrap(),
            json!({"searchId": "s2", "resultCount": 0}),
        )
        .await;
        // Straight to discard, no getSearchResults.
        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "DOM.discardSearchResults");
        fake.respond(cmd["id"].as_u64().unwrap(), json!({})).await;

        assert!(search.await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn eval_carries_the_promise_flag() {
        let Rig {
            registry, mut fake, ..
        } = rig(false);
        fake.attach_target("T1", "S1", "page").await;
        settle().await;
        let tab = registry.tab("T1").unwrap();

        let call = {
            let tab = tab.clone();
            tokio::spawn(async move { tab.eval("1 + 1", false).await })
        };
        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "Runtime.evaluate");
        assert_eq!(cmd["params"]["expression"], "1 + 1");
        assert_eq!(cmd["params"]["awaitPromise"], false);
        assert_eq!(cmd["params"]["returnByValue"], true);
        fake.respond(
            cmd["id"].as_u64().unwrap(),
            json!({"result": {"type": "number", "value": 2}}),
        )
        .await;

        let result = call.await.unwrap().unwrap();
        assert_eq!(result.value, Some(json!(2)));
    }

    #[tokio::test]
    async fn find_elems_with_passes_depth_and_pierce() {
        let Rig {
            registry, mut fake, ..
        } = rig(false);
        fake.attach_target("T1", "S1", "page").await;
        settle().await;
        let tab = registry.tab("T1").unwrap();

        let search = {
            let tab = tab.clone();
            tokio::spawn(async move { tab.find_elems_with("div", 2, false).await })
        };

        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "DOM.getDocument");
        assert_eq!(cmd["params"], json!({"depth": 2, "pierce": false}));
        fake.respond(cmd["id"].as_u64().unwrap(), json!({"root": minimal_tree()}))
            .await;

        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "DOM.performSearch");
        fake.respond(
            cmd["id"].as_u64().unwrap(),
            json!({"searchId": "s3", "resultCount": 1}),
        )
        .await;
        let cmd = fake.next_command().await;
        fake.respond(cmd["id"].as_u64().unwrap(), json!({"nodeIds": [2]}))
            .await;
        let cmd = fake.next_command().await;
        fake.respond(cmd["id"].as_u64().unwrap(), json!({})).await;

        assert_eq!(search.await.unwrap().unwrap().len(), 1);

        // The partial snapshot never enters the cache: the next default
        // search fetches a full pierced tree.
        let search = {
            let tab = tab.clone();
            tokio::spawn(async move { tab.find_elems("div").await })
        };
        let cmd = fake.next_command().await;
        assert_eq!(cmd["method"], "DOM.getDocument");
        assert_eq!(cmd["params"], json!({"depth": -1, "pierce": true}));
        fake.respond(cmd["id"].as_u64().unwrap(), json!({"root": minimal_tree()}))
            .await;
        let cmd = fake.next_command().await;
        fake.respond(
            cmd["id"].as_u64().unwrap(),
            json!({"searchId": "s4", "resultCount": 0}),
        )
        .await;
        let cmd = fake.next_command().await;
        fake.respond(cmd["id"].as_u64().unwrap(), json!({})).await;
        assert!(search.await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn top_level_walks_the_frame_chain() {
        let Rig {
            registry, mut fake, ..
        } = rig(false);

        fake.attach_target("PAGE", "S1", "page").await;
        let mut frame_info = target_info("FRAME", "iframe");
        frame_info["parentFrameId"] = json!("PAGE");
        fake.event(
            "Target.attachedToTarget",
            json!({"sessionId": "S2", "targetInfo": frame_info, "waitingForDebugger": false}),
            None,
        )
        .await;
        settle().await;

        let page = registry.tab("PAGE").unwrap();
        let frame = registry.tab("FRAME").unwrap();

        assert!(Arc::ptr_eq(&page.top_level(), &page));
        assert!(Arc::ptr_eq(&frame.top_level(), &page));
        assert!(frame.is_embedded_in(&page));
        assert!(!page.is_embedded_in(&frame));
    }

    #[tokio::test]
    async fn wait_for_elems_returns_empty_at_deadline() {
        let Rig {
            registry,
            mut fake,
            ..
        } = rig(false);
        fake.attach_target("T1", "S1", "page").await;
        settle().await;
        let tab = registry.tab("T1").unwrap();

        // Script the browser side: every search round comes up empty.
        let responder = tokio::spawn(async move {
            loop {
                let cmd = fake.next_command().await;
                let id = cmd["id"].as_u64().unwrap();
                match cmd["method"].as_str().unwrap() {
                    "DOM.getDocument" => {
                        fake.respond(id, json!({"root": minimal_tree()})).await
                    }
                    "DOM.performSearch" => {
                        fake.respond(id, json!({"searchId": "s", "resultCount": 0}))
                            .await
                    }
                    _ => fake.respond(id, json!({})).await,
                }
            }
        });

        let found = tab
            .wait_for_elems("never", Duration::from_millis(150))
            .await
            .unwrap();
        assert!(found.is_empty());
        responder.abort();
    }
}
