//! Browser: owns the process, the connection, and the registry.
//!
//! One `Browser` per launched process. Everything below it hangs off
//! the single pipe connection; when the browser goes away, so does all
//! of it, which is why shutdown here is a ladder rather than a single
//! kill.

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::client::{CdpClient, EventCallback};
use crate::config::Config;
use crate::error::{CdpError, Result};
use crate::proto::{browser as proto_browser, target};
use crate::registry::TargetRegistry;
use crate::tab::Tab;
use crate::transport;

/// Bounded wait for the protocol-level close request.
const CLOSE_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// Grace after the close request before SIGTERM.
const EXIT_GRACE: Duration = Duration::from_secs(5);
/// Grace after SIGTERM before SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(3);
/// Startup settles once the pipe has been quiet this long.
const STARTUP_IDLE: Duration = Duration::from_secs(1);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a created target may take to show up in the registry.
const CREATE_TAB_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Browser {
    config: Config,
    client: Arc<CdpClient>,
    registry: Arc<TargetRegistry>,
    child: tokio::sync::Mutex<Option<Child>>,
    recv_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    pid: Option<u32>,
}

impl Browser {
    /// Launch the browser and wait for the initial burst of discovery
    /// traffic to settle.
    pub async fn start(mut config: Config) -> Result<Self> {
        let (child, reader, writer) = transport::launch(&mut config).await?;
        let pid = child.id();

        let registry =
            TargetRegistry::new(config.auto_attach, config.auto_enable_domains.clone());
        let (client, recv_task) = CdpClient::start(reader, writer, registry.clone());

        client
            .send(&target::SetDiscoverTargets { discover: true }, None)
            .await?;

        let browser = Self {
            config,
            client,
            registry,
            child: tokio::sync::Mutex::new(Some(child)),
            recv_task: std::sync::Mutex::new(Some(recv_task)),
            pid,
        };
        browser.wait_idle(STARTUP_IDLE, STARTUP_TIMEOUT).await;
        tracing::info!(tabs = browser.registry.len(), "browser ready");
        Ok(browser)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn tabs(&self) -> Vec<Arc<Tab>> {
        self.registry.tabs()
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    /// First page target, the one the initial `about:blank` produced.
    pub fn first_tab(&self) -> Option<Arc<Tab>> {
        self.registry.tabs().into_iter().find(|t| t.kind() == "page")
    }

    /// Register a connection-level event handler.
    pub fn on(&self, method: impl Into<String>, callback: EventCallback) {
        self.client.on(method, callback);
    }

    pub fn clear_handlers(&self) {
        self.client.clear_handlers();
    }

    /// Open a new page and wait for the registry to pick it up. With
    /// auto-attach on the returned tab is usually already usable; with
    /// it off the caller attaches on its own schedule.
    pub async fn create_tab(&self, url: &str) -> Result<Arc<Tab>> {
        let resp = self
            .client
            .send(
                &target::CreateTarget {
                    url: url.to_string(),
                    new_window: None,
                },
                None,
            )
            .await?;

        let deadline = tokio::time::Instant::now() + CREATE_TAB_TIMEOUT;
        loop {
            if let Some(tab) = self.registry.tab(&resp.target_id) {
                if tab.is_attached() || !self.config.auto_attach {
                    return Ok(tab);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                // Created but never announced; the discovery event got lost.
                return Err(CdpError::NotFound(format!(
                    "target {} did not appear after createTarget",
                    resp.target_id
                )));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Navigate an existing or fresh tab and hand it back.
    pub async fn navigate(&self, url: &str, new_tab: bool, timeout: Duration) -> Result<Arc<Tab>> {
        let tab = if new_tab {
            None
        } else {
            self.first_tab()
        };
        let tab = match tab {
            Some(tab) => tab,
            None => self.create_tab("about:blank").await?,
        };
        tab.navigate(url, timeout).await?;
        Ok(tab)
    }

    /// Block until the pipe has been quiet for `threshold`, or give up
    /// after `timeout`. Discovery and auto-attach produce a burst of
    /// unsolicited traffic; quiet means the browser is done announcing.
    pub async fn wait_idle(&self, threshold: Duration, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.client.idle_for() < threshold {
            if tokio::time::Instant::now() >= deadline || self.client.is_closed() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Shutdown ladder: ask nicely over the protocol, then wait, then
    /// SIGTERM, then SIGKILL. Each rung is independently bounded so a
    /// wedged browser cannot hang the caller.
    pub async fn close(&self) {
        if !self.client.is_closed() {
            let close = self.client.send(&proto_browser::Close {}, None);
            match tokio::time::timeout(CLOSE_REQUEST_TIMEOUT, close).await {
                Ok(Ok(_)) => tracing::debug!("browser acknowledged close"),
                Ok(Err(err)) => tracing::debug!(%err, "close request failed"),
                Err(_) => tracing::debug!("close request timed out"),
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match transport::shutdown_process(&mut child, EXIT_GRACE, TERM_GRACE).await {
                Ok(status) => tracing::info!(%status, "browser exited"),
                Err(err) => tracing::warn!(%err, "failed to reap browser process"),
            }
        }

        if let Ok(mut slot) = self.recv_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        self.client.shutdown();
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// End-to-end against a real browser binary. Run explicitly:
    /// `cargo test --package pipecdp -- --ignored smoke`.
    #[tokio::test]
    #[ignore]
    async fn smoke_launch_navigate_close() {
        let config = Config {
            user_data_dir: Some(
                tempfile::tempdir().expect("tempdir").keep(),
            ),
            ..Config::default()
        };

        let browser = Browser::start(config).await.expect("browser start");
        assert!(browser.pid().is_some());

        let tab = browser
            .navigate("about:blank", false, Duration::from_secs(5))
            .await
            .expect("navigate");
        assert!(tab.is_attached());

        let elems = tab.find_elems("body").await.expect("find body");
        assert!(!elems.is_empty());

        browser.close().await;
    }
}
