//! Browser automation over the DevTools pipe.
//!
//! Launches a Chromium-family browser with `--remote-debugging-pipe`
//! and drives it over NUL-terminated JSON frames on a pair of OS pipes:
//! no debugging port, no socket, nothing another process on the machine
//! can connect to.
//!
//! The layering, bottom up:
//! - [`transport`]: process launch, pipe framing, escalating shutdown.
//! - [`client`]: request/response correlation and event demultiplexing
//!   over the single connection.
//! - [`registry`]: target lifecycle; one [`Tab`] identity per target.
//! - [`tab`] / [`elem`]: document snapshots, element search, and
//!   interaction with staleness detection.
//! - [`browser`]: the owning facade tying process and connection
//!   lifetimes together.
//!
//! ```no_run
//! use pipecdp::{Browser, Config};
//! use std::time::Duration;
//!
//! # async fn run() -> pipecdp::Result<()> {
//! let browser = Browser::start(Config::default()).await?;
//! let tab = browser.navigate("https://example.com", false, Duration::from_secs(10)).await?;
//! if let Some(heading) = tab.find_elem("h1").await? {
//!     println!("{:?}", heading.text().await?);
//! }
//! browser.close().await;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod client;
pub mod config;
pub mod elem;
pub mod error;
pub mod proto;
pub mod registry;
pub mod tab;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use browser::Browser;
pub use client::{CdpClient, EventCallback};
pub use config::Config;
pub use elem::Element;
pub use error::{CdpError, Result};
pub use proto::CdpEvent;
pub use registry::TargetRegistry;
pub use tab::Tab;
