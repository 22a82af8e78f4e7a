//! Minimal end-to-end run: launch, navigate, read the heading, close.
//!
//! ```sh
//! cargo run --example quickstart -- https://example.com
//! ```

use std::time::Duration;

use pipecdp::{Browser, Config};

#[tokio::main]
async fn main() -> pipecdp::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipecdp=info".into()),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com".to_string());

    let browser = Browser::start(Config::default()).await?;
    tracing::info!(pid = ?browser.pid(), "browser up");

    let tab = browser.navigate(&url, false, Duration::from_secs(10)).await?;
    tracing::info!(url = %tab.url(), title = %tab.title(), "page loaded");

    if let Some(heading) = tab.find_elem("h1").await? {
        println!("h1: {}", heading.text().await?.unwrap_or_default());
    } else {
        println!("no h1 on this page");
    }

    browser.close().await;
    Ok(())
}
