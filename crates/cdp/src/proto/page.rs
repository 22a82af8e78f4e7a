//! Page domain: navigation and load signalling.

use serde::{Deserialize, Serialize};

use super::{Command, Empty};

#[derive(Debug, Serialize)]
pub struct Enable {}

impl Command for Enable {
    const METHOD: &'static str = "Page.enable";
    type Response = Empty;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigate {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResponse {
    pub frame_id: String,
    #[serde(default)]
    pub loader_id: Option<String>,
    /// Set when navigation was intercepted or failed outright.
    #[serde(default)]
    pub error_text: Option<String>,
}

impl Command for Navigate {
    const METHOD: &'static str = "Page.navigate";
    type Response = NavigateResponse;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadEventFired {
    pub timestamp: f64,
}
