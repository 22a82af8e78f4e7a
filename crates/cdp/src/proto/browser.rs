//! Browser domain: connection-level lifecycle.

use serde::Serialize;

use super::{Command, Empty};

/// Ask the browser to shut down gracefully. First rung of the
/// shutdown ladder.
#[derive(Debug, Serialize)]
pub struct Close {}

impl Command for Close {
    const METHOD: &'static str = "Browser.close";
    type Response = Empty;
}
