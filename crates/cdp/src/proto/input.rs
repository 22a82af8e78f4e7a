//! Input domain: synthetic pointer and keyboard events.

use serde::{Deserialize, Serialize};

use super::{Command, Empty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    None,
    Left,
    Middle,
    Right,
    Back,
    Forward,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMouseEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub x: f64,
    pub y: f64,
    pub button: MouseButton,
    pub click_count: i64,
}

impl DispatchMouseEvent {
    pub fn pressed(x: f64, y: f64, button: MouseButton, click_count: i64) -> Self {
        Self {
            kind: "mousePressed",
            x,
            y,
            button,
            click_count,
        }
    }

    pub fn released(x: f64, y: f64, button: MouseButton, click_count: i64) -> Self {
        Self {
            kind: "mouseReleased",
            x,
            y,
            button,
            click_count,
        }
    }
}

impl Command for DispatchMouseEvent {
    const METHOD: &'static str = "Input.dispatchMouseEvent";
    type Response = Empty;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertText {
    pub text: String,
}

impl Command for InsertText {
    const METHOD: &'static str = "Input.insertText";
    type Response = Empty;
}
