//! Mobile UI automation driver contract.

use async_trait::async_trait;

use crate::error::Result;

/// Element lookup strategies the walker uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum By {
    Xpath,
    Id,
}

/// One element lookup: a strategy plus its selector value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub by: By,
    pub value: String,
}

impl Locator {
    pub fn xpath(value: &str) -> Self {
        Self {
            by: By::Xpath,
            value: value.to_string(),
        }
    }

    pub fn id(value: &str) -> Self {
        Self {
            by: By::Id,
            value: value.to_string(),
        }
    }
}

/// Geometry and text of a located element, in screen coordinates.
#[derive(Debug, Clone, Default)]
pub struct UiElement {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub text: String,
}

/// Abstraction over the mobile automation server.
///
/// The walker needs exactly four capabilities: locate an element, click it,
/// capture its on-screen region, and tap at absolute coordinates.
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// Look an element up; `Ok(None)` when it is not on screen. Absence is
    /// an expected probe outcome, not an error.
    async fn find(&self, locator: &Locator) -> Result<Option<UiElement>>;

    /// Click an element. Returns whether it was found and clicked.
    async fn click(&self, locator: &Locator) -> Result<bool>;

    /// PNG screenshot of the element's on-screen region.
    async fn screenshot(&self, locator: &Locator) -> Result<Vec<u8>>;

    /// Tap at absolute screen coordinates.
    async fn tap(&self, x: i64, y: i64) -> Result<()>;
}
