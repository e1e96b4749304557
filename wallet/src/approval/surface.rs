//! How a consent question is physically put in front of the user.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{POPUP_HEIGHT, POPUP_WIDTH};
use crate::Result;

use super::PendingRequest;

/// Window parameters for a consent popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupOptions {
    /// Always `"popup"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub focused: bool,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<u64>,
    pub url: String,
}

impl PopupOptions {
    /// The standard consent popup for a queued request.
    pub fn for_request(request: &PendingRequest) -> Self {
        Self {
            kind: "popup".to_string(),
            focused: true,
            width: POPUP_WIDTH,
            height: POPUP_HEIGHT,
            tab_id: None,
            url: format!("popup.html?requestId={}", request.id),
        }
    }
}

/// Opens and closes consent windows.
///
/// The queue calls `open` with at most one request on screen at a time
/// and `close` once that request has resolved. Implementations report a
/// window id when the host environment assigns one; the queue uses it to
/// map a user-initiated window close back to an implicit rejection.
#[async_trait]
pub trait ApprovalSurface: Send + Sync {
    /// Show the request. Returns the opened window's id, when there is one.
    async fn open(&self, request: &PendingRequest, options: PopupOptions) -> Result<Option<u64>>;

    /// Tear the window down. Closing an already-closed window is fine.
    async fn close(&self, window_id: u64) -> Result<()>;
}

/// A surface that shows nothing. For headless operation and tests that
/// drive the queue directly.
#[derive(Debug, Default)]
pub struct NullSurface;

#[async_trait]
impl ApprovalSurface for NullSurface {
    async fn open(&self, _request: &PendingRequest, _options: PopupOptions) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn close(&self, _window_id: u64) -> Result<()> {
        Ok(())
    }
}
