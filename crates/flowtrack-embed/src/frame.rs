//! Cross-frame messaging protocol
//!
//! The embed renders inside an iframe on a page it does not control. These
//! are the only messages it ever posts upward. Both go to the wildcard
//! origin: the host snippet is pasted into arbitrary sites, so the embed
//! cannot know the parent origin ahead of time, and neither message
//! carries anything sensitive.

use serde::{Deserialize, Serialize};

/// Target origin for every parent post.
pub const WILDCARD_TARGET_ORIGIN: &str = "*";

/// Messages posted to the embedding page.
///
/// The `type` tag is namespaced so host pages listening for unrelated
/// `message` events can filter cheaply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FrameMessage {
    /// Fresh content height in CSS pixels; the host snippet resizes the
    /// iframe to match.
    #[serde(rename = "flowtrack:resize")]
    Resize { height: u32 },

    /// Posted once, after the server accepts a submission.
    #[serde(rename = "flowtrack:submit:success")]
    SubmitSuccess {
        #[serde(rename = "leadId")]
        lead_id: String,
        message: String,
    },
}

// ============================================================================
// Tests
// ============================================================================
