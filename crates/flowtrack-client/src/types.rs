//! Wire types for the public forms endpoints

use chrono::{DateTime, Utc};
use flowtrack_attribution::TrackingData;
use flowtrack_forms::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of `POST /forms/public/{slug}/submit`.
///
/// `fields` carries exactly the schema's field keys, including fields the
/// visitor left empty; the server distinguishes "empty" from "missing".
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub fields: HashMap<String, FieldValue>,
    pub tracking: TrackingData,
    pub metadata: SubmissionMetadata,
}

/// Per-attempt metadata, assembled fresh alongside the tracking bundle.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    pub submitted_at: DateTime<Utc>,
    /// Schema revision the visitor actually saw.
    pub form_version: u32,
}

/// Server acknowledgement of an accepted submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmissionResult {
    pub success: bool,
    #[serde(default)]
    pub lead_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

/// Body of the fire-and-forget view beacon.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViewBeacon {
    pub utk: String,
}
