//! Submission state machine
//!
//! One controller per mounted form. It owns the value map, runs client
//! validation, performs the single network submit, and folds server
//! rejections back into per-field errors.
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!                    ▼                              │ edit
//!   Idle ──▶ Validating ──▶ Submitting ──▶ Success  │
//!              │                 │                  │
//!              │ invalid         ├──▶ FieldError ───┤
//!              ▼                 │                  │
//!            Idle                └──▶ RequestError ─┘
//! ```
//!
//! `Success` is terminal for the instance. `FieldError` and
//! `RequestError` collapse back to `Idle` on the next edit, and a fresh
//! `submit()` is allowed from either.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use flowtrack_attribution::{self as attribution, PageEnvironment};
use flowtrack_client::{
    ApiError, FormSubmissionResult, FormsApi, ServerFieldError, SubmissionMetadata,
    SubmissionPayload,
};
use flowtrack_forms::{initial_values, validate_form, FieldError, FieldValue, FormSchema};

use crate::frame::{FrameMessage, WILDCARD_TARGET_ORIGIN};
use crate::ports::{FrameSink, Navigator};

/// Pause between an accepted submission and the optional redirect, long
/// enough for the visitor to read the success message.
pub const REDIRECT_DELAY: Duration = Duration::from_millis(1500);

/// Submission lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Success,
    FieldError,
    RequestError,
}

/// Controller events for UI binding.
#[derive(Clone, Debug, Serialize)]
pub enum EmbedEvent {
    StateChanged(SubmitState),
    ValidationFailed { errors: BTreeMap<String, FieldError> },
    Submitted { result: FormSubmissionResult },
    SubmitFailed { message: String },
}

/// Submission state machine for one mounted form.
pub struct SubmissionController {
    slug: String,
    schema: Arc<FormSchema>,
    api: Arc<dyn FormsApi>,
    env: Arc<dyn PageEnvironment>,
    sink: Arc<dyn FrameSink>,
    navigator: Arc<dyn Navigator>,
    state: parking_lot::RwLock<SubmitState>,
    values: parking_lot::RwLock<HashMap<String, FieldValue>>,
    touched: parking_lot::RwLock<HashSet<String>>,
    field_errors: parking_lot::RwLock<BTreeMap<String, FieldError>>,
    request_error: parking_lot::RwLock<Option<String>>,
    result: parking_lot::RwLock<Option<FormSubmissionResult>>,
    redirect_task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    event_tx: tokio::sync::broadcast::Sender<EmbedEvent>,
}

impl SubmissionController {
    pub fn new(
        slug: impl Into<String>,
        schema: Arc<FormSchema>,
        api: Arc<dyn FormsApi>,
        env: Arc<dyn PageEnvironment>,
        sink: Arc<dyn FrameSink>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (event_tx, _) = tokio::sync::broadcast::channel(100);
        let values = initial_values(&schema.fields);

        Self {
            slug: slug.into(),
            schema,
            api,
            env,
            sink,
            navigator,
            state: parking_lot::RwLock::new(SubmitState::Idle),
            values: parking_lot::RwLock::new(values),
            touched: parking_lot::RwLock::new(HashSet::new()),
            field_errors: parking_lot::RwLock::new(BTreeMap::new()),
            request_error: parking_lot::RwLock::new(None),
            result: parking_lot::RwLock::new(None),
            redirect_task: parking_lot::Mutex::new(None),
            event_tx,
        }
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Record user input for a field.
    ///
    /// Clears any error on that field and collapses a failed submit state
    /// back to `Idle`. Keys outside the schema are dropped, so the payload
    /// can never grow fields the form does not define.
    pub fn set_value(&self, key: &str, value: impl Into<FieldValue>) {
        if self.schema.field(key).is_none() {
            debug!("ignoring value for unknown field '{}'", key);
            return;
        }
        self.values.write().insert(key.to_string(), value.into());
        self.touched.write().insert(key.to_string());
        self.field_errors.write().remove(key);

        let state = self.state();
        if state == SubmitState::FieldError || state == SubmitState::RequestError {
            *self.request_error.write() = None;
            self.set_state(SubmitState::Idle);
        }
    }

    /// Mark a field as touched without changing its value (blur).
    pub fn touch(&self, key: &str) {
        self.touched.write().insert(key.to_string());
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Run one submission attempt end to end and return the state it
    /// lands in.
    ///
    /// Client validation always completes before any network activity; an
    /// invalid form never leaves the page. Calls while a request is in
    /// flight, or after success, are ignored.
    pub async fn submit(&self) -> SubmitState {
        // Guard and transition under one lock so two concurrent calls
        // cannot both pass the in-flight check
        {
            let mut state = self.state.write();
            match *state {
                SubmitState::Submitting => {
                    debug!("submit ignored: request already in flight");
                    return SubmitState::Submitting;
                }
                SubmitState::Success => {
                    debug!("submit ignored: form already submitted");
                    return SubmitState::Success;
                }
                _ => *state = SubmitState::Validating,
            }
        }
        self.emit_event(EmbedEvent::StateChanged(SubmitState::Validating));
        *self.request_error.write() = None;

        // Step 1: full client-side validation pass
        let errors = {
            let values = self.values.read();
            validate_form(&self.schema.fields, &values)
        };
        if !errors.is_empty() {
            debug!("validation failed on {} field(s)", errors.len());
            self.mark_all_touched();
            *self.field_errors.write() = errors.clone();
            self.set_state(SubmitState::Idle);
            self.emit_event(EmbedEvent::ValidationFailed { errors });
            return SubmitState::Idle;
        }

        // Step 2: assemble the payload with attribution read at submit
        // time, not mount time
        let payload = SubmissionPayload {
            fields: self.values.read().clone(),
            tracking: attribution::collect(self.env.as_ref()),
            metadata: SubmissionMetadata {
                submitted_at: Utc::now(),
                form_version: self.schema.version,
            },
        };

        // Step 3: exactly one network call per accepted attempt
        self.set_state(SubmitState::Submitting);
        match self.api.submit(&self.slug, &payload).await {
            Ok(result) => self.accept(result),
            Err(ApiError::Validation(server_errors)) => self.reject_fields(server_errors),
            Err(err) => self.reject_request(err),
        }
    }

    fn accept(&self, result: FormSubmissionResult) -> SubmitState {
        info!("submission accepted: lead '{}'", result.lead_id);
        self.field_errors.write().clear();
        *self.result.write() = Some(result.clone());
        self.set_state(SubmitState::Success);
        self.emit_event(EmbedEvent::Submitted {
            result: result.clone(),
        });

        self.sink.post_to_parent(
            &FrameMessage::SubmitSuccess {
                lead_id: result.lead_id.clone(),
                message: result.message.clone(),
            },
            WILDCARD_TARGET_ORIGIN,
        );

        if let Some(url) = result.redirect_url {
            self.schedule_redirect(url);
        }
        SubmitState::Success
    }

    fn reject_fields(&self, server_errors: Vec<ServerFieldError>) -> SubmitState {
        warn!("server rejected {} field(s)", server_errors.len());
        self.mark_all_touched();
        {
            // Server verdicts win over anything already on the same key
            let mut errors = self.field_errors.write();
            for err in server_errors {
                errors.insert(
                    err.field,
                    FieldError {
                        message: err.message,
                        code: err.code,
                    },
                );
            }
        }
        self.set_state(SubmitState::FieldError);
        self.emit_event(EmbedEvent::ValidationFailed {
            errors: self.field_errors.read().clone(),
        });
        SubmitState::FieldError
    }

    fn reject_request(&self, err: ApiError) -> SubmitState {
        warn!("submission failed: {}", err);
        let message = err.user_message();
        *self.request_error.write() = Some(message.clone());
        self.set_state(SubmitState::RequestError);
        self.emit_event(EmbedEvent::SubmitFailed { message });
        SubmitState::RequestError
    }

    fn schedule_redirect(&self, url: String) {
        let navigator = Arc::clone(&self.navigator);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(REDIRECT_DELAY).await;
            debug!("redirecting to '{}'", url);
            navigator.navigate(&url);
        });
        *self.redirect_task.lock() = Some(handle);
    }

    /// Abort a scheduled post-success redirect. The embed session calls
    /// this on unmount; a no-op when nothing is pending.
    pub fn cancel_redirect(&self) {
        if let Some(handle) = self.redirect_task.lock().take() {
            handle.abort();
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> SubmitState {
        *self.state.read()
    }

    pub fn schema(&self) -> Arc<FormSchema> {
        Arc::clone(&self.schema)
    }

    pub fn values(&self) -> HashMap<String, FieldValue> {
        self.values.read().clone()
    }

    pub fn value(&self, key: &str) -> Option<FieldValue> {
        self.values.read().get(key).cloned()
    }

    pub fn field_errors(&self) -> BTreeMap<String, FieldError> {
        self.field_errors.read().clone()
    }

    pub fn request_error(&self) -> Option<String> {
        self.request_error.read().clone()
    }

    pub fn result(&self) -> Option<FormSubmissionResult> {
        self.result.read().clone()
    }

    pub fn is_touched(&self, key: &str) -> bool {
        self.touched.read().contains(key)
    }

    /// Subscribe to controller events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EmbedEvent> {
        self.event_tx.subscribe()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn mark_all_touched(&self) {
        let mut touched = self.touched.write();
        for field in &self.schema.fields {
            touched.insert(field.field_key.clone());
        }
    }

    fn set_state(&self, state: SubmitState) {
        *self.state.write() = state;
        self.emit_event(EmbedEvent::StateChanged(state));
    }

    fn emit_event(&self, event: EmbedEvent) {
        let _ = self.event_tx.send(event);
    }
}

// ============================================================================
// Tests
// ============================================================================
