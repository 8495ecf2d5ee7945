//! FlowTrack Embed Runtime
//!
//! Headless core of the embeddable lead-capture form: everything the
//! browser binding needs except the DOM itself. One [`FormEmbed`] is one
//! mounted form inside one iframe.
//!
//! Features:
//! - One-shot mount: schema fetch, inactive-form gate, rich-text
//!   sanitization before anything can render
//! - Submission state machine with exactly-once network submit
//! - Server rejection reconciliation back onto individual fields
//! - Batched iframe height reporting to the host page
//! - Fire-and-forget view beacon with the visitor key
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       FormEmbed                         │
//! │                                                         │
//! │  ┌──────────────────┐  ┌──────────────┐  ┌───────────┐  │
//! │  │    Submission    │  │    Resize    │  │   View    │  │
//! │  │    Controller    │  │    Bridge    │  │  Beacon   │  │
//! │  └────────┬─────────┘  └──────┬───────┘  └─────┬─────┘  │
//! │           │                   │                │        │
//! │  ┌────────▼───────────────────▼────────────────▼─────┐  │
//! │  │  Ports: FormsApi, PageEnvironment, FrameSink,     │  │
//! │  │         Navigator, LayoutProbe                    │  │
//! │  └───────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Every port is a trait, so the whole runtime runs under plain Tokio in
//! tests with in-memory adapters standing in for the page.

pub mod controller;
pub mod frame;
pub mod ports;
pub mod resize;

pub use controller::{EmbedEvent, SubmissionController, SubmitState, REDIRECT_DELAY};
pub use frame::{FrameMessage, WILDCARD_TARGET_ORIGIN};
pub use ports::{FrameSink, LayoutProbe, MemoryNavigator, MemorySink, Navigator, StaticProbe};
pub use resize::{LayoutSignal, ResizeBridge, FRAME_INTERVAL, MUTATION_DEBOUNCE, SETTLE_DELAY};

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use flowtrack_attribution::{visitor_key, PageEnvironment};
use flowtrack_client::{ApiError, FormSubmissionResult, FormsApi};
use flowtrack_forms::{sanitize_html, FieldError, FieldValue, FormSchema};

/// Embed session errors.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// The form exists but is switched off; render nothing.
    #[error("form is not accepting submissions")]
    FormInactive,

    #[error("form already loaded")]
    AlreadyLoaded,

    #[error("form not loaded yet")]
    NotLoaded,
}

pub type Result<T> = std::result::Result<T, EmbedError>;

/// Capacity of the layout signal channel. Signals are tiny and the
/// bridge drains fast; a full channel just backpressures the binding.
const LAYOUT_CHANNEL_CAPACITY: usize = 32;

/// One mounted form: schema fetch, submission controller, resize bridge
/// and view beacon glued together behind the host-facing ports.
pub struct FormEmbed {
    slug: String,
    api: Arc<dyn FormsApi>,
    env: Arc<dyn PageEnvironment>,
    sink: Arc<dyn FrameSink>,
    navigator: Arc<dyn Navigator>,
    probe: Arc<dyn LayoutProbe>,
    /// Mount claim, taken before the schema fetch so two interleaved
    /// `load()` calls cannot both mount.
    mounted: AtomicBool,
    controller: parking_lot::RwLock<Option<Arc<SubmissionController>>>,
    layout_tx: parking_lot::RwLock<Option<mpsc::Sender<LayoutSignal>>>,
    bridge: parking_lot::RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl FormEmbed {
    pub fn new(
        slug: impl Into<String>,
        api: Arc<dyn FormsApi>,
        env: Arc<dyn PageEnvironment>,
        sink: Arc<dyn FrameSink>,
        navigator: Arc<dyn Navigator>,
        probe: Arc<dyn LayoutProbe>,
    ) -> Self {
        Self {
            slug: slug.into(),
            api,
            env,
            sink,
            navigator,
            probe,
            mounted: AtomicBool::new(false),
            controller: parking_lot::RwLock::new(None),
            layout_tx: parking_lot::RwLock::new(None),
            bridge: parking_lot::RwLock::new(None),
        }
    }

    /// Mount the form.
    ///
    /// Fetches the schema exactly once, rejects inactive forms, sanitizes
    /// every rich-text setting before the binding can render it, fires
    /// the view beacon and starts the resize bridge. Any further call,
    /// including one racing the first, fails with
    /// [`EmbedError::AlreadyLoaded`]; the schema is never re-read for the
    /// lifetime of the mount. A failed mount releases the claim, so the
    /// host can retry after a fetch error or an inactive form.
    pub async fn load(&self) -> Result<()> {
        // Claim the mount before the first await; the check and the claim
        // must be one atomic step or two interleaved calls both pass
        if self
            .mounted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EmbedError::AlreadyLoaded);
        }

        match self.mount().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.mounted.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    async fn mount(&self) -> Result<()> {
        // Step 1: fetch and vet the schema
        let mut schema = self.api.fetch_schema(&self.slug).await?;
        if !schema.is_active {
            return Err(EmbedError::FormInactive);
        }

        // Step 2: sanitize rich content before anything can render it
        sanitize_settings(&mut schema);

        // Step 3: build the controller around the frozen schema
        let controller = Arc::new(SubmissionController::new(
            self.slug.clone(),
            Arc::new(schema),
            Arc::clone(&self.api),
            Arc::clone(&self.env),
            Arc::clone(&self.sink),
            Arc::clone(&self.navigator),
        ));
        *self.controller.write() = Some(controller);

        // Step 4: view beacon, fire and forget
        let utk = visitor_key(self.env.as_ref());
        let api = Arc::clone(&self.api);
        let slug = self.slug.clone();
        tokio::spawn(async move {
            api.record_view(&slug, &utk).await;
        });

        // Step 5: start the resize bridge
        let (tx, rx) = mpsc::channel(LAYOUT_CHANNEL_CAPACITY);
        let bridge = ResizeBridge::new(Arc::clone(&self.probe), Arc::clone(&self.sink), rx);
        *self.layout_tx.write() = Some(tx);
        *self.bridge.write() = Some(tokio::spawn(bridge.run()));

        info!("form '{}' mounted", self.slug);
        Ok(())
    }

    /// Unmount the form: stop the resize bridge, cancel any pending
    /// redirect, and drop the controller.
    ///
    /// The bridge is aborted rather than drained, so a sender clone still
    /// held by the binding cannot keep it alive; its sends fail from here
    /// on. Safe to call on an unloaded embed.
    pub async fn unmount(&self) {
        *self.layout_tx.write() = None;

        let handle = self.bridge.write().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }

        if let Some(controller) = self.controller.write().take() {
            controller.cancel_redirect();
        }
        self.mounted.store(false, Ordering::SeqCst);
        debug!("form '{}' unmounted", self.slug);
    }

    /// Sender the host binding feeds layout signals into. `None` before
    /// `load()` and after `unmount()`.
    pub fn layout_signals(&self) -> Option<mpsc::Sender<LayoutSignal>> {
        self.layout_tx.read().clone()
    }

    /// The mounted, sanitized schema.
    pub fn schema(&self) -> Result<Arc<FormSchema>> {
        Ok(self.controller()?.schema())
    }

    pub fn state(&self) -> Result<SubmitState> {
        Ok(self.controller()?.state())
    }

    pub fn set_value(&self, key: &str, value: impl Into<FieldValue>) -> Result<()> {
        self.controller()?.set_value(key, value);
        Ok(())
    }

    pub fn touch(&self, key: &str) -> Result<()> {
        self.controller()?.touch(key);
        Ok(())
    }

    pub async fn submit(&self) -> Result<SubmitState> {
        let controller = self.controller()?;
        Ok(controller.submit().await)
    }

    pub fn values(&self) -> Result<HashMap<String, FieldValue>> {
        Ok(self.controller()?.values())
    }

    pub fn field_errors(&self) -> Result<BTreeMap<String, FieldError>> {
        Ok(self.controller()?.field_errors())
    }

    pub fn request_error(&self) -> Result<Option<String>> {
        Ok(self.controller()?.request_error())
    }

    pub fn result(&self) -> Result<Option<FormSubmissionResult>> {
        Ok(self.controller()?.result())
    }

    pub fn subscribe(&self) -> Result<tokio::sync::broadcast::Receiver<EmbedEvent>> {
        Ok(self.controller()?.subscribe())
    }

    fn controller(&self) -> Result<Arc<SubmissionController>> {
        self.controller.read().clone().ok_or(EmbedError::NotLoaded)
    }
}

/// Sanitize every schema setting that reaches the page as markup.
fn sanitize_settings(schema: &mut FormSchema) {
    let settings = &mut schema.settings;
    if let Some(html) = settings.header_html.take() {
        settings.header_html = Some(sanitize_html(&html));
    }
    if let Some(html) = settings.description_html.take() {
        settings.description_html = Some(sanitize_html(&html));
    }
    settings.success_message = sanitize_html(&settings.success_message);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowtrack_attribution::MemoryPage;
    use flowtrack_client::{SubmissionPayload, Result as ApiResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    struct ScriptedApi {
        schema: Option<FormSchema>,
        redirect: Option<String>,
        fetches: AtomicUsize,
        views: AtomicUsize,
    }

    impl ScriptedApi {
        fn serving(schema: FormSchema) -> Self {
            Self {
                schema: Some(schema),
                redirect: None,
                fetches: AtomicUsize::new(0),
                views: AtomicUsize::new(0),
            }
        }

        fn not_found() -> Self {
            Self {
                schema: None,
                redirect: None,
                fetches: AtomicUsize::new(0),
                views: AtomicUsize::new(0),
            }
        }

        fn with_redirect(mut self, url: &str) -> Self {
            self.redirect = Some(url.to_string());
            self
        }
    }

    #[async_trait]
    impl FormsApi for ScriptedApi {
        async fn fetch_schema(&self, _slug: &str) -> ApiResult<FormSchema> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            // Yield once so concurrent callers interleave like a real
            // round-trip would
            tokio::task::yield_now().await;
            self.schema.clone().ok_or(ApiError::NotFound)
        }

        async fn submit(
            &self,
            _slug: &str,
            _payload: &SubmissionPayload,
        ) -> ApiResult<FormSubmissionResult> {
            Ok(FormSubmissionResult {
                success: true,
                lead_id: "lead_9".to_string(),
                message: "Got it".to_string(),
                redirect_url: self.redirect.clone(),
            })
        }

        async fn record_view(&self, _slug: &str, _utk: &str) {
            self.views.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn newsletter_schema() -> FormSchema {
        serde_json::from_value(json!({
            "slug": "newsletter",
            "version": 1,
            "fields": [
                {
                    "fieldKey": "email",
                    "label": "Email",
                    "fieldType": "EMAIL",
                    "isRequired": true,
                    "displayOrder": 0
                }
            ],
            "settings": {
                "headerHtml": "<h2>Join us</h2><script>steal()</script>",
                "successMessage": "<p onclick=\"x()\">Done</p>"
            },
            "isActive": true
        }))
        .unwrap()
    }

    fn embed_for(api: ScriptedApi) -> (Arc<FormEmbed>, Arc<ScriptedApi>, Arc<MemorySink>) {
        let api = Arc::new(api);
        let sink = Arc::new(MemorySink::new());
        let embed = Arc::new(FormEmbed::new(
            "newsletter",
            api.clone(),
            Arc::new(MemoryPage::new().with_url("https://example.com/blog")),
            sink.clone(),
            Arc::new(MemoryNavigator::new()),
            Arc::new(StaticProbe::new(480)),
        ));
        (embed, api, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_mounts_sanitizes_and_reports_height() {
        let (embed, api, sink) = embed_for(ScriptedApi::serving(newsletter_schema()));

        assert_ok!(embed.load().await);
        assert_eq!(embed.state().unwrap(), SubmitState::Idle);
        assert!(embed.layout_signals().is_some());

        let schema = embed.schema().unwrap();
        assert_eq!(
            schema.settings.header_html.as_deref(),
            Some("<h2>Join us</h2>")
        );
        assert_eq!(schema.settings.success_message, "<p>Done</p>");

        // Beacon task and settle report both run on the paused clock
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(api.views.load(Ordering::SeqCst), 1);
        assert!(sink
            .messages()
            .contains(&FrameMessage::Resize { height: 480 }));
    }

    #[tokio::test]
    async fn test_inactive_form_refuses_to_mount() {
        let mut schema = newsletter_schema();
        schema.is_active = false;
        let (embed, _api, _sink) = embed_for(ScriptedApi::serving(schema));

        assert!(matches!(embed.load().await, Err(EmbedError::FormInactive)));
        assert!(matches!(embed.state(), Err(EmbedError::NotLoaded)));
        // The refusal released the mount claim, so the answer stays
        // FormInactive rather than AlreadyLoaded
        assert!(matches!(embed.load().await, Err(EmbedError::FormInactive)));
    }

    #[tokio::test]
    async fn test_missing_form_surfaces_the_api_error() {
        let (embed, _api, _sink) = embed_for(ScriptedApi::not_found());

        assert!(matches!(
            embed.load().await,
            Err(EmbedError::Api(ApiError::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_failed_load_stays_retryable() {
        let (embed, api, _sink) = embed_for(ScriptedApi::not_found());

        assert!(matches!(
            embed.load().await,
            Err(EmbedError::Api(ApiError::NotFound))
        ));

        // A retry reaches the API again instead of tripping over a claim
        // left behind by the failed mount
        assert!(matches!(
            embed.load().await,
            Err(EmbedError::Api(ApiError::NotFound))
        ));
        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_load_is_rejected() {
        let (embed, api, _sink) = embed_for(ScriptedApi::serving(newsletter_schema()));

        assert_ok!(embed.load().await);
        assert!(matches!(embed.load().await, Err(EmbedError::AlreadyLoaded)));
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_mount_once() {
        let (embed, api, _sink) = embed_for(ScriptedApi::serving(newsletter_schema()));

        // Both calls start before either finishes its schema fetch; only
        // one may claim the mount
        let (first, second) = tokio::join!(embed.load(), embed.load());

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(EmbedError::AlreadyLoaded)))
                .count(),
            1
        );
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        // Give the spawned beacon a chance to run; it must fire once
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(api.views.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_operations_before_load_fail_cleanly() {
        let (embed, _api, _sink) = embed_for(ScriptedApi::serving(newsletter_schema()));

        assert_err!(embed.set_value("email", "a@b.com"));
        assert_err!(embed.submit().await);
        assert!(matches!(embed.schema(), Err(EmbedError::NotLoaded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_closes_the_signal_channel() {
        let (embed, _api, sink) = embed_for(ScriptedApi::serving(newsletter_schema()));
        assert_ok!(embed.load().await);

        let tx = embed.layout_signals().unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        let posted = sink.messages().len();

        embed.unmount().await;
        assert!(embed.layout_signals().is_none());
        assert!(tx.send(LayoutSignal::ContentResized).await.is_err());
        assert!(matches!(embed.state(), Err(EmbedError::NotLoaded)));
        assert_eq!(sink.messages().len(), posted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_pending_redirect() {
        let api = ScriptedApi::serving(newsletter_schema())
            .with_redirect("https://example.com/thanks");
        let navigator = Arc::new(MemoryNavigator::new());
        let embed = FormEmbed::new(
            "newsletter",
            Arc::new(api),
            Arc::new(MemoryPage::new().with_url("https://example.com/blog")),
            Arc::new(MemorySink::new()),
            navigator.clone(),
            Arc::new(StaticProbe::new(480)),
        );

        assert_ok!(embed.load().await);
        embed.set_value("email", "reader@example.com").unwrap();
        assert_eq!(embed.submit().await.unwrap(), SubmitState::Success);

        // Tear down while the redirect timer is still counting; the
        // navigation must never happen
        embed.unmount().await;
        tokio::time::sleep(REDIRECT_DELAY + Duration::from_millis(500)).await;
        assert!(navigator.navigated_to().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_submit_flow_through_the_embed() {
        let (embed, _api, sink) = embed_for(ScriptedApi::serving(newsletter_schema()));
        assert_ok!(embed.load().await);

        embed.set_value("email", "reader@example.com").unwrap();
        let state = embed.submit().await.unwrap();

        assert_eq!(state, SubmitState::Success);
        assert_eq!(embed.result().unwrap().unwrap().lead_id, "lead_9");
        assert!(sink.messages().iter().any(|m| matches!(
            m,
            FrameMessage::SubmitSuccess { lead_id, .. } if lead_id == "lead_9"
        )));
    }
}
