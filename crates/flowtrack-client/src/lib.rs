//! FlowTrack Public Forms API Client
//!
//! Async client for the three unauthenticated endpoints an embedded form
//! talks to: schema fetch, submission, and the view beacon. Submission is
//! a single attempt with no retries; the embed's exactly-once guarantee
//! depends on that.
//!
//! # Example
//!
//! ```rust,no_run
//! use flowtrack_client::FormsClient;
//!
//! # async fn run() -> flowtrack_client::Result<()> {
//! let client = FormsClient::new("https://api.flowtrack.io");
//! let schema = client.fetch_schema("newsletter").await?;
//! println!("{} fields", schema.fields.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod types;

pub use error::{ApiError, Result, ServerFieldError};
pub use types::{FormSubmissionResult, SubmissionMetadata, SubmissionPayload, ViewBeacon};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowtrack_forms::FormSchema;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Client version reported in the user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.flowtrack.io";

/// Default per-request timeout. Submission is exactly-once, so a hung
/// request has to resolve into a visible failure instead of waiting
/// forever.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`FormsClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Async client for the public forms endpoints. Cheap to clone.
#[derive(Clone)]
pub struct FormsClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    http: reqwest::Client,
}

impl FormsClient {
    /// Create a client against the given API origin.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_config(ClientConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    /// Create a client with custom configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&format!("flowtrack-embed/{}", VERSION))
                .expect("Invalid user agent"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            inner: Arc::new(ClientInner { config, http }),
        }
    }

    /// `GET /forms/public/{slug}`: fetch the published schema.
    pub async fn fetch_schema(&self, slug: &str) -> Result<FormSchema> {
        let url = self.endpoint(slug, None);
        let response = self
            .inner
            .http
            .get(&url)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            return Err(failure(response).await);
        }

        response
            .json::<FormSchema>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// `POST /forms/public/{slug}/submit`: one attempt, no retries.
    ///
    /// A 400 carrying the structured `errors` array becomes
    /// [`ApiError::Validation`]; a 400 without it is treated as a plain
    /// request failure.
    pub async fn submit(
        &self,
        slug: &str,
        payload: &SubmissionPayload,
    ) -> Result<FormSubmissionResult> {
        let url = self.endpoint(slug, Some("submit"));
        let response = self
            .inner
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let body = response.bytes().await.unwrap_or_default();

            #[derive(Deserialize)]
            struct ValidationBody {
                errors: Vec<ServerFieldError>,
            }

            return match serde_json::from_slice::<ValidationBody>(&body) {
                Ok(parsed) if !parsed.errors.is_empty() => Err(ApiError::Validation(parsed.errors)),
                _ => Err(ApiError::Status {
                    status: 400,
                    message: extract_message(&body),
                }),
            };
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            return Err(failure(response).await);
        }

        response
            .json::<FormSubmissionResult>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// `POST /forms/public/{slug}/view`: fire-and-forget analytics
    /// beacon. Failures are logged and swallowed; a lost view count must
    /// never affect the visitor.
    pub async fn record_view(&self, slug: &str, utk: &str) {
        let url = self.endpoint(slug, Some("view"));
        let body = ViewBeacon {
            utk: utk.to_string(),
        };

        match self.inner.http.post(&url).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                debug!("view beacon rejected: status {}", response.status());
            }
            Ok(_) => {}
            Err(e) => {
                debug!("view beacon failed: {}", e);
            }
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn endpoint(&self, slug: &str, action: Option<&str>) -> String {
        let base = self.inner.config.base_url.trim_end_matches('/');
        match action {
            Some(action) => format!("{}/forms/public/{}/{}", base, slug, action),
            None => format!("{}/forms/public/{}", base, slug),
        }
    }
}

/// The surface the embed runtime needs from the API. [`FormsClient`] is
/// the production implementation; tests substitute in-process fakes.
#[async_trait]
pub trait FormsApi: Send + Sync {
    async fn fetch_schema(&self, slug: &str) -> Result<FormSchema>;
    async fn submit(&self, slug: &str, payload: &SubmissionPayload)
        -> Result<FormSubmissionResult>;
    async fn record_view(&self, slug: &str, utk: &str);
}

#[async_trait]
impl FormsApi for FormsClient {
    async fn fetch_schema(&self, slug: &str) -> Result<FormSchema> {
        self.fetch_schema(slug).await
    }

    async fn submit(
        &self,
        slug: &str,
        payload: &SubmissionPayload,
    ) -> Result<FormSubmissionResult> {
        self.submit(slug, payload).await
    }

    async fn record_view(&self, slug: &str, utk: &str) {
        self.record_view(slug, utk).await
    }
}

fn map_send_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Http(e)
    }
}

async fn failure(response: reqwest::Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.bytes().await.unwrap_or_default();
    ApiError::Status {
        status,
        message: extract_message(&body),
    }
}

fn extract_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ApiMessage {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_slice::<ApiMessage>(body) {
        if let Some(message) = parsed.message.or(parsed.error) {
            return message;
        }
    }
    String::from_utf8_lossy(body).trim().to_string()
}
