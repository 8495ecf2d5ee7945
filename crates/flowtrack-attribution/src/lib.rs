//! FlowTrack Visitor Attribution
//!
//! Ties public form submissions back to the visitor and the campaign that
//! brought them: a long-lived visitor key cookie, the canonical `utm_*`
//! query parameters, and the page context at submission time.
//!
//! Ambient page access goes through the [`PageEnvironment`] port so the
//! collectors run identically under a real browser binding and in headless
//! tests (backed by [`MemoryPage`]).

pub mod utm;
pub mod visitor;

pub use utm::{utm_params, UtmParams};
pub use visitor::{strong_visitor_key, visitor_key, UTK_COOKIE};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

// =============================================================================
// Page environment port
// =============================================================================

/// Ambient page context the collectors read from and write to.
///
/// A browser binding backs this with `document.cookie`, `location`,
/// `document.referrer` and `navigator.userAgent`; headless hosts and tests
/// use [`MemoryPage`]. All methods are best-effort: `None` means the
/// context has nothing to offer, never an error.
pub trait PageEnvironment: Send + Sync {
    /// Read a cookie value by name.
    fn cookie(&self, name: &str) -> Option<String>;
    /// Write a cookie given a full `name=value; attributes` string.
    fn set_cookie(&self, cookie: &str);
    /// The page's current URL.
    fn current_url(&self) -> Option<String>;
    fn referrer(&self) -> Option<String>;
    fn user_agent(&self) -> Option<String>;
}

/// In-memory [`PageEnvironment`] adapter.
#[derive(Default)]
pub struct MemoryPage {
    cookies: RwLock<HashMap<String, String>>,
    cookie_writes: RwLock<Vec<String>>,
    url: RwLock<Option<String>>,
    referrer: Option<String>,
    user_agent: Option<String>,
}

impl MemoryPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(self, url: impl Into<String>) -> Self {
        *self.url.write() = Some(url.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Simulate navigation.
    pub fn set_url(&self, url: impl Into<String>) {
        *self.url.write() = Some(url.into());
    }

    /// Raw cookie strings passed to [`PageEnvironment::set_cookie`], in
    /// order. Lets tests assert on attributes the cookie map drops.
    pub fn cookie_writes(&self) -> Vec<String> {
        self.cookie_writes.read().clone()
    }
}

impl PageEnvironment for MemoryPage {
    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.read().get(name).cloned()
    }

    fn set_cookie(&self, cookie: &str) {
        self.cookie_writes.write().push(cookie.to_string());
        // Store the name=value pair the way document.cookie would
        let pair = cookie.split(';').next().unwrap_or(cookie);
        if let Some((name, value)) = pair.split_once('=') {
            self.cookies
                .write()
                .insert(name.trim().to_string(), value.trim().to_string());
        }
    }

    fn current_url(&self) -> Option<String> {
        self.url.read().clone()
    }

    fn referrer(&self) -> Option<String> {
        self.referrer.clone()
    }

    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }
}

// =============================================================================
// Tracking bundle
// =============================================================================

/// Attribution bundle attached to every submission.
///
/// Assembled fresh per attempt; nothing here is cached between submits.
/// The `utm_*` keys keep their canonical snake_case names on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingData {
    #[serde(default)]
    pub utk: String,
    #[serde(rename = "utm_source", skip_serializing_if = "Option::is_none", default)]
    pub utm_source: Option<String>,
    #[serde(rename = "utm_medium", skip_serializing_if = "Option::is_none", default)]
    pub utm_medium: Option<String>,
    #[serde(rename = "utm_campaign", skip_serializing_if = "Option::is_none", default)]
    pub utm_campaign: Option<String>,
    #[serde(rename = "utm_term", skip_serializing_if = "Option::is_none", default)]
    pub utm_term: Option<String>,
    #[serde(rename = "utm_content", skip_serializing_if = "Option::is_none", default)]
    pub utm_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub page_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_agent: Option<String>,
}

/// Assemble the full attribution bundle for one submission attempt.
///
/// Everything is read fresh from the environment; the only persisted piece
/// is the visitor key, which [`visitor_key`] creates on first contact.
pub fn collect(env: &dyn PageEnvironment) -> TrackingData {
    let utm = utm_params(env);
    let page_url = env.current_url();
    let page_path = page_url
        .as_deref()
        .and_then(|raw| Url::parse(raw).ok())
        .map(|u| u.path().to_string());

    TrackingData {
        utk: visitor_key(env),
        utm_source: utm.source,
        utm_medium: utm.medium,
        utm_campaign: utm.campaign,
        utm_term: utm.term,
        utm_content: utm.content,
        referrer: env.referrer(),
        page_url,
        page_path,
        user_agent: env.user_agent(),
    }
}
