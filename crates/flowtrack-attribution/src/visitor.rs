//! Visitor identity cookie
//!
//! Submissions are attributed to a long-lived visitor key stored in the
//! `flowtrack_utk` cookie. The key is written once and then read verbatim
//! for every later visit; regeneration only happens when the cookie is
//! absent. Concurrent first visits can race the write, which costs an
//! attribution inaccuracy, not correctness.

use crate::PageEnvironment;
use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use tracing::debug;

/// Cookie holding the visitor key.
pub const UTK_COOKIE: &str = "flowtrack_utk";

const UTK_TTL_DAYS: i64 = 365;

/// Read the visitor key, generating and persisting one when absent.
///
/// The default key is a millisecond timestamp in base36 plus a short
/// random suffix: unique enough for attribution and deliberately cheaper
/// than a UUID. Callers that need collision resistance use
/// [`strong_visitor_key`].
pub fn visitor_key(env: &dyn PageEnvironment) -> String {
    if let Some(existing) = read_existing(env) {
        return existing;
    }
    let key = generate_key();
    persist(env, &key);
    key
}

/// UUID v4 variant of [`visitor_key`] for callers that reuse the key as a
/// primary identifier.
pub fn strong_visitor_key(env: &dyn PageEnvironment) -> String {
    if let Some(existing) = read_existing(env) {
        return existing;
    }
    let key = uuid::Uuid::new_v4().to_string();
    persist(env, &key);
    key
}

fn read_existing(env: &dyn PageEnvironment) -> Option<String> {
    env.cookie(UTK_COOKIE).filter(|v| !v.is_empty())
}

fn persist(env: &dyn PageEnvironment, key: &str) {
    let expires = (Utc::now() + Duration::days(UTK_TTL_DAYS)).format("%a, %d %b %Y %H:%M:%S GMT");
    env.set_cookie(&format!(
        "{}={}; Expires={}; Path=/; SameSite=Lax",
        UTK_COOKIE, key, expires
    ));
    debug!("issued new visitor key");
}

fn generate_key() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{}.{}", to_base36(millis), suffix.to_lowercase())
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize] as char);
        n /= 36;
    }
    out.iter().rev().collect()
}
