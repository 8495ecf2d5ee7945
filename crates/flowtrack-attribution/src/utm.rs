//! UTM campaign parameter capture

use crate::PageEnvironment;
use url::Url;

/// The five canonical campaign parameters, all optional.
///
/// Sparse by design: an absent key stays `None` and is never defaulted,
/// so downstream reporting can tell "no campaign" from "empty campaign".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UtmParams {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub term: Option<String>,
    pub content: Option<String>,
}

impl UtmParams {
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.medium.is_none()
            && self.campaign.is_none()
            && self.term.is_none()
            && self.content.is_none()
    }
}

/// Read the `utm_*` parameters from the current URL's query string.
///
/// Values are percent-decoded; the first occurrence of a duplicated key
/// wins; empty values count as absent. Without a parseable page URL the
/// result is entirely `None`.
pub fn utm_params(env: &dyn PageEnvironment) -> UtmParams {
    let mut params = UtmParams::default();

    let url = match env.current_url().and_then(|raw| Url::parse(&raw).ok()) {
        Some(url) => url,
        None => return params,
    };

    for (key, value) in url.query_pairs() {
        if value.is_empty() {
            continue;
        }
        let slot = match key.as_ref() {
            "utm_source" => &mut params.source,
            "utm_medium" => &mut params.medium,
            "utm_campaign" => &mut params.campaign,
            "utm_term" => &mut params.term,
            "utm_content" => &mut params.content,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    params
}
