//! Rich content sanitization
//!
//! Form headers, descriptions and success messages are authored in the
//! builder and stored server-side; by the time they reach an embed on a
//! third-party page they are untrusted. The sanitizer keeps a small
//! allow-list of inline formatting and strips everything else before the
//! content is handed to a renderer.

use regex::Regex;

/// Tags that survive sanitization. Everything else is unwrapped to its
/// text content.
const ALLOWED_TAGS: &[&str] = &[
    "a", "b", "br", "em", "h1", "h2", "h3", "h4", "i", "li", "ol", "p", "span", "strong", "u",
    "ul",
];

/// Tags whose entire body is dropped, not just the markup.
const DROP_WITH_BODY: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "form", "svg", "noscript", "textarea",
];

/// Reduce untrusted HTML to allow-listed formatting.
///
/// - comments and `<script>`/`<style>`-like elements vanish with their body
/// - unknown tags are unwrapped, their text content kept
/// - all attributes are dropped except a scheme-checked `href` on `<a>`
pub fn sanitize_html(input: &str) -> String {
    let mut out = strip_comments(input);
    out = strip_dangerous_elements(&out);
    rebuild_tags(&out)
}

fn strip_comments(input: &str) -> String {
    match Regex::new(r"(?s)<!--.*?-->") {
        Ok(re) => re.replace_all(input, "").to_string(),
        Err(_) => input.to_string(),
    }
}

fn strip_dangerous_elements(input: &str) -> String {
    let mut out = input.to_string();

    // Paired elements go first so their body disappears with them
    for tag in DROP_WITH_BODY {
        let pattern = format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>", tag = tag);
        if let Ok(re) = Regex::new(&pattern) {
            out = re.replace_all(&out, "").to_string();
        }
    }

    // Leftover unpaired or structural tags lose their markup only
    let leftover = r"(?i)</?(script|style|iframe|object|embed|form|svg|noscript|textarea|link|meta|base|title|head|body|html)\b[^>]*>";
    if let Ok(re) = Regex::new(leftover) {
        out = re.replace_all(&out, "").to_string();
    }

    out
}

fn rebuild_tags(input: &str) -> String {
    let tag_re = match Regex::new(r"(?s)</?([a-zA-Z][a-zA-Z0-9]*)[^>]*>") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };

    tag_re
        .replace_all(input, |caps: &regex::Captures| {
            let raw = &caps[0];
            let name = caps[1].to_lowercase();

            if !ALLOWED_TAGS.contains(&name.as_str()) {
                // Unwrap: drop the markup, keep whatever it contained
                return String::new();
            }

            if raw.starts_with("</") {
                return format!("</{}>", name);
            }

            if name == "a" {
                if let Some(href) = extract_href(raw) {
                    if safe_href(&href) {
                        return format!(r#"<a href="{}">"#, href.replace('"', "&quot;"));
                    }
                }
                return "<a>".to_string();
            }

            format!("<{}>", name)
        })
        .to_string()
}

fn extract_href(tag: &str) -> Option<String> {
    let re = Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).ok()?;
    let caps = re.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().trim().to_string())
}

fn safe_href(href: &str) -> bool {
    // Whitespace and control characters can smuggle a scheme past a
    // prefix check ("jav\nascript:"), so compare against a compacted copy
    let compact: String = href
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_lowercase();

    compact.starts_with("http://")
        || compact.starts_with("https://")
        || compact.starts_with("mailto:")
}
