//! Markup stripping for submitted text.
//!
//! This is a blocklist, not an HTML parser: entities are left encoded and
//! malformed markup is only removed when it still looks like `<...>`.

use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid script block regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Remove `<script>` blocks (any casing) and then every remaining tag.
pub fn sanitize(text: &str) -> String {
    let without_scripts = SCRIPT_BLOCK_RE.replace_all(text, "");
    TAG_RE.replace_all(&without_scripts, "").into_owned()
}
