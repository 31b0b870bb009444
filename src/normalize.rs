//! Text normalization for source posts. Pure, no I/O.
use once_cell::sync::Lazy;
use regex::Regex;

static AUTO_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https://t\.co/\w+").expect("valid auto-link pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Strip platform-generated `t.co` auto-links, collapse whitespace runs
/// (including newlines) to a single space, and trim.
///
/// Returns an empty string for input that is entirely noise; callers
/// must treat that as "skip this post."
pub fn normalize(raw: &str) -> String {
    let stripped = AUTO_LINK.replace_all(raw, "");
    let collapsed = WHITESPACE.replace_all(&stripped, " ");
    collapsed.trim().to_string()
}
