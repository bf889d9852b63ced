//! Ruby block keyword detection for script lines.

use regex::Regex;
use std::sync::LazyLock;

pub const START_BLOCK_KEYWORDS: &[&str] = &["if", "unless", "case", "begin", "for", "until", "while"];
pub const MID_BLOCK_KEYWORDS: &[&str] = &["else", "elsif", "when", "rescue", "ensure", "in"];
const LOOP_KEYWORDS: &[&str] = &["for", "until", "while"];

static FIRST_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\S+)\s+").unwrap());
static BLOCK_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^-?\s*(?:(else|elsif|rescue|ensure|end|when|in)|(?:\w+(?:,\s*\w+)*\s*=\s*)?(if|begin|case|unless))\b")
        .unwrap()
});
static ANONYMOUS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdo\s*(\|\s*[^|]*\s*\|)?(\s*#.*)?\z").unwrap());

/// The block keyword a script line starts with, if any.
///
/// `x = if foo` counts as `if`.
pub fn block_keyword(text: &str) -> Option<&str> {
    if let Some(token) = FIRST_TOKEN.captures(text).and_then(|caps| caps.get(1))
        && LOOP_KEYWORDS.contains(&token.as_str())
    {
        return Some(token.as_str());
    }

    let caps = BLOCK_KEYWORD.captures(text)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
}

pub fn is_start_block(text: &str) -> bool {
    block_keyword(text).is_some_and(|keyword| START_BLOCK_KEYWORDS.contains(&keyword))
}

pub fn is_mid_block(text: &str) -> bool {
    block_keyword(text).is_some_and(|keyword| MID_BLOCK_KEYWORDS.contains(&keyword))
}

pub fn is_case(text: &str) -> bool {
    block_keyword(text) == Some("case")
}

/// Ends with `do`, `do |args|` and an optional comment.
pub fn is_anonymous_block(text: &str) -> bool {
    ANONYMOUS_BLOCK.is_match(text)
}

pub fn opens_block(text: &str) -> bool {
    is_anonymous_block(text) || is_start_block(text)
}
