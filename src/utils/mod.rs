pub mod line_ending;

pub use line_ending::{join_lines, split_lines};

/// Trait for indentation-related string extensions
pub trait StrExt {
    /// Number of leading ASCII spaces
    fn leading_spaces(&self) -> usize;

    /// True when the string is empty or only whitespace
    fn is_blank(&self) -> bool;

    /// Byte index of the first non-whitespace character
    fn first_non_blank(&self) -> Option<usize>;
}

impl StrExt for str {
    fn leading_spaces(&self) -> usize {
        self.bytes().take_while(|&b| b == b' ').count()
    }

    fn is_blank(&self) -> bool {
        self.chars().all(char::is_whitespace)
    }

    fn first_non_blank(&self) -> Option<usize> {
        self.char_indices().find(|(_, c)| !c.is_whitespace()).map(|(i, _)| i)
    }
}

/// Shift a line by `delta` columns.
///
/// A positive delta prepends spaces. A negative delta removes up to `-delta`
/// leading spaces, never touching anything else on the line.
pub fn indent(line: &str, delta: isize) -> String {
    if delta >= 0 {
        let mut result = String::with_capacity(line.len() + delta.unsigned_abs());
        result.extend(std::iter::repeat_n(' ', delta.unsigned_abs()));
        result.push_str(line);
        result
    } else {
        let removable = line.leading_spaces().min(delta.unsigned_abs());
        line[removable..].to_string()
    }
}

/// Insert `text` right after the leading whitespace of `line`.
pub fn insert_after_indentation(line: &str, text: &str) -> String {
    let split = line.first_non_blank().unwrap_or(line.len());
    let mut result = String::with_capacity(line.len() + text.len());
    result.push_str(&line[..split]);
    result.push_str(text);
    result.push_str(&line[split..]);
    result
}

/// Two spaces per indentation level.
pub fn indentation(level: usize) -> String {
    "  ".repeat(level)
}
