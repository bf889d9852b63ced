//! `#{...}` interpolation scanning.

/// One balanced interpolation found in a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolation {
    /// Byte offset of the first code character, right after `#{`
    pub start: usize,
    /// Code between the braces, not trimmed
    pub code: String,
}

/// Number of backslashes immediately before byte `pos`.
fn escapes_before(bytes: &[u8], pos: usize) -> usize {
    bytes[..pos].iter().rev().take_while(|&&b| b == b'\\').count()
}

/// Byte offset of the `}` closing a brace opened right before `from`.
fn closing_brace(text: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in text[from..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(from + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Find every `#{...}` in `text`.
///
/// An interpolation preceded by an odd number of backslashes is escaped and
/// skipped. Scanning stops at the first unbalanced opening.
pub fn scan_interpolations(text: &str) -> Vec<Interpolation> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find("#{") {
        let hash = pos + offset;
        let code_start = hash + 2;
        if escapes_before(bytes, hash) % 2 == 1 {
            pos = code_start;
            continue;
        }
        let Some(close) = closing_brace(text, code_start) else {
            break;
        };
        found.push(Interpolation {
            start: code_start,
            code: text[code_start..close].to_string(),
        });
        pos = close + 1;
    }

    found
}

pub fn contains_interpolation(text: &str) -> bool {
    !scan_interpolations(text).is_empty()
}

/// Turn interpolated text into the quoted Ruby string a HAML compiler would
/// hand to the tree. Literal parts get their quotes escaped, interpolations
/// are kept verbatim.
pub fn to_string_script(text: &str) -> String {
    let mut script = String::with_capacity(text.len() + 2);
    script.push('"');
    let mut literal_start = 0;
    for interpolation in scan_interpolations(text) {
        let hash = interpolation.start - 2;
        push_escaped(&mut script, &text[literal_start..hash]);
        script.push_str("#{");
        script.push_str(&interpolation.code);
        script.push('}');
        literal_start = interpolation.start + interpolation.code.len() + 1;
    }
    push_escaped(&mut script, &text[literal_start..]);
    script.push('"');
    script
}

fn push_escaped(out: &mut String, literal: &str) {
    for c in literal.chars() {
        if c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_finds_offsets() {
        let line = "hello #{foo(bar , 42)} world #{zee(:a =>  5)}!!";
        let found = scan_interpolations(line);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].code, "foo(bar , 42)");
        assert_eq!(&line[found[0].start..found[0].start + 13], "foo(bar , 42)");
        assert_eq!(found[1].code, "zee(:a =>  5)");
    }

    #[test]
    fn test_escaped_interpolation_is_skipped() {
        assert!(scan_interpolations(r"a \#{nope} b").is_empty());
        let found = scan_interpolations(r"a \\#{yes} b");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, "yes");
    }

    #[test]
    fn test_nested_braces_balance() {
        let found = scan_interpolations("x #{h.map { |k| k }} y");
        assert_eq!(found[0].code, "h.map { |k| k }");
    }

    #[test]
    fn test_unbalanced_stops() {
        assert!(scan_interpolations("x #{oops").is_empty());
    }

    #[test]
    fn test_to_string_script() {
        assert_eq!(to_string_script(r#"say "hi" #{name}"#), r#""say \"hi\" #{name}""#);
    }
}
