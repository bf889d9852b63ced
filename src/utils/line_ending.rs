/// Split text into lines on `\r\n`, `\r` or `\n`.
///
/// Unlike [`str::lines`], a trailing line terminator yields a final empty
/// line, so `join_lines(&split_lines(text)) == text` for LF-only input.
pub fn split_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            }
            '\n' => lines.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    lines.push(current);
    lines
}

pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut result = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            result.push('\n');
        }
        result.push_str(line.as_ref());
    }
    result
}
