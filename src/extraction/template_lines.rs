use crate::utils::{StrExt, indent};
use std::ops::RangeInclusive;

/// Template lines being corrected, with a lock flag per line.
///
/// Locked lines were already rewritten by a correction and are left alone by
/// later indentation shifts. Flags move with their lines on insert and
/// removal.
#[derive(Debug, Clone, Default)]
pub struct TemplateLines {
    lines: Vec<String>,
    locked: Vec<bool>,
}

impl TemplateLines {
    pub fn new(lines: Vec<String>) -> Self {
        let locked = vec![false; lines.len()];
        Self { lines, locked }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_locked(&self, index: usize) -> bool {
        self.locked.get(index).copied().unwrap_or(false)
    }

    pub fn set(&mut self, index: usize, line: String) {
        if let Some(slot) = self.lines.get_mut(index) {
            *slot = line;
        }
    }

    pub fn insert(&mut self, index: usize, line: String) {
        let index = index.min(self.lines.len());
        self.lines.insert(index, line);
        self.locked.insert(index, false);
    }

    pub fn remove(&mut self, index: usize) {
        if index < self.lines.len() {
            self.lines.remove(index);
            self.locked.remove(index);
        }
    }

    /// Replace `start..end` (clamped) with `replacement`, unlocked.
    pub fn splice(&mut self, start: usize, end: usize, replacement: Vec<String>) {
        let start = start.min(self.lines.len());
        let end = end.clamp(start, self.lines.len());
        let count = replacement.len();
        self.lines.splice(start..end, replacement);
        self.locked.splice(start..end, std::iter::repeat_n(false, count));
    }

    pub fn lock(&mut self, range: RangeInclusive<usize>) {
        for index in range {
            if let Some(flag) = self.locked.get_mut(index) {
                *flag = true;
            }
        }
    }

    /// Shift the block following line `end` by `to_indent - from_indent`.
    ///
    /// Blank lines are skipped, locked lines are left alone and the shift
    /// stops at the first line indented less than `from_indent`.
    pub fn shift_indent_after(&mut self, end: usize, from_indent: usize, to_indent: usize) {
        let delta = to_indent as isize - from_indent as isize;
        if delta == 0 {
            return;
        }

        for index in end + 1..self.lines.len() {
            let line = &self.lines[index];
            if line.is_blank() {
                continue;
            }
            if line.leading_spaces() < from_indent {
                break;
            }
            if self.locked[index] {
                continue;
            }
            self.lines[index] = indent(line, delta);
        }
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &[&str]) -> TemplateLines {
        TemplateLines::new(text.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_locks_follow_inserts_and_removals() {
        let mut buffer = lines(&["a", "b", "c"]);
        buffer.lock(2..=2);
        buffer.insert(0, "z".to_string());
        assert!(buffer.is_locked(3));
        assert!(!buffer.is_locked(2));
        buffer.remove(1);
        assert!(buffer.is_locked(2));
        assert_eq!(buffer.lines(), ["z", "b", "c"]);
    }

    #[test]
    fn test_splice_unlocks_replacement() {
        let mut buffer = lines(&["a", "b", "c", "d"]);
        buffer.lock(0..=3);
        buffer.splice(1, 3, vec!["x".to_string()]);
        assert_eq!(buffer.lines(), ["a", "x", "d"]);
        assert!(buffer.is_locked(0));
        assert!(!buffer.is_locked(1));
        assert!(buffer.is_locked(2));
    }

    #[test]
    fn test_shift_stops_at_dedent_and_skips_locked() {
        let mut buffer = lines(&["- if a", "  - b", "  %p", "", "    locked", "  %i", "%after"]);
        buffer.lock(4..=4);
        buffer.shift_indent_after(1, 2, 4);
        assert_eq!(
            buffer.into_lines(),
            ["- if a", "  - b", "    %p", "", "    locked", "    %i", "%after"]
        );
    }

    #[test]
    fn test_shift_by_zero_is_noop() {
        let mut buffer = lines(&["a", "  b"]);
        buffer.shift_indent_after(0, 2, 2);
        assert_eq!(buffer.lines(), ["a", "  b"]);
    }
}
