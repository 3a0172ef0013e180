//! Shared line and indentation utilities
//!
//! Rewrites work on exact byte slices; these helpers keep the line math in
//! one place.

/// Exact text of 1-based lines `start..=end`, including interior newlines
/// but not the trailing one
pub fn slice_lines(source: &str, start_line: usize, end_line: usize) -> String {
    source
        .lines()
        .skip(start_line.saturating_sub(1))
        .take(end_line.saturating_sub(start_line) + 1)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Leading whitespace of a line
pub fn leading_indent(line: &str) -> &str {
    let end = line
        .find(|c: char| !c.is_whitespace())
        .unwrap_or(line.len());
    &line[..end]
}

/// Shift every non-blank line of `block` by `delta` spaces (negative
/// dedents, clamped at column zero)
pub fn shift_indent(block: &str, delta: isize) -> String {
    block
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else if delta >= 0 {
                format!("{}{}", " ".repeat(delta as usize), line)
            } else {
                let cut = (-delta) as usize;
                let indent = leading_indent(line);
                let strip = cut.min(indent.len());
                line[strip..].to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_lines() {
        let src = "a\nb\nc\nd\n";
        assert_eq!(slice_lines(src, 2, 3), "b\nc");
        assert_eq!(slice_lines(src, 1, 1), "a");
    }

    #[test]
    fn test_shift_indent() {
        assert_eq!(shift_indent("    a\n        b", -4), "a\n    b");
        assert_eq!(shift_indent("a\nb", 2), "  a\n  b");
        // blank lines stay blank
        assert_eq!(shift_indent("    a\n\n    b", -4), "a\n\nb");
    }

    #[test]
    fn test_leading_indent() {
        assert_eq!(leading_indent("    x = 1"), "    ");
        assert_eq!(leading_indent("x"), "");
    }
}
