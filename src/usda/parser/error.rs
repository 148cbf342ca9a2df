use std::fmt;
use std::ops::Range;

/// Source line context for the token a parse failure stopped at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorHighlight {
    pub line: usize,
    pub column: usize,
    pub line_text: String,
}

impl ErrorHighlight {
    /// Locate `span` in `source`. Returns `None` for empty input.
    pub fn from_span(source: &str, span: Range<usize>) -> Option<Self> {
        if source.is_empty() {
            return None;
        }

        let mut offset = span.start.min(source.len());
        while !source.is_char_boundary(offset) {
            offset -= 1;
        }

        let line_start = source[..offset].rfind('\n').map(|pos| pos + 1).unwrap_or(0);
        let line_end = source[line_start..]
            .find('\n')
            .map(|pos| line_start + pos)
            .unwrap_or(source.len());

        Some(ErrorHighlight {
            line: source[..line_start].matches('\n').count() + 1,
            column: source[line_start..offset].chars().count() + 1,
            line_text: source[line_start..line_end].trim_end_matches('\r').to_owned(),
        })
    }

    /// Caret line pointing at the highlighted column, preserving tabs.
    pub fn pointer_line(&self) -> String {
        let mut pointer: String = self
            .line_text
            .chars()
            .take(self.column - 1)
            .map(|ch| if ch == '\t' { '\t' } else { ' ' })
            .collect();
        pointer.push('^');
        pointer
    }
}

impl fmt::Display for ErrorHighlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {} column {}\n{}\n{}",
            self.line,
            self.column,
            self.line_text,
            self.pointer_line()
        )
    }
}
