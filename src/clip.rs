//! Value clip sequence naming.
//!
//! A clip set lists one asset per frame (`shot.1001.usd`, `shot.1002.usd`, ...).
//! The graph shows the whole set as a single node named after its frame span.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// Stands in for a frame number when a clip path has no digits.
pub const MISSING_FRAME: &str = "???";

static FRAME_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b").expect("frame number pattern"));

/// Byte range of the last word-bounded digit run in `path`.
fn last_frame_number(path: &str) -> Option<Range<usize>> {
    FRAME_NUMBER.find_iter(path).last().map(|m| m.range())
}

/// A clip set's inferred sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipSequence {
    /// First path with its frame number replaced by the span, e.g. `./clips/shot.1001-1005.usd`.
    pub name: String,
    /// `<first>-<last>`, e.g. `1001-1005`.
    pub span: String,
    pub first_frame: String,
    pub last_frame: String,
}

impl ClipSequence {
    /// Infer the sequence from a clip set's asset paths. `None` for an empty list.
    pub fn infer<S: AsRef<str>>(asset_paths: &[S]) -> Option<ClipSequence> {
        let first = asset_paths.first()?.as_ref();
        let last = asset_paths.last()?.as_ref();

        let first_range = last_frame_number(first);
        let first_frame = first_range
            .clone()
            .map_or(MISSING_FRAME, |range| &first[range])
            .to_owned();
        let last_frame = last_frame_number(last)
            .map_or(MISSING_FRAME, |range| &last[range])
            .to_owned();

        let span = format!("{first_frame}-{last_frame}");
        let name = match first_range {
            Some(range) => format!("{}{span}{}", &first[..range.start], &first[range.end..]),
            None => format!("{span}{first}"),
        };

        Some(ClipSequence {
            name,
            span,
            first_frame,
            last_frame,
        })
    }
}
