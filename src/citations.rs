//! Inline citation markers.
//!
//! Answers reference their sources with `[n]` tokens. [`render_answer_with_citations`]
//! splits an answer into plain text and citation markers; a token whose
//! number has no matching citation stays plain text. Flattening the
//! segments with [`flatten`] always gives back the original answer.
//!
//! ```rust
//! use kb_chat::citations::{flatten, render_answer_with_citations, Segment};
//! use kb_chat::models::Citation;
//!
//! let sources = vec![Citation {
//!     citation_number: 1,
//!     document_name: "guide.pdf".to_string(),
//!     page_number: 4,
//!     excerpt: String::new(),
//! }];
//! let text = "Use a torque wrench [1], not pliers [7].";
//! let segments = render_answer_with_citations(text, &sources);
//! assert!(matches!(segments[1], Segment::Marker { .. }));
//! assert_eq!(flatten(&segments), text);
//! ```

use regex::Regex;
use std::sync::OnceLock;

use crate::models::Citation;

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid citation pattern"))
}

/// A piece of a rendered answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment<'a> {
    Text(&'a str),
    /// A `[n]` token that resolved to a citation.
    Marker {
        token: &'a str,
        citation: &'a Citation,
    },
}

impl<'a> Segment<'a> {
    /// The exact source text this segment covers.
    pub fn as_text(&self) -> &'a str {
        match self {
            Segment::Text(text) => text,
            Segment::Marker { token, .. } => token,
        }
    }
}

/// Split `text` into plain text and citation markers.
pub fn render_answer_with_citations<'a>(
    text: &'a str,
    citations: &'a [Citation],
) -> Vec<Segment<'a>> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in marker_pattern().captures_iter(text) {
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            segments.push(Segment::Text(&text[last..whole.start()]));
        }

        let citation = digits
            .as_str()
            .parse::<u32>()
            .ok()
            .and_then(|n| citations.iter().find(|c| c.citation_number == n));

        segments.push(match citation {
            Some(citation) => Segment::Marker {
                token: whole.as_str(),
                citation,
            },
            None => Segment::Text(whole.as_str()),
        });
        last = whole.end();
    }

    if last < text.len() {
        segments.push(Segment::Text(&text[last..]));
    }
    segments
}

/// Join segments back into plain text.
pub fn flatten(segments: &[Segment<'_>]) -> String {
    segments.iter().map(Segment::as_text).collect()
}
