//! Terminal rendering for the document panel and the chat transcript.

use crate::citations::{render_answer_with_citations, Segment};
use crate::documents::StatusCounts;
use crate::events::short_id;
use crate::models::{ChatTurn, Document, DocumentStatus, Role, StructuredAnswer};

/// Confidence bands for the answer badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            ConfidenceLevel::High
        } else if score >= 0.4 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

/// Score as a whole percentage, e.g. `0.85` → `"85%"`.
pub fn confidence_percent(score: f64) -> String {
    let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
    format!("{}%", (score * 100.0).round() as u32)
}

/// Badge text, e.g. `"85% confidence (high)"`.
pub fn confidence_badge(score: f64) -> String {
    format!(
        "{} confidence ({})",
        confidence_percent(score),
        ConfidenceLevel::from_score(score).label()
    )
}

/// Human-readable byte count (1024 base).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn status_marker(status: DocumentStatus) -> &'static str {
    match status {
        DocumentStatus::Uploading => "…",
        DocumentStatus::Success => "✓",
        DocumentStatus::Error => "✗",
    }
}

/// The document panel: one row per document plus a totals line.
pub fn render_documents(docs: &[Document], counts: StatusCounts) -> String {
    if docs.is_empty() {
        return "No documents. Upload a PDF to get started.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<10} {:<2} {:<10} {:>10}  {}\n",
        "ID", "", "STATUS", "SIZE", "NAME"
    ));
    for doc in docs {
        out.push_str(&format!(
            "{:<10} {:<2} {:<10} {:>10}  {}\n",
            short_id(&doc.id),
            status_marker(doc.status),
            doc.status.as_str(),
            format_size(doc.size),
            doc.name
        ));
        if let Some(err) = &doc.error {
            out.push_str(&format!("{:<24}error: {}\n", "", err));
        }
    }
    out.push_str(&format!(
        "{} document(s): {} ready, {} uploading, {} failed\n",
        counts.total(),
        counts.success,
        counts.uploading,
        counts.error
    ));
    out
}

/// Answer text with resolved markers annotated by document and page.
pub fn render_answer_text(text: &str, answer: Option<&StructuredAnswer>) -> String {
    let sources = answer.map(|a| a.sources.as_slice()).unwrap_or(&[]);
    render_answer_with_citations(text, sources)
        .iter()
        .map(|segment| match segment {
            Segment::Text(t) => t.to_string(),
            Segment::Marker { citation, .. } => format!(
                "[{}: {}, p. {}]",
                citation.citation_number, citation.document_name, citation.page_number
            ),
        })
        .collect()
}

/// One transcript entry, with sources, confidence, and related questions
/// for assistant turns that carry a payload.
pub fn render_turn(turn: &ChatTurn) -> String {
    let mut out = String::new();
    match turn.role {
        Role::User => {
            out.push_str(&format!("you> {}\n", turn.text));
        }
        Role::Assistant => {
            out.push_str(&format!(
                "assistant> {}\n",
                render_answer_text(&turn.text, turn.answer.as_ref())
            ));
            if let Some(answer) = &turn.answer {
                if !answer.sources.is_empty() {
                    out.push_str("  sources:\n");
                    for c in &answer.sources {
                        out.push_str(&format!(
                            "    [{}] {} (p. {})\n",
                            c.citation_number, c.document_name, c.page_number
                        ));
                        if !c.excerpt.is_empty() {
                            out.push_str(&format!("        \"{}\"\n", c.excerpt));
                        }
                    }
                }
                out.push_str(&format!("  {}\n", confidence_badge(answer.confidence)));
                if !answer.related_questions.is_empty() {
                    out.push_str("  related:\n");
                    for (i, q) in answer.related_questions.iter().enumerate() {
                        out.push_str(&format!("    {}. {}\n", i + 1, q));
                    }
                }
            }
        }
    }
    out
}

/// Numbered list of shortcut queries.
pub fn render_shortcuts(title: &str, queries: &[String]) -> String {
    let mut out = format!("{}:\n", title);
    for (i, q) in queries.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, q));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Citation;

    #[test]
    fn confidence_badge_rounds_and_bands() {
        assert_eq!(confidence_percent(0.85), "85%");
        assert_eq!(ConfidenceLevel::from_score(0.85), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.7), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.69), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.4), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.0), ConfidenceLevel::Low);
        assert_eq!(confidence_percent(0.0), "0%");
        assert_eq!(confidence_percent(0.999), "100%");
        assert_eq!(confidence_percent(f64::NAN), "0%");
        assert_eq!(confidence_badge(0.85), "85% confidence (high)");
    }

    #[test]
    fn sizes_are_humanized() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn assistant_turn_shows_sources_and_badge() {
        let answer = StructuredAnswer {
            answer: "Torque to 40 Nm [1] or more [4].".to_string(),
            sources: vec![Citation {
                citation_number: 1,
                document_name: "manual.pdf".to_string(),
                page_number: 12,
                excerpt: "40 Nm".to_string(),
            }],
            confidence: 0.85,
            related_questions: vec!["What tools are needed?".to_string()],
        };
        let turn = ChatTurn::assistant(answer.answer.clone(), Some(answer));
        let out = render_turn(&turn);

        assert!(out.contains("Torque to 40 Nm [1: manual.pdf, p. 12] or more [4]."));
        assert!(out.contains("[1] manual.pdf (p. 12)"));
        assert!(out.contains("85% confidence (high)"));
        assert!(out.contains("1. What tools are needed?"));
    }

    #[test]
    fn empty_panel_has_hint() {
        let out = render_documents(&[], StatusCounts::default());
        assert!(out.contains("No documents"));
    }

    #[test]
    fn panel_lists_errors() {
        let mut doc = Document::uploading("broken.pdf", 2048);
        doc.status = DocumentStatus::Error;
        doc.error = Some("quota exceeded".to_string());
        let counts = StatusCounts {
            error: 1,
            ..Default::default()
        };
        let out = render_documents(&[doc], counts);
        assert!(out.contains("broken.pdf"));
        assert!(out.contains("2.0 KB"));
        assert!(out.contains("error: quota exceeded"));
        assert!(out.contains("1 failed"));
    }
}
