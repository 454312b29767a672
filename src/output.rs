//! Output types: the report, its sections, document metadata and run stats.
//!
//! A [`Report`] is built once per review and never mutated afterwards; its
//! fields are private and only readable through accessors.

use crate::config::{ProjectInfo, ReviewType};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Title of the fallback section used when the answer has no structure.
pub const UNSTRUCTURED_TITLE: &str = "Unstructured Output";

/// Disclaimer appended to every report unless disabled.
pub const DISCLAIMER: &str = "This AI-generated report is for informational purposes only and should not be \
considered professional architectural or planning advice. Always consult qualified professionals and \
your local planning authority before proceeding with any development.";

/// A titled block of text within the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub body: String,
}

impl Section {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// The fallback section holding the answer verbatim.
    pub fn unstructured(raw: impl Into<String>) -> Self {
        Self::new(UNSTRUCTURED_TITLE, raw)
    }
}

/// Drawing category guessed from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    SitePlan,
    FloorPlansExisting,
    FloorPlansProposed,
    ElevationsExisting,
    ElevationsProposed,
    Sections,
    DesignAndAccessStatement,
    Other,
}

impl DocumentKind {
    /// Guess the drawing category from keywords in a file name.
    pub fn from_file_name(name: &str) -> Self {
        let n = name.to_lowercase();
        let existing = n.contains("exist");
        let proposed = n.contains("prop");
        if n.contains("site") {
            DocumentKind::SitePlan
        } else if n.contains("floor") && existing {
            DocumentKind::FloorPlansExisting
        } else if n.contains("floor") && proposed {
            DocumentKind::FloorPlansProposed
        } else if n.contains("elevation") && existing {
            DocumentKind::ElevationsExisting
        } else if n.contains("elevation") && proposed {
            DocumentKind::ElevationsProposed
        } else if n.contains("section") {
            DocumentKind::Sections
        } else if n.contains("design") || n.contains("access") {
            DocumentKind::DesignAndAccessStatement
        } else if n.contains("plan") {
            DocumentKind::SitePlan
        } else {
            DocumentKind::Other
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentKind::SitePlan => "Site Plan",
            DocumentKind::FloorPlansExisting => "Floor Plans - Existing",
            DocumentKind::FloorPlansProposed => "Floor Plans - Proposed",
            DocumentKind::ElevationsExisting => "Elevations - Existing",
            DocumentKind::ElevationsProposed => "Elevations - Proposed",
            DocumentKind::Sections => "Sections",
            DocumentKind::DesignAndAccessStatement => "Design & Access Statement",
            DocumentKind::Other => "Other Supporting Documents",
        };
        f.write_str(s)
    }
}

/// Metadata read from the input PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// File name or URL the document came from.
    pub source: String,
    pub size_bytes: usize,
    pub page_count: usize,
    pub pdf_version: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub is_encrypted: bool,
    pub kind: DocumentKind,
}

impl DocumentMetadata {
    /// Label used in the prompt context, e.g. `Floor Plans - Proposed (plans.pdf, 2 pages)`.
    pub fn label(&self) -> String {
        format!(
            "{} ({}, {} page{})",
            self.kind,
            self.source,
            self.page_count,
            if self.page_count == 1 { "" } else { "s" }
        )
    }
}

/// Everything printed in the report header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub project: ProjectInfo,
    pub review_type: ReviewType,
    pub model: String,
    pub document: DocumentMetadata,
    pub generated_at: DateTime<Local>,
}

/// The finished compliance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    title: String,
    metadata: ReportMetadata,
    sections: Vec<Section>,
    disclaimer: Option<String>,
}

impl Report {
    /// Assemble a report. An empty section list becomes one empty
    /// "Unstructured Output" section so a report always has a body.
    pub fn new(
        title: impl Into<String>,
        metadata: ReportMetadata,
        sections: Vec<Section>,
        disclaimer: Option<String>,
    ) -> Self {
        let sections = if sections.is_empty() {
            vec![Section::unstructured("")]
        } else {
            sections
        };
        Self {
            title: title.into(),
            metadata,
            sections,
            disclaimer,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn metadata(&self) -> &ReportMetadata {
        &self.metadata
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn disclaimer(&self) -> Option<&str> {
        self.disclaimer.as_deref()
    }

    /// Label/value rows for the project-information block.
    pub fn header_rows(&self) -> Vec<(&'static str, String)> {
        let m = &self.metadata;
        let p = &m.project;
        let mut rows = Vec::with_capacity(8);
        if let Some(ref a) = p.address {
            rows.push(("Address", a.clone()));
        }
        if let Some(ref t) = p.project_type {
            rows.push(("Project Type", t.clone()));
        }
        rows.push((
            "Local Authority",
            p.council.clone().unwrap_or_else(|| "Not specified".into()),
        ));
        rows.push((
            "Planning Reference",
            p.planning_reference.clone().unwrap_or_else(|| "None".into()),
        ));
        rows.push(("Review", m.review_type.label().to_string()));
        rows.push(("Drawings", m.document.label()));
        rows.push(("Model", m.model.clone()));
        rows.push(("Analysis Date", m.generated_at.format("%d %B %Y").to_string()));
        rows
    }

    /// Render the report as a Markdown document.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        for (label, value) in self.header_rows() {
            out.push_str(&format!("- **{label}:** {value}\n"));
        }
        for section in &self.sections {
            out.push_str(&format!("\n## {}\n\n", section.title));
            let body = section.body.trim_end();
            if !body.is_empty() {
                out.push_str(body);
                out.push('\n');
            }
        }
        if let Some(ref d) = self.disclaimer {
            out.push_str(&format!("\n---\n\n*{d}*\n"));
        }
        out
    }
}

/// Timing and token statistics for one review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewStats {
    pub document_bytes: usize,
    pub page_count: usize,
    pub sections: usize,
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    pub load_ms: u64,
    pub api_ms: u64,
    pub render_ms: u64,
    pub total_ms: u64,
}

/// Result of [`crate::review::review`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutput {
    pub report: Report,
    /// The model's answer before section parsing.
    pub raw_response: String,
    pub stats: ReviewStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            project: ProjectInfo {
                address: Some("1 High Street".into()),
                ..Default::default()
            },
            review_type: ReviewType::Nppf,
            model: "gemini-1.5-pro".into(),
            document: DocumentMetadata {
                source: "plans.pdf".into(),
                size_bytes: 1024,
                page_count: 2,
                pdf_version: "1.5".into(),
                title: None,
                author: None,
                is_encrypted: false,
                kind: DocumentKind::FloorPlansProposed,
            },
            generated_at: Local::now(),
        }
    }

    #[test]
    fn empty_sections_become_unstructured() {
        let r = Report::new("T", metadata(), vec![], None);
        assert_eq!(r.sections().len(), 1);
        assert_eq!(r.sections()[0].title, UNSTRUCTURED_TITLE);
        assert!(r.sections()[0].body.is_empty());
    }

    #[test]
    fn document_kind_detection() {
        assert_eq!(DocumentKind::from_file_name("SITE_location.pdf"), DocumentKind::SitePlan);
        assert_eq!(
            DocumentKind::from_file_name("floor-plans-proposed.pdf"),
            DocumentKind::FloorPlansProposed
        );
        assert_eq!(
            DocumentKind::from_file_name("Existing Elevations.pdf"),
            DocumentKind::ElevationsExisting
        );
        assert_eq!(
            DocumentKind::from_file_name("DAS design statement.pdf"),
            DocumentKind::DesignAndAccessStatement
        );
        assert_eq!(DocumentKind::from_file_name("scan001.pdf"), DocumentKind::Other);
    }

    #[test]
    fn label_pluralises_pages() {
        let mut m = metadata().document;
        assert_eq!(m.label(), "Floor Plans - Proposed (plans.pdf, 2 pages)");
        m.page_count = 1;
        assert!(m.label().ends_with("1 page)"));
    }

    #[test]
    fn markdown_lists_sections_in_order() {
        let r = Report::new(
            "Review",
            metadata(),
            vec![Section::new("Section A", "alpha"), Section::new("Section B", "beta")],
            Some(DISCLAIMER.to_string()),
        );
        let md = r.to_markdown();
        let a = md.find("## Section A").unwrap();
        let b = md.find("## Section B").unwrap();
        assert!(a < b);
        assert!(md.starts_with("# Review\n"));
        assert!(md.contains("**Address:** 1 High Street"));
        assert!(md.contains("informational purposes only"));
    }

    #[test]
    fn header_rows_fill_defaults() {
        let r = Report::new("T", metadata(), vec![], None);
        let rows = r.header_rows();
        assert!(rows.contains(&("Local Authority", "Not specified".to_string())));
        assert!(rows.contains(&("Planning Reference", "None".to_string())));
    }
}
