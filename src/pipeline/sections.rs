//! Section parsing: split the model's answer into titled report sections.
//!
//! The model's output format is not guaranteed, so parsing never fails.
//! Whatever the rule, an answer with no recognisable marker becomes one
//! "Unstructured Output" section holding the answer verbatim, and an empty
//! answer becomes one "Unstructured Output" section with an empty body.

use crate::config::SectionRule;
use crate::output::Section;
use crate::pipeline::postprocess::clean_response;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// Title given to text that precedes the first marker.
pub const PREAMBLE_TITLE: &str = "Introduction";

/// Longest line (in chars) accepted as a title by [`SectionRule::TitleLines`].
const MAX_TITLE_CHARS: usize = 80;
const MAX_TITLE_WORDS: usize = 10;

static RE_ATX_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s{0,3}#{1,6}\s+(.+?)(?:\s+#+)?\s*$").expect("heading regex is valid")
});

static RE_BOLD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\*\*|__)([^*_]+?)(?:\*\*|__):?\s*$").expect("bold-line regex is valid")
});

static RE_LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*+•]\s|\d+[.)]\s)").expect("list regex is valid"));

/// Parse an answer into sections under `rule`.
pub fn parse_sections(raw: &str, rule: &SectionRule) -> Vec<Section> {
    let text = clean_response(raw);
    if text.is_empty() {
        return vec![Section::unstructured("")];
    }

    let parsed = match rule {
        SectionRule::Auto => parse_structured(&text)
            .or_else(|| split_on(&text, markdown_title))
            .or_else(|| split_on(&text, title_line)),
        SectionRule::MarkdownHeadings => split_on(&text, markdown_title),
        SectionRule::TitleLines => split_on(&text, title_line),
        SectionRule::BlankLineBlocks => split_blocks(&text),
        SectionRule::Pattern(re) => split_on(&text, |line| pattern_title(re, line)),
    };

    parsed.unwrap_or_else(|| vec![Section::unstructured(raw)])
}

/// Walk the lines, starting a new section at every line `title_of` accepts.
///
/// Returns `None` when no line is a title.
fn split_on<F>(text: &str, title_of: F) -> Option<Vec<Section>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut sections = Vec::new();
    let mut preamble: Vec<&str> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(title) = title_of(line) {
            if let Some((t, body)) = current.take() {
                sections.push(Section::new(t, join_body(&body)));
            }
            current = Some((title, Vec::new()));
        } else if let Some((_, ref mut body)) = current {
            body.push(line);
        } else {
            preamble.push(line);
        }
    }

    let (title, body) = current?;
    sections.push(Section::new(title, join_body(&body)));

    let intro = join_body(&preamble);
    if !intro.is_empty() {
        sections.insert(0, Section::new(PREAMBLE_TITLE, intro));
    }
    Some(sections)
}

/// Each blank-line-delimited block is a section titled by its first line.
fn split_blocks(text: &str) -> Option<Vec<Section>> {
    let sections: Vec<Section> = text
        .split("\n\n")
        .map(|block| block.trim_matches('\n'))
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let (first, rest) = block.split_once('\n').unwrap_or((block, ""));
            let title = markdown_title(first).unwrap_or_else(|| first.trim().to_string());
            Section::new(title, rest.trim_matches('\n'))
        })
        .collect();
    (!sections.is_empty()).then_some(sections)
}

fn join_body(lines: &[&str]) -> String {
    lines.join("\n").trim_matches('\n').to_string()
}

/// `#`..`######` headings and whole-line bold text.
fn markdown_title(line: &str) -> Option<String> {
    let caps = RE_ATX_HEADING
        .captures(line)
        .or_else(|| RE_BOLD_LINE.captures(line))?;
    let title = caps[1].trim().trim_end_matches(':').trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Short, capitalised lines without sentence punctuation.
fn title_line(line: &str) -> Option<String> {
    let t = line.trim();
    if t.is_empty() || t.chars().count() > MAX_TITLE_CHARS || RE_LIST_ITEM.is_match(line) {
        return None;
    }
    let first = t.chars().next()?;
    if !(first.is_uppercase() || first.is_ascii_digit()) {
        return None;
    }
    if t.ends_with(['.', ',', ';', '!', '?']) {
        return None;
    }

    let words: Vec<&str> = t.split_whitespace().collect();
    if words.len() > MAX_TITLE_WORDS {
        return None;
    }
    // Title case: at least half the significant words are capitalised.
    let significant: Vec<&&str> = words
        .iter()
        .filter(|w| !is_minor_word(w) && w.chars().any(char::is_alphabetic))
        .collect();
    let capitalised = significant
        .iter()
        .filter(|w| w.chars().next().is_some_and(|c| !c.is_lowercase()))
        .count();
    if capitalised * 2 < significant.len() {
        return None;
    }

    Some(t.trim_end_matches(':').trim().to_string())
}

fn is_minor_word(w: &str) -> bool {
    matches!(
        w.to_lowercase().as_str(),
        "a" | "an" | "and" | "as" | "at" | "by" | "for" | "in" | "of" | "on" | "or" | "the" | "to"
            | "vs" | "with" | "&" | "-"
    )
}

fn pattern_title(re: &Regex, line: &str) -> Option<String> {
    let caps = re.captures(line)?;
    let title = caps.get(1).map_or(line, |m| m.as_str()).trim();
    (!title.is_empty()).then(|| title.to_string())
}

// ── Structured (JSON) answers ───────────────────────────────────────────────

/// The JSON report shape requested by `ResponseFormat::Json`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StructuredAnalysis {
    ai_review_framework: Vec<FrameworkEntry>,
    plan_by_plan_review: Vec<PlanReview>,
    policy_compatibility_summary: Vec<PolicyCompatibility>,
    ai_recommendation_summary: TextOrList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FrameworkEntry {
    framework: String,
    relevant_policies: TextOrList,
    key_considerations: TextOrList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PlanReview {
    plan_type: String,
    positives: TextOrList,
    observations: TextOrList,
    compliance_notes: TextOrList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PolicyCompatibility {
    policy_area: String,
    status: String,
    details: TextOrList,
    recommendations: TextOrList,
}

/// Models return either a string or an array of strings for the same field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl Default for TextOrList {
    fn default() -> Self {
        TextOrList::List(Vec::new())
    }
}

impl TextOrList {
    fn items(&self) -> Vec<&str> {
        let raw: Vec<&str> = match self {
            TextOrList::Text(s) => vec![s.as_str()],
            TextOrList::List(v) => v.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn joined(&self, sep: &str) -> String {
        self.items().join(sep)
    }
}

/// The JSON analysis, either as the whole text or as the outermost
/// `{ ... }` inside surrounding prose or fences.
fn extract_analysis(text: &str) -> Option<StructuredAnalysis> {
    if let Ok(analysis) = serde_json::from_str(text.trim()) {
        return Some(analysis);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn parse_structured(text: &str) -> Option<Vec<Section>> {
    let analysis = extract_analysis(text)?;

    let mut sections = Vec::new();

    let frameworks: Vec<String> = analysis
        .ai_review_framework
        .iter()
        .map(|f| {
            let mut lines = vec![f.framework.trim().to_string()];
            let policies = f.relevant_policies.joined(", ");
            if !policies.is_empty() {
                lines.push(format!("- Relevant policies: {policies}"));
            }
            let considerations = f.key_considerations.joined(" ");
            if !considerations.is_empty() {
                lines.push(format!("- Key considerations: {considerations}"));
            }
            lines.join("\n")
        })
        .collect();
    push_joined(&mut sections, "Regulatory Framework Analysis", frameworks);

    let plans: Vec<String> = analysis
        .plan_by_plan_review
        .iter()
        .map(|p| {
            let mut lines = vec![p.plan_type.trim().to_string()];
            push_list(&mut lines, "Positives:", &p.positives);
            push_list(&mut lines, "Observations:", &p.observations);
            let notes = p.compliance_notes.joined(" ");
            if !notes.is_empty() {
                lines.push(format!("Compliance notes: {notes}"));
            }
            lines.join("\n")
        })
        .collect();
    push_joined(&mut sections, "Plan-by-Plan Review", plans);

    let policies: Vec<String> = analysis
        .policy_compatibility_summary
        .iter()
        .map(|p| {
            let heading = match p.status.trim() {
                "" => p.policy_area.trim().to_string(),
                status => format!("{} ({status})", p.policy_area.trim()),
            };
            let mut lines = vec![heading];
            let details = p.details.joined(" ");
            if !details.is_empty() {
                lines.push(details);
            }
            push_list(&mut lines, "Recommendations:", &p.recommendations);
            lines.join("\n")
        })
        .collect();
    push_joined(&mut sections, "Policy Compatibility Summary", policies);

    let summary = analysis.ai_recommendation_summary.joined("\n\n");
    if !summary.is_empty() {
        sections.push(Section::new("AI Recommendations Summary", summary));
    }

    (!sections.is_empty()).then_some(sections)
}

fn push_list(lines: &mut Vec<String>, label: &str, items: &TextOrList) {
    let items = items.items();
    if items.is_empty() {
        return;
    }
    lines.push(label.to_string());
    lines.extend(items.into_iter().map(|i| format!("- {i}")));
}

fn push_joined(sections: &mut Vec<Section>, title: &str, entries: Vec<String>) {
    let entries: Vec<String> = entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
    if !entries.is_empty() {
        sections.push(Section::new(title, entries.join("\n\n")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::UNSTRUCTURED_TITLE;

    fn titles(sections: &[Section]) -> Vec<&str> {
        sections.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn empty_answer_is_one_empty_unstructured_section() {
        for raw in ["", "   ", "\n\n\t\n"] {
            let s = parse_sections(raw, &SectionRule::Auto);
            assert_eq!(s, vec![Section::new(UNSTRUCTURED_TITLE, "")]);
        }
    }

    #[test]
    fn plain_title_lines() {
        let s = parse_sections("Section A\n...\nSection B\n...", &SectionRule::Auto);
        assert_eq!(titles(&s), ["Section A", "Section B"]);
        assert_eq!(s[0].body, "...");
        assert_eq!(s[1].body, "...");
    }

    #[test]
    fn markdown_headings_in_order() {
        let raw = "## Drawings Reviewed\nGround floor plan.\n\n## Compliance Assessment\n- Depth 3m\n\n### Overall Opinion ###\nAcceptable.";
        let s = parse_sections(raw, &SectionRule::MarkdownHeadings);
        assert_eq!(
            titles(&s),
            ["Drawings Reviewed", "Compliance Assessment", "Overall Opinion"]
        );
        assert_eq!(s[1].body, "- Depth 3m");
    }

    #[test]
    fn auto_prefers_headings_over_title_lines() {
        let raw = "## Issues\nRear Extension Depth\nThe depth is 4m.";
        let s = parse_sections(raw, &SectionRule::Auto);
        assert_eq!(titles(&s), ["Issues"]);
        assert!(s[0].body.contains("Rear Extension Depth"));
    }

    #[test]
    fn bold_lines_are_headings() {
        let raw = "**Key Measurements:**\n- Ridge 7.2m\n__Recommendations__\n- Reduce depth";
        let s = parse_sections(raw, &SectionRule::MarkdownHeadings);
        assert_eq!(titles(&s), ["Key Measurements", "Recommendations"]);
    }

    #[test]
    fn inline_bold_spans_are_not_headings() {
        let raw = "**Note** and **more**\nbody";
        let s = parse_sections(raw, &SectionRule::MarkdownHeadings);
        assert_eq!(titles(&s), [UNSTRUCTURED_TITLE]);
        assert_eq!(s[0].body, raw);
    }

    #[test]
    fn preamble_becomes_introduction() {
        let raw = "Here is my review.\n\n## Findings\nAll good.";
        let s = parse_sections(raw, &SectionRule::Auto);
        assert_eq!(titles(&s), [PREAMBLE_TITLE, "Findings"]);
        assert_eq!(s[0].body, "Here is my review.");
    }

    #[test]
    fn no_markers_is_verbatim_unstructured() {
        let raw = "the drawings show a rear extension.\nit looks fine overall.\n";
        let s = parse_sections(raw, &SectionRule::Auto);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].title, UNSTRUCTURED_TITLE);
        assert_eq!(s[0].body, raw);
    }

    #[test]
    fn title_line_rules() {
        assert_eq!(title_line("Key Measurements:"), Some("Key Measurements".into()));
        assert_eq!(title_line("3. Compliance"), None); // list item
        assert_eq!(title_line("2024 Review Notes"), Some("2024 Review Notes".into()));
        assert_eq!(title_line("The ridge height is 7m."), None);
        assert_eq!(title_line("The rear extension projects 4m beyond"), None);
        assert_eq!(title_line("lowercase start"), None);
        assert_eq!(title_line("- Bullet Point"), None);
        assert_eq!(title_line(&"Word ".repeat(11)), None);
    }

    #[test]
    fn blank_line_blocks() {
        let raw = "Site Context\nSuburban street.\n\nMassing\nTwo storeys.\nPitched roof.";
        let s = parse_sections(raw, &SectionRule::BlankLineBlocks);
        assert_eq!(titles(&s), ["Site Context", "Massing"]);
        assert_eq!(s[1].body, "Two storeys.\nPitched roof.");
    }

    #[test]
    fn custom_pattern_uses_group_one() {
        let rule = SectionRule::pattern(r"^=+\s*(.+?)\s*=+$").unwrap();
        let raw = "== Parking ==\nTwo spaces.\n== Refuse ==\nBins to side.";
        let s = parse_sections(raw, &rule);
        assert_eq!(titles(&s), ["Parking", "Refuse"]);
    }

    #[test]
    fn pattern_without_match_falls_back() {
        let rule = SectionRule::pattern(r"^SECTION:").unwrap();
        let s = parse_sections("Nothing here", &rule);
        assert_eq!(titles(&s), [UNSTRUCTURED_TITLE]);
        assert_eq!(s[0].body, "Nothing here");
    }

    #[test]
    fn structured_json_answer() {
        let raw = r#"```json
{
  "aiReviewFramework": [
    {"framework": "NPPF", "relevantPolicies": ["Chapter 12"], "keyConsiderations": "Design quality"}
  ],
  "planByPlanReview": [
    {"planType": "Proposed Floor Plans", "positives": ["Good light"], "observations": "Stair is steep", "complianceNotes": "Part K"}
  ],
  "policyCompatibilitySummary": [],
  "aiRecommendationSummary": "Likely acceptable."
}
```"#;
        let s = parse_sections(raw, &SectionRule::Auto);
        assert_eq!(
            titles(&s),
            [
                "Regulatory Framework Analysis",
                "Plan-by-Plan Review",
                "AI Recommendations Summary"
            ]
        );
        assert!(s[0].body.contains("- Relevant policies: Chapter 12"));
        assert!(s[1].body.contains("Observations:\n- Stair is steep"));
        assert_eq!(s[2].body, "Likely acceptable.");
    }

    #[test]
    fn json_analysis_inside_prose() {
        let raw = "Here is the JSON analysis:\n```json\n{\"aiRecommendationSummary\": [\"Reduce the eaves height.\", \"Obscure the side window.\"]}\n```\nLet me know if you need more.";
        let s = parse_sections(raw, &SectionRule::Auto);
        assert_eq!(titles(&s), ["AI Recommendations Summary"]);
        assert_eq!(
            s[0].body,
            "Reduce the eaves height.\n\nObscure the side window."
        );
    }

    #[test]
    fn unrelated_json_is_not_structured() {
        let raw = r#"{"foo": 1}"#;
        let s = parse_sections(raw, &SectionRule::Auto);
        assert_eq!(titles(&s), [UNSTRUCTURED_TITLE]);
    }
}
