//! Prompt templates for drawing compliance reviews.
//!
//! Every fixed [`ReviewType`] maps to exactly one template constant. The
//! template is sent verbatim as its own text part; project details and user
//! instructions travel in a second part built by [`build_context`], so the
//! template a request carries is always byte-identical to the constant here.

use crate::config::{ProjectInfo, ResponseFormat, ReviewType};
use crate::error::ReviewError;

/// Output instructions shared by every template. A macro so `concat!` can
/// splice it into the `const` templates.
macro_rules! report_format {
    () => {
        r###"

OUTPUT FORMAT
- Start each section with a Markdown heading: "## <Section title>"
- Use these sections, in this order: "Drawings Reviewed", "Key Measurements",
  "Compliance Assessment", "Issues and Risks", "Recommendations", "Overall Opinion"
- Use "- " bullet points for lists
- Quote dimensions exactly as annotated on the drawings, with units
- If something cannot be read from the drawings, say so rather than guessing
- Do NOT wrap the answer in code fences and do NOT add commentary outside the sections"###
    };
}

/// National Planning Policy Framework review.
pub const NPPF_PROMPT: &str = concat!(
    r#"You are an expert UK planning consultant reviewing architectural drawings against the National Planning Policy Framework (NPPF).

Examine every page of the attached PDF. Identify each drawing (site plan, floor plans, elevations, sections) and read its dimensions, annotations and labels.

Assess the proposal against the NPPF, in particular:
1. Achieving well-designed places (Chapter 12): scale, massing, materials, character of the area
2. Effective use of land (Chapter 11): density, plot coverage, amenity space
3. Residential amenity: overlooking, overshadowing, outlook and privacy for neighbours
4. Conserving and enhancing the historic environment (Chapter 16) where heritage assets are affected
5. Highway safety, parking and access
6. Sustainability and climate change (Chapter 14): flood risk, energy efficiency"#,
    report_format!()
);

/// Local Plan / Local Development Framework review.
pub const LOCAL_PLAN_PROMPT: &str = concat!(
    r#"You are an expert UK planning consultant reviewing architectural drawings against the policies of the Local Plan (Local Development Framework) of the relevant local planning authority.

Examine every page of the attached PDF. Identify each drawing (site plan, floor plans, elevations, sections) and read its dimensions, annotations and labels.

Assess the proposal against typical Local Plan design policies, in particular:
1. Design and character: street scene, building lines, roof form, materials
2. Extensions: subservience to the host building, set-backs and set-downs, the 45-degree rule
3. Residential amenity: separation distances, overlooking, daylight and sunlight
4. Space standards: internal floor areas against the Nationally Described Space Standard
5. Parking standards, refuse storage and cycle storage
6. Any Supplementary Planning Documents the authority is likely to apply
Where a policy depends on the specific authority, state the assumption you are making."#,
    report_format!()
);

/// Building Regulations review.
pub const BUILDING_REGS_PROMPT: &str = concat!(
    r#"You are an expert UK building control surveyor reviewing architectural drawings against the Building Regulations 2010 and their Approved Documents.

Examine every page of the attached PDF. Identify each drawing (site plan, floor plans, elevations, sections) and read its dimensions, annotations and specification notes.

Assess the proposal against the Approved Documents, in particular:
1. Part A (Structure): spans, lintels, beams and foundations where shown
2. Part B (Fire safety): means of escape, protected stairs, fire separation
3. Part F and Part L (Ventilation, Conservation of fuel and power): openings, insulation notes
4. Part K (Protection from falling): stair geometry, guarding and balustrade heights
5. Part M (Access to and use of buildings): level access, door widths
6. Part O (Overheating) for new dwellings
Flag any specification that is missing from the drawings but required for approval."#,
    report_format!()
);

/// Permitted Development Rights review.
pub const PERMITTED_DEVELOPMENT_PROMPT: &str = concat!(
    r#"You are an expert UK planning consultant checking whether the works shown in the attached architectural drawings fall within Permitted Development Rights under the Town and Country Planning (General Permitted Development) (England) Order 2015, Schedule 2, Part 1.

Examine every page of the attached PDF. Identify each drawing (site plan, floor plans, elevations, sections) and read its dimensions, annotations and labels.

Check the relevant Classes, in particular:
1. Class A (enlargement of a dwellinghouse): depth, height, eaves height, width and the 50% curtilage rule
2. Class B and C (roof alterations): volume allowances, set-back from the eaves, rooflight projection
3. Class E (outbuildings): height limits near boundaries, use incidental to the dwellinghouse
4. Materials of a similar appearance to the existing house
5. Designated land exclusions (conservation areas, AONB, listed buildings)
State clearly for each element whether it is permitted development or needs planning permission."#,
    report_format!()
);

/// Instructions added to the context part when a JSON answer is requested.
pub const JSON_SCHEMA_INSTRUCTION: &str = r#"Respond with a single JSON object instead of Markdown sections:
{
  "aiReviewFramework": [
    { "framework": "Framework name", "relevantPolicies": ["..."], "keyConsiderations": "..." }
  ],
  "planByPlanReview": [
    { "planType": "Drawing title", "positives": ["..."], "observations": ["..."], "complianceNotes": "..." }
  ],
  "policyCompatibilitySummary": [
    { "policyArea": "...", "status": "Compliant | Partially Compliant | Non-Compliant", "details": "...", "recommendations": ["..."] }
  ],
  "aiRecommendationSummary": "Overall assessment with references to the drawings"
}"#;

/// The fixed template for a review type.
///
/// Returns `None` for [`ReviewType::Custom`], whose text comes from the user.
pub fn template(review_type: ReviewType) -> Option<&'static str> {
    match review_type {
        ReviewType::Nppf => Some(NPPF_PROMPT),
        ReviewType::LocalPlan => Some(LOCAL_PLAN_PROMPT),
        ReviewType::BuildingRegs => Some(BUILDING_REGS_PROMPT),
        ReviewType::PermittedDevelopment => Some(PERMITTED_DEVELOPMENT_PROMPT),
        ReviewType::Custom => None,
    }
}

/// Resolve the prompt text for a review, failing on an empty result.
pub fn select_prompt(
    review_type: ReviewType,
    custom_prompt: Option<&str>,
) -> Result<String, ReviewError> {
    let text = match review_type {
        ReviewType::Custom => custom_prompt.unwrap_or_default(),
        fixed => template(fixed).unwrap_or_default(),
    };
    if text.trim().is_empty() {
        return Err(ReviewError::EmptyPrompt {
            review_type: review_type.to_string(),
        });
    }
    Ok(text.to_string())
}

/// Build the context part: project details, the file, user instructions.
///
/// Returns `None` when there is nothing to add.
pub fn build_context(
    project: &ProjectInfo,
    document_label: Option<&str>,
    instructions: Option<&str>,
    format: ResponseFormat,
) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();

    if !project.is_empty() {
        lines.push("PROJECT".to_string());
        if let Some(ref t) = project.project_type {
            lines.push(format!("- Type: {t}"));
        }
        if let Some(ref a) = project.address {
            lines.push(format!("- Address: {a}"));
        }
        lines.push(format!(
            "- Local planning authority: {}",
            project.council.as_deref().unwrap_or("Not specified")
        ));
        if let Some(ref r) = project.planning_reference {
            lines.push(format!("- Previous planning reference: {r}"));
        }
    }

    if let Some(label) = document_label {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(format!("ATTACHED FILE: {label}"));
    }

    if let Some(text) = instructions.map(str::trim).filter(|t| !t.is_empty()) {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("USER REQUEST".to_string());
        lines.push(text.to_string());
    }

    if format == ResponseFormat::Json {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(JSON_SCHEMA_INSTRUCTION.to_string());
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
