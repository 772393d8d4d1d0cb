//! Prompt text and schema hints for the three service calls.

use serde_json::{json, Value};
use std::fmt::Write as _;

use super::layout::LayoutEstimate;
use crate::core::{
    format_money, BrandingConfig, Candidate, GenerationAttempt, GenerationRequest, PageConfig,
    QualityRequirements, Template,
};

/// System instruction for the generator.
pub const GENERATOR_SYSTEM: &str = "You assemble business documents. You receive an HTML \
template containing {{PLACEHOLDER}} markers and structured request data. Replace every marker \
with its value and repeat the line-item row once per item, in order. Keep the template's \
structure, styling, colors and fonts exactly as they are. Never invent content that is not in \
the data, and use the pre-formatted values verbatim.";

/// System instruction for the semantic validator.
pub const VALIDATOR_SYSTEM: &str = "You review a generated business document against the \
template it was produced from. Judge whether structure, layout and styling were preserved. \
Report each deviation as one short, specific issue. Do not judge the business data itself.";

/// System instruction for the optimizer.
pub const OPTIMIZER_SYSTEM: &str = "You prepare HTML documents for print-to-PDF rendering. \
You may change layout only: CSS, page-break hints, table sizing and header repetition. Never \
change text, numbers, colors or the order of content.";

/// Expected reply of the generator.
#[must_use]
pub fn generation_schema() -> Value {
    json!({
        "html_generated": "<the complete filled HTML document>",
        "metadata": {"placeholders_filled": ["CLIENT_NAME"], "notes": "optional remarks"}
    })
}

/// Expected reply of the semantic validator.
#[must_use]
pub fn validation_schema() -> Value {
    json!({
        "is_valid": true,
        "similarity_score": 0.93,
        "issues": ["short description of one deviation"],
        "corrections_made": [],
        "quality_score": 0.9
    })
}

/// Expected reply of the optimizer.
#[must_use]
pub fn optimization_schema() -> Value {
    json!({
        "html_optimized": "<the complete print-ready HTML document>",
        "analysis": {
            "estimated_pages": 1,
            "adjustments": ["what was changed"],
            "warnings": ["anything the reader should know"]
        }
    })
}

/// User prompt for one generation attempt.
#[must_use]
pub fn generation_prompt(
    template: &Template,
    request: &GenerationRequest,
    attempt: &GenerationAttempt,
) -> String {
    let values = request.placeholder_values();
    let mut prompt = String::new();

    let _ = writeln!(prompt, "TEMPLATE:\n{}\n", template.markup());

    prompt.push_str("PLACEHOLDER VALUES:\n");
    for name in template.placeholders() {
        match values.get(name.as_str()) {
            Some(value) => {
                let _ = writeln!(prompt, "- {name}: {value}");
            }
            None => {
                let _ = writeln!(prompt, "- {name}: (no value, leave the element empty)");
            }
        }
    }

    prompt.push_str("\nLINE ITEMS (in order):\n");
    for (i, item) in request.items.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. {} | {} {} | {} | {}",
            i + 1,
            item.name,
            item.quantity,
            item.unit,
            format_money(item.unit_price),
            format_money(item.total)
        );
    }

    let data = serde_json::to_string_pretty(request).unwrap_or_default();
    let _ = write!(prompt, "\nREQUEST DATA (JSON):\n{data}\n");

    if let Some(ref prior) = attempt.prior {
        let _ = write!(
            prompt,
            "\nATTEMPT {} WAS REJECTED. Fix exactly these issues and change nothing else:\n",
            attempt.number.saturating_sub(1)
        );
        for issue in &prior.issues {
            let _ = writeln!(prompt, "- {issue}");
        }
        let _ = write!(prompt, "\nREJECTED MARKUP:\n{}\n", prior.markup);
    }

    prompt
}

/// User prompt for the semantic review.
#[must_use]
pub fn validation_prompt(
    candidate: &Candidate,
    template: &Template,
    branding: &BrandingConfig,
) -> String {
    format!(
        "TEMPLATE:\n{}\n\nBRANDING:\n{}\n\nGENERATED DOCUMENT (attempt {}):\n{}\n\n\
         Score similarity_score from 0 to 1 for how faithfully the document keeps the \
         template's structure and styling.",
        template.markup(),
        branding.describe(),
        candidate.attempt,
        candidate.markup
    )
}

/// User prompt for print optimization.
#[must_use]
pub fn optimization_prompt(
    candidate: &Candidate,
    page: &PageConfig,
    quality: &QualityRequirements,
    estimate: &LayoutEstimate,
) -> String {
    let mut tasks = vec![format!(
        "Ensure margins of at least {}mm with an @page rule.",
        page.margin_mm.max(quality.min_margin_mm)
    )];
    if estimate.needs_page_breaks() {
        tasks.push("Content exceeds one page: add page-break hints between logical sections.".to_string());
    }
    if quality.repeat_table_headers {
        tasks.push("Repeat table header rows on every printed page (thead).".to_string());
    }
    if !quality.allow_row_split {
        tasks.push("Keep table rows from splitting across pages.".to_string());
    }
    if !estimate.oversized_tables.is_empty() {
        tasks.push("Shrink and re-center the over-wide tables listed below.".to_string());
    }

    format!(
        "PAGE: {} {}, margin {}mm\n\nREQUIREMENTS:\n{}\n\nLAYOUT ESTIMATE:\n{}\n\nTASKS:\n- {}\n\nDOCUMENT:\n{}",
        page.size.css_name(),
        page.orientation,
        page.margin_mm,
        quality.describe(),
        estimate.describe(),
        tasks.join("\n- "),
        candidate.markup
    )
}
