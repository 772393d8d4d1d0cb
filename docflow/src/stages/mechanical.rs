//! Deterministic, service-free validation checks.
//!
//! Issues come out grouped by check, in a fixed check order, and within a
//! check by document position or request order. Running the checks twice on
//! the same inputs yields identical lists.

use std::collections::BTreeSet;

use crate::core::color::extract_colors;
use crate::core::{
    unresolved_placeholders, BrandingConfig, GenerationRequest, IssueCode, Template,
    ValidationIssue,
};
use crate::utils::markup::{balance_errors, contains_normalized, visible_text};

/// Runs every mechanical check on `markup`.
#[must_use]
pub fn check(
    markup: &str,
    template: &Template,
    branding: &BrandingConfig,
    request: &GenerationRequest,
) -> Vec<ValidationIssue> {
    let text = visible_text(markup);
    let mut issues = well_formedness(markup);
    issues.extend(unresolved(markup));
    issues.extend(missing_values(&text, template, request));
    issues.extend(unauthorized_colors(markup, template, branding));
    issues.extend(missing_line_items(&text, request));
    issues
}

/// Tag-balance problems.
#[must_use]
pub fn well_formedness(markup: &str) -> Vec<ValidationIssue> {
    balance_errors(markup)
        .into_iter()
        .map(|e| ValidationIssue::mechanical(IssueCode::MalformedMarkup, format!("markup is not well formed: {e}")))
        .collect()
}

/// Placeholder syntax left in the output.
#[must_use]
pub fn unresolved(markup: &str) -> Vec<ValidationIssue> {
    unresolved_placeholders(markup)
        .into_iter()
        .map(|p| {
            ValidationIssue::mechanical(
                IssueCode::UnresolvedPlaceholder,
                format!("placeholder {p} was left unresolved"),
            )
        })
        .collect()
}

/// Template placeholders whose request value is absent from the text.
#[must_use]
pub fn missing_values(
    text: &str,
    template: &Template,
    request: &GenerationRequest,
) -> Vec<ValidationIssue> {
    let values = request.placeholder_values();
    template
        .placeholders()
        .iter()
        .filter_map(|name| {
            let value = values.get(name.as_str())?;
            (!contains_normalized(text, value)).then(|| {
                ValidationIssue::mechanical(
                    IssueCode::MissingValue,
                    format!("value for {name} (\"{value}\") does not appear in the document"),
                )
            })
        })
        .collect()
}

/// Colors outside `branding ∪ template colors`, once each, in document order.
#[must_use]
pub fn unauthorized_colors(
    markup: &str,
    template: &Template,
    branding: &BrandingConfig,
) -> Vec<ValidationIssue> {
    let allowed = branding.authorized_colors();
    let mut reported = BTreeSet::new();

    extract_colors(markup)
        .into_iter()
        .filter(|occ| !allowed.contains(&occ.color) && !template.colors().contains(&occ.color))
        .filter(|occ| reported.insert(occ.color.clone()))
        .map(|occ| {
            ValidationIssue::mechanical(
                IssueCode::UnauthorizedColor,
                format!(
                    "color {} ({}) is not part of the branding or the template",
                    occ.literal, occ.color
                ),
            )
        })
        .collect()
}

/// Line items whose name is absent from the text, in request order.
#[must_use]
pub fn missing_line_items(text: &str, request: &GenerationRequest) -> Vec<ValidationIssue> {
    request
        .item_names()
        .filter(|name| !contains_normalized(text, name))
        .map(|name| {
            ValidationIssue::mechanical(
                IssueCode::MissingLineItem,
                format!("line item \"{name}\" is missing from the document"),
            )
        })
        .collect()
}
