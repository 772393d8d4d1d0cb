//! Completion-service reply bodies for each stage.

use serde_json::json;

/// A generator reply carrying `markup`.
#[must_use]
pub fn generation(markup: &str) -> String {
    json!({ "html_generated": markup, "metadata": { "model": "scripted" } }).to_string()
}

/// A semantic-review reply with the given score and issues.
#[must_use]
pub fn review(similarity_score: f64, issues: &[&str]) -> String {
    json!({
        "is_valid": issues.is_empty(),
        "similarity_score": similarity_score,
        "issues": issues,
        "corrections_made": [],
        "quality_score": similarity_score,
    })
    .to_string()
}

/// An optimizer reply carrying `markup`, wrapped in prose and a code fence
/// the way chat models tend to answer.
#[must_use]
pub fn optimization(markup: &str, estimated_pages: u32) -> String {
    let body = json!({
        "html_optimized": markup,
        "analysis": {
            "estimated_pages": estimated_pages,
            "adjustments": ["added print margins"],
            "warnings": [],
        },
    });
    format!("Here is the optimized document:\n```json\n{body}\n```")
}
