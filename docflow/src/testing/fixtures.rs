//! Sample inputs shared by unit tests, integration tests and benches.
//!
//! The filled document renders every request value verbatim and uses only
//! the template's own colors, so it passes the mechanical checks.

use chrono::NaiveDate;

use crate::core::{
    BrandingConfig, ClientInfo, EventInfo, GenerationRequest, LineItem, PageConfig, Pricing,
    QualityRequirements, Template,
};
use crate::orchestrator::PipelineInput;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
body { font-family: Georgia, serif; color: #333333; }
.header { background: #1f3a5f; color: #ffffff; padding: 12px; }
th { background-color: #1f3a5f; color: #ffffff; }
.total { border-top: 2px solid #c8a24a; }
</style>
</head>
<body>
<div class="header">
<h1>Quote for {{CLIENT_NAME}}</h1>
<p>{{CLIENT_COMPANY}}</p>
</div>
<section class="event">
<p>Event: {{EVENT_NAME}} on {{EVENT_DATE}} at {{EVENT_VENUE}}</p>
<p>Guests: {{GUEST_COUNT}}</p>
</section>
<table>
<tr><th>Item</th><th>Quantity</th><th>Unit price</th><th>Total</th></tr>
<tr><td>{{ITEM_NAME}}</td><td>{{ITEM_QTY}}</td><td>{{ITEM_PRICE}}</td><td>{{ITEM_TOTAL}}</td></tr>
</table>
<div class="total">
<p>Subtotal: {{SUBTOTAL}} {{CURRENCY}}</p>
<p>Tax ({{TAX_RATE}}): {{TAX_AMOUNT}} {{CURRENCY}}</p>
<p>Total: {{TOTAL}} {{CURRENCY}}</p>
</div>
</body>
</html>
"#;

const ITEM_ROW: &str = "<tr><td>{{ITEM_NAME}}</td><td>{{ITEM_QTY}}</td><td>{{ITEM_PRICE}}</td><td>{{ITEM_TOTAL}}</td></tr>";

const FILLED_ROWS: &str = "<tr><td>Grilled Salmon</td><td>80 plate</td><td>24.50</td><td>1960.00</td></tr>
<tr><td>Seasonal Salad</td><td>80 plate</td><td>9.00</td><td>720.00</td></tr>
<tr><td>Lemon Tart</td><td>80 piece</td><td>6.25</td><td>500.00</td></tr>";

/// A catering quote template with header, event, item table and totals.
#[must_use]
pub fn sample_template() -> Template {
    Template::new(TEMPLATE)
}

/// Branding that authorizes the template's palette.
#[must_use]
pub fn sample_branding() -> BrandingConfig {
    BrandingConfig::new("#1f3a5f", "#1f3a5f", "#ffffff")
        .with_secondary_color("#333333")
        .with_accent_color("#c8a24a")
        .with_font_family("Georgia, serif")
}

/// Three line items for 80 guests at 8% tax.
#[must_use]
pub fn sample_request() -> GenerationRequest {
    let client = ClientInfo {
        name: "Dana Whitfield".to_string(),
        company: Some("Whitfield & Co".to_string()),
        email: None,
        phone: None,
        address: None,
    };
    let items = vec![
        LineItem::new("Grilled Salmon", 80.0, "plate", 24.5),
        LineItem::new("Seasonal Salad", 80.0, "plate", 9.0),
        LineItem::new("Lemon Tart", 80.0, "piece", 6.25),
    ];
    let pricing = Pricing::compute(&items, 8.0, 0.0);

    GenerationRequest::new(client, items)
        .with_event(EventInfo {
            name: Some("Spring Gala".to_string()),
            date: NaiveDate::from_ymd_opt(2026, 4, 18),
            venue: Some("Harbor Hall".to_string()),
            guest_count: Some(80),
        })
        .with_pricing(pricing)
}

/// The template filled with [`sample_request`], passing every mechanical
/// check.
#[must_use]
pub fn filled_markup() -> String {
    TEMPLATE
        .replace(ITEM_ROW, FILLED_ROWS)
        .replace("{{CLIENT_NAME}}", "Dana Whitfield")
        .replace("{{CLIENT_COMPANY}}", "Whitfield &amp; Co")
        .replace("{{EVENT_NAME}}", "Spring Gala")
        .replace("{{EVENT_DATE}}", "2026-04-18")
        .replace("{{EVENT_VENUE}}", "Harbor Hall")
        .replace("{{GUEST_COUNT}}", "80")
        .replace("{{SUBTOTAL}}", "3180.00")
        .replace("{{TAX_RATE}}", "8%")
        .replace("{{TAX_AMOUNT}}", "254.40")
        .replace("{{TOTAL}}", "3434.40")
        .replace("{{CURRENCY}}", "USD")
}

/// [`filled_markup`] with a heading color outside the branding.
#[must_use]
pub fn off_brand_markup() -> String {
    filled_markup().replace("<h1>", r##"<h1 style="color: #ff0000">"##)
}

/// Default inputs for a full run.
#[must_use]
pub fn sample_input() -> PipelineInput {
    PipelineInput::new(
        sample_template(),
        sample_branding(),
        sample_request(),
    )
    .with_page_config(PageConfig::default())
    .with_quality(QualityRequirements::default())
}
