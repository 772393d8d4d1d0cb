//! Structured business data for one generation run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who the document is for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Contact name.
    pub name: String,
    /// Company, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact phone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Postal address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Event and venue facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    /// Event name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Event date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Venue name or address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    /// Expected number of guests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_count: Option<u32>,
}

/// One priced line of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Item name as it must appear in the output.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Quantity.
    pub quantity: f64,
    /// Unit label (e.g. "person", "hour").
    #[serde(default)]
    pub unit: String,
    /// Price per unit.
    pub unit_price: f64,
    /// Line total.
    pub total: f64,
}

impl LineItem {
    /// Creates a line item whose total is quantity times unit price.
    #[must_use]
    pub fn new(name: impl Into<String>, quantity: f64, unit: impl Into<String>, unit_price: f64) -> Self {
        Self {
            name: name.into(),
            description: None,
            quantity,
            unit: unit.into(),
            unit_price,
            total: quantity * unit_price,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Computed totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// Sum of line totals.
    pub subtotal: f64,
    /// Tax rate in percent.
    #[serde(default)]
    pub tax_rate: f64,
    /// Tax amount.
    #[serde(default)]
    pub tax_amount: f64,
    /// Discount amount.
    #[serde(default)]
    pub discount: f64,
    /// Grand total.
    pub total: f64,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Pricing {
    /// Computes pricing from items, a tax rate in percent and a discount.
    #[must_use]
    pub fn compute(items: &[LineItem], tax_rate: f64, discount: f64) -> Self {
        let subtotal: f64 = items.iter().map(|item| item.total).sum();
        let taxable = (subtotal - discount).max(0.0);
        let tax_amount = round_cents(taxable * tax_rate / 100.0);
        Self {
            subtotal: round_cents(subtotal),
            tax_rate,
            tax_amount,
            discount: round_cents(discount),
            total: round_cents(taxable + tax_amount),
            currency: default_currency(),
        }
    }

    /// Sets the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

/// Conditional sections of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFlags {
    /// Render the tax row.
    #[serde(default = "default_true")]
    pub show_tax_row: bool,
    /// Render the discount row.
    #[serde(default)]
    pub show_discount_row: bool,
    /// Render the notes section.
    #[serde(default = "default_true")]
    pub show_notes: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplayFlags {
    fn default() -> Self {
        Self {
            show_tax_row: true,
            show_discount_row: false,
            show_notes: true,
        }
    }
}

/// All data needed to fill one document. Immutable for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Client identity.
    pub client: ClientInfo,
    /// Event facts.
    #[serde(default)]
    pub event: EventInfo,
    /// Ordered line items.
    pub items: Vec<LineItem>,
    /// Computed totals.
    pub pricing: Pricing,
    /// Conditional display flags.
    #[serde(default)]
    pub flags: DisplayFlags,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl GenerationRequest {
    /// Creates a request; pricing is computed from the items with no tax.
    #[must_use]
    pub fn new(client: ClientInfo, items: Vec<LineItem>) -> Self {
        let pricing = Pricing::compute(&items, 0.0, 0.0);
        Self {
            client,
            event: EventInfo::default(),
            items,
            pricing,
            flags: DisplayFlags::default(),
            notes: None,
        }
    }

    /// Sets the event.
    #[must_use]
    pub fn with_event(mut self, event: EventInfo) -> Self {
        self.event = event;
        self
    }

    /// Sets pricing.
    #[must_use]
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Sets display flags.
    #[must_use]
    pub fn with_flags(mut self, flags: DisplayFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Item names in request order.
    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.name.as_str())
    }

    /// Canonical placeholder values, pre-formatted for display.
    ///
    /// Entries hidden by the display flags are omitted, as are empty
    /// optional fields.
    #[must_use]
    pub fn placeholder_values(&self) -> BTreeMap<&'static str, String> {
        let mut values = BTreeMap::new();
        let mut put = |key: &'static str, value: Option<String>| {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                values.insert(key, v);
            }
        };

        put("CLIENT_NAME", Some(self.client.name.clone()));
        put("CLIENT_COMPANY", self.client.company.clone());
        put("CLIENT_EMAIL", self.client.email.clone());
        put("CLIENT_PHONE", self.client.phone.clone());
        put("CLIENT_ADDRESS", self.client.address.clone());
        put("EVENT_NAME", self.event.name.clone());
        put(
            "EVENT_DATE",
            self.event.date.map(|d| d.format("%Y-%m-%d").to_string()),
        );
        put("EVENT_VENUE", self.event.venue.clone());
        put("GUEST_COUNT", self.event.guest_count.map(|n| n.to_string()));
        put("SUBTOTAL", Some(format_money(self.pricing.subtotal)));
        put("TOTAL", Some(format_money(self.pricing.total)));
        put("CURRENCY", Some(self.pricing.currency.clone()));

        if self.flags.show_tax_row {
            put("TAX_RATE", Some(format!("{}%", self.pricing.tax_rate)));
            put("TAX_AMOUNT", Some(format_money(self.pricing.tax_amount)));
        }
        if self.flags.show_discount_row {
            put("DISCOUNT", Some(format_money(self.pricing.discount)));
        }
        if self.flags.show_notes {
            put("NOTES", self.notes.clone());
        }

        values
    }
}

/// Formats an amount with exactly two decimals.
#[must_use]
pub fn format_money(amount: f64) -> String {
    format!("{amount:.2}")
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
