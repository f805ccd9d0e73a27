//! Offer email and quotation document rendering.
//!
//! Both collaborators are template-driven: a plain-text email body for the
//! composer's send step and an HTML quotation document per sent version.
//! Custom Tera filters cover money formatting of decimal amounts, which
//! serialize as strings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tera::{Context, Tera};
use tracing::info;

use tafel_core::config::EmailConfig;
use tafel_core::domain::history::OfferHistoryEntry;
use tafel_core::domain::inquiry::Inquiry;
use tafel_core::domain::option::OfferOption;
use tafel_core::send::{OfferEmailGenerator, ProviderError, QuotationGenerator};

const OFFER_EMAIL_TEMPLATE: &str = "offer_email.txt";
const QUOTATION_TEMPLATE: &str = "quotation.html";

const DEFAULT_OFFER_EMAIL: &str = r#"Dear {{ customer_name }},

thank you for your inquiry. We are pleased to offer the following for {{ guest_count }} guests:
{% for option in options %}
Option {{ option.label }}: {{ option.package_name }}
  Guests: {{ option.guest_count }}
  Total: {{ option.total_amount | money }} EUR
{%- if option.payment_link %}
  Payment: {{ option.payment_link.url }}
{%- endif %}
{% endfor %}
Kind regards,
{{ sender_name }}
"#;

const DEFAULT_QUOTATION: &str = r#"<!DOCTYPE html>
<html>
  <head><title>Offer v{{ version }}</title></head>
  <body>
    <h1>Offer for {{ customer_name }} (version {{ version }})</h1>
    <ul>
    {% for option in options %}
      <li>Option {{ option.label }}: {{ option.package_name }}, {{ option.total_amount | money }} EUR</li>
    {% endfor %}
    </ul>
  </body>
</html>
"#;

/// Formats a numeric or stringly-numeric value with two decimal places.
/// Usage: `amount | money`
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let num = match value {
        tera::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        tera::Value::String(s) => s.parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(tera::Value::String(format!("{num:.2}")))
}

pub fn build_templates(config: &EmailConfig) -> Result<Tera, tera::Error> {
    let mut tera = match &config.template_dir {
        Some(dir) => Tera::new(&format!("{dir}/**/*"))?,
        None => Tera::default(),
    };

    if !tera.get_template_names().any(|name| name == OFFER_EMAIL_TEMPLATE) {
        tera.add_raw_template(OFFER_EMAIL_TEMPLATE, DEFAULT_OFFER_EMAIL)?;
    }
    if !tera.get_template_names().any(|name| name == QUOTATION_TEMPLATE) {
        tera.add_raw_template(QUOTATION_TEMPLATE, DEFAULT_QUOTATION)?;
    }
    tera.register_filter("money", tera_money_filter);
    Ok(tera)
}

pub struct TeraOfferEmail {
    tera: Arc<Tera>,
    sender_name: String,
}

impl TeraOfferEmail {
    pub fn new(tera: Arc<Tera>, sender_name: impl Into<String>) -> Self {
        Self { tera, sender_name: sender_name.into() }
    }
}

#[async_trait]
impl OfferEmailGenerator for TeraOfferEmail {
    async fn generate(
        &self,
        inquiry: &Inquiry,
        options: &[OfferOption],
    ) -> Result<String, ProviderError> {
        let mut context = Context::new();
        context.insert("customer_name", &inquiry.customer_name);
        context.insert("guest_count", &inquiry.guest_count);
        context.insert("event_date", &inquiry.event_date);
        context.insert("options", options);
        context.insert("sender_name", &self.sender_name);

        self.tera
            .render(OFFER_EMAIL_TEMPLATE, &context)
            .map_err(|error| ProviderError::Rejected(format!("email template: {error}")))
    }
}

pub struct TeraQuotationDocument {
    tera: Arc<Tera>,
}

impl TeraQuotationDocument {
    pub fn new(tera: Arc<Tera>) -> Self {
        Self { tera }
    }
}

#[async_trait]
impl QuotationGenerator for TeraQuotationDocument {
    async fn generate(
        &self,
        inquiry: &Inquiry,
        entry: &OfferHistoryEntry,
    ) -> Result<(), ProviderError> {
        let mut context = Context::new();
        context.insert("customer_name", &inquiry.customer_name);
        context.insert("version", &entry.version);
        context.insert("sent_at", &entry.sent_at.to_rfc3339());
        context.insert("options", &entry.options_snapshot);

        let document = self
            .tera
            .render(QUOTATION_TEMPLATE, &context)
            .map_err(|error| ProviderError::Rejected(format!("quotation template: {error}")))?;

        info!(
            event_name = "quotation.rendered",
            inquiry_id = %inquiry.id.0,
            version = entry.version,
            bytes = document.len(),
            "quotation document rendered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use tafel_core::config::EmailConfig;
    use tafel_core::domain::history::{HistoryEntryId, OfferHistoryEntry};
    use tafel_core::domain::inquiry::{Inquiry, InquiryId, InquiryStatus};
    use tafel_core::domain::option::{OfferOption, OptionLabel, PaymentLink};
    use tafel_core::send::{OfferEmailGenerator, QuotationGenerator};

    use super::{build_templates, TeraOfferEmail, TeraQuotationDocument};

    fn email_config() -> EmailConfig {
        EmailConfig {
            sender_name: "Tafel Events".to_string(),
            sender_address: "events@tafel.example".to_string(),
            template_dir: None,
        }
    }

    fn inquiry() -> Inquiry {
        Inquiry {
            id: InquiryId("inq-render".to_string()),
            customer_name: "Erika Mustermann".to_string(),
            customer_email: "erika@example.com".to_string(),
            event_date: None,
            guest_count: 20,
            preselected_packages: Vec::new(),
            status: InquiryStatus::InProgress,
            offer_sent_at: None,
            offer_sent_by: None,
            current_offer_version: 1,
            email_draft: None,
        }
    }

    fn option() -> OfferOption {
        let mut option = OfferOption::blank(OptionLabel::A, 20, 1, 0);
        option.package_name = "Classic Dinner".to_string();
        option.total_amount = Decimal::new(99_000, 2);
        option.payment_link = Some(PaymentLink {
            id: "plink_1".to_string(),
            url: "https://pay.example/1".to_string(),
        });
        option
    }

    #[tokio::test]
    async fn email_renders_options_with_formatted_totals() {
        let tera = Arc::new(build_templates(&email_config()).expect("templates"));
        let generator = TeraOfferEmail::new(tera, "Tafel Events");

        let body = generator.generate(&inquiry(), &[option()]).await.expect("render");

        assert!(body.contains("Dear Erika Mustermann"));
        assert!(body.contains("Option A: Classic Dinner"));
        assert!(body.contains("990.00 EUR"));
        assert!(body.contains("https://pay.example/1"));
        assert!(body.contains("Tafel Events"));
    }

    #[tokio::test]
    async fn quotation_renders_for_a_history_entry() {
        let tera = Arc::new(build_templates(&email_config()).expect("templates"));
        let renderer = TeraQuotationDocument::new(tera);

        let entry = OfferHistoryEntry {
            id: HistoryEntryId::generate(),
            version: 2,
            sent_at: Utc::now(),
            sent_by: Some("events@tafel.example".to_string()),
            email_content: Some("body".to_string()),
            pdf_url: None,
            options_snapshot: vec![option()],
        };

        renderer.generate(&inquiry(), &entry).await.expect("render");
    }
}
