//! Stripe-backed payment link provider.
//!
//! Two sequential API calls per link: an ad-hoc price for the option's
//! amount, then a payment link referencing it. Calls are never retried
//! automatically; the send flow aborts on the first failure and the operator
//! retries manually.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::info;

use tafel_core::domain::option::PaymentLink;
use tafel_core::send::{PaymentLinkProvider, PaymentLinkRequest, ProviderError};

const CURRENCY: &str = "eur";

pub struct StripePaymentLinks {
    client: Client,
    api_base_url: String,
    secret_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PaymentLinkResponse {
    id: String,
    url: String,
}

impl StripePaymentLinks {
    pub fn new(api_base_url: impl Into<String>, secret_key: SecretString) -> Self {
        Self { client: Client::new(), api_base_url: api_base_url.into(), secret_key }
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{path}", self.api_base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("stripe returned {status}: {body}")));
        }

        response.json::<T>().await.map_err(|error| ProviderError::Transport(error.to_string()))
    }
}

#[async_trait]
impl PaymentLinkProvider for StripePaymentLinks {
    async fn create_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLink, ProviderError> {
        let price: PriceResponse = self.post_form("/v1/prices", &price_form(request)?).await?;
        let link: PaymentLinkResponse =
            self.post_form("/v1/payment_links", &link_form(&price.id, request)).await?;

        info!(
            event_name = "payments.link_created",
            inquiry_id = %request.inquiry_id.0,
            option_id = %request.option_id.0,
            link_id = %link.id,
            "payment link created"
        );
        Ok(PaymentLink { id: link.id, url: link.url })
    }
}

/// Stand-in used when no Stripe key is configured. Keeps the send flow's
/// error path honest instead of silently skipping links.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledPaymentLinks;

#[async_trait]
impl PaymentLinkProvider for DisabledPaymentLinks {
    async fn create_link(
        &self,
        _request: &PaymentLinkRequest,
    ) -> Result<PaymentLink, ProviderError> {
        Err(ProviderError::Rejected("payment link provider is not configured".to_string()))
    }
}

fn amount_in_cents(amount: Decimal) -> Result<i64, ProviderError> {
    let cents = (amount * Decimal::from(100)).round();
    cents
        .to_i64()
        .filter(|value| *value >= 0)
        .ok_or_else(|| ProviderError::Rejected(format!("amount `{amount}` is not chargeable")))
}

fn price_form(request: &PaymentLinkRequest) -> Result<Vec<(String, String)>, ProviderError> {
    Ok(vec![
        ("currency".to_string(), CURRENCY.to_string()),
        ("unit_amount".to_string(), amount_in_cents(request.amount)?.to_string()),
        (
            "product_data[name]".to_string(),
            format!("{} ({})", request.package_name, request.customer_name),
        ),
    ])
}

fn link_form(price_id: &str, request: &PaymentLinkRequest) -> Vec<(String, String)> {
    vec![
        ("line_items[0][price]".to_string(), price_id.to_string()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("metadata[inquiry_id]".to_string(), request.inquiry_id.0.clone()),
        ("metadata[option_id]".to_string(), request.option_id.0.clone()),
        ("metadata[customer_email]".to_string(), request.customer_email.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use tafel_core::domain::inquiry::InquiryId;
    use tafel_core::domain::option::OptionId;
    use tafel_core::send::{PaymentLinkProvider, PaymentLinkRequest, ProviderError};

    use super::{amount_in_cents, link_form, price_form, DisabledPaymentLinks};

    fn request() -> PaymentLinkRequest {
        PaymentLinkRequest {
            inquiry_id: InquiryId("inq-1".to_string()),
            option_id: OptionId("opt-1".to_string()),
            package_name: "Classic Dinner".to_string(),
            amount: Decimal::new(49_500, 2),
            customer_name: "Erika Mustermann".to_string(),
            customer_email: "erika@example.com".to_string(),
        }
    }

    #[test]
    fn amounts_convert_to_whole_cents() {
        assert_eq!(amount_in_cents(Decimal::new(49_500, 2)).expect("cents"), 49_500);
        assert_eq!(amount_in_cents(Decimal::new(1_005, 1)).expect("cents"), 10_050);
        assert!(amount_in_cents(Decimal::new(-100, 2)).is_err());
    }

    #[test]
    fn price_form_carries_currency_amount_and_product() {
        let form = price_form(&request()).expect("form");
        assert!(form.contains(&("currency".to_string(), "eur".to_string())));
        assert!(form.contains(&("unit_amount".to_string(), "49500".to_string())));
        assert!(form
            .iter()
            .any(|(key, value)| key == "product_data[name]" && value.contains("Classic Dinner")));
    }

    #[test]
    fn link_form_references_price_and_inquiry_metadata() {
        let form = link_form("price_123", &request());
        assert!(form.contains(&("line_items[0][price]".to_string(), "price_123".to_string())));
        assert!(form.contains(&("metadata[inquiry_id]".to_string(), "inq-1".to_string())));
    }

    #[tokio::test]
    async fn disabled_provider_rejects_every_request() {
        let error =
            DisabledPaymentLinks.create_link(&request()).await.expect_err("must be rejected");
        assert!(matches!(error, ProviderError::Rejected(_)));
    }
}
