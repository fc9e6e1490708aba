//! Mercado Pago client for PIX charges.

use super::provider::{PaymentError, PaymentProvider, PaymentStatus, PixPayment, PixPaymentRequest};
use crate::config::PaymentSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub struct MercadoPagoClient {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    notification_url: Option<String>,
    payer_email: String,
}

impl MercadoPagoClient {
    pub fn new(settings: &PaymentSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to create payment HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            access_token: settings.access_token.clone(),
            notification_url: settings.notification_url.clone(),
            payer_email: settings.payer_email.clone(),
        })
    }

    fn access_token(&self) -> Result<&str, PaymentError> {
        self.access_token
            .as_deref()
            .ok_or(PaymentError::NotConfigured)
    }
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    transaction_amount: f64,
    description: &'a str,
    payment_method_id: &'static str,
    payer: Payer<'a>,
    external_reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Payer<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: serde_json::Value,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Deserialize)]
struct PointOfInteraction {
    transaction_data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    qr_code: Option<String>,
    qr_code_base64: Option<String>,
}

/// The provider sends numeric ids; we keep them as strings everywhere.
fn id_to_string(id: &serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

impl TryFrom<PaymentResponse> for PixPayment {
    type Error = PaymentError;

    fn try_from(response: PaymentResponse) -> Result<Self, Self::Error> {
        let payment_id = id_to_string(&response.id)
            .ok_or_else(|| PaymentError::Malformed("payment without id".into()))?;
        let data = response
            .point_of_interaction
            .and_then(|p| p.transaction_data)
            .ok_or_else(|| PaymentError::Malformed("payment without transaction data".into()))?;
        match (data.qr_code, data.qr_code_base64) {
            (Some(qr_code), Some(qr_code_base64)) if !qr_code_base64.is_empty() => Ok(PixPayment {
                payment_id,
                qr_code,
                qr_code_base64,
            }),
            _ => Err(PaymentError::Malformed(format!(
                "payment {} has no QR code",
                payment_id
            ))),
        }
    }
}

fn cents_to_amount(cents: i64) -> f64 {
    cents as f64 / 100.0
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PaymentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PaymentError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl PaymentProvider for MercadoPagoClient {
    async fn create_pix_payment(
        &self,
        request: &PixPaymentRequest,
    ) -> Result<PixPayment, PaymentError> {
        let token = self.access_token()?;
        let url = format!("{}/v1/payments", self.base_url);
        let body = CreatePaymentBody {
            transaction_amount: cents_to_amount(request.amount_cents),
            description: &request.description,
            payment_method_id: "pix",
            payer: Payer {
                email: &self.payer_email,
            },
            external_reference: &request.external_reference,
            notification_url: self.notification_url.as_deref(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("X-Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await?;
        let response: PaymentResponse = check_status(response).await?.json().await?;
        let payment = PixPayment::try_from(response)?;
        info!(
            "Created PIX payment {} for {} cents",
            payment.payment_id, request.amount_cents
        );
        Ok(payment)
    }

    async fn get_payment_status(&self, payment_id: &str) -> Result<PaymentStatus, PaymentError> {
        let token = self.access_token()?;
        let url = format!("{}/v1/payments/{}", self.base_url, payment_id);

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let response: PaymentResponse = check_status(response).await?.json().await?;
        let status = response
            .status
            .ok_or_else(|| PaymentError::Malformed(format!("payment {} has no status", payment_id)))?;
        debug!("Payment {} status is {}", payment_id, status);
        Ok(PaymentStatus::from_provider_str(&status))
    }
}
