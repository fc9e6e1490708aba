use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment provider is not configured")]
    NotConfigured,

    #[error("payment request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed payment response: {0}")]
    Malformed(String),
}

/// What we ask the provider for when a customer checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixPaymentRequest {
    pub amount_cents: i64,
    pub description: String,
    /// Our correlation id, echoed back by the provider as the external reference.
    pub external_reference: String,
}

/// A freshly created PIX charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixPayment {
    pub payment_id: String,
    /// "Copia e cola" text code.
    pub qr_code: String,
    pub qr_code_base64: String,
}

/// Authoritative status as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Approved,
    Pending,
    Rejected,
    Cancelled,
    Other(String),
}

impl PaymentStatus {
    pub fn from_provider_str(status: &str) -> Self {
        match status {
            "approved" => Self::Approved,
            "pending" | "in_process" | "authorized" => Self::Pending,
            "rejected" => Self::Rejected,
            "cancelled" | "refunded" | "charged_back" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// PIX payment processor. Only its answers count as proof of payment.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_pix_payment(
        &self,
        request: &PixPaymentRequest,
    ) -> Result<PixPayment, PaymentError>;

    async fn get_payment_status(&self, payment_id: &str) -> Result<PaymentStatus, PaymentError>;
}
