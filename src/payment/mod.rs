//! PIX payments: intent creation, provider verification and exactly-once settlement.

mod gate;
mod mercadopago;
mod provider;
mod webhook;

pub use gate::{ConfirmOutcome, GateError, PaymentIntent, SettlementGate, MAX_SPOKEN_MESSAGE_CHARS};
pub use mercadopago::MercadoPagoClient;
pub use provider::{PaymentError, PaymentProvider, PaymentStatus, PixPayment, PixPaymentRequest};
pub use webhook::extract_payment_id;
