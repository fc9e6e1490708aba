//! Issues PIX payment intents and turns verified confirmations into queue entries.

use super::provider::{PaymentError, PaymentProvider, PaymentStatus, PixPayment, PixPaymentRequest};
use crate::playout::{PlayoutError, PlayoutHandle};
use crate::server::metrics;
use crate::store::{
    PendingSettlement, SettleResult, SettlementItem, SettlementStatus, SettlementStore,
    StorageError,
};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const MAX_SPOKEN_MESSAGE_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid payment request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Provider(#[from] PaymentError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Playout(#[from] PlayoutError),
}

/// A customer's checkout, before the provider has seen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub items: Vec<SettlementItem>,
    pub amount_cents: i64,
    pub description: String,
    pub spoken_message: Option<String>,
    /// Session that should hear about the confirmation.
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Settled { revenue_cents: i64 },
    AlreadySettled,
    UnknownPayment,
    /// The provider does not (yet) consider this payment approved.
    NotApproved(PaymentStatus),
}

pub struct SettlementGate {
    provider: Arc<dyn PaymentProvider>,
    store: Arc<dyn SettlementStore>,
    playout: PlayoutHandle,
    max_items_per_order: usize,
}

impl SettlementGate {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: Arc<dyn SettlementStore>,
        playout: PlayoutHandle,
        max_items_per_order: usize,
    ) -> Self {
        Self {
            provider,
            store,
            playout,
            max_items_per_order,
        }
    }

    fn validate(&self, intent: &PaymentIntent) -> Result<(), GateError> {
        if intent.items.is_empty() {
            return Err(GateError::Invalid("no items selected".into()));
        }
        if intent.items.len() > self.max_items_per_order {
            return Err(GateError::Invalid(format!(
                "at most {} items per order",
                self.max_items_per_order
            )));
        }
        if intent
            .items
            .iter()
            .any(|item| item.media_id.trim().is_empty() || item.title.trim().is_empty())
        {
            return Err(GateError::Invalid("every item needs a mediaId and a title".into()));
        }
        if intent.amount_cents <= 0 {
            return Err(GateError::Invalid("amount must be positive".into()));
        }
        if intent.correlation_id.trim().is_empty() {
            return Err(GateError::Invalid("correlationId is required".into()));
        }
        if let Some(message) = &intent.spoken_message {
            if message.chars().count() > MAX_SPOKEN_MESSAGE_CHARS {
                return Err(GateError::Invalid(format!(
                    "message longer than {} characters",
                    MAX_SPOKEN_MESSAGE_CHARS
                )));
            }
        }
        Ok(())
    }

    /// Creates the charge at the provider, then records it as pending.
    ///
    /// Nothing is stored if the provider refuses.
    pub async fn create_intent(&self, intent: PaymentIntent) -> Result<PixPayment, GateError> {
        if let Err(e) = self.validate(&intent) {
            metrics::record_payment_intent("invalid");
            return Err(e);
        }

        let description = match intent.description.trim() {
            "" => format!("Jukebox: {} música(s)", intent.items.len()),
            text => text.to_string(),
        };
        let request = PixPaymentRequest {
            amount_cents: intent.amount_cents,
            description: description.clone(),
            external_reference: intent.correlation_id.clone(),
        };
        let payment = match self.provider.create_pix_payment(&request).await {
            Ok(payment) => payment,
            Err(e) => {
                warn!("Payment provider refused intent: {}", e);
                metrics::record_payment_intent("provider_error");
                return Err(e.into());
            }
        };

        let spoken_message = intent
            .spoken_message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        let pending = PendingSettlement {
            payment_id: payment.payment_id.clone(),
            correlation_id: intent.correlation_id,
            amount_cents: intent.amount_cents,
            description,
            spoken_message,
            items: intent.items,
            status: SettlementStatus::Pending,
            created_at: Utc::now().timestamp_millis(),
            settled_at: None,
        };
        self.store.create_pending_settlement(&pending)?;
        metrics::record_payment_intent("created");
        info!(
            "Payment {} pending: {} items, {} cents, session {}",
            pending.payment_id,
            pending.items.len(),
            pending.amount_cents,
            pending.correlation_id
        );
        Ok(payment)
    }

    /// Handles a (possibly redundant) confirmation for `payment_id`.
    ///
    /// The provider is asked for the payment's status before anything is credited.
    /// Provider errors are returned so the caller can ask for redelivery.
    pub async fn confirm(&self, payment_id: &str) -> Result<ConfirmOutcome, GateError> {
        match self.store.get_settlement(payment_id)? {
            None => {
                info!("Notification for unknown payment {}, ignoring", payment_id);
                metrics::record_webhook("unknown");
                return Ok(ConfirmOutcome::UnknownPayment);
            }
            Some(settlement) if settlement.status == SettlementStatus::Settled => {
                metrics::record_webhook("duplicate");
                return Ok(ConfirmOutcome::AlreadySettled);
            }
            Some(_) => {}
        }

        let status = match self.provider.get_payment_status(payment_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Could not verify payment {}: {}", payment_id, e);
                metrics::record_webhook("provider_error");
                return Err(e.into());
            }
        };
        if !status.is_approved() {
            info!("Payment {} is {:?}, not settling yet", payment_id, status);
            metrics::record_webhook("not_approved");
            return Ok(ConfirmOutcome::NotApproved(status));
        }

        let outcome = match self.playout.settle(payment_id).await? {
            SettleResult::Settled { revenue_cents, .. } => {
                ConfirmOutcome::Settled { revenue_cents }
            }
            SettleResult::AlreadySettled => ConfirmOutcome::AlreadySettled,
            SettleResult::UnknownPayment => ConfirmOutcome::UnknownPayment,
        };
        metrics::record_webhook("verified");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayoutSettings;
    use crate::playout::PlayoutScheduler;
    use crate::server::websocket::connection::{ConnectionManager, SessionRole};
    use crate::server::websocket::messages::msg_types;
    use crate::store::{QueueStore, SettingsStore, SqliteJukeboxStore};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct FakeProvider {
        next_id: AtomicUsize,
        statuses: Mutex<HashMap<String, PaymentStatus>>,
        status_queries: AtomicUsize,
        fail: AtomicBool,
    }

    impl FakeProvider {
        fn approve(&self, payment_id: &str) {
            self.statuses
                .lock()
                .unwrap()
                .insert(payment_id.to_string(), PaymentStatus::Approved);
        }
    }

    #[async_trait]
    impl PaymentProvider for FakeProvider {
        async fn create_pix_payment(
            &self,
            request: &PixPaymentRequest,
        ) -> Result<PixPayment, PaymentError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PaymentError::Status {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            let id = format!("pay-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            self.statuses
                .lock()
                .unwrap()
                .insert(id.clone(), PaymentStatus::Pending);
            Ok(PixPayment {
                payment_id: id,
                qr_code: format!("pix:{}", request.amount_cents),
                qr_code_base64: "aW1n".into(),
            })
        }

        async fn get_payment_status(
            &self,
            payment_id: &str,
        ) -> Result<PaymentStatus, PaymentError> {
            self.status_queries.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(PaymentError::Status {
                    status: 500,
                    body: String::new(),
                });
            }
            self.statuses
                .lock()
                .unwrap()
                .get(payment_id)
                .cloned()
                .ok_or(PaymentError::Status {
                    status: 404,
                    body: String::new(),
                })
        }
    }

    struct Fixture {
        gate: SettlementGate,
        provider: Arc<FakeProvider>,
        store: Arc<SqliteJukeboxStore>,
        connections: Arc<ConnectionManager>,
        shutdown: CancellationToken,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.shutdown.cancel();
        }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SqliteJukeboxStore::in_memory().unwrap());
        let provider = Arc::new(FakeProvider::default());
        let connections = Arc::new(ConnectionManager::new());
        let shutdown = CancellationToken::new();
        let (scheduler, handle) = PlayoutScheduler::new(
            store.clone(),
            connections.clone(),
            &PlayoutSettings::default(),
            shutdown.clone(),
        );
        tokio::spawn(scheduler.run());
        let gate = SettlementGate::new(provider.clone(), store.clone(), handle, 3);
        Fixture {
            gate,
            provider,
            store,
            connections,
            shutdown,
        }
    }

    fn intent(correlation_id: &str, media: &[&str]) -> PaymentIntent {
        PaymentIntent {
            items: media
                .iter()
                .map(|m| SettlementItem {
                    media_id: m.to_string(),
                    title: format!("Title {}", m),
                })
                .collect(),
            amount_cents: 200 * media.len() as i64,
            description: String::new(),
            spoken_message: Some("  parabéns, Ana!  ".into()),
            correlation_id: correlation_id.to_string(),
        }
    }

    #[tokio::test]
    async fn create_intent_stores_pending_settlement() {
        let f = fixture();
        let payment = f.gate.create_intent(intent("sess-1", &["a", "b"])).await.unwrap();
        assert_eq!(payment.payment_id, "pay-1");
        assert_eq!(payment.qr_code, "pix:400");

        let stored = f.store.get_settlement("pay-1").unwrap().unwrap();
        assert_eq!(stored.status, SettlementStatus::Pending);
        assert_eq!(stored.correlation_id, "sess-1");
        assert_eq!(stored.amount_cents, 400);
        assert_eq!(stored.items.len(), 2);
        assert_eq!(stored.spoken_message.as_deref(), Some("parabéns, Ana!"));
        assert_eq!(stored.description, "Jukebox: 2 música(s)");
    }

    #[tokio::test]
    async fn invalid_intents_are_rejected_before_the_provider() {
        let f = fixture();

        let cases = vec![
            intent("sess", &[]),
            intent("sess", &["a", "b", "c", "d"]),
            intent("  ", &["a"]),
            PaymentIntent {
                amount_cents: 0,
                ..intent("sess", &["a"])
            },
            PaymentIntent {
                spoken_message: Some("x".repeat(MAX_SPOKEN_MESSAGE_CHARS + 1)),
                ..intent("sess", &["a"])
            },
            PaymentIntent {
                items: vec![SettlementItem {
                    media_id: " ".into(),
                    title: "T".into(),
                }],
                ..intent("sess", &["a"])
            },
        ];
        for case in cases {
            assert!(matches!(
                f.gate.create_intent(case).await,
                Err(GateError::Invalid(_))
            ));
        }
        assert_eq!(f.provider.next_id.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_failure_stores_nothing() {
        let f = fixture();
        f.provider.fail.store(true, Ordering::SeqCst);

        let result = f.gate.create_intent(intent("sess", &["a"])).await;
        assert!(matches!(result, Err(GateError::Provider(_))));
        assert!(f.store.get_settlement("pay-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_payment_is_not_settled() {
        let f = fixture();
        f.gate.create_intent(intent("sess", &["a"])).await.unwrap();

        let outcome = f.gate.confirm("pay-1").await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::NotApproved(PaymentStatus::Pending));
        assert_eq!(f.store.queue_len().unwrap(), 0);
        assert_eq!(
            f.store.get_settlement("pay-1").unwrap().unwrap().status,
            SettlementStatus::Pending
        );
    }

    #[tokio::test]
    async fn approved_payment_settles_exactly_once() {
        let f = fixture();
        let (session_id, mut session) = f.connections.register(SessionRole::Viewer).await;
        f.gate
            .create_intent(intent(&session_id, &["a", "b"]))
            .await
            .unwrap();
        f.provider.approve("pay-1");

        let first = f.gate.confirm("pay-1").await.unwrap();
        assert_eq!(first, ConfirmOutcome::Settled { revenue_cents: 400 });
        for _ in 0..3 {
            assert_eq!(
                f.gate.confirm("pay-1").await.unwrap(),
                ConfirmOutcome::AlreadySettled
            );
        }

        // Redundant deliveries are answered locally.
        assert_eq!(f.provider.status_queries.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.get_settings().unwrap().revenue_cents, 400);

        let mut confirmations = 0;
        while let Ok(message) = session.try_recv() {
            if message.msg_type == msg_types::PAYMENT_CONFIRMED {
                confirmations += 1;
            }
        }
        assert_eq!(confirmations, 1);
    }

    #[tokio::test]
    async fn unknown_payment_does_not_reach_the_provider() {
        let f = fixture();
        assert_eq!(
            f.gate.confirm("never-created").await.unwrap(),
            ConfirmOutcome::UnknownPayment
        );
        assert_eq!(f.provider.status_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_error_during_confirmation_is_surfaced() {
        let f = fixture();
        f.gate.create_intent(intent("sess", &["a"])).await.unwrap();
        f.provider.fail.store(true, Ordering::SeqCst);

        let result = f.gate.confirm("pay-1").await;
        assert!(matches!(result, Err(GateError::Provider(_))));
        assert_eq!(
            f.store.get_settlement("pay-1").unwrap().unwrap().status,
            SettlementStatus::Pending
        );
    }
}
