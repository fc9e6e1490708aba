//! Records owned by the jukebox store.

use serde::{Deserialize, Serialize};

/// Where a queue entry came from. Priority is derived from the origin, never stored
/// independently of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Paid request admitted by a payment settlement.
    Customer,
    /// Request added by hand from the admin panel.
    Admin,
    /// House playlist material used to fill idle time.
    Fallback,
}

impl Origin {
    /// Higher classes play first.
    pub fn priority_class(&self) -> i32 {
        match self {
            Origin::Customer | Origin::Admin => 1,
            Origin::Fallback => 0,
        }
    }

    /// Only paid requests interrupt house playback; admin additions wait their turn.
    pub fn preempts_fallback(&self) -> bool {
        matches!(self, Origin::Customer)
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Origin::Customer => "customer",
            Origin::Admin => "admin",
            Origin::Fallback => "fallback",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(Origin::Customer),
            "admin" => Some(Origin::Admin),
            "fallback" => Some(Origin::Fallback),
            _ => None,
        }
    }
}

/// A request to be appended to the queue. The store assigns id, priority and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueueEntry {
    pub media_id: String,
    pub title: String,
    pub origin: Origin,
    pub spoken_message: Option<String>,
}

impl NewQueueEntry {
    pub fn new(
        media_id: impl Into<String>,
        title: impl Into<String>,
        origin: Origin,
        spoken_message: Option<String>,
    ) -> Self {
        Self {
            media_id: media_id.into(),
            title: title.into(),
            origin,
            spoken_message: spoken_message.filter(|m| !m.trim().is_empty()),
        }
    }

    pub fn admin(media_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(media_id, title, Origin::Admin, None)
    }

    pub fn fallback(item: &FallbackCatalogItem) -> Self {
        Self::new(item.media_id.clone(), item.title.clone(), Origin::Fallback, None)
    }
}

/// A pending playback request as stored in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: String,
    pub media_id: String,
    pub title: String,
    pub origin: Origin,
    pub spoken_message: Option<String>,
    pub priority_class: i32,
    /// Milliseconds since the Unix epoch.
    pub enqueued_at: i64,
}

/// One item of the house playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackCatalogItem {
    pub title: String,
    pub media_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Settled,
}

impl SettlementStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Settled => "settled",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SettlementStatus::Pending),
            "settled" => Some(SettlementStatus::Settled),
            _ => None,
        }
    }
}

/// A media item bought as part of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementItem {
    pub media_id: String,
    pub title: String,
}

/// A payment intent waiting for (or having received) external confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSettlement {
    /// Identifier assigned by the payment provider.
    pub payment_id: String,
    /// Session that created the intent and should hear about its confirmation.
    pub correlation_id: String,
    pub amount_cents: i64,
    pub description: String,
    pub spoken_message: Option<String>,
    pub items: Vec<SettlementItem>,
    pub status: SettlementStatus,
    pub created_at: i64,
    pub settled_at: Option<i64>,
}

impl PendingSettlement {
    /// Queue entries this settlement admits once paid.
    pub fn queue_entries(&self) -> Vec<NewQueueEntry> {
        self.items
            .iter()
            .map(|item| {
                NewQueueEntry::new(
                    item.media_id.clone(),
                    item.title.clone(),
                    Origin::Customer,
                    self.spoken_message.clone(),
                )
            })
            .collect()
    }
}

/// Outcome of an attempt to settle a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleResult {
    Settled {
        settlement: PendingSettlement,
        enqueued: Vec<QueueEntry>,
        revenue_cents: i64,
    },
    /// The payment was settled by an earlier delivery; nothing changed.
    AlreadySettled,
    /// No intent with this payment id exists.
    UnknownPayment,
}

/// Persisted jukebox-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JukeboxSettings {
    pub promo_text: String,
    pub volume: u8,
    pub muted: bool,
    pub revenue_cents: i64,
}

pub const DEFAULT_PROMO_TEXT: &str = "Bem-vindo ao Contêiner Music Box!";
pub const DEFAULT_VOLUME: u8 = 50;
