use super::error::PlayoutError;
use super::state::{PlayoutSnapshot, TrackEndReason};
use crate::store::{FallbackCatalogItem, JukeboxSettings, NewQueueEntry, QueueEntry, SettleResult};
use tokio::sync::{mpsc, oneshot};

pub const MAX_PROMO_TEXT_CHARS: usize = 200;

/// Command sent to the scheduler.
pub enum PlayoutCommand {
    Enqueue {
        entry: NewQueueEntry,
        response: oneshot::Sender<Result<QueueEntry, PlayoutError>>,
    },
    RemoveEntry {
        id: String,
        response: oneshot::Sender<Result<bool, PlayoutError>>,
    },
    ClearQueue {
        response: oneshot::Sender<Result<usize, PlayoutError>>,
    },
    Skip {
        response: oneshot::Sender<()>,
    },
    TrackEnded {
        play_id: Option<u64>,
        reason: TrackEndReason,
        /// true if the signal advanced the queue, false if it was ignored as stale.
        response: oneshot::Sender<bool>,
    },
    DisplayReady {
        session_id: String,
        response: oneshot::Sender<()>,
    },
    SendAdminState {
        session_id: String,
        response: oneshot::Sender<()>,
    },
    SendSnapshot {
        session_id: String,
        response: oneshot::Sender<()>,
    },
    SaveFallbackCatalog {
        items: Vec<FallbackCatalogItem>,
        response: oneshot::Sender<Result<(), PlayoutError>>,
    },
    Settle {
        payment_id: String,
        response: oneshot::Sender<Result<SettleResult, PlayoutError>>,
    },
    SetVolume {
        volume: u8,
        response: oneshot::Sender<Result<JukeboxSettings, PlayoutError>>,
    },
    SetPromoText {
        text: String,
        response: oneshot::Sender<Result<(), PlayoutError>>,
    },
    TogglePause {
        response: oneshot::Sender<()>,
    },
    Snapshot {
        response: oneshot::Sender<Result<PlayoutSnapshot, PlayoutError>>,
    },
}

/// Handle to the playout scheduler, cloned into every HTTP and WebSocket handler.
///
/// Every queue-affecting operation goes through the scheduler's mailbox, so at most one
/// is in flight at a time.
#[derive(Clone)]
pub struct PlayoutHandle {
    command_tx: mpsc::Sender<PlayoutCommand>,
}

impl PlayoutHandle {
    pub fn new(command_tx: mpsc::Sender<PlayoutCommand>) -> Self {
        Self { command_tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> PlayoutCommand,
    ) -> Result<T, PlayoutError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(make(response_tx))
            .await
            .map_err(|_| PlayoutError::Unavailable)?;
        response_rx.await.map_err(|_| PlayoutError::Unavailable)
    }

    /// Adds an entry. Customer entries preempt fallback playback; others wait their turn.
    pub async fn enqueue(&self, entry: NewQueueEntry) -> Result<QueueEntry, PlayoutError> {
        if entry.media_id.trim().is_empty() {
            return Err(PlayoutError::InvalidCommand("mediaId is required".into()));
        }
        if entry.title.trim().is_empty() {
            return Err(PlayoutError::InvalidCommand("title is required".into()));
        }
        self.request(|response| PlayoutCommand::Enqueue { entry, response })
            .await?
    }

    pub async fn remove_entry(&self, id: &str) -> Result<bool, PlayoutError> {
        let id = id.to_string();
        self.request(|response| PlayoutCommand::RemoveEntry { id, response })
            .await?
    }

    pub async fn clear_queue(&self) -> Result<usize, PlayoutError> {
        self.request(|response| PlayoutCommand::ClearQueue { response })
            .await?
    }

    /// Forced end-of-track, honored in every state.
    pub async fn skip(&self) -> Result<(), PlayoutError> {
        self.request(|response| PlayoutCommand::Skip { response })
            .await
    }

    pub async fn track_ended(
        &self,
        play_id: Option<u64>,
        reason: TrackEndReason,
    ) -> Result<bool, PlayoutError> {
        self.request(|response| PlayoutCommand::TrackEnded {
            play_id,
            reason,
            response,
        })
        .await
    }

    /// Sends the initial volume, promo text, snapshot and current play command to a
    /// display that just announced itself.
    pub async fn display_ready(&self, session_id: &str) -> Result<(), PlayoutError> {
        let session_id = session_id.to_string();
        self.request(|response| PlayoutCommand::DisplayReady {
            session_id,
            response,
        })
        .await
    }

    /// Sends snapshot, catalog, revenue, volume and promo text to one admin session.
    pub async fn send_admin_state(&self, session_id: &str) -> Result<(), PlayoutError> {
        let session_id = session_id.to_string();
        self.request(|response| PlayoutCommand::SendAdminState {
            session_id,
            response,
        })
        .await
    }

    /// Sends the current snapshot to one session from inside the scheduler, so it is
    /// ordered with every later broadcast that session receives.
    pub async fn send_snapshot(&self, session_id: &str) -> Result<(), PlayoutError> {
        let session_id = session_id.to_string();
        self.request(|response| PlayoutCommand::SendSnapshot {
            session_id,
            response,
        })
        .await
    }

    pub async fn save_fallback_catalog(
        &self,
        items: Vec<FallbackCatalogItem>,
    ) -> Result<(), PlayoutError> {
        self.request(|response| PlayoutCommand::SaveFallbackCatalog { items, response })
            .await?
    }

    /// Settles a payment already verified with the provider.
    pub async fn settle(&self, payment_id: &str) -> Result<SettleResult, PlayoutError> {
        let payment_id = payment_id.to_string();
        self.request(|response| PlayoutCommand::Settle {
            payment_id,
            response,
        })
        .await?
    }

    /// Volume is clamped to 0..=100; zero mutes.
    pub async fn set_volume(&self, volume: i64) -> Result<JukeboxSettings, PlayoutError> {
        let volume = volume.clamp(0, 100) as u8;
        self.request(|response| PlayoutCommand::SetVolume { volume, response })
            .await?
    }

    pub async fn set_promo_text(&self, text: &str) -> Result<(), PlayoutError> {
        let text = text.trim().to_string();
        if text.chars().count() > MAX_PROMO_TEXT_CHARS {
            return Err(PlayoutError::InvalidCommand(format!(
                "promo text longer than {} characters",
                MAX_PROMO_TEXT_CHARS
            )));
        }
        self.request(|response| PlayoutCommand::SetPromoText { text, response })
            .await?
    }

    /// Pass-through pause/resume for the displays. Scheduler state and timers are untouched.
    pub async fn toggle_pause(&self) -> Result<(), PlayoutError> {
        self.request(|response| PlayoutCommand::TogglePause { response })
            .await
    }

    pub async fn snapshot(&self) -> Result<PlayoutSnapshot, PlayoutError> {
        self.request(|response| PlayoutCommand::Snapshot { response })
            .await?
    }
}
