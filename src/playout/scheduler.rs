//! The playout scheduler: sole owner of what plays now.
//!
//! Runs as a single task. Commands from HTTP/WebSocket handlers, end-of-track signals,
//! settlements and its own deadlines are all processed one at a time by `run`, so queue
//! mutations never interleave. Deadlines are plain `Option<Instant>` fields: arming sets
//! one, any competing transition clears it, and a cleared deadline cannot fire.

use super::error::PlayoutError;
use super::handle::{PlayoutCommand, PlayoutHandle};
use super::state::{NowPlaying, PlayoutSnapshot, PlayoutState, TrackEndReason};
use crate::config::PlayoutSettings;
use crate::server::metrics;
use crate::server::websocket::connection::{ConnectionManager, SendError, SessionRole};
use crate::server::websocket::messages::{admin, msg_types, player, ServerMessage};
use crate::store::{
    FallbackCatalogItem, JukeboxSettings, JukeboxStore, NewQueueEntry, Origin, QueueEntry,
    RetryPolicy, SettleResult, StorageError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 64;

const SNAPSHOT_ROLES: &[SessionRole] =
    &[SessionRole::Display, SessionRole::Admin, SessionRole::Viewer];
const DISPLAY_ROLES: &[SessionRole] = &[SessionRole::Display];
const ADMIN_ROLES: &[SessionRole] = &[SessionRole::Admin];
const VOLUME_ROLES: &[SessionRole] = &[SessionRole::Display, SessionRole::Admin];

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

pub struct PlayoutScheduler {
    store: Arc<dyn JukeboxStore>,
    connections: Arc<ConnectionManager>,
    retry: RetryPolicy,
    inactivity_delay: Duration,
    max_track_duration: Duration,
    recovery_delay: Duration,

    command_receiver: mpsc::Receiver<PlayoutCommand>,
    shutdown_token: CancellationToken,

    state: PlayoutState,
    now_playing: Option<NowPlaying>,
    last_play_id: u64,

    /// Armed only in `Waiting`.
    inactivity_deadline: Option<Instant>,
    /// Hard ceiling for the current track, in case the display never reports back.
    track_deadline: Option<Instant>,
    /// Re-attempt after a storage failure left a transition unfinished.
    recovery_deadline: Option<Instant>,
}

impl PlayoutScheduler {
    pub fn new(
        store: Arc<dyn JukeboxStore>,
        connections: Arc<ConnectionManager>,
        settings: &PlayoutSettings,
        shutdown_token: CancellationToken,
    ) -> (Self, PlayoutHandle) {
        let (command_tx, command_receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let scheduler = Self {
            store,
            connections,
            retry: RetryPolicy::new(&settings.store_retry),
            inactivity_delay: Duration::from_millis(settings.inactivity_delay_ms),
            max_track_duration: Duration::from_secs(settings.max_track_duration_secs),
            recovery_delay: Duration::from_millis(settings.recovery_delay_ms),
            command_receiver,
            shutdown_token,
            state: PlayoutState::Idle,
            now_playing: None,
            last_play_id: 0,
            inactivity_deadline: None,
            track_deadline: None,
            recovery_deadline: None,
        };
        (scheduler, PlayoutHandle::new(command_tx))
    }

    /// Main scheduler loop.
    pub async fn run(mut self) {
        info!(
            "Starting playout scheduler (inactivity delay {:?}, track ceiling {:?})",
            self.inactivity_delay, self.max_track_duration
        );

        // Nothing is playing after a restart; the store decides whether to resume draining.
        self.resume_from_store().await;
        self.broadcast_snapshot().await;

        loop {
            let inactivity = sleep_until_deadline(self.inactivity_deadline);
            let track_ceiling = sleep_until_deadline(self.track_deadline);
            let recovery = sleep_until_deadline(self.recovery_deadline);

            // Commands win ties with deadlines: an enqueue that arrives at the instant the
            // inactivity timer fires is handled first and cancels the fallback fill.
            tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => {
                    info!("Playout scheduler received shutdown signal");
                    break;
                }
                cmd = self.command_receiver.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                _ = inactivity => {
                    self.inactivity_deadline = None;
                    self.on_inactivity_elapsed().await;
                    self.broadcast_snapshot().await;
                }
                _ = track_ceiling => {
                    self.track_deadline = None;
                    self.on_track_ceiling().await;
                    self.broadcast_snapshot().await;
                }
                _ = recovery => {
                    self.recovery_deadline = None;
                    info!("Retrying playout transition after storage failure");
                    self.resume_from_store().await;
                    self.broadcast_snapshot().await;
                }
            }
        }

        info!("Playout scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: PlayoutCommand) {
        match cmd {
            PlayoutCommand::Enqueue { entry, response } => {
                let result = self.enqueue(entry).await;
                self.broadcast_snapshot().await;
                let _ = response.send(result);
            }
            PlayoutCommand::RemoveEntry { id, response } => {
                let result = self
                    .with_store("remove_entry", |store| store.remove_entry(&id))
                    .await;
                self.broadcast_snapshot().await;
                let _ = response.send(result);
            }
            PlayoutCommand::ClearQueue { response } => {
                let result = self
                    .with_store("clear_queue", |store| store.clear_queue())
                    .await;
                if let Ok(removed) = &result {
                    info!("Admin cleared {} queued entries", removed);
                }
                self.broadcast_snapshot().await;
                let _ = response.send(result);
            }
            PlayoutCommand::Skip { response } => {
                info!("Admin skip (state {:?})", self.state);
                self.advance().await;
                self.broadcast_snapshot().await;
                let _ = response.send(());
            }
            PlayoutCommand::TrackEnded {
                play_id,
                reason,
                response,
            } => {
                let advanced = self.on_track_ended(play_id, reason).await;
                if advanced {
                    self.broadcast_snapshot().await;
                }
                let _ = response.send(advanced);
            }
            PlayoutCommand::DisplayReady {
                session_id,
                response,
            } => {
                self.on_display_ready(&session_id).await;
                let _ = response.send(());
            }
            PlayoutCommand::SendAdminState {
                session_id,
                response,
            } => {
                self.send_admin_state(&session_id).await;
                let _ = response.send(());
            }
            PlayoutCommand::SendSnapshot {
                session_id,
                response,
            } => {
                self.send_snapshot(&session_id).await;
                let _ = response.send(());
            }
            PlayoutCommand::SaveFallbackCatalog { items, response } => {
                let result = self.save_fallback_catalog(items).await;
                self.broadcast_snapshot().await;
                let _ = response.send(result);
            }
            PlayoutCommand::Settle {
                payment_id,
                response,
            } => {
                let result = self.settle(&payment_id).await;
                self.broadcast_snapshot().await;
                let _ = response.send(result);
            }
            PlayoutCommand::SetVolume { volume, response } => {
                let result = self.set_volume(volume).await;
                self.broadcast_snapshot().await;
                let _ = response.send(result);
            }
            PlayoutCommand::SetPromoText { text, response } => {
                let result = self.set_promo_text(text).await;
                self.broadcast_snapshot().await;
                let _ = response.send(result);
            }
            PlayoutCommand::TogglePause { response } => {
                debug!("Forwarding pause toggle to displays");
                self.connections
                    .broadcast_to_roles(DISPLAY_ROLES, ServerMessage::empty(msg_types::PLAYER_PAUSE))
                    .await;
                let _ = response.send(());
            }
            PlayoutCommand::Snapshot { response } => {
                let result = self.snapshot().await.map_err(PlayoutError::from);
                let _ = response.send(result);
            }
        }
    }

    /// Runs a store operation under the retry policy, reporting exhausted failures to the
    /// admin surface.
    async fn with_store<T, F>(&self, operation: &'static str, op: F) -> Result<T, PlayoutError>
    where
        F: Fn(&dyn JukeboxStore) -> Result<T, StorageError>,
    {
        let store = self.store.as_ref();
        match self.retry.run(operation, || op(store)).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.report_storage_failure(operation, &e).await;
                Err(e.into())
            }
        }
    }

    async fn report_storage_failure(&self, operation: &str, err: &StorageError) {
        error!("Playout store operation {} failed: {}", operation, err);
        self.connections
            .broadcast_to_roles(
                ADMIN_ROLES,
                ServerMessage::new(
                    msg_types::ADMIN_ERROR,
                    admin::AdminError {
                        message: format!("Falha ao acessar a fila ({}): {}", operation, err),
                    },
                ),
            )
            .await;
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    async fn enqueue(&mut self, entry: NewQueueEntry) -> Result<QueueEntry, PlayoutError> {
        let stored = self
            .with_store("enqueue", move |store| store.enqueue(entry.clone()))
            .await?;
        info!(
            "Queued {:?} {} ({})",
            stored.origin, stored.media_id, stored.title
        );
        self.on_entries_added(stored.origin).await;
        Ok(stored)
    }

    /// Reacts to new queue content: starts playback from an empty player, preempts
    /// fallback for customer requests, otherwise leaves the current track alone.
    async fn on_entries_added(&mut self, origin: Origin) {
        match self.state {
            PlayoutState::Idle | PlayoutState::Waiting => {
                self.inactivity_deadline = None;
                self.advance().await;
            }
            PlayoutState::PlayingFallback if origin.preempts_fallback() => {
                if let Some(current) = &self.now_playing {
                    info!(
                        "Preempting fallback {} for {:?} request",
                        current.media_id, origin
                    );
                }
                metrics::record_preemption();
                self.advance().await;
            }
            PlayoutState::PlayingFallback | PlayoutState::PlayingCustomer => {}
        }
    }

    /// Moves to the next queue entry, or to `Waiting` when the queue is empty.
    /// Returns false if the store failed: `now_playing` is then left as it was and a
    /// recovery attempt is scheduled.
    async fn advance(&mut self) -> bool {
        let next = self
            .with_store("dequeue_next", |store| store.dequeue_next())
            .await;
        match next {
            Ok(Some(entry)) => {
                self.start_playback(entry).await;
                true
            }
            Ok(None) => {
                if let Some(previous) = self.now_playing.take() {
                    debug!("Queue drained after {}", previous.media_id);
                }
                self.track_deadline = None;
                self.recovery_deadline = None;
                self.enter_waiting();
                true
            }
            Err(_) => {
                self.track_deadline = None;
                self.recovery_deadline = Some(Instant::now() + self.recovery_delay);
                false
            }
        }
    }

    async fn start_playback(&mut self, entry: QueueEntry) {
        self.last_play_id += 1;
        let now_playing = NowPlaying::from_entry(entry, self.last_play_id);
        info!(
            "Now playing #{} {:?} {} ({})",
            now_playing.play_id, now_playing.origin, now_playing.media_id, now_playing.title
        );
        metrics::record_track_started(now_playing.origin);

        self.state = PlayoutState::playing(now_playing.origin);
        self.inactivity_deadline = None;
        self.recovery_deadline = None;
        self.track_deadline = Some(Instant::now() + self.max_track_duration);

        let play = ServerMessage::new(msg_types::PLAYER_PLAY, now_playing.play_command());
        self.now_playing = Some(now_playing);
        let failed = self
            .connections
            .broadcast_to_roles(DISPLAY_ROLES, play)
            .await;
        if failed > 0 {
            debug!("Play command could not reach {} display(s)", failed);
        }
    }

    fn enter_waiting(&mut self) {
        self.state = PlayoutState::Waiting;
        self.inactivity_deadline = Some(Instant::now() + self.inactivity_delay);
        debug!("Waiting, inactivity timer armed for {:?}", self.inactivity_delay);
    }

    async fn on_track_ended(&mut self, play_id: Option<u64>, reason: TrackEndReason) -> bool {
        let Some(current) = &self.now_playing else {
            debug!("Ignoring {:?} signal, nothing is playing", reason);
            return false;
        };
        if let Some(play_id) = play_id {
            if play_id != current.play_id {
                warn!(
                    "Ignoring stale {:?} signal for play #{} (current #{})",
                    reason, play_id, current.play_id
                );
                return false;
            }
        }
        if reason == TrackEndReason::DisplayError {
            warn!(
                "Display could not play {} ({}), advancing",
                current.media_id, current.title
            );
        }
        self.advance().await
    }

    async fn on_track_ceiling(&mut self) {
        if let Some(current) = &self.now_playing {
            warn!(
                "No end-of-track signal for #{} {} within {:?}, advancing",
                current.play_id, current.media_id, self.max_track_duration
            );
        }
        self.advance().await;
    }

    async fn on_inactivity_elapsed(&mut self) {
        if self.state != PlayoutState::Waiting {
            return;
        }

        // Something may have been queued without going through us (e.g. restored rows).
        match self.with_store("queue_len", |store| store.queue_len()).await {
            Ok(0) => {}
            Ok(_) => {
                self.advance().await;
                return;
            }
            Err(_) => {
                self.recovery_deadline = Some(Instant::now() + self.recovery_delay);
                return;
            }
        }

        let catalog = match self
            .with_store("get_fallback_catalog", |store| store.get_fallback_catalog())
            .await
        {
            Ok(catalog) => catalog,
            Err(_) => {
                self.recovery_deadline = Some(Instant::now() + self.recovery_delay);
                return;
            }
        };

        if catalog.is_empty() {
            info!("Inactivity timer fired with an empty fallback catalog, going idle");
            self.state = PlayoutState::Idle;
            return;
        }

        let entries: Vec<NewQueueEntry> = catalog.iter().map(NewQueueEntry::fallback).collect();
        match self
            .with_store("enqueue_many", move |store| store.enqueue_many(entries.clone()))
            .await
        {
            Ok(stored) => {
                info!("Filled queue with {} fallback entries", stored.len());
                metrics::record_fallback_fill(stored.len());
                self.advance().await;
            }
            Err(_) => {
                self.recovery_deadline = Some(Instant::now() + self.recovery_delay);
            }
        }
    }

    /// Startup and post-failure path: never assume idle while entries exist.
    async fn resume_from_store(&mut self) {
        if self.now_playing.is_some() {
            self.advance().await;
            return;
        }
        match self.with_store("queue_len", |store| store.queue_len()).await {
            Ok(0) => self.enter_waiting(),
            Ok(pending) => {
                info!("Resuming playback with {} queued entries", pending);
                self.advance().await;
            }
            Err(_) => {
                self.recovery_deadline = Some(Instant::now() + self.recovery_delay);
            }
        }
    }

    async fn on_display_ready(&mut self, session_id: &str) {
        let settings = self.settings_or_default().await;
        let volume = player::Volume {
            volume: settings.volume,
            muted: settings.muted,
        };
        let mut messages = vec![
            ServerMessage::new(msg_types::PLAYER_INIT, volume),
            ServerMessage::new(
                msg_types::PROMO_UPDATE,
                player::Promo {
                    text: settings.promo_text,
                },
            ),
        ];
        if let Ok(snapshot) = self.snapshot().await {
            messages.push(ServerMessage::new(msg_types::STATE_UPDATE, snapshot));
        }
        if let Some(current) = &self.now_playing {
            messages.push(ServerMessage::new(
                msg_types::PLAYER_PLAY,
                current.play_command(),
            ));
        }
        self.send_all_to_session(session_id, messages).await;

        // The catalog may have been filled since we went idle.
        if self.state == PlayoutState::Idle {
            self.enter_waiting();
        }
    }

    async fn send_admin_state(&self, session_id: &str) {
        let settings = self.settings_or_default().await;
        let mut messages = Vec::new();
        if let Ok(snapshot) = self.snapshot().await {
            messages.push(ServerMessage::new(msg_types::STATE_UPDATE, snapshot));
        }
        if let Ok(items) = self
            .with_store("get_fallback_catalog", |store| store.get_fallback_catalog())
            .await
        {
            messages.push(ServerMessage::new(
                msg_types::ADMIN_CATALOG,
                admin::Catalog { items },
            ));
        }
        messages.push(ServerMessage::new(
            msg_types::ADMIN_REVENUE,
            admin::Revenue {
                revenue_cents: settings.revenue_cents,
            },
        ));
        messages.push(ServerMessage::new(
            msg_types::PLAYER_SET_VOLUME,
            player::Volume {
                volume: settings.volume,
                muted: settings.muted,
            },
        ));
        messages.push(ServerMessage::new(
            msg_types::PROMO_UPDATE,
            player::Promo {
                text: settings.promo_text,
            },
        ));
        self.send_all_to_session(session_id, messages).await;
    }

    async fn send_snapshot(&self, session_id: &str) {
        match self.snapshot().await {
            Ok(snapshot) => {
                self.send_all_to_session(
                    session_id,
                    vec![ServerMessage::new(msg_types::STATE_UPDATE, snapshot)],
                )
                .await
            }
            Err(e) => warn!("No snapshot for session {}: {}", session_id, e),
        }
    }

    async fn save_fallback_catalog(
        &mut self,
        items: Vec<FallbackCatalogItem>,
    ) -> Result<(), PlayoutError> {
        self.with_store("replace_fallback_catalog", |store| {
            store.replace_fallback_catalog(&items)
        })
        .await?;

        self.connections
            .broadcast_to_roles(
                ADMIN_ROLES,
                ServerMessage::new(msg_types::ADMIN_CATALOG, admin::Catalog { items }),
            )
            .await;

        if self.state == PlayoutState::Idle {
            self.enter_waiting();
        }
        Ok(())
    }

    async fn settle(&mut self, payment_id: &str) -> Result<SettleResult, PlayoutError> {
        let result = self
            .with_store("settle", |store| store.settle(payment_id))
            .await?;

        match &result {
            SettleResult::Settled {
                settlement,
                enqueued,
                revenue_cents,
            } => {
                info!(
                    "Payment {} settled: {} entries, {} cents (revenue {} cents)",
                    payment_id,
                    enqueued.len(),
                    settlement.amount_cents,
                    revenue_cents
                );
                metrics::record_settlement("settled");
                metrics::set_revenue_cents(*revenue_cents);

                let confirmation = ServerMessage::new(
                    msg_types::PAYMENT_CONFIRMED,
                    admin::PaymentConfirmed {
                        payment_id: payment_id.to_string(),
                    },
                );
                match self
                    .connections
                    .send_to_session(&settlement.correlation_id, confirmation)
                    .await
                {
                    Ok(()) => {}
                    Err(SendError::NotConnected) | Err(SendError::Disconnected) => {
                        warn!(
                            "Session {} that paid {} is gone; entries were queued anyway",
                            settlement.correlation_id, payment_id
                        );
                        metrics::record_unreachable_session();
                    }
                }

                if let Some(first) = enqueued.first() {
                    self.connections
                        .broadcast_to_roles(
                            DISPLAY_ROLES,
                            ServerMessage::new(
                                msg_types::PLAYER_NEW_ORDER,
                                player::NewOrder {
                                    title: first.title.clone(),
                                },
                            ),
                        )
                        .await;
                }
                self.connections
                    .broadcast_to_roles(
                        ADMIN_ROLES,
                        ServerMessage::new(
                            msg_types::ADMIN_REVENUE,
                            admin::Revenue {
                                revenue_cents: *revenue_cents,
                            },
                        ),
                    )
                    .await;

                if !enqueued.is_empty() {
                    self.on_entries_added(Origin::Customer).await;
                }
            }
            SettleResult::AlreadySettled => {
                info!("Payment {} was already settled, ignoring", payment_id);
                metrics::record_settlement("duplicate");
            }
            SettleResult::UnknownPayment => {
                warn!("No pending settlement for payment {}", payment_id);
                metrics::record_settlement("unknown");
            }
        }
        Ok(result)
    }

    async fn set_volume(&mut self, volume: u8) -> Result<JukeboxSettings, PlayoutError> {
        let settings = self
            .with_store("set_volume", |store| store.set_volume(volume))
            .await?;
        self.connections
            .broadcast_to_roles(
                VOLUME_ROLES,
                ServerMessage::new(
                    msg_types::PLAYER_SET_VOLUME,
                    player::Volume {
                        volume: settings.volume,
                        muted: settings.muted,
                    },
                ),
            )
            .await;
        Ok(settings)
    }

    async fn set_promo_text(&mut self, text: String) -> Result<(), PlayoutError> {
        self.with_store("set_promo_text", |store| store.set_promo_text(&text))
            .await?;
        self.connections
            .broadcast_to_all(ServerMessage::new(
                msg_types::PROMO_UPDATE,
                player::Promo { text },
            ))
            .await;
        Ok(())
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    async fn snapshot(&self) -> Result<PlayoutSnapshot, StorageError> {
        let store = self.store.as_ref();
        let queue = self.retry.run("peek_all", || store.peek_all()).await?;
        metrics::set_queue_length(queue.len());
        Ok(PlayoutSnapshot {
            state: self.state,
            now_playing: self.now_playing.clone(),
            queue,
        })
    }

    async fn broadcast_snapshot(&self) {
        match self.snapshot().await {
            Ok(snapshot) => {
                self.connections
                    .broadcast_to_roles(
                        SNAPSHOT_ROLES,
                        ServerMessage::new(msg_types::STATE_UPDATE, snapshot),
                    )
                    .await;
            }
            Err(e) => self.report_storage_failure("peek_all", &e).await,
        }
    }

    async fn settings_or_default(&self) -> JukeboxSettings {
        let store = self.store.as_ref();
        match self.retry.run("get_settings", || store.get_settings()).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not read jukebox settings, using defaults: {}", e);
                JukeboxSettings {
                    promo_text: crate::store::DEFAULT_PROMO_TEXT.to_string(),
                    volume: crate::store::DEFAULT_VOLUME,
                    muted: true,
                    revenue_cents: 0,
                }
            }
        }
    }

    async fn send_all_to_session(&self, session_id: &str, messages: Vec<ServerMessage>) {
        for message in messages {
            if let Err(e) = self.connections.send_to_session(session_id, message).await {
                debug!("Session {} unreachable: {:?}", session_id, e);
                return;
            }
        }
    }
}
