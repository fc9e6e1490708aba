use crate::server::websocket::messages::player;
use crate::store::{Origin, QueueEntry};
use serde::Serialize;

/// Playback regime of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayoutState {
    /// Nothing playing, queue empty, no fallback fill pending.
    Idle,
    /// Nothing playing, queue empty, inactivity timer armed.
    Waiting,
    /// A customer or admin request is playing.
    PlayingCustomer,
    PlayingFallback,
}

impl PlayoutState {
    pub fn playing(origin: Origin) -> Self {
        match origin {
            Origin::Customer | Origin::Admin => PlayoutState::PlayingCustomer,
            Origin::Fallback => PlayoutState::PlayingFallback,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(
            self,
            PlayoutState::PlayingCustomer | PlayoutState::PlayingFallback
        )
    }
}

/// The single active playout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    /// Token carried by the play command; end-of-track signals must echo it.
    pub play_id: u64,
    pub media_id: String,
    pub title: String,
    pub origin: Origin,
    pub spoken_message: Option<String>,
}

impl NowPlaying {
    pub fn from_entry(entry: QueueEntry, play_id: u64) -> Self {
        Self {
            play_id,
            media_id: entry.media_id,
            title: entry.title,
            origin: entry.origin,
            spoken_message: entry.spoken_message,
        }
    }

    pub fn play_command(&self) -> player::Play {
        player::Play {
            play_id: self.play_id,
            media_id: self.media_id.clone(),
            title: self.title.clone(),
            spoken_message: self.spoken_message.clone(),
        }
    }
}

/// What every display and admin sees after each state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayoutSnapshot {
    pub state: PlayoutState,
    pub now_playing: Option<NowPlaying>,
    pub queue: Vec<QueueEntry>,
}

/// Why the current track stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndReason {
    Finished,
    /// The display could not play the item; handled like `Finished`.
    DisplayError,
}
