//! Playback queue scheduling: what plays now, fallback fills and paid preemption.

mod catalog;
mod error;
mod handle;
mod scheduler;
mod state;

pub use catalog::{resolve_catalog_input, CatalogUpdate};
pub use error::PlayoutError;
pub use handle::{PlayoutCommand, PlayoutHandle, MAX_PROMO_TEXT_CHARS};
pub use scheduler::PlayoutScheduler;
pub use state::{NowPlaying, PlayoutSnapshot, PlayoutState, TrackEndReason};
