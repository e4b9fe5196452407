// Train location ingestion
//
// Per tick: fetch the live snapshot, drop unchanged reports, placeholder
// coordinates and positions off the rail network, persist the survivors as
// one batch and publish each to its per-train topic.

mod pipeline;
mod publish;
mod recently_seen;
mod sentinel;
mod track;

pub use pipeline::{PositionPipeline, TickReport};
pub use publish::{
    topic_for, BroadcastSink, HttpPublishSink, LogSink, PublishError, PublishSink,
    PublishedMessage,
};
pub use recently_seen::RecentlySeenFilter;
pub use sentinel::SentinelFilter;
pub use track::{TrackError, TrackIndex, TrackProximityFilter};

use crate::remote::RemoteError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that abort a tick. Nothing is published after either.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("failed to fetch train locations: {0}")]
    Fetch(#[source] RemoteError),

    #[error("failed to persist train locations: {0}")]
    Store(#[source] StoreError),
}
