// Remote live interface access
//
// The reconciler and the position pipeline only see the two source traits
// below; `LiveInterfaceClient` implements both over HTTP.

use crate::model::{RemoteDocumentStatus, TrackWorkNotification, TrainLocation};
use async_trait::async_trait;

mod error;
mod http;
mod live;

pub use error::RemoteError;
pub use http::{HttpClient, HttpResponse, ReqwestHttpClient};
pub use live::LiveInterfaceClient;

/// Versioned track-work notifications as served by the live interface.
#[async_trait]
pub trait RemoteDocumentSource: Send + Sync {
    /// Latest version of every document the remote knows about.
    async fn statuses(&self) -> Result<Vec<RemoteDocumentStatus>, RemoteError>;

    /// One specific version of one document.
    async fn fetch_version(
        &self,
        id: u64,
        version: u32,
    ) -> Result<TrackWorkNotification, RemoteError>;
}

/// Snapshot of current train positions.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn fetch_locations(&self) -> Result<Vec<TrainLocation>, RemoteError>;
}
