use crate::client::DetectionApiError;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// User-facing notification for a failed submit. The action is over; nothing
/// previously displayed was touched.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Image upload failed: {0}")]
    ImageUpload(DetectionApiError),
    #[error("Video analysis failed: {0}")]
    VideoAnalysis(DetectionApiError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome<T> {
    /// Nothing selected, no request was made.
    NoFile,
    /// A request of this flow is still running, no request was made.
    InFlight,
    /// A newer submit was issued while this one was waiting; its response was dropped.
    Superseded,
    Completed(T),
}

/// Monotonic request counter. Only the latest issued token may update view state.
#[derive(Debug, Default)]
pub struct RequestTokens {
    latest: AtomicU64,
}

impl RequestTokens {
    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_latest(&self, token: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == token
    }
}
