use thiserror::Error;

use crate::media::MediaDescription;
use crate::stats::{CallStats, StatsSample};

use super::CallState;

/// Errors from the media engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The engine could not set up streams for the description.
    #[error("Media engine failed to apply description: {0}")]
    Apply(String),

    /// The engine isn't running.
    #[error("Media engine not running")]
    NotRunning,
}

/// The media engine that sends and receives the negotiated streams.
pub trait MediaEngine {
    /// Start or update the streams to match the result description.
    fn apply_description(&mut self, result: &MediaDescription) -> Result<(), MediaError>;

    /// Stop all streams.
    fn stop(&mut self);

    /// Current counters, one entry per running stream.
    fn sample_stats(&mut self) -> Vec<StatsSample>;
}

/// Observer of a call. All methods default to doing nothing.
///
/// Listeners are called in the order they were added.
pub trait CallListener {
    /// The call moved from `prev` to `state`.
    fn on_state_changed(&mut self, prev: CallState, state: CallState, message: &str) {
        let _ = (prev, state, message);
    }

    /// A renegotiation failed and the previous descriptions were restored.
    fn on_update_failed(&mut self, reason: &str) {
        let _ = reason;
    }

    /// New stats for a stream.
    fn on_stats_updated(&mut self, stats: &CallStats) {
        let _ = stats;
    }

    /// The media engine failed. The call state is unchanged.
    fn on_media_error(&mut self, error: &MediaError) {
        let _ = error;
    }
}
