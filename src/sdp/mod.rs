//! SDP wire format for media descriptions.

use thiserror::Error;

mod data;
pub(crate) use data::Sdp;

mod convert;
mod parser;

/// Errors from parsing and serializing SDP.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdpError {
    /// The text is not well formed SDP.
    #[error("SDP parse: {0}")]
    ParseError(String),

    /// The SDP parsed but describes something contradictory.
    #[error("SDP inconsistent: {0}")]
    Inconsistent(String),
}
