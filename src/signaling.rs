//! The seam towards the signaling layer (SIP or similar).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::Round;
use crate::media::MediaDescription;

/// Why a call or an offer is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    /// The user declined.
    Declined,
    /// The user is busy.
    Busy,
    /// The offered media can't be accepted.
    NotAcceptable,
    /// Another offer/answer exchange is in progress (glare).
    RequestPending,
    /// No response in time.
    RequestTimeout,
    /// The remote side is unavailable.
    ServiceUnavailable,
    /// Anything else, free text.
    Other(String),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Declined => write!(f, "Call declined"),
            Reason::Busy => write!(f, "Busy here"),
            Reason::NotAcceptable => write!(f, "Not acceptable here"),
            Reason::RequestPending => write!(f, "Request pending"),
            Reason::RequestTimeout => write!(f, "Request timeout"),
            Reason::ServiceUnavailable => write!(f, "Service unavailable"),
            Reason::Other(v) => write!(f, "{}", v),
        }
    }
}

/// Errors from the signaling layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    /// The request could not be sent.
    #[error("Signaling send failed: {0}")]
    Send(String),

    /// The operation has no dialog to act on.
    #[error("Signaling operation closed")]
    Closed,
}

/// Something the signaling layer tells the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// A remote (re-)offer. `None` for an offerless request such as a session refresh.
    RemoteOffer {
        /// The offer SDP.
        sdp: Option<String>,
    },
    /// Provisional response to our initial offer, possibly with an early answer.
    Progress {
        /// Early media answer SDP.
        sdp: Option<String>,
    },
    /// The remote side accepted the request sent in `round`.
    Accepted {
        /// Round of the request.
        round: Round,
        /// Answer SDP, or the remote offer when our request was offerless.
        sdp: Option<String>,
    },
    /// The remote side rejected the request sent in `round`.
    Declined {
        /// Round of the request.
        round: Round,
        /// Why.
        reason: Reason,
    },
    /// The remote side ended the call.
    Terminated,
    /// The transport failed (timeout, unreachable, ...).
    TransportError {
        /// Description of the failure.
        reason: String,
    },
    /// The operation is fully closed. Nothing more will come from it.
    Closed,
}

/// One signaling dialog, as used by a single call session.
///
/// Outgoing requests carry the session [`Round`] so responses can be correlated, and
/// responses to a round that is no longer pending are dropped.
pub trait SignalingOperation {
    /// Send the initial request with our offer.
    fn send_initial(&mut self, round: Round, offer: &MediaDescription) -> Result<(), SignalingError>;

    /// Accept the incoming request with our answer.
    fn accept(&mut self, answer: &MediaDescription) -> Result<(), SignalingError>;

    /// Accept an incoming request that carried no offer, with our offer.
    ///
    /// The answer comes back as [`SignalingEvent::Accepted`] for `round`.
    fn accept_with_offer(
        &mut self,
        round: Round,
        offer: &MediaDescription,
    ) -> Result<(), SignalingError>;

    /// Reject the incoming request.
    fn decline(&mut self, reason: &Reason) -> Result<(), SignalingError>;

    /// Send a new offer in an established dialog.
    fn send_update(&mut self, round: Round, offer: &MediaDescription) -> Result<(), SignalingError>;

    /// End the dialog.
    fn terminate(&mut self) -> Result<(), SignalingError>;

    /// Next event from the signaling layer.
    fn poll_event(&mut self) -> Option<SignalingEvent>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reason_text() {
        assert_eq!(Reason::Declined.to_string(), "Call declined");
        assert_eq!(Reason::Other("Gone fishing".into()).to_string(), "Gone fishing");
    }
}
