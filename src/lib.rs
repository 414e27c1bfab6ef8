//! Call session control plane in Sans-IO style.
//!
//! This crate drives the lifecycle of an audio/video call, from the first offer to
//! the final release, and computes the media actually used through SDP offer/answer
//! ([RFC 3264][rfc3264]). It decides codecs, directions and media encryption
//! (SDES-SRTP, DTLS-SRTP or ZRTP), and renegotiates on hold, resume, ICE completion
//! and remote re-offers.
//!
//! The [`CallSession`] itself does no network talking. It has no internal threads,
//! async tasks or timers. Everything happens from the calls of the public API, and
//! the outside world is reached through two narrow traits:
//!
//! * [`SignalingOperation`] sends requests and responses (SIP or anything similar),
//!   and hands back what the remote side said as [`SignalingEvent`]s.
//! * [`MediaEngine`] runs the negotiated streams.
//!
//! Observers are added as [`CallListener`]s and are called in the order they were added.
//!
//! # Usage
//!
//! ## Outgoing
//!
//! ```no_run
//! # use callsess::*;
//! # struct Sip;
//! # impl SignalingOperation for Sip {
//! #     fn send_initial(&mut self, _: Round, _: &MediaDescription) -> Result<(), SignalingError> { Ok(()) }
//! #     fn accept(&mut self, _: &MediaDescription) -> Result<(), SignalingError> { Ok(()) }
//! #     fn accept_with_offer(&mut self, _: Round, _: &MediaDescription) -> Result<(), SignalingError> { Ok(()) }
//! #     fn decline(&mut self, _: &Reason) -> Result<(), SignalingError> { Ok(()) }
//! #     fn send_update(&mut self, _: Round, _: &MediaDescription) -> Result<(), SignalingError> { Ok(()) }
//! #     fn terminate(&mut self) -> Result<(), SignalingError> { Ok(()) }
//! #     fn poll_event(&mut self) -> Option<SignalingEvent> { None }
//! # }
//! # struct NoMedia;
//! # impl MediaEngine for NoMedia {
//! #     fn apply_description(&mut self, _: &MediaDescription) -> Result<(), MediaError> { Ok(()) }
//! #     fn stop(&mut self) {}
//! #     fn sample_stats(&mut self) -> Vec<StatsSample> { vec![] }
//! # }
//! // What we can do.
//! let caps = LocalCapabilities::new("192.168.1.10").add_stream(LocalStream::audio(
//!     7078,
//!     vec![
//!         Codec::new(111, "opus", 48000, Some(2)),
//!         Codec::new(0, "PCMU", 8000, None),
//!     ],
//! ));
//!
//! // Offer SRTP, but accept calls without it.
//! let config = SessionConfig::new()
//!     .set_encryption_policy(EncryptionPolicy::Legacy(MediaEncryption::Srtp));
//!
//! let mut call = CallSession::new(config, caps, Sip, NoMedia);
//!
//! // Sends the initial offer through the signaling operation.
//! call.start().unwrap();
//! assert_eq!(call.state(), CallState::OutgoingProgress);
//! ```
//!
//! ## Incoming
//!
//! An incoming call starts with a [`SignalingEvent::RemoteOffer`]. The offer is
//! negotiated right away, and the call waits in [`CallState::IncomingReceived`] for
//! [`CallSession::accept()`] or [`CallSession::decline()`]. An offer that can't be
//! accepted at all is declined with [`Reason::NotAcceptable`] and ends in
//! [`CallState::Error`].
//!
//! ## Run loop
//!
//! ```no_run
//! # use callsess::*;
//! # use std::time::Instant;
//! # fn run<O: SignalingOperation, M: MediaEngine>(call: &mut CallSession<O, M>) -> Result<(), CallError> {
//! loop {
//!     // Handles all queued signaling events and samples stats when due.
//!     call.tick(Instant::now())?;
//!
//!     if call.state() == CallState::Released {
//!         break;
//!     }
//!
//!     // Wait for new signaling input, or until `call.poll_timeout()`.
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Renegotiation
//!
//! Established calls renegotiate with [`CallSession::pause()`], [`CallSession::resume()`],
//! [`CallSession::update()`] and [`CallSession::ice_completed()`]. Each new offer starts
//! a [`Round`], and responses carrying an older round are dropped. A renegotiation that
//! fails restores the descriptions from before the round and reports through
//! [`CallListener::on_update_failed()`]. It never fails the call.
//!
//! An update that would offer the same thing as before is not sent at all. What
//! counts as a change is decided by the [`StreamDescriptionDiffer`].
//!
//! # Encryption
//!
//! The local [`EncryptionPolicy`] is one of:
//!
//! * `Mandatory`: only the given encryption, calls that can't use it fail.
//! * `Negotiated`: the default plus an ordered list of alternatives, offered as
//!   [RFC 5939][rfc5939] potential configurations. The offerer's order wins.
//! * `Legacy`: the given encryption is preferred. When the two sides disagree the
//!   configurable legacy order decides, by default ZRTP, DTLS, SRTP, none.
//!
//! # Pii
//!
//! Addresses and keys appear in debug logs. The `pii` feature redacts them.
//!
//! [rfc3264]: https://www.rfc-editor.org/rfc/rfc3264
//! [rfc5939]: https://www.rfc-editor.org/rfc/rfc5939

#![forbid(unsafe_code)]
#![allow(clippy::new_without_default)]
#![allow(clippy::manual_range_contains)]
#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

use thiserror::Error;

mod id;
pub use id::{CallId, Pt, Round, SessionId};

pub mod media;
pub use media::{Codec, MediaDescription, StreamDescription, StreamDirection, StreamType};

mod sdp;

mod diff;
pub use diff::{DiffFlags, StreamDescriptionDiffer};

mod encryption;
pub use encryption::{match_crypto, EncryptionNegotiator, EncryptionPolicy};
pub use encryption::{MediaEncryption, SrtpMatch};

mod negotiate;
pub use negotiate::{NegotiationContext, OfferAnswerEngine};

mod signaling;
pub use signaling::{Reason, SignalingEvent, SignalingOperation};

mod session;
pub use session::{transition, CallListener, CallSession, CallState, MediaEngine};
pub use session::{Effect, OfferKind, Outcome, SessionEvent, Transition, TransitionContext};

pub mod stats;
pub use stats::{CallStats, CallStatsCollector, StatsSample};

mod config;
pub use config::{AccountParams, LocalCapabilities, LocalStream, SessionConfig};

mod util;

/// Various error types.
pub mod error {
    pub use crate::encryption::EncryptionError;
    pub use crate::negotiate::NegotiationError;
    pub use crate::sdp::SdpError;
    pub use crate::session::MediaError;
    pub use crate::signaling::SignalingError;
}

pub use error::{MediaError, SignalingError};

/// Errors for the whole call session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CallError {
    /// SDP errors.
    #[error("{0}")]
    Sdp(#[from] error::SdpError),

    /// Offer/answer negotiation failed.
    #[error("{0}")]
    Negotiation(#[from] error::NegotiationError),

    /// Media encryption couldn't be agreed.
    #[error("{0}")]
    Encryption(#[from] error::EncryptionError),

    /// The signaling operation failed.
    #[error("{0}")]
    Signaling(#[from] error::SignalingError),

    /// The media engine failed.
    #[error("{0}")]
    Media(#[from] error::MediaError),

    /// The command isn't valid in the current state.
    #[error("Can't {action} in state {state}")]
    InvalidState {
        /// State of the call.
        state: CallState,
        /// The refused command.
        action: &'static str,
    },
}
