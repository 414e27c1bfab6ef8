use std::fmt;

use serde::{Deserialize, Serialize};

use crate::signaling::Reason;

/// State of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum CallState {
    Idle,
    OutgoingInit,
    OutgoingProgress,
    OutgoingRinging,
    OutgoingEarlyMedia,
    IncomingReceived,
    Connected,
    StreamsRunning,
    Pausing,
    Paused,
    Resuming,
    Updating,
    UpdatedByRemote,
    PausedByRemote,
    Error,
    End,
    Released,
}

impl CallState {
    /// Established states where no offer/answer exchange is in progress.
    pub fn is_stable(&self) -> bool {
        matches!(
            self,
            CallState::StreamsRunning | CallState::Paused | CallState::PausedByRemote
        )
    }

    /// States waiting for the answer to an offer we sent in an established call.
    pub fn is_round(&self) -> bool {
        matches!(
            self,
            CallState::Pausing | CallState::Resuming | CallState::Updating
        )
    }

    /// Outgoing states before the call is answered.
    pub fn is_outgoing_early(&self) -> bool {
        matches!(
            self,
            CallState::OutgoingInit
                | CallState::OutgoingProgress
                | CallState::OutgoingRinging
                | CallState::OutgoingEarlyMedia
        )
    }

    /// `End`, `Error` or `Released`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::End | CallState::Error | CallState::Released)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Result of negotiating a description received with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Negotiation succeeded.
    Ok {
        /// Every enabled remote stream is sendonly or inactive.
        paused_by_remote: bool,
        /// The result differs from the previous one.
        changed: bool,
    },
    /// The description could not be parsed or negotiated.
    Failed(String),
}

impl Outcome {
    fn paused_by_remote(&self) -> bool {
        matches!(
            self,
            Outcome::Ok {
                paused_by_remote: true,
                ..
            }
        )
    }
}

/// Every input to the call state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Place the call.
    Start,
    /// Accept an incoming call.
    Accept,
    /// Reject an incoming call.
    Decline(Reason),
    /// Put the call on hold.
    Pause,
    /// Take the call off hold.
    Resume,
    /// Renegotiate. `changed` is false if the new local description is the same as before.
    Update {
        /// Whether there is anything to renegotiate.
        changed: bool,
    },
    /// Hang up.
    Terminate,
    /// ICE found its pairs. `reinvite` tells whether to send a new offer.
    IceCompleted {
        /// Send a new offer with the selected addresses.
        reinvite: bool,
    },
    /// Remote offer, already negotiated.
    RemoteOffer(Outcome),
    /// Remote request without offer.
    Refresh,
    /// Provisional response, with the outcome of an early answer if there was one.
    Progress {
        /// Early media answer outcome.
        early_media: Option<Outcome>,
    },
    /// Our request was accepted, with the outcome of the answer.
    Accepted(Outcome),
    /// Our request was rejected.
    Declined(Reason),
    /// Remote hung up.
    Terminated,
    /// The signaling transport failed.
    TransportError,
    /// The signaling operation is closed.
    Closed,
}

impl SessionEvent {
    /// Whether this is a user command (as opposed to something from signaling).
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            SessionEvent::Start
                | SessionEvent::Accept
                | SessionEvent::Decline(_)
                | SessionEvent::Pause
                | SessionEvent::Resume
                | SessionEvent::Update { .. }
                | SessionEvent::Terminate
                | SessionEvent::IceCompleted { .. }
        )
    }
}

/// What kind of offer to send in an established call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferKind {
    /// Put streams on hold.
    Pause,
    /// Take streams off hold.
    Resume,
    /// Anything else.
    Update,
}

/// Side effects of a transition, carried out by the session in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send the initial offer.
    SendInitial,
    /// Accept with the negotiated answer.
    Accept,
    /// Accept a request that had no offer, sending our description as the offer.
    AcceptOffer,
    /// Reject the request.
    DeclineWith(Reason),
    /// Send a new offer in the established call.
    SendUpdate(OfferKind),
    /// End the signaling operation.
    TerminateOp,
    /// Hand the result description to the media engine.
    ApplyMedia,
    /// Keep the current descriptions to restore on failure.
    Snapshot,
    /// Restore the descriptions kept by `Snapshot`.
    Revert,
    /// Tell listeners a renegotiation failed.
    UpdateFailed(String),
    /// Forget the pending round, later responses to it are dropped.
    AbandonRound,
}

/// The states to walk through and the effects to carry out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// States entered in order. Empty if the state doesn't change.
    pub path: Vec<CallState>,
    /// Side effects, carried out before the states are entered.
    pub effects: Vec<Effect>,
    /// Message for the state change.
    pub message: Option<String>,
}

impl Transition {
    fn to(path: &[CallState]) -> Self {
        Transition {
            path: path.to_vec(),
            ..Default::default()
        }
    }

    fn stay() -> Self {
        Transition::default()
    }

    fn with(mut self, effects: &[Effect]) -> Self {
        self.effects.extend_from_slice(effects);
        self
    }

    fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Session facts the transition function needs besides the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContext {
    /// State to return to when an offer/answer round finishes or fails.
    pub last_stable: CallState,
    /// The incoming call carried no offer.
    pub offerless: bool,
    /// The remote offer of the incoming call puts us on hold.
    pub remote_on_hold: bool,
    /// We sent our description as offer in a response and wait for the answer.
    pub awaiting_answer: bool,
}

impl Default for TransitionContext {
    fn default() -> Self {
        TransitionContext {
            last_stable: CallState::StreamsRunning,
            offerless: false,
            remote_on_hold: false,
            awaiting_answer: false,
        }
    }
}

/// The call state machine.
///
/// Returns `None` when the event doesn't apply in the state. For a command that
/// means it was invalid, a signaling event is just dropped.
pub fn transition(
    state: CallState,
    event: &SessionEvent,
    ctx: &TransitionContext,
) -> Option<Transition> {
    use CallState::*;
    use Effect::*;
    use SessionEvent as E;

    // Running media with the remote side on hold or not.
    let running = |o: &Outcome| {
        if o.paused_by_remote() {
            PausedByRemote
        } else {
            StreamsRunning
        }
    };

    if state == Released {
        return None;
    }

    if let E::Closed = event {
        return Some(match state {
            End | Error => Transition::to(&[Released]),
            _ => Transition::to(&[End, Released]).with(&[AbandonRound]),
        });
    }

    if matches!(state, End | Error) {
        return match event {
            // Hanging up twice is fine.
            E::Terminate => Some(Transition::stay()),
            _ => None,
        };
    }

    let t = match (state, event) {
        (Idle, E::Start) => Transition::to(&[OutgoingInit, OutgoingProgress]).with(&[SendInitial]),
        (Idle, E::RemoteOffer(Outcome::Ok { .. })) => Transition::to(&[IncomingReceived]),
        (Idle, E::RemoteOffer(Outcome::Failed(msg))) => Transition::to(&[Error])
            .with(&[DeclineWith(Reason::NotAcceptable)])
            .message(msg.clone()),
        (Idle, E::Refresh) => Transition::to(&[IncomingReceived]),
        (Idle, E::Terminate) => Transition::to(&[End]),

        (s, E::Progress { early_media }) if s.is_outgoing_early() => match early_media {
            Some(o @ Outcome::Ok { .. }) => {
                if s == OutgoingEarlyMedia && !matches!(o, Outcome::Ok { changed: true, .. }) {
                    Transition::stay()
                } else {
                    Transition::to(&[OutgoingEarlyMedia]).with(&[ApplyMedia])
                }
            }
            Some(Outcome::Failed(msg)) => {
                warn!("Ignore unacceptable early media: {}", msg);
                Transition::stay()
            }
            None if matches!(s, OutgoingInit | OutgoingProgress) => {
                Transition::to(&[OutgoingRinging])
            }
            None => Transition::stay(),
        },
        (s, E::Accepted(o)) if s.is_outgoing_early() => match o {
            Outcome::Ok { .. } => Transition::to(&[Connected, running(o)]).with(&[ApplyMedia]),
            Outcome::Failed(msg) => Transition::to(&[Error])
                .with(&[TerminateOp])
                .message(msg.clone()),
        },
        (s, E::Declined(reason)) if s.is_outgoing_early() => {
            let to = if *reason == Reason::Declined {
                End
            } else {
                Error
            };
            Transition::to(&[to]).message(reason.to_string())
        }

        (IncomingReceived, E::Accept) if ctx.offerless => {
            Transition::to(&[Connected]).with(&[AcceptOffer])
        }
        (IncomingReceived, E::Accept) => {
            let to = if ctx.remote_on_hold {
                PausedByRemote
            } else {
                StreamsRunning
            };
            Transition::to(&[Connected, to]).with(&[Accept, ApplyMedia])
        }
        (IncomingReceived, E::Decline(reason)) => Transition::to(&[End])
            .with(&[DeclineWith(reason.clone())])
            .message(reason.to_string()),

        (Connected, E::Accepted(o)) if ctx.awaiting_answer => match o {
            Outcome::Ok { .. } => Transition::to(&[running(o)]).with(&[ApplyMedia]),
            Outcome::Failed(msg) => Transition::to(&[Error])
                .with(&[TerminateOp])
                .message(msg.clone()),
        },

        (StreamsRunning | PausedByRemote, E::Pause) => {
            Transition::to(&[Pausing]).with(&[Snapshot, SendUpdate(OfferKind::Pause)])
        }
        (Paused, E::Resume) => {
            Transition::to(&[Resuming]).with(&[Snapshot, SendUpdate(OfferKind::Resume)])
        }
        (s, E::Update { changed: false }) if s.is_stable() => Transition::stay(),
        (s, E::Update { changed: true }) | (s, E::IceCompleted { reinvite: true })
            if s.is_stable() =>
        {
            Transition::to(&[Updating]).with(&[Snapshot, SendUpdate(OfferKind::Update)])
        }
        (s, E::IceCompleted { reinvite: false }) if s.is_stable() => Transition::stay(),

        (s, E::RemoteOffer(o)) if s.is_stable() => {
            let back = match (s, o) {
                (Paused, _) => Paused,
                (_, o) => running(o),
            };
            match o {
                Outcome::Ok { .. } => Transition::to(&[UpdatedByRemote, back])
                    .with(&[Snapshot, Accept, ApplyMedia]),
                Outcome::Failed(msg) => Transition::to(&[UpdatedByRemote, s])
                    .with(&[
                        Snapshot,
                        DeclineWith(Reason::NotAcceptable),
                        Revert,
                        UpdateFailed(msg.clone()),
                    ])
                    .message(msg.clone()),
            }
        }
        (s, E::Refresh) if s.is_stable() => {
            Transition::to(&[UpdatedByRemote, s]).with(&[Snapshot, AcceptOffer])
        }
        (s, E::Accepted(o)) if s.is_stable() && ctx.awaiting_answer => match o {
            Outcome::Ok { changed: true, .. } => Transition::stay().with(&[ApplyMedia]),
            Outcome::Ok { .. } => Transition::stay(),
            Outcome::Failed(msg) => {
                Transition::stay().with(&[Revert, UpdateFailed(msg.clone())])
            }
        },

        (s, E::Accepted(o)) if s.is_round() => match o {
            Outcome::Ok { .. } => {
                let to = match (s, ctx.last_stable) {
                    (Pausing, _) | (Updating, Paused) => Paused,
                    _ => running(o),
                };
                Transition::to(&[to]).with(&[ApplyMedia])
            }
            Outcome::Failed(msg) => Transition::to(&[ctx.last_stable])
                .with(&[Revert, UpdateFailed(msg.clone())])
                .message(msg.clone()),
        },
        (s, E::Declined(reason)) if s.is_round() => Transition::to(&[ctx.last_stable])
            .with(&[Revert, UpdateFailed(reason.to_string())])
            .message(reason.to_string()),
        (s, E::TransportError) if s.is_round() => Transition::to(&[ctx.last_stable])
            .with(&[Revert, UpdateFailed("Transport error".into())])
            .message("Transport error"),
        (s, E::RemoteOffer(_) | E::Refresh) if s.is_round() => {
            Transition::stay().with(&[DeclineWith(Reason::RequestPending)])
        }

        (s, E::Terminate) => {
            let effect = if s == IncomingReceived {
                DeclineWith(Reason::Declined)
            } else {
                TerminateOp
            };
            Transition::to(&[End])
                .with(&[effect, AbandonRound])
                .message("Call terminated")
        }
        (_, E::Terminated) => Transition::to(&[End])
            .with(&[AbandonRound])
            .message("Call ended by remote"),
        (s, E::TransportError) => {
            let to = if s.is_stable() { End } else { Error };
            Transition::to(&[to])
                .with(&[AbandonRound])
                .message("Transport error")
        }

        _ => return None,
    };

    Some(t)
}
