//! The call session, driving one call from setup to release.

use std::net::SocketAddr;
use std::time::Instant;

use crate::config::{LocalCapabilities, SessionConfig};
use crate::diff::{DiffFlags, StreamDescriptionDiffer};
use crate::encryption::{EncryptionPolicy, MediaEncryption};
use crate::id::{CallId, Round};
use crate::media::MediaDescription;
use crate::negotiate::{NegotiationContext, OfferAnswerEngine};
use crate::signaling::{Reason, SignalingError, SignalingEvent, SignalingOperation};
use crate::stats::CallStatsCollector;
use crate::CallError;

mod listener;
pub use listener::{CallListener, MediaEngine, MediaError};

mod local;
use local::{answer_keys, build_local, hold};

mod state;
pub use state::{transition, CallState, Effect, OfferKind, Outcome};
pub use state::{SessionEvent, Transition, TransitionContext};

/// Descriptions of a negotiation that is not yet committed.
struct Staged {
    local: MediaDescription,
    remote: MediaDescription,
    result: MediaDescription,
}

/// Descriptions to restore when a round fails.
struct Snapshot {
    local: Option<MediaDescription>,
    remote: Option<MediaDescription>,
    result: Option<MediaDescription>,
    caps: LocalCapabilities,
}

/// One call.
///
/// The session does no IO of its own. Signaling goes through the
/// [`SignalingOperation`] and media through the [`MediaEngine`], and time only
/// moves when [`CallSession::tick()`] is called.
///
/// ```no_run
/// # use callsess::*;
/// # use std::time::Instant;
/// fn run(op: impl SignalingOperation, media: impl MediaEngine) -> Result<(), CallError> {
///     let caps = LocalCapabilities::new("192.168.1.10")
///         .add_stream(LocalStream::audio(7078, vec![Codec::new(0, "PCMU", 8000, None)]));
///
///     let mut call = CallSession::new(SessionConfig::new(), caps, op, media);
///     call.start()?;
///
///     while call.state() != CallState::Released {
///         // Wait for signaling input or until `call.poll_timeout()`.
///         call.tick(Instant::now())?;
///     }
///
///     Ok(())
/// }
/// ```
pub struct CallSession<O, M> {
    id: CallId,
    state: CallState,
    prev_state: CallState,
    last_stable: CallState,
    config: SessionConfig,
    caps: LocalCapabilities,
    prev_caps: Option<LocalCapabilities>,
    local: Option<MediaDescription>,
    remote: Option<MediaDescription>,
    result: Option<MediaDescription>,
    snapshot: Option<Snapshot>,
    staged: Option<Staged>,
    proposed: Option<MediaDescription>,
    op: O,
    media: M,
    listeners: Vec<Box<dyn CallListener>>,
    round: Round,
    pending: Option<Round>,
    offerless: bool,
    awaiting_answer: bool,
    stats: CallStatsCollector,
}

impl<O: SignalingOperation, M: MediaEngine> CallSession<O, M> {
    /// Creates a session in state [`CallState::Idle`].
    pub fn new(config: SessionConfig, caps: LocalCapabilities, op: O, media: M) -> Self {
        let stats = CallStatsCollector::new(config.stats_interval(), config.stats_smoothing());

        CallSession {
            id: CallId::new(),
            state: CallState::Idle,
            prev_state: CallState::Idle,
            last_stable: CallState::StreamsRunning,
            config,
            caps,
            prev_caps: None,
            local: None,
            remote: None,
            result: None,
            snapshot: None,
            staged: None,
            proposed: None,
            op,
            media,
            listeners: vec![],
            round: Round::from(0),
            pending: None,
            offerless: false,
            awaiting_answer: false,
            stats,
        }
    }

    /// Add a listener. Listeners are notified in the order they were added.
    pub fn add_listener(&mut self, listener: impl CallListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Identity of the call.
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> CallState {
        self.state
    }

    /// State before the current one.
    pub fn prev_state(&self) -> CallState {
        self.prev_state
    }

    /// The last offer/answer round started.
    pub fn round(&self) -> Round {
        self.round
    }

    /// The session config.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Our latest committed description.
    pub fn local_description(&self) -> Option<&MediaDescription> {
        self.local.as_ref()
    }

    /// The remote side's latest committed description.
    pub fn remote_description(&self) -> Option<&MediaDescription> {
        self.remote.as_ref()
    }

    /// The negotiated description in use.
    pub fn result_description(&self) -> Option<&MediaDescription> {
        self.result.as_ref()
    }

    /// Call statistics.
    pub fn stats(&self) -> &CallStatsCollector {
        &self.stats
    }

    /// The signaling operation.
    pub fn op(&self) -> &O {
        &self.op
    }

    /// Mutable access to the signaling operation.
    pub fn op_mut(&mut self) -> &mut O {
        &mut self.op
    }

    /// The media engine.
    pub fn media(&self) -> &M {
        &self.media
    }

    /// Mutable access to the media engine.
    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    /// Place the call, sending our offer.
    pub fn start(&mut self) -> Result<(), CallError> {
        self.command(SessionEvent::Start, "start")
    }

    /// Accept an incoming call.
    pub fn accept(&mut self) -> Result<(), CallError> {
        self.command(SessionEvent::Accept, "accept")
    }

    /// Reject an incoming call.
    pub fn decline(&mut self, reason: Reason) -> Result<(), CallError> {
        self.command(SessionEvent::Decline(reason), "decline")
    }

    /// Put the call on hold. All enabled streams are offered as inactive.
    pub fn pause(&mut self) -> Result<(), CallError> {
        self.command(SessionEvent::Pause, "pause")
    }

    /// Take the call off hold.
    pub fn resume(&mut self) -> Result<(), CallError> {
        self.command(SessionEvent::Resume, "resume")
    }

    /// Offer the current local capabilities again.
    ///
    /// Nothing is sent if the new offer doesn't differ from the current one.
    pub fn update(&mut self) -> Result<(), CallError> {
        let changed = self.propose();
        self.command_with_proposal(SessionEvent::Update { changed }, "update")
    }

    /// Change the local capabilities and offer them.
    pub fn update_capabilities(&mut self, caps: LocalCapabilities) -> Result<(), CallError> {
        if !self.state.is_stable() {
            return Err(self.invalid("update capabilities"));
        }
        self.prev_caps = Some(std::mem::replace(&mut self.caps, caps));
        let ret = self.update();
        self.prev_caps = None;
        ret
    }

    /// Hang up. Allowed in any state but [`CallState::Released`].
    pub fn terminate(&mut self) -> Result<(), CallError> {
        self.command(SessionEvent::Terminate, "terminate")
    }

    /// Change the encryption policy. An established call is renegotiated right away.
    pub fn set_encryption_policy(&mut self, policy: EncryptionPolicy) -> Result<(), CallError> {
        if self.state == CallState::Released {
            return Err(self.invalid("set encryption policy"));
        }

        info!("Set encryption policy: {:?}", policy);
        let config = std::mem::take(&mut self.config);
        self.config = config.set_encryption_policy(policy);

        if self.state.is_stable() {
            self.propose();
            return self.command_with_proposal(
                SessionEvent::Update { changed: true },
                "set encryption policy",
            );
        }

        Ok(())
    }

    /// ICE completed with the given selected local addresses, per stream index.
    ///
    /// Depending on config a new offer with the selected addresses is sent.
    pub fn ice_completed(&mut self, selected: &[(usize, SocketAddr)]) -> Result<(), CallError> {
        if !self.state.is_stable() {
            return Err(self.invalid("complete ice"));
        }

        for (index, addr) in selected {
            self.caps.set_selected(*index, *addr);
        }

        let dtls = self
            .result
            .as_ref()
            .map(|r| r.encryption() == MediaEncryption::Dtls)
            .unwrap_or(false);

        let wanted = self.config.update_call_when_ice_completed()
            && (!dtls || self.config.update_call_when_ice_completed_with_dtls());

        let reinvite = wanted && self.propose();
        if !reinvite {
            debug!("No offer after ICE completion (wanted: {})", wanted);
        }

        self.command_with_proposal(SessionEvent::IceCompleted { reinvite }, "complete ice")
    }

    /// Handle one event from the signaling layer.
    pub fn handle_event(&mut self, event: SignalingEvent) -> Result<(), CallError> {
        if self.state == CallState::Released {
            debug!("Drop event in released call: {:?}", event);
            return Ok(());
        }

        trace!("Handle event in state {}: {:?}", self.state, event);

        let mut round_done = false;

        let (event, staged) = match event {
            SignalingEvent::RemoteOffer { sdp: Some(sdp) } => {
                let (outcome, staged) = self.answer_offer(&sdp);
                (SessionEvent::RemoteOffer(outcome), staged)
            }
            SignalingEvent::RemoteOffer { sdp: None } => {
                if self.state == CallState::Idle {
                    self.offerless = true;
                }
                (SessionEvent::Refresh, None)
            }
            SignalingEvent::Progress { sdp } => match sdp {
                Some(sdp) => {
                    let (outcome, staged) = self.take_answer(&sdp);
                    (
                        SessionEvent::Progress {
                            early_media: Some(outcome),
                        },
                        staged,
                    )
                }
                None => (SessionEvent::Progress { early_media: None }, None),
            },
            SignalingEvent::Accepted { round, sdp } => {
                if !self.is_pending(round) {
                    return Ok(());
                }
                round_done = true;
                match sdp {
                    Some(sdp) => {
                        let (outcome, staged) = self.take_answer(&sdp);
                        (SessionEvent::Accepted(outcome), staged)
                    }
                    None => (SessionEvent::Accepted(self.answerless_accept()), None),
                }
            }
            SignalingEvent::Declined { round, reason } => {
                if !self.is_pending(round) {
                    return Ok(());
                }
                round_done = true;
                (SessionEvent::Declined(reason), None)
            }
            SignalingEvent::Terminated => (SessionEvent::Terminated, None),
            SignalingEvent::TransportError { reason } => {
                warn!("Transport error: {}", reason);
                round_done = true;
                (SessionEvent::TransportError, None)
            }
            SignalingEvent::Closed => (SessionEvent::Closed, None),
        };

        let ret = self.process(event, staged);

        if round_done {
            self.pending = None;
            self.awaiting_answer = false;
        }

        ret
    }

    /// Drive the session. Handles all queued signaling events and samples stats when due.
    pub fn tick(&mut self, now: Instant) -> Result<(), CallError> {
        while let Some(event) = self.op.poll_event() {
            self.handle_event(event)?;
        }

        if self.media_running() && self.stats.wants_timeout(now) {
            let samples = self.media.sample_stats();
            self.stats.handle_timeout(now, samples);

            while let Some(stats) = self.stats.poll_output() {
                for l in self.listeners.iter_mut() {
                    l.on_stats_updated(&stats);
                }
            }
        }

        Ok(())
    }

    /// When [`CallSession::tick()`] next needs to be called for stats.
    pub fn poll_timeout(&self) -> Option<Instant> {
        if !self.media_running() {
            return None;
        }
        self.stats.poll_timeout()
    }

    fn media_running(&self) -> bool {
        self.state.is_stable() || self.state.is_round()
    }

    fn invalid(&self, action: &'static str) -> CallError {
        CallError::InvalidState {
            state: self.state,
            action,
        }
    }

    fn is_pending(&self, round: Round) -> bool {
        if self.pending == Some(round) {
            return true;
        }
        warn!(
            "Drop response for round {}, pending: {:?}",
            round, self.pending
        );
        false
    }

    fn context(&self) -> TransitionContext {
        TransitionContext {
            last_stable: self.last_stable,
            offerless: self.offerless,
            remote_on_hold: self
                .staged
                .as_ref()
                .map(|s| s.remote.is_on_hold())
                .unwrap_or(false),
            awaiting_answer: self.awaiting_answer,
        }
    }

    // Build the next offer and tell whether it differs from the current local description.
    fn propose(&mut self) -> bool {
        let offer = self.next_local(OfferKind::Update);
        let changed = match &self.local {
            Some(local) => {
                let flags = StreamDescriptionDiffer::new(local, &offer).diff();
                debug!("Proposed offer changes: {}", flags);
                !flags.is_empty()
            }
            None => true,
        };
        self.proposed = Some(offer);
        changed
    }

    fn command_with_proposal(
        &mut self,
        event: SessionEvent,
        action: &'static str,
    ) -> Result<(), CallError> {
        let ret = self.command(event, action);
        self.proposed = None;
        ret
    }

    fn command(&mut self, event: SessionEvent, action: &'static str) -> Result<(), CallError> {
        let Some(t) = transition(self.state, &event, &self.context()) else {
            return Err(self.invalid(action));
        };
        info!("Call {} {} in state {}", self.id, action, self.state);
        self.run(t, None)
    }

    fn process(&mut self, event: SessionEvent, staged: Option<Staged>) -> Result<(), CallError> {
        let Some(t) = transition(self.state, &event, &self.context()) else {
            debug!("Drop {:?} in state {}", event, self.state);
            return Ok(());
        };
        self.run(t, staged)
    }

    fn run(&mut self, t: Transition, staged: Option<Staged>) -> Result<(), CallError> {
        if let Some(staged) = staged {
            let keep = t.path.contains(&CallState::IncomingReceived)
                || t
                    .effects
                    .iter()
                    .any(|e| matches!(e, Effect::Accept | Effect::ApplyMedia));
            if keep {
                self.staged = Some(staged);
            }
        }

        let ending = t.path.iter().any(|s| s.is_terminal());

        for effect in t.effects {
            if let Err(e) = self.execute(effect) {
                warn!("Signaling failed in state {}: {}", self.state, e);
                if !ending && self.state.is_stable() {
                    // A renegotiation that never got out leaves the call as it was.
                    self.abort_round(&e);
                } else if !ending && self.state.is_round() {
                    debug!("Round {:?} still pending", self.pending);
                } else {
                    // Transport error transitions never use the signaling operation.
                    let fallback =
                        transition(self.state, &SessionEvent::TransportError, &self.context());
                    if let Some(t) = fallback {
                        self.run(t, None)?;
                    }
                }
                return Err(e.into());
            }
        }

        for state in t.path {
            self.enter(state, t.message.as_deref());
        }

        Ok(())
    }

    fn enter(&mut self, state: CallState, message: Option<&str>) {
        let prev = self.state;
        self.prev_state = prev;
        self.state = state;

        if state.is_stable() {
            self.last_stable = state;
        }

        info!("Call {} {} -> {}", self.id, prev, state);

        if matches!(state, CallState::End | CallState::Error) && !prev.is_terminal() {
            self.media.stop();
        }

        let message = message.map(|m| m.to_string()).unwrap_or_else(|| state.to_string());
        for l in self.listeners.iter_mut() {
            l.on_state_changed(prev, state, &message);
        }
    }

    fn execute(&mut self, effect: Effect) -> Result<(), SignalingError> {
        trace!("Execute {:?}", effect);

        match effect {
            Effect::SendInitial => {
                let offer = self.next_local(OfferKind::Update);
                let round = self.next_round();
                self.op.send_initial(round, &offer)?;
                self.local = Some(offer);
            }
            Effect::Accept => {
                let Some(staged) = self.staged.take() else {
                    warn!("No negotiated answer to accept with");
                    return Ok(());
                };
                self.op.accept(&staged.result)?;
                self.commit(staged);
            }
            Effect::AcceptOffer => {
                let offer = self.next_local(OfferKind::Update);
                let round = self.next_round();
                self.awaiting_answer = true;
                info!("Offer in accept, round {}", round);
                self.op.accept_with_offer(round, &offer)?;
                self.local = Some(offer);
            }
            Effect::DeclineWith(reason) => {
                self.staged = None;
                self.op.decline(&reason)?;
            }
            Effect::SendUpdate(kind) => {
                let offer = match self.proposed.take() {
                    Some(v) => v,
                    None => self.next_local(kind),
                };
                let round = self.next_round();
                info!("Send {:?} offer in round {}", kind, round);
                self.op.send_update(round, &offer)?;
                self.local = Some(offer);
            }
            Effect::TerminateOp => self.op.terminate()?,
            Effect::ApplyMedia => {
                if let Some(staged) = self.staged.take() {
                    self.commit(staged);
                }
                self.apply_media();
            }
            Effect::Snapshot => {
                self.snapshot = Some(Snapshot {
                    local: self.local.clone(),
                    remote: self.remote.clone(),
                    result: self.result.clone(),
                    caps: self.prev_caps.take().unwrap_or_else(|| self.caps.clone()),
                });
            }
            Effect::Revert => self.revert(),
            Effect::UpdateFailed(reason) => {
                for l in self.listeners.iter_mut() {
                    l.on_update_failed(&reason);
                }
            }
            Effect::AbandonRound => {
                if let Some(round) = self.pending.take() {
                    info!("Abandon round {}", round);
                }
                self.awaiting_answer = false;
                self.staged = None;
                self.proposed = None;
            }
        }

        Ok(())
    }

    fn revert(&mut self) {
        self.staged = None;
        if let Some(s) = self.snapshot.take() {
            warn!("Revert to descriptions before the failed round");
            self.local = s.local;
            self.remote = s.remote;
            self.result = s.result;
            self.caps = s.caps;
        }
    }

    fn abort_round(&mut self, error: &SignalingError) {
        self.revert();
        if let Some(round) = self.pending.take() {
            info!("Abort round {}", round);
        }
        self.awaiting_answer = false;
        self.proposed = None;

        let reason = error.to_string();
        for l in self.listeners.iter_mut() {
            l.on_update_failed(&reason);
        }
    }

    fn next_round(&mut self) -> Round {
        self.round = self.round.next();
        self.pending = Some(self.round);
        self.round
    }

    fn next_local(&self, kind: OfferKind) -> MediaDescription {
        let available = if self.config.low_bandwidth() {
            self.stats.available_bandwidth()
        } else {
            None
        };

        let mut md = build_local(&self.caps, &self.config, self.local.as_ref(), available);

        let on_hold = match kind {
            OfferKind::Pause => true,
            OfferKind::Resume => false,
            OfferKind::Update => self.state == CallState::Paused,
        };
        if on_hold {
            hold(&mut md);
        }

        md
    }

    fn engine(&self) -> OfferAnswerEngine {
        OfferAnswerEngine::new(NegotiationContext {
            policy: self.config.encryption_policy().clone(),
            legacy_order: self.config.legacy_order().to_vec(),
        })
    }

    // A remote offer, answered with our next local description.
    fn answer_offer(&self, sdp: &str) -> (Outcome, Option<Staged>) {
        let remote = match MediaDescription::parse(sdp) {
            Ok(v) => v,
            Err(e) => {
                warn!("Unusable remote offer: {}", e);
                return (Outcome::Failed(e.to_string()), None);
            }
        };
        let mut local = self.next_local(OfferKind::Update);
        answer_keys(&mut local, &self.config, &remote, self.local.as_ref());
        self.negotiated(local, remote, false)
    }

    // A 200 OK without SDP. Only usable after early media, which then becomes the answer.
    fn answerless_accept(&self) -> Outcome {
        if self.state != CallState::OutgoingEarlyMedia {
            return Outcome::Failed("Accepted without answer".into());
        }
        match &self.remote {
            Some(remote) if self.result.is_some() => {
                info!("Use early media answer, none in accept");
                Outcome::Ok {
                    paused_by_remote: remote.is_on_hold(),
                    changed: false,
                }
            }
            _ => Outcome::Failed("Accepted without answer".into()),
        }
    }

    // A remote answer to the offer in our local description.
    fn take_answer(&self, sdp: &str) -> (Outcome, Option<Staged>) {
        let remote = match MediaDescription::parse(sdp) {
            Ok(v) => v,
            Err(e) => {
                warn!("Unusable remote answer: {}", e);
                return (Outcome::Failed(e.to_string()), None);
            }
        };
        let Some(local) = self.local.clone() else {
            return (Outcome::Failed("Answer without offer".into()), None);
        };
        self.negotiated(local, remote, true)
    }

    fn negotiated(
        &self,
        local: MediaDescription,
        remote: MediaDescription,
        is_local_offerer: bool,
    ) -> (Outcome, Option<Staged>) {
        match self.engine().negotiate(&local, &remote, is_local_offerer) {
            Ok(result) => {
                let changed = match &self.result {
                    Some(prev) => !StreamDescriptionDiffer::new(prev, &result).diff().is_empty(),
                    None => true,
                };
                let outcome = Outcome::Ok {
                    paused_by_remote: remote.is_on_hold(),
                    changed,
                };
                debug!("Negotiated {:?}", outcome);
                (
                    outcome,
                    Some(Staged {
                        local,
                        remote,
                        result,
                    }),
                )
            }
            Err(e) => {
                warn!("Negotiation failed: {}", e);
                (Outcome::Failed(e.to_string()), None)
            }
        }
    }

    fn commit(&mut self, staged: Staged) {
        if let Some(prev) = &self.result {
            let flags = StreamDescriptionDiffer::new(prev, &staged.result).diff();
            debug!("Result changes: {}", flags);
            if flags.intersects(DiffFlags::STREAMS_CHANGED | DiffFlags::NETWORK_CHANGED) {
                self.stats.reset();
            }
        }
        self.local = Some(staged.local);
        self.remote = Some(staged.remote);
        self.result = Some(staged.result);
    }

    fn apply_media(&mut self) {
        let Some(result) = &self.result else {
            return;
        };
        if let Err(e) = self.media.apply_description(result) {
            warn!("Media engine failed: {}", e);
            for l in self.listeners.iter_mut() {
                l.on_media_error(&e);
            }
        }
    }
}
