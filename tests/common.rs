#![allow(unused)]
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Once;

use callsess::{CallListener, CallSession, CallState, CallStats, Codec, LocalCapabilities};
use callsess::{LocalStream, MediaDescription, MediaEngine, MediaError, Reason, Round};
use callsess::{SessionConfig, SignalingError, SignalingEvent, SignalingOperation, StatsSample};

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    });
}

/// What the session asked the signaling layer to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Initial(Round, MediaDescription),
    Accept(MediaDescription),
    AcceptOffer(Round, MediaDescription),
    Decline(Reason),
    Update(Round, MediaDescription),
    Terminate,
}

/// Scripted signaling operation. Records what is sent, hands out queued events.
#[derive(Debug, Default)]
pub struct TestOp {
    pub sent: Vec<Sent>,
    pub events: VecDeque<SignalingEvent>,
    pub fail_next: bool,
}

impl TestOp {
    pub fn push(&mut self, event: SignalingEvent) {
        self.events.push_back(event);
    }

    /// The last offer sent, with its round.
    pub fn last_offer(&self) -> Option<(Round, &MediaDescription)> {
        self.sent.iter().rev().find_map(|s| match s {
            Sent::Initial(r, md) | Sent::Update(r, md) | Sent::AcceptOffer(r, md) => {
                Some((*r, md))
            }
            _ => None,
        })
    }

    /// The last description sent in an accept.
    pub fn last_accept(&self) -> Option<&MediaDescription> {
        self.sent.iter().rev().find_map(|s| match s {
            Sent::Accept(md) => Some(md),
            _ => None,
        })
    }

    pub fn declines(&self) -> Vec<Reason> {
        self.sent
            .iter()
            .filter_map(|s| match s {
                Sent::Decline(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    fn check(&mut self) -> Result<(), SignalingError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(SignalingError::Send("scripted failure".into()));
        }
        Ok(())
    }
}

impl SignalingOperation for TestOp {
    fn send_initial(&mut self, round: Round, offer: &MediaDescription) -> Result<(), SignalingError> {
        self.check()?;
        self.sent.push(Sent::Initial(round, offer.clone()));
        Ok(())
    }

    fn accept(&mut self, answer: &MediaDescription) -> Result<(), SignalingError> {
        self.check()?;
        self.sent.push(Sent::Accept(answer.clone()));
        Ok(())
    }

    fn accept_with_offer(
        &mut self,
        round: Round,
        offer: &MediaDescription,
    ) -> Result<(), SignalingError> {
        self.check()?;
        self.sent.push(Sent::AcceptOffer(round, offer.clone()));
        Ok(())
    }

    fn decline(&mut self, reason: &Reason) -> Result<(), SignalingError> {
        self.check()?;
        self.sent.push(Sent::Decline(reason.clone()));
        Ok(())
    }

    fn send_update(&mut self, round: Round, offer: &MediaDescription) -> Result<(), SignalingError> {
        self.check()?;
        self.sent.push(Sent::Update(round, offer.clone()));
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), SignalingError> {
        self.check()?;
        self.sent.push(Sent::Terminate);
        Ok(())
    }

    fn poll_event(&mut self) -> Option<SignalingEvent> {
        self.events.pop_front()
    }
}

/// Media engine that records what it was told, with counters growing on every sample.
#[derive(Debug, Default)]
pub struct TestMedia {
    pub applied: Vec<MediaDescription>,
    pub stopped: bool,
    pub fail: bool,
    pub counters: Vec<StatsSample>,
}

impl MediaEngine for TestMedia {
    fn apply_description(&mut self, result: &MediaDescription) -> Result<(), MediaError> {
        if self.fail {
            return Err(MediaError::Apply("scripted failure".into()));
        }
        self.applied.push(result.clone());
        self.counters = result
            .enabled_streams()
            .map(|(index, _)| StatsSample {
                index,
                ..Default::default()
            })
            .collect();
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn sample_stats(&mut self) -> Vec<StatsSample> {
        for c in &mut self.counters {
            c.bytes_rx += 8_000;
            c.bytes_tx += 4_000;
            c.packets_rx += 50;
        }
        self.counters.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Note {
    State(CallState, CallState, String),
    UpdateFailed(String),
    Stats(usize),
    MediaError(MediaError),
}

/// Listener that keeps every notification.
#[derive(Debug, Clone, Default)]
pub struct Recorder(pub Rc<RefCell<Vec<Note>>>);

impl Recorder {
    pub fn notes(&self) -> Vec<Note> {
        self.0.borrow().clone()
    }

    pub fn states(&self) -> Vec<CallState> {
        self.0
            .borrow()
            .iter()
            .filter_map(|n| match n {
                Note::State(_, s, _) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn update_failures(&self) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter_map(|n| match n {
                Note::UpdateFailed(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl CallListener for Recorder {
    fn on_state_changed(&mut self, prev: CallState, state: CallState, message: &str) {
        self.0
            .borrow_mut()
            .push(Note::State(prev, state, message.to_string()));
    }

    fn on_update_failed(&mut self, reason: &str) {
        self.0
            .borrow_mut()
            .push(Note::UpdateFailed(reason.to_string()));
    }

    fn on_stats_updated(&mut self, stats: &CallStats) {
        self.0.borrow_mut().push(Note::Stats(stats.index));
    }

    fn on_media_error(&mut self, error: &MediaError) {
        self.0.borrow_mut().push(Note::MediaError(error.clone()));
    }
}

pub type TestCall = CallSession<TestOp, TestMedia>;

pub fn opus() -> Codec {
    Codec::new(111, "opus", 48000, Some(2))
}

pub fn pcmu() -> Codec {
    Codec::new(0, "PCMU", 8000, None)
}

pub fn dtmf() -> Codec {
    Codec::new(101, "telephone-event", 8000, None)
}

pub fn vp8() -> Codec {
    Codec::new(96, "VP8", 90000, None)
}

pub fn audio_caps(addr: &str, port: u16) -> LocalCapabilities {
    LocalCapabilities::new(addr).add_stream(LocalStream::audio(port, vec![opus(), pcmu(), dtmf()]))
}

pub fn av_caps(addr: &str, port: u16) -> LocalCapabilities {
    audio_caps(addr, port).add_stream(LocalStream::video(port + 2, vec![vp8()]))
}

pub fn new_call(config: SessionConfig, caps: LocalCapabilities) -> (TestCall, Recorder) {
    let mut call = CallSession::new(config, caps, TestOp::default(), TestMedia::default());
    let recorder = Recorder::default();
    call.add_listener(recorder.clone());
    (call, recorder)
}

/// Deliver the last offer of `from` to `to` as a remote offer.
pub fn deliver_offer(from: &TestCall, to: &mut TestCall) -> Round {
    let (round, offer) = from.op().last_offer().expect("an offer");
    let sdp = offer.to_sdp_string();
    to.handle_event(SignalingEvent::RemoteOffer { sdp: Some(sdp) })
        .expect("handle offer");
    round
}

/// Deliver the last accept of `from` to `to` as the response to `round`.
pub fn deliver_accept(from: &TestCall, to: &mut TestCall, round: Round) {
    let answer = from.op().last_accept().expect("an accept");
    let sdp = answer.to_sdp_string();
    to.handle_event(SignalingEvent::Accepted {
        round,
        sdp: Some(sdp),
    })
    .expect("handle accept");
}

/// Alice calls Bob and Bob answers.
pub fn connect(alice: &mut TestCall, bob: &mut TestCall) {
    alice.start().expect("start");
    let round = deliver_offer(alice, bob);
    assert_eq!(bob.state(), CallState::IncomingReceived);
    bob.accept().expect("accept");
    deliver_accept(bob, alice, round);
}
