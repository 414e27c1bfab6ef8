use callsess::media::{Fingerprint, MediaProto, Setup};
use callsess::{CallState, EncryptionPolicy, MediaDescription, MediaEncryption, Reason};
use callsess::{NegotiationContext, OfferAnswerEngine, SessionConfig};

mod common;
use common::*;

fn config(policy: EncryptionPolicy) -> SessionConfig {
    SessionConfig::new().set_encryption_policy(policy)
}

fn fingerprint(b: u8) -> Fingerprint {
    Fingerprint {
        hash_func: "sha-256".into(),
        bytes: vec![b; 32],
    }
}

fn pair(alice: SessionConfig, bob: SessionConfig) -> (TestCall, TestCall) {
    let (mut alice, _) = new_call(alice, audio_caps("10.0.0.1", 7078));
    let (mut bob, _) = new_call(bob, audio_caps("10.0.0.2", 9078));
    connect(&mut alice, &mut bob);
    (alice, bob)
}

#[test]
pub fn srtp_keys_exchanged() {
    init_log();

    let srtp = EncryptionPolicy::Legacy(MediaEncryption::Srtp);
    let (alice, bob) = pair(config(srtp.clone()), config(srtp));

    assert_eq!(alice.state(), CallState::StreamsRunning);
    assert_eq!(bob.state(), CallState::StreamsRunning);

    let offer = alice.local_description().unwrap();
    assert_eq!(offer.streams[0].proto, MediaProto::RtpSavp);
    assert_eq!(offer.streams[0].crypto.len(), 2);

    let bob_key = &bob.local_description().unwrap().streams[0].crypto[0].key;

    let a = &alice.result_description().unwrap().streams[0];
    let b = &bob.result_description().unwrap().streams[0];
    assert_eq!(a.encryption(), MediaEncryption::Srtp);
    assert_eq!(b.encryption(), MediaEncryption::Srtp);
    assert_eq!(a.crypto.len(), 1);
    assert_eq!(a.crypto[0].tag, 1);
    assert_eq!(&a.crypto[0].key, bob_key);
    assert_eq!(b.crypto[0].tag, 1);
    assert_eq!(&b.crypto[0].key, bob_key);
}

#[test]
pub fn plain_answerer_follows_srtp_offer() {
    init_log();

    let (alice, bob) = pair(
        config(EncryptionPolicy::Legacy(MediaEncryption::Srtp)),
        SessionConfig::new(),
    );

    assert_eq!(bob.state(), CallState::StreamsRunning);
    let answer = bob.op().last_accept().unwrap();
    assert_eq!(answer.streams[0].proto, MediaProto::RtpSavp);
    assert_eq!(
        alice.result_description().unwrap().encryption(),
        MediaEncryption::Srtp
    );
}

#[test]
pub fn zrtp_layered_on_plain_offer() {
    init_log();

    let (alice, bob) = pair(
        SessionConfig::new(),
        config(EncryptionPolicy::Legacy(MediaEncryption::Zrtp)),
    );

    assert_eq!(alice.state(), CallState::StreamsRunning);
    let b = &bob.result_description().unwrap().streams[0];
    assert_eq!(b.proto, MediaProto::RtpAvp);
    assert!(b.zrtp_hash.is_some());
    assert_eq!(b.encryption(), MediaEncryption::Zrtp);
}

#[test]
pub fn mandatory_overrides_preference() {
    init_log();

    let alice = config(EncryptionPolicy::Negotiated {
        default: MediaEncryption::None,
        supported: vec![MediaEncryption::Zrtp, MediaEncryption::Srtp],
    });
    let bob = config(EncryptionPolicy::Mandatory(MediaEncryption::Srtp));

    let (alice, bob) = pair(alice, bob);

    // The offer is plain RTP with SRTP as a potential configuration.
    let offer = alice.local_description().unwrap();
    assert_eq!(offer.streams[0].proto, MediaProto::RtpAvp);

    assert_eq!(bob.state(), CallState::StreamsRunning);
    assert_eq!(alice.state(), CallState::StreamsRunning);

    let answer = bob.op().last_accept().unwrap();
    assert_eq!(answer.streams[0].proto, MediaProto::RtpSavp);
    assert_eq!(
        bob.result_description().unwrap().encryption(),
        MediaEncryption::Srtp
    );
    assert_eq!(
        alice.result_description().unwrap().encryption(),
        MediaEncryption::Srtp
    );
}

#[test]
pub fn mandatory_suite_unknown_to_offer() {
    init_log();

    let (mut alice, _) = new_call(
        config(EncryptionPolicy::Legacy(MediaEncryption::Srtp)),
        audio_caps("10.0.0.1", 7078),
    );
    let (mut bob, _) = new_call(
        config(EncryptionPolicy::Mandatory(MediaEncryption::Dtls))
            .set_dtls_fingerprint(fingerprint(0xbb)),
        audio_caps("10.0.0.2", 9078),
    );

    alice.start().unwrap();
    deliver_offer(&alice, &mut bob);

    assert_eq!(bob.state(), CallState::Error);
    assert_eq!(bob.op().declines(), vec![Reason::NotAcceptable]);
}

#[test]
pub fn offerer_capability_order_wins() {
    init_log();

    let alice = config(EncryptionPolicy::Negotiated {
        default: MediaEncryption::None,
        supported: vec![MediaEncryption::Dtls, MediaEncryption::Srtp],
    })
    .set_dtls_fingerprint(fingerprint(0xaa));

    let bob = config(EncryptionPolicy::Negotiated {
        default: MediaEncryption::None,
        supported: vec![MediaEncryption::Srtp, MediaEncryption::Dtls],
    })
    .set_dtls_fingerprint(fingerprint(0xbb));

    let (alice, bob) = pair(alice, bob);

    assert_eq!(alice.state(), CallState::StreamsRunning);

    let b = &bob.result_description().unwrap().streams[0];
    assert_eq!(b.encryption(), MediaEncryption::Dtls);
    assert_eq!(b.proto, MediaProto::UdpTlsRtpSavp);
    assert_eq!(b.setup, Some(Setup::Active));
    assert_eq!(b.fingerprint, Some(fingerprint(0xbb)));

    let a = &alice.result_description().unwrap().streams[0];
    assert_eq!(a.encryption(), MediaEncryption::Dtls);
    assert_eq!(a.setup, Some(Setup::Active));
    assert_eq!(a.fingerprint, Some(fingerprint(0xbb)));
}

#[test]
pub fn negotiation_is_deterministic() {
    init_log();

    let srtp = EncryptionPolicy::Negotiated {
        default: MediaEncryption::None,
        supported: vec![MediaEncryption::Srtp],
    };
    let (alice, bob) = pair(config(srtp.clone()), config(srtp.clone()));

    let offer = MediaDescription::parse(&alice.local_description().unwrap().to_sdp_string())
        .unwrap();
    let local = bob.local_description().unwrap();

    let engine = OfferAnswerEngine::new(NegotiationContext {
        policy: srtp,
        legacy_order: MediaEncryption::default_legacy_order(),
    });

    let first = engine.negotiate(local, &offer, false).unwrap();
    let second = engine.negotiate(local, &offer, false).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.encryption(), MediaEncryption::Srtp);
}

#[test]
pub fn policy_change_renegotiates() {
    init_log();

    let (mut alice, _) = new_call(SessionConfig::new(), audio_caps("10.0.0.1", 7078));
    let (mut bob, _) = new_call(SessionConfig::new(), audio_caps("10.0.0.2", 9078));
    connect(&mut alice, &mut bob);

    alice
        .set_encryption_policy(EncryptionPolicy::Legacy(MediaEncryption::Srtp))
        .unwrap();
    assert_eq!(alice.state(), CallState::Updating);

    let (round, offer) = alice.op().last_offer().unwrap();
    assert_eq!(offer.streams[0].proto, MediaProto::RtpSavp);

    deliver_offer(&alice, &mut bob);
    deliver_accept(&bob, &mut alice, round);

    assert_eq!(alice.state(), CallState::StreamsRunning);
    assert_eq!(
        alice.result_description().unwrap().encryption(),
        MediaEncryption::Srtp
    );
    assert_eq!(alice.media().applied.len(), 2);
}
