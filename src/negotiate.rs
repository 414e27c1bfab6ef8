//! Offer/answer negotiation of media descriptions (RFC 3264).

use thiserror::Error;

use crate::encryption::{match_crypto, EncryptionError, EncryptionNegotiator};
use crate::encryption::{EncryptionPolicy, MediaEncryption, SrtpMatch};
use crate::media::{Codec, MediaDescription, MediaProto, Setup};
use crate::media::{StreamDescription, StreamDirection};

/// Errors from negotiating a pair of descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// A mandatory stream has no codec in common.
    #[error("No common codec for mandatory stream {0}")]
    NoCommonCodec(usize),

    /// Encryption couldn't be agreed, or applied to a mandatory stream.
    #[error("{0}")]
    Encryption(#[from] EncryptionError),

    /// Nothing left that can carry media.
    #[error("No active stream in result")]
    NoActiveStream,
}

/// Per-round inputs that stay the same for every stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationContext {
    /// The local encryption policy.
    pub policy: EncryptionPolicy,
    /// Legacy order for the encryption negotiator, highest first.
    pub legacy_order: Vec<MediaEncryption>,
}

/// Computes the result description of an offer/answer exchange.
///
/// The engine is pure. The same inputs always give the same result, and the
/// inputs are never modified.
#[derive(Debug, Clone)]
pub struct OfferAnswerEngine {
    policy: EncryptionPolicy,
    negotiator: EncryptionNegotiator,
}

/// The two descriptions of a stream, seen as offer and answer.
struct Pair<'a> {
    index: usize,
    local: &'a StreamDescription,
    remote: &'a StreamDescription,
    answering: bool,
}

impl<'a> Pair<'a> {
    fn offer(&self) -> &'a StreamDescription {
        if self.answering {
            self.remote
        } else {
            self.local
        }
    }

    fn answer(&self) -> &'a StreamDescription {
        if self.answering {
            self.local
        } else {
            self.remote
        }
    }

    // Transport (address, port, ICE) is the local one when we are the answerer since the
    // result is what goes on the wire. As offerer it's where the remote side wants media.
    fn transport(&self) -> &'a StreamDescription {
        if self.answering {
            self.local
        } else {
            self.remote
        }
    }
}

impl OfferAnswerEngine {
    /// Creates an engine for one round.
    pub fn new(ctx: NegotiationContext) -> Self {
        OfferAnswerEngine {
            policy: ctx.policy,
            negotiator: EncryptionNegotiator::new(ctx.legacy_order),
        }
    }

    /// Negotiate the `local` and `remote` descriptions.
    ///
    /// When `is_local_offerer` is true, `local` is the offer we sent and `remote`
    /// the answer. Otherwise `remote` is the offer and the result is our answer.
    pub fn negotiate(
        &self,
        local: &MediaDescription,
        remote: &MediaDescription,
        is_local_offerer: bool,
    ) -> Result<MediaDescription, NegotiationError> {
        let answering = !is_local_offerer;
        let offer = if answering { remote } else { local };

        let enc = self.session_encryption(local, remote, answering)?;
        debug!("Negotiate session encryption: {}", enc);

        let mut result = MediaDescription {
            session_id: local.session_id,
            session_version: local.session_version,
            origin_addr: local.origin_addr.clone(),
            addr: if answering {
                local.addr.clone()
            } else {
                remote.addr.clone()
            },
            bandwidth: local.bandwidth,
            ice_ufrag: local.ice_ufrag.clone(),
            ice_pwd: local.ice_pwd.clone(),
            ice_lite: local.ice_lite,
            bundles: vec![],
            custom_attrs: local.custom_attrs.clone(),
            streams: vec![],
        };

        let count = local.streams.len().max(remote.streams.len());

        for index in 0..count {
            let stream = match (local.stream(index), remote.stream(index)) {
                (Some(l), Some(r)) => {
                    let pair = Pair {
                        index,
                        local: l,
                        remote: r,
                        answering,
                    };
                    self.negotiate_stream(&pair, enc)?
                }
                (Some(s), None) | (None, Some(s)) => {
                    debug!("Stream {} only on one side", index);
                    StreamDescription::absent(s.typ.clone(), s.proto.clone())
                }
                (None, None) => continue,
            };
            result.streams.push(stream);
        }

        // Bundles come from the remote side, limited to what we kept.
        let enabled_mids: Vec<String> = result
            .enabled_streams()
            .filter_map(|(_, s)| s.mid.clone())
            .collect();
        for group in &remote.bundles {
            let kept: Vec<String> = group
                .iter()
                .filter(|m| enabled_mids.contains(m))
                .cloned()
                .collect();
            if !kept.is_empty() {
                result.bundles.push(kept);
            }
        }

        let offered = offer.enabled_streams().count();
        if offered > 0 && result.enabled_streams().count() == 0 {
            return Err(NegotiationError::NoActiveStream);
        }

        Ok(result)
    }

    fn session_encryption(
        &self,
        local: &MediaDescription,
        remote: &MediaDescription,
        answering: bool,
    ) -> Result<MediaEncryption, EncryptionError> {
        let remote_stream = main_stream(remote);

        let remote_policy = remote_stream
            .map(EncryptionPolicy::from_stream)
            .unwrap_or_default();

        if !answering {
            return self
                .negotiator
                .check_answer(&self.policy, remote_policy.actual());
        }

        let offered_caps = remote_stream
            .map(|s| s.capabilities.clone())
            .unwrap_or_default();

        let offered_crypto = remote_stream.map(|s| &s.crypto[..]).unwrap_or(&[]);
        let local_crypto: Vec<_> = local
            .streams
            .iter()
            .flat_map(|s| s.crypto.iter().cloned())
            .collect();
        let srtp = SrtpMatch::new(offered_crypto, &local_crypto);

        self.negotiator
            .resolve(&remote_policy, &self.policy, &offered_caps, &srtp)
    }

    fn negotiate_stream(
        &self,
        pair: &Pair<'_>,
        enc: MediaEncryption,
    ) -> Result<StreamDescription, NegotiationError> {
        let Pair {
            index,
            local: l,
            remote: r,
            answering,
        } = *pair;
        let offer = pair.offer();

        let absent = || StreamDescription::absent(offer.typ.clone(), offer.proto.clone());

        if !l.is_enabled() || !r.is_enabled() {
            debug!("Stream {} disabled", index);
            return Ok(absent());
        }

        if l.typ != r.typ {
            debug!("Stream {} type mismatch: {} vs {}", index, l.typ, r.typ);
            return Ok(absent());
        }

        if !protos_compatible(&l.proto, &r.proto) {
            debug!("Stream {} incompatible proto: {} vs {}", index, l.proto, r.proto);
            return Ok(absent());
        }

        let codecs = match_codecs(l, r, answering);
        if codecs.iter().all(|c| c.is_telephone_event()) {
            if offer.is_mandatory() {
                return Err(NegotiationError::NoCommonCodec(index));
            }
            debug!("Stream {} has no common codec", index);
            return Ok(absent());
        }

        let dir = if answering {
            StreamDirection::answer(l.dir, r.dir)
        } else {
            StreamDirection::outgoing(l.dir, r.dir)
        };

        let t = pair.transport();
        let mut s = StreamDescription::new(offer.typ.clone(), t.port, dir, codecs);
        s.rtcp_port = t.rtcp_port;
        s.addr = t.addr.clone();
        s.rtcp_mux = l.rtcp_mux && r.rtcp_mux;
        s.bandwidth = t.bandwidth;
        s.ptime = t.ptime;
        s.mid = offer.mid.clone();
        s.ice_ufrag = t.ice_ufrag.clone();
        s.ice_pwd = t.ice_pwd.clone();
        s.candidates = t.candidates.clone();
        s.custom_attrs = t.custom_attrs.clone();

        match self.apply_encryption(pair, enc, &mut s) {
            Ok(()) => Ok(s),
            Err(e) if offer.is_mandatory() => Err(e.into()),
            Err(e) => {
                debug!("Drop stream {}: {}", index, e);
                Ok(absent())
            }
        }
    }

    fn apply_encryption(
        &self,
        pair: &Pair<'_>,
        enc: MediaEncryption,
        s: &mut StreamDescription,
    ) -> Result<(), EncryptionError> {
        let offer = pair.offer();
        let (l, r) = (pair.local, pair.remote);
        let unusable = || EncryptionError::Unusable {
            index: pair.index,
            enc,
        };

        if !offer_allows(offer, enc) || !offer_allows_answer(pair.answer(), enc, pair.answering) {
            return Err(unusable());
        }

        s.proto = if offer.encryption() == enc {
            offer.proto.clone()
        } else {
            MediaProto::for_encryption(enc, offer.proto.has_avpf())
        };

        match enc {
            MediaEncryption::None => {}
            MediaEncryption::Srtp => {
                let c = match_crypto(&l.crypto, &r.crypto, pair.answering).ok_or_else(unusable)?;
                s.crypto = vec![c];
            }
            MediaEncryption::Dtls => {
                if l.fingerprint.is_none() || r.fingerprint.is_none() {
                    return Err(unusable());
                }
                let t = pair.transport();
                s.fingerprint = t.fingerprint.clone();
                s.setup = Some(if pair.answering {
                    Setup::answer_to(r.setup.unwrap_or(Setup::ActPass))
                } else {
                    r.setup
                        .unwrap_or_else(|| Setup::answer_to(l.setup.unwrap_or(Setup::ActPass)))
                });
            }
            MediaEncryption::Zrtp => match &l.zrtp_hash {
                Some(h) => s.zrtp_hash = Some(h.clone()),
                None if self.policy.is_mandatory() => return Err(unusable()),
                // In-band keying, plain RTP is what's left.
                None => {}
            },
        }

        Ok(())
    }
}

// The stream that decides the session encryption: first enabled mandatory stream,
// otherwise first enabled stream.
fn main_stream(md: &MediaDescription) -> Option<&StreamDescription> {
    md.enabled_streams()
        .find(|(_, s)| s.is_mandatory())
        .or_else(|| md.enabled_streams().next())
        .map(|(_, s)| s)
}

// RTP profiles can be renegotiated through encryption, anything else must match exactly.
fn protos_compatible(a: &MediaProto, b: &MediaProto) -> bool {
    if a.is_rtp() && b.is_rtp() {
        return true;
    }
    a == b
}

// Whether the offer made `enc` possible, in the m-line or as a potential configuration.
// A plain RTP offer allows ZRTP which is keyed in-band.
fn offer_allows(offer: &StreamDescription, enc: MediaEncryption) -> bool {
    offer.encryption() == enc
        || offer.capabilities.contains(&enc)
        || (!offer.proto.is_secure() && matches!(enc, MediaEncryption::None | MediaEncryption::Zrtp))
}

// A remote answer must be using the suite. Our own answer is built from it.
fn offer_allows_answer(answer: &StreamDescription, enc: MediaEncryption, answering: bool) -> bool {
    if answering {
        return true;
    }
    let actual = answer.encryption();
    actual == enc || (!answer.proto.is_secure() && enc == MediaEncryption::None)
}

/// Codecs present on both sides, in the offerer's order, with the remote payload type.
fn match_codecs(l: &StreamDescription, r: &StreamDescription, answering: bool) -> Vec<Codec> {
    let (offer, answer) = if answering { (r, l) } else { (l, r) };

    let mut codecs: Vec<Codec> = vec![];

    for o in &offer.codecs {
        let Some(a) = answer.codecs.iter().find(|a| a.matches(o)) else {
            continue;
        };

        let (local, remote) = if answering { (a, o) } else { (o, a) };

        if codecs.iter().any(|c| c.pt == remote.pt) {
            continue;
        }

        let mut c = local.clone();
        c.pt = remote.pt;
        c.mime = remote.mime.clone();
        codecs.push(c);
    }

    codecs
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::media::{CryptoAttribute, Fingerprint, SrtpSuite, StreamType};

    fn engine(policy: EncryptionPolicy) -> OfferAnswerEngine {
        OfferAnswerEngine::new(NegotiationContext {
            policy,
            legacy_order: MediaEncryption::default_legacy_order(),
        })
    }

    fn audio(port: u16, codecs: Vec<Codec>) -> StreamDescription {
        StreamDescription::new(StreamType::Audio, port, StreamDirection::SendRecv, codecs)
    }

    fn video(port: u16, codecs: Vec<Codec>) -> StreamDescription {
        StreamDescription::new(StreamType::Video, port, StreamDirection::SendRecv, codecs)
    }

    fn desc(addr: &str, streams: Vec<StreamDescription>) -> MediaDescription {
        let mut md = MediaDescription::new(addr);
        md.addr = Some(addr.into());
        md.streams = streams;
        md
    }

    fn opus(pt: u8) -> Codec {
        Codec::new(pt, "opus", 48000, Some(2))
    }

    fn crypto(tag: u32, suite: SrtpSuite, key: &str) -> CryptoAttribute {
        CryptoAttribute {
            tag,
            suite,
            key: key.into(),
        }
    }

    #[test]
    fn simple_answer() {
        let remote = desc(
            "10.0.0.2",
            vec![audio(
                4000,
                vec![opus(111), Codec::new(0, "PCMU", 8000, None)],
            )],
        );
        let local = desc(
            "10.0.0.1",
            vec![audio(
                7078,
                vec![Codec::new(0, "PCMU", 8000, None), opus(96)],
            )],
        );

        let r = engine(EncryptionPolicy::default())
            .negotiate(&local, &remote, false)
            .unwrap();

        let s = &r.streams[0];
        assert_eq!(s.port, 7078);
        assert_eq!(s.dir, StreamDirection::SendRecv);
        // Offerer order, remote numbering.
        assert_eq!(s.codecs.len(), 2);
        assert_eq!(*s.codecs[0].pt, 111);
        assert_eq!(s.codecs[0].mime, "opus");
        assert_eq!(*s.codecs[1].pt, 0);
        assert_eq!(r.addr.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn offerer_result_uses_remote_transport() {
        let local = desc("10.0.0.1", vec![audio(7078, vec![opus(111)])]);
        let mut answer = audio(4000, vec![opus(111)]);
        answer.dir = StreamDirection::RecvOnly;
        let remote = desc("10.0.0.2", vec![answer]);

        let r = engine(EncryptionPolicy::default())
            .negotiate(&local, &remote, true)
            .unwrap();

        assert_eq!(r.streams[0].port, 4000);
        assert_eq!(r.streams[0].dir, StreamDirection::SendOnly);
        assert_eq!(r.addr.as_deref(), Some("10.0.0.2"));
        assert_eq!(r.session_id, local.session_id);
    }

    #[test]
    fn optional_stream_without_codec_is_absent() {
        let remote = desc(
            "10.0.0.2",
            vec![audio(4000, vec![opus(111)]), video(4002, vec![Codec::new(96, "VP8", 90000, None)])],
        );
        let local = desc(
            "10.0.0.1",
            vec![audio(7078, vec![opus(111)]), video(9078, vec![Codec::new(97, "H264", 90000, None)])],
        );

        let r = engine(EncryptionPolicy::default())
            .negotiate(&local, &remote, false)
            .unwrap();

        assert!(r.streams[0].is_enabled());
        assert!(!r.streams[1].is_enabled());
        assert_eq!(r.streams[1].dir, StreamDirection::Inactive);
        assert!(r.streams[1].codecs.is_empty());
    }

    #[test]
    fn mandatory_stream_without_codec_fails() {
        let remote = desc("10.0.0.2", vec![audio(4000, vec![opus(111)])]);
        let local = desc("10.0.0.1", vec![audio(7078, vec![Codec::new(8, "PCMA", 8000, None)])]);

        let r = engine(EncryptionPolicy::default()).negotiate(&local, &remote, false);
        assert_eq!(r, Err(NegotiationError::NoCommonCodec(0)));
    }

    #[test]
    fn telephone_event_alone_is_no_codec() {
        let te = Codec::new(101, "telephone-event", 8000, None);
        let remote = desc("10.0.0.2", vec![audio(4000, vec![opus(111), te.clone()])]);
        let local = desc("10.0.0.1", vec![audio(7078, vec![Codec::new(8, "PCMA", 8000, None), te])]);

        let r = engine(EncryptionPolicy::default()).negotiate(&local, &remote, false);
        assert_eq!(r, Err(NegotiationError::NoCommonCodec(0)));
    }

    #[test]
    fn one_sided_stream_is_absent() {
        let remote = desc("10.0.0.2", vec![audio(4000, vec![opus(111)]), video(4002, vec![])]);
        let local = desc("10.0.0.1", vec![audio(7078, vec![opus(111)])]);

        let r = engine(EncryptionPolicy::default())
            .negotiate(&local, &remote, false)
            .unwrap();
        assert_eq!(r.streams.len(), 2);
        assert_eq!(r.streams[1].port, 0);
    }

    #[test]
    fn srtp_answer_uses_local_key_and_remote_tag() {
        let mut offer = audio(4000, vec![opus(111)]);
        offer.proto = MediaProto::RtpSavp;
        offer.crypto = vec![
            crypto(1, SrtpSuite::AeadAes256Gcm, "inline:remote-gcm"),
            crypto(2, SrtpSuite::AesCm128HmacSha1_80, "inline:remote80"),
        ];
        let mut mine = audio(7078, vec![opus(111)]);
        mine.proto = MediaProto::RtpSavp;
        mine.crypto = vec![crypto(1, SrtpSuite::AesCm128HmacSha1_80, "inline:local80")];

        let remote = desc("10.0.0.2", vec![offer]);
        let local = desc("10.0.0.1", vec![mine]);

        let r = engine(EncryptionPolicy::Legacy(MediaEncryption::Srtp))
            .negotiate(&local, &remote, false)
            .unwrap();

        let s = &r.streams[0];
        assert_eq!(s.proto, MediaProto::RtpSavp);
        assert_eq!(s.crypto, vec![crypto(2, SrtpSuite::AesCm128HmacSha1_80, "inline:local80")]);
        assert_eq!(s.encryption(), MediaEncryption::Srtp);
    }

    #[test]
    fn mandatory_srtp_rejects_plain_offer() {
        let remote = desc("10.0.0.2", vec![audio(4000, vec![opus(111)])]);
        let mut mine = audio(7078, vec![opus(111)]);
        mine.proto = MediaProto::RtpSavp;
        mine.crypto = vec![crypto(1, SrtpSuite::AesCm128HmacSha1_80, "inline:local80")];
        let local = desc("10.0.0.1", vec![mine]);

        let r = engine(EncryptionPolicy::Mandatory(MediaEncryption::Srtp))
            .negotiate(&local, &remote, false);
        assert!(matches!(r, Err(NegotiationError::Encryption(_))));
    }

    #[test]
    fn capability_negotiation_picks_dtls() {
        let fp = Fingerprint {
            hash_func: "sha-256".into(),
            bytes: vec![1, 2, 3],
        };

        let mut offer = audio(4000, vec![opus(111)]);
        offer.capabilities = vec![MediaEncryption::Dtls, MediaEncryption::None];
        offer.fingerprint = Some(fp.clone());
        offer.setup = Some(Setup::ActPass);

        let mut mine = audio(7078, vec![opus(111)]);
        mine.capabilities = vec![MediaEncryption::Dtls];
        mine.fingerprint = Some(fp.clone());
        mine.setup = Some(Setup::ActPass);

        let remote = desc("10.0.0.2", vec![offer]);
        let local = desc("10.0.0.1", vec![mine]);

        let policy = EncryptionPolicy::Negotiated {
            default: MediaEncryption::None,
            supported: vec![MediaEncryption::Dtls],
        };
        let r = engine(policy).negotiate(&local, &remote, false).unwrap();

        let s = &r.streams[0];
        assert_eq!(s.proto, MediaProto::UdpTlsRtpSavp);
        assert_eq!(s.setup, Some(Setup::Active));
        assert_eq!(s.encryption(), MediaEncryption::Dtls);
    }

    #[test]
    fn determinism() {
        let remote = desc("10.0.0.2", vec![audio(4000, vec![opus(111)]), video(4002, vec![])]);
        let local = desc("10.0.0.1", vec![audio(7078, vec![opus(111)])]);
        let e = engine(EncryptionPolicy::default());

        let a = e.negotiate(&local, &remote, false).unwrap();
        let b = e.negotiate(&local, &remote, false).unwrap();
        assert_eq!(a.to_sdp_string(), b.to_sdp_string());
    }

    #[test]
    fn bundle_limited_to_enabled() {
        let mut a = audio(4000, vec![opus(111)]);
        a.mid = Some("0".into());
        let mut v = video(4002, vec![Codec::new(96, "VP8", 90000, None)]);
        v.mid = Some("1".into());
        let mut remote = desc("10.0.0.2", vec![a, v]);
        remote.bundles = vec![vec!["0".into(), "1".into()]];

        let local = desc("10.0.0.1", vec![audio(7078, vec![opus(111)])]);

        let r = engine(EncryptionPolicy::default())
            .negotiate(&local, &remote, false)
            .unwrap();
        assert_eq!(r.bundles, vec![vec!["0".to_string()]]);
    }

    #[test]
    fn no_active_stream() {
        let remote = desc("10.0.0.2", vec![video(4002, vec![Codec::new(96, "VP8", 90000, None)])]);
        let local = desc("10.0.0.1", vec![video(9078, vec![Codec::new(97, "H264", 90000, None)])]);

        let r = engine(EncryptionPolicy::default()).negotiate(&local, &remote, false);
        assert_eq!(r, Err(NegotiationError::NoActiveStream));
    }
}
