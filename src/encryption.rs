//! Media encryption suites and how two sides agree on one.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::{CryptoAttribute, SrtpSuite, StreamDescription};

/// Encryption used for the media of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MediaEncryption {
    /// Plain RTP.
    #[default]
    None,
    /// SRTP keyed with SDES `a=crypto` lines.
    Srtp,
    /// ZRTP, keyed in-band. Signaled with `a=zrtp-hash`.
    Zrtp,
    /// DTLS-SRTP. Signaled with `a=fingerprint` and `a=setup`.
    Dtls,
}

impl MediaEncryption {
    /// Default preference when two legacy sides disagree, highest first.
    pub fn default_legacy_order() -> Vec<MediaEncryption> {
        use MediaEncryption::*;
        vec![Zrtp, Dtls, Srtp, None]
    }
}

impl fmt::Display for MediaEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaEncryption::None => "none",
            MediaEncryption::Srtp => "srtp",
            MediaEncryption::Zrtp => "zrtp",
            MediaEncryption::Dtls => "dtls",
        };
        write!(f, "{}", s)
    }
}

/// How one side of the call wants encryption to be chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionPolicy {
    /// Only this suite is acceptable. Overrides anything the other side prefers.
    Mandatory(MediaEncryption),
    /// Capability negotiation (RFC 5939). `default` goes in the m-line,
    /// `supported` is advertised as potential configurations in preference order.
    Negotiated {
        /// The suite used in the actual configuration.
        default: MediaEncryption,
        /// Potential configurations, most preferred first.
        supported: Vec<MediaEncryption>,
    },
    /// A single suite without capability negotiation.
    Legacy(MediaEncryption),
}

impl Default for EncryptionPolicy {
    fn default() -> Self {
        EncryptionPolicy::Legacy(MediaEncryption::None)
    }
}

impl EncryptionPolicy {
    /// The suite for the actual configuration, i.e. what the m-line proto says.
    pub fn actual(&self) -> MediaEncryption {
        match self {
            EncryptionPolicy::Mandatory(e) => *e,
            EncryptionPolicy::Negotiated { default, .. } => *default,
            EncryptionPolicy::Legacy(e) => *e,
        }
    }

    /// Potential configurations to advertise. Empty unless negotiated.
    pub fn supported(&self) -> &[MediaEncryption] {
        match self {
            EncryptionPolicy::Negotiated { supported, .. } => supported,
            _ => &[],
        }
    }

    /// Every suite this side can put on the wire, without duplicates.
    pub fn suites(&self) -> Vec<MediaEncryption> {
        let mut all = vec![self.actual()];
        for e in self.supported() {
            if !all.contains(e) {
                all.push(*e);
            }
        }
        all
    }

    /// Whether this side would accept the suite.
    pub fn knows(&self, enc: MediaEncryption) -> bool {
        match self {
            EncryptionPolicy::Mandatory(e) => *e == enc,
            EncryptionPolicy::Negotiated { default, supported } => {
                *default == enc || supported.contains(&enc)
            }
            EncryptionPolicy::Legacy(e) => *e == enc,
        }
    }

    fn actual_proto_secure(&self) -> bool {
        matches!(self.actual(), MediaEncryption::Srtp | MediaEncryption::Dtls)
    }

    /// Whether this is [`EncryptionPolicy::Mandatory`].
    pub fn is_mandatory(&self) -> bool {
        matches!(self, EncryptionPolicy::Mandatory(_))
    }

    /// Infer the policy of a remote side from one of its streams.
    pub fn from_stream(stream: &StreamDescription) -> Self {
        if stream.capabilities.is_empty() {
            EncryptionPolicy::Legacy(stream.encryption())
        } else {
            EncryptionPolicy::Negotiated {
                default: stream.encryption(),
                supported: stream.capabilities.clone(),
            }
        }
    }
}

/// SRTP sub-suites present on each side, to tell whether an SRTP outcome is possible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SrtpMatch {
    /// Suites in the offerer's crypto lines.
    pub offered: Vec<SrtpSuite>,
    /// Suites the answerer can use.
    pub accepted: Vec<SrtpSuite>,
}

impl SrtpMatch {
    /// Collect the suites from both sides' crypto lines.
    pub fn new(offered: &[CryptoAttribute], accepted: &[CryptoAttribute]) -> Self {
        let known = |c: &&CryptoAttribute| !matches!(c.suite, SrtpSuite::Unknown(_));
        SrtpMatch {
            offered: offered.iter().filter(known).map(|c| c.suite.clone()).collect(),
            accepted: accepted.iter().filter(known).map(|c| c.suite.clone()).collect(),
        }
    }

    /// Whether at least one sub-suite is on both sides.
    pub fn overlaps(&self) -> bool {
        self.offered.iter().any(|s| self.accepted.contains(s))
    }
}

/// Errors from choosing an encryption suite.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncryptionError {
    /// No suite acceptable to both sides.
    #[error("No common encryption suite (offerer {offerer}, answerer {answerer})")]
    NoCommonSuite {
        /// What the offerer uses.
        offerer: MediaEncryption,
        /// What the answerer uses.
        answerer: MediaEncryption,
    },

    /// Both sides require an encryption suite, and they differ.
    #[error("Conflicting mandatory encryption: {0} vs {1}")]
    MandatoryConflict(MediaEncryption, MediaEncryption),

    /// The session suite couldn't be applied to a stream.
    #[error("Can't use {enc} on stream {index}")]
    Unusable {
        /// Index of the stream.
        index: usize,
        /// The session suite.
        enc: MediaEncryption,
    },
}

/// Chooses one encryption suite for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionNegotiator {
    legacy_order: Vec<MediaEncryption>,
}

impl Default for EncryptionNegotiator {
    fn default() -> Self {
        EncryptionNegotiator::new(MediaEncryption::default_legacy_order())
    }
}

impl EncryptionNegotiator {
    /// Creates a negotiator using the order, highest preference first, when two
    /// legacy sides disagree. Suites missing in the order rank lowest.
    pub fn new(legacy_order: Vec<MediaEncryption>) -> Self {
        EncryptionNegotiator { legacy_order }
    }

    fn rank(&self, enc: MediaEncryption) -> usize {
        self.legacy_order
            .iter()
            .position(|e| *e == enc)
            .unwrap_or(self.legacy_order.len())
    }

    /// Resolve the suite for the session.
    ///
    /// `offerer_supported` is the offerer's potential configuration list in its
    /// order of preference, `srtp` tells whether the SRTP sub-suites intersect.
    pub fn resolve(
        &self,
        offerer: &EncryptionPolicy,
        answerer: &EncryptionPolicy,
        offerer_supported: &[MediaEncryption],
        srtp: &SrtpMatch,
    ) -> Result<MediaEncryption, EncryptionError> {
        let no_common = || EncryptionError::NoCommonSuite {
            offerer: offerer.actual(),
            answerer: answerer.actual(),
        };

        // 1. Mandatory wins, but only if the other side can do it.
        match (offerer, answerer) {
            (EncryptionPolicy::Mandatory(a), EncryptionPolicy::Mandatory(b)) if a != b => {
                return Err(EncryptionError::MandatoryConflict(*a, *b));
            }
            (EncryptionPolicy::Mandatory(m), other) | (other, EncryptionPolicy::Mandatory(m)) => {
                if !other.knows(*m) {
                    debug!("Mandatory {} not known by other side", m);
                    return Err(no_common());
                }
                if *m == MediaEncryption::Srtp && !srtp.overlaps() {
                    debug!("Mandatory SRTP without common crypto suite");
                    return Err(no_common());
                }
                return Ok(*m);
            }
            _ => {}
        }

        // 2. Capability negotiation on both sides: offerer's order decides.
        if let (EncryptionPolicy::Negotiated { .. }, EncryptionPolicy::Negotiated { .. }) =
            (offerer, answerer)
        {
            let fallback = [offerer.actual()];
            let list = if offerer_supported.is_empty() {
                &fallback[..]
            } else {
                offerer_supported
            };

            for enc in list {
                if !answerer.knows(*enc) {
                    continue;
                }
                if *enc == MediaEncryption::Srtp && !srtp.overlaps() {
                    trace!("Skip SRTP capability, no common crypto suite");
                    continue;
                }
                return Ok(*enc);
            }

            return Err(no_common());
        }

        // 3. Legacy.
        let a = offerer.actual();
        let b = answerer.actual();

        if a == b {
            return Ok(a);
        }

        if self.rank(a) <= self.rank(b) {
            return Ok(a);
        }

        // The answerer's suite ranks higher. Only ZRTP can be layered on a plain offer,
        // anything else follows the offer.
        if b == MediaEncryption::Zrtp && a == MediaEncryption::None {
            Ok(b)
        } else {
            Ok(a)
        }
    }
}

impl EncryptionNegotiator {
    /// Check the suite the remote side picked when answering our offer.
    pub fn check_answer(
        &self,
        offerer: &EncryptionPolicy,
        answered: MediaEncryption,
    ) -> Result<MediaEncryption, EncryptionError> {
        if offerer.knows(answered) {
            return Ok(answered);
        }

        let plain_offer = !offerer.actual_proto_secure();
        let layered = matches!(answered, MediaEncryption::None | MediaEncryption::Zrtp);

        if !offerer.is_mandatory() && plain_offer && layered {
            return Ok(answered);
        }

        Err(EncryptionError::NoCommonSuite {
            offerer: offerer.actual(),
            answerer: answered,
        })
    }
}

/// Find the crypto line to use for a stream.
///
/// Walks the remote lines in order and takes the first one whose suite the local
/// side also has. When answering the local key is paired with the remote tag,
/// otherwise the remote key is paired with the local tag.
pub fn match_crypto(
    local: &[CryptoAttribute],
    remote: &[CryptoAttribute],
    answering: bool,
) -> Option<CryptoAttribute> {
    for r in remote {
        if matches!(r.suite, SrtpSuite::Unknown(_)) {
            continue;
        }
        let Some(l) = local.iter().find(|l| l.suite == r.suite) else {
            continue;
        };

        let c = if answering {
            CryptoAttribute {
                tag: r.tag,
                suite: r.suite.clone(),
                key: l.key.clone(),
            }
        } else {
            CryptoAttribute {
                tag: l.tag,
                suite: r.suite.clone(),
                key: r.key.clone(),
            }
        };

        return Some(c);
    }

    None
}

#[cfg(test)]
mod test {
    use super::*;
    use MediaEncryption::*;

    fn srtp_ok() -> SrtpMatch {
        SrtpMatch {
            offered: vec![SrtpSuite::AesCm128HmacSha1_80],
            accepted: vec![SrtpSuite::AesCm128HmacSha1_80],
        }
    }

    fn negotiated(default: MediaEncryption, supported: &[MediaEncryption]) -> EncryptionPolicy {
        EncryptionPolicy::Negotiated {
            default,
            supported: supported.to_vec(),
        }
    }

    #[test]
    fn mandatory_overrides_preference() {
        let n = EncryptionNegotiator::default();
        let offerer = negotiated(None, &[Zrtp, Dtls, Srtp]);
        let answerer = EncryptionPolicy::Mandatory(Dtls);
        let r = n.resolve(&offerer, &answerer, &[Zrtp, Dtls, Srtp], &srtp_ok());
        assert_eq!(r, Ok(Dtls));
    }

    #[test]
    fn mandatory_unknown_to_other_side() {
        let n = EncryptionNegotiator::default();
        let offerer = EncryptionPolicy::Legacy(None);
        let answerer = EncryptionPolicy::Mandatory(Srtp);
        let r = n.resolve(&offerer, &answerer, &[], &srtp_ok());
        assert!(matches!(r, Err(EncryptionError::NoCommonSuite { .. })));
    }

    #[test]
    fn mandatory_conflict() {
        let n = EncryptionNegotiator::default();
        let r = n.resolve(
            &EncryptionPolicy::Mandatory(Srtp),
            &EncryptionPolicy::Mandatory(Dtls),
            &[],
            &srtp_ok(),
        );
        assert_eq!(r, Err(EncryptionError::MandatoryConflict(Srtp, Dtls)));
    }

    #[test]
    fn mandatory_srtp_needs_common_crypto() {
        let n = EncryptionNegotiator::default();
        let r = n.resolve(
            &EncryptionPolicy::Mandatory(Srtp),
            &EncryptionPolicy::Mandatory(Srtp),
            &[],
            &SrtpMatch::default(),
        );
        assert!(r.is_err());
    }

    #[test]
    fn capability_order_follows_offerer() {
        let n = EncryptionNegotiator::default();
        let offerer = negotiated(None, &[Zrtp, Dtls, Srtp]);
        let answerer = negotiated(None, &[Srtp, Dtls]);
        let r = n.resolve(&offerer, &answerer, &[Zrtp, Dtls, Srtp], &srtp_ok());
        assert_eq!(r, Ok(Dtls));
    }

    #[test]
    fn capability_srtp_skipped_without_overlap() {
        let n = EncryptionNegotiator::default();
        let offerer = negotiated(None, &[Srtp, None]);
        let answerer = negotiated(None, &[Srtp]);
        let r = n.resolve(&offerer, &answerer, &[Srtp, None], &SrtpMatch::default());
        assert_eq!(r, Ok(None));
    }

    #[test]
    fn capability_no_match() {
        let n = EncryptionNegotiator::default();
        let offerer = negotiated(Zrtp, &[Zrtp]);
        let answerer = negotiated(Dtls, &[Dtls]);
        let r = n.resolve(&offerer, &answerer, &[Zrtp], &srtp_ok());
        assert!(r.is_err());
    }

    #[test]
    fn legacy_same() {
        let n = EncryptionNegotiator::default();
        let p = EncryptionPolicy::Legacy(Srtp);
        assert_eq!(n.resolve(&p, &p, &[], &srtp_ok()), Ok(Srtp));
    }

    #[test]
    fn legacy_higher_wins() {
        let n = EncryptionNegotiator::default();
        let offerer = EncryptionPolicy::Legacy(Dtls);
        let answerer = EncryptionPolicy::Legacy(Srtp);
        assert_eq!(n.resolve(&offerer, &answerer, &[], &srtp_ok()), Ok(Dtls));

        let offerer = EncryptionPolicy::Legacy(None);
        let answerer = EncryptionPolicy::Legacy(Zrtp);
        assert_eq!(n.resolve(&offerer, &answerer, &[], &srtp_ok()), Ok(Zrtp));
    }

    #[test]
    fn legacy_answerer_follows_secure_offer() {
        let n = EncryptionNegotiator::default();
        let offerer = EncryptionPolicy::Legacy(None);
        let answerer = EncryptionPolicy::Legacy(Srtp);
        assert_eq!(n.resolve(&offerer, &answerer, &[], &srtp_ok()), Ok(None));
    }

    #[test]
    fn legacy_custom_order() {
        let n = EncryptionNegotiator::new(vec![Srtp, Dtls, Zrtp, None]);
        let offerer = EncryptionPolicy::Legacy(Srtp);
        let answerer = EncryptionPolicy::Legacy(Dtls);
        assert_eq!(n.resolve(&offerer, &answerer, &[], &srtp_ok()), Ok(Srtp));
    }

    #[test]
    fn legacy_order_only_decides_layering() {
        // Ranking plain RTP first refuses ZRTP on a plain offer.
        let n = EncryptionNegotiator::new(vec![None, Zrtp, Dtls, Srtp]);
        let offerer = EncryptionPolicy::Legacy(None);
        let answerer = EncryptionPolicy::Legacy(Zrtp);
        assert_eq!(n.resolve(&offerer, &answerer, &[], &srtp_ok()), Ok(None));

        // A higher ranked answer suite that can't be layered keeps the offer.
        let n = EncryptionNegotiator::new(vec![Srtp, Dtls, Zrtp, None]);
        let offerer = EncryptionPolicy::Legacy(Dtls);
        let answerer = EncryptionPolicy::Legacy(Srtp);
        assert_eq!(n.resolve(&offerer, &answerer, &[], &srtp_ok()), Ok(Dtls));
    }

    #[test]
    fn answer_check() {
        let n = EncryptionNegotiator::default();
        let offered = negotiated(None, &[Dtls, Srtp]);
        assert_eq!(n.check_answer(&offered, Dtls), Ok(Dtls));
        assert_eq!(n.check_answer(&offered, Zrtp), Ok(Zrtp));
        assert!(n.check_answer(&EncryptionPolicy::Legacy(Srtp), Dtls).is_err());
        assert!(n.check_answer(&EncryptionPolicy::Mandatory(Srtp), None).is_err());
        assert_eq!(n.check_answer(&EncryptionPolicy::Legacy(Zrtp), None), Ok(None));
    }

    #[test]
    fn crypto_matching() {
        let local = vec![
            CryptoAttribute {
                tag: 1,
                suite: SrtpSuite::AesCm128HmacSha1_80,
                key: "inline:local80".into(),
            },
            CryptoAttribute {
                tag: 2,
                suite: SrtpSuite::AesCm128HmacSha1_32,
                key: "inline:local32".into(),
            },
        ];
        let remote = vec![
            CryptoAttribute {
                tag: 5,
                suite: SrtpSuite::Unknown("FOO".into()),
                key: "inline:x".into(),
            },
            CryptoAttribute {
                tag: 7,
                suite: SrtpSuite::AesCm128HmacSha1_32,
                key: "inline:remote32".into(),
            },
        ];

        let a = match_crypto(&local, &remote, true).unwrap();
        assert_eq!(a.tag, 7);
        assert_eq!(a.key, "inline:local32");

        let o = match_crypto(&local, &remote, false).unwrap();
        assert_eq!(o.tag, 2);
        assert_eq!(o.key, "inline:remote32");

        assert!(match_crypto(&local, &remote[..1], true).is_none());
    }

    #[test]
    fn policy_from_stream() {
        use crate::media::{StreamDirection, StreamType};
        let mut s = StreamDescription::new(StreamType::Audio, 7078, StreamDirection::SendRecv, vec![]);
        assert_eq!(EncryptionPolicy::from_stream(&s), EncryptionPolicy::Legacy(None));
        s.capabilities = vec![Dtls, None];
        assert_eq!(EncryptionPolicy::from_stream(&s), negotiated(None, &[Dtls, None]));
    }
}
