use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::encryption::{EncryptionPolicy, MediaEncryption};
use crate::media::{Candidate, Codec, Fingerprint, SrtpSuite, StreamDirection, StreamType};

/// Customized config for creating a [`CallSession`][crate::CallSession].
///
/// ```
/// use callsess::{EncryptionPolicy, MediaEncryption, SessionConfig};
///
/// let config = SessionConfig::new()
///     .set_encryption_policy(EncryptionPolicy::Mandatory(MediaEncryption::Srtp))
///     .set_update_call_when_ice_completed(false);
///
/// assert!(!config.update_call_when_ice_completed());
/// ```
///
/// Configs implement [`Clone`] to help create multiple sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    policy: EncryptionPolicy,
    legacy_order: Vec<MediaEncryption>,
    srtp_suites: Vec<SrtpSuite>,
    dtls_fingerprint: Option<Fingerprint>,
    update_call_when_ice_completed: bool,
    update_call_when_ice_completed_with_dtls: bool,
    stats_interval: Duration,
    stats_smoothing: f64,
    low_bandwidth: bool,
}

/// Per-account overrides of a [`SessionConfig`].
///
/// Anything left as `None` keeps the session default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountParams {
    /// Encryption policy for calls of this account.
    pub policy: Option<EncryptionPolicy>,
    /// See [`SessionConfig::set_update_call_when_ice_completed`].
    pub update_call_when_ice_completed: Option<bool>,
    /// See [`SessionConfig::set_update_call_when_ice_completed_with_dtls`].
    pub update_call_when_ice_completed_with_dtls: Option<bool>,
}

impl SessionConfig {
    /// Creates a new default config.
    pub fn new() -> Self {
        SessionConfig::default()
    }

    /// Apply the overrides of an account.
    pub fn with_account(mut self, account: &AccountParams) -> Self {
        if let Some(p) = &account.policy {
            self.policy = p.clone();
        }
        if let Some(v) = account.update_call_when_ice_completed {
            self.update_call_when_ice_completed = v;
        }
        if let Some(v) = account.update_call_when_ice_completed_with_dtls {
            self.update_call_when_ice_completed_with_dtls = v;
        }
        self
    }

    /// The local encryption policy.
    pub fn encryption_policy(&self) -> &EncryptionPolicy {
        &self.policy
    }

    /// Set the local encryption policy.
    ///
    /// Defaults to `EncryptionPolicy::Legacy(MediaEncryption::None)`.
    pub fn set_encryption_policy(mut self, policy: EncryptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Preference order used when two legacy sides disagree, highest first.
    pub fn legacy_order(&self) -> &[MediaEncryption] {
        &self.legacy_order
    }

    /// Set the legacy preference order.
    ///
    /// Defaults to ZRTP, DTLS, SRTP, none.
    ///
    /// The order can't make an answer switch to another transport profile. When the
    /// answerer's suite ranks higher than the offer's, it is only used if it can be
    /// layered on the offer, which is ZRTP over plain RTP. Otherwise the offer's suite
    /// is kept. In practice the order decides whether a legacy answerer adds ZRTP to a
    /// plain offer.
    pub fn set_legacy_order(mut self, order: Vec<MediaEncryption>) -> Self {
        self.legacy_order = order;
        self
    }

    /// SRTP suites offered in `a=crypto` lines, in preference order.
    pub fn srtp_suites(&self) -> &[SrtpSuite] {
        &self.srtp_suites
    }

    /// Set the SRTP suites to offer.
    ///
    /// Defaults to `AES_CM_128_HMAC_SHA1_80` and `AES_CM_128_HMAC_SHA1_32`.
    pub fn set_srtp_suites(mut self, suites: Vec<SrtpSuite>) -> Self {
        self.srtp_suites = suites;
        self
    }

    /// The DTLS certificate fingerprint, if set.
    pub fn dtls_fingerprint(&self) -> Option<&Fingerprint> {
        self.dtls_fingerprint.as_ref()
    }

    /// Set the fingerprint of the DTLS certificate used by the media engine.
    ///
    /// DTLS is unusable without it.
    pub fn set_dtls_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.dtls_fingerprint = Some(fingerprint);
        self
    }

    /// Set the DTLS fingerprint from a DER encoded certificate, hashed with sha-1.
    pub fn set_dtls_certificate(self, der: &[u8]) -> Self {
        let bytes = Sha1::digest(der).to_vec();
        self.set_dtls_fingerprint(Fingerprint {
            hash_func: "sha-1".into(),
            bytes,
        })
    }

    /// Whether to send a new offer with the selected addresses when ICE completes.
    pub fn update_call_when_ice_completed(&self) -> bool {
        self.update_call_when_ice_completed
    }

    /// Toggle the offer after ICE completion. Defaults to `true`.
    pub fn set_update_call_when_ice_completed(mut self, enabled: bool) -> Self {
        self.update_call_when_ice_completed = enabled;
        self
    }

    /// Whether the offer after ICE completion is also sent when using DTLS.
    pub fn update_call_when_ice_completed_with_dtls(&self) -> bool {
        self.update_call_when_ice_completed_with_dtls
    }

    /// Toggle the offer after ICE completion for DTLS calls. Defaults to `false`.
    pub fn set_update_call_when_ice_completed_with_dtls(mut self, enabled: bool) -> Self {
        self.update_call_when_ice_completed_with_dtls = enabled;
        self
    }

    /// How often stats are sampled.
    pub fn stats_interval(&self) -> Duration {
        self.stats_interval
    }

    /// Set how often stats are sampled. Defaults to 1 second.
    pub fn set_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Weight of a new sample in the running averages of stats.
    pub fn stats_smoothing(&self) -> f64 {
        self.stats_smoothing
    }

    /// Set the running average weight, between 0 and 1. Defaults to 0.1.
    pub fn set_stats_smoothing(mut self, smoothing: f64) -> Self {
        self.stats_smoothing = smoothing;
        self
    }

    /// Whether codecs that don't fit the measured bandwidth are left out of new offers.
    pub fn low_bandwidth(&self) -> bool {
        self.low_bandwidth
    }

    /// Toggle low bandwidth mode. Defaults to `false`.
    pub fn set_low_bandwidth(mut self, enabled: bool) -> Self {
        self.low_bandwidth = enabled;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: EncryptionPolicy::default(),
            legacy_order: MediaEncryption::default_legacy_order(),
            srtp_suites: vec![
                SrtpSuite::AesCm128HmacSha1_80,
                SrtpSuite::AesCm128HmacSha1_32,
            ],
            dtls_fingerprint: None,
            update_call_when_ice_completed: true,
            update_call_when_ice_completed_with_dtls: false,
            stats_interval: Duration::from_secs(1),
            stats_smoothing: 0.1,
            low_bandwidth: false,
        }
    }
}

/// What the local side can send and receive.
///
/// ```
/// use callsess::{Codec, LocalCapabilities, LocalStream};
///
/// let caps = LocalCapabilities::new("192.168.1.10")
///     .add_stream(LocalStream::audio(7078, vec![Codec::new(0, "PCMU", 8000, None)]));
///
/// assert_eq!(caps.streams.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCapabilities {
    /// Address in the `o=` line.
    pub origin_addr: String,
    /// Session connection address. Defaults to the origin address.
    pub addr: Option<String>,
    /// Session bandwidth in kbit/s.
    pub bandwidth: Option<u32>,
    /// Session level ICE credentials.
    pub ice_ufrag: Option<String>,
    /// Session level ICE password.
    pub ice_pwd: Option<String>,
    /// ZRTP hash of the media engine, `<version> <hex>`. Generated if not set.
    pub zrtp_hash: Option<String>,
    /// Bundle all streams that have a mid.
    pub bundle: bool,
    /// Streams in order.
    pub streams: Vec<LocalStream>,
}

/// One local stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStream {
    /// Kind of media.
    pub typ: StreamType,
    /// RTP port.
    pub port: u16,
    /// RTCP port, when not the next port.
    pub rtcp_port: Option<u16>,
    /// Whether RTCP is multiplexed on the RTP port.
    pub rtcp_mux: bool,
    /// Stream connection address, if different from the session one.
    pub addr: Option<String>,
    /// Wanted direction.
    pub dir: StreamDirection,
    /// Codecs in preference order.
    pub codecs: Vec<Codec>,
    /// Use the feedback profile (AVPF).
    pub avpf: bool,
    /// Stream bandwidth in kbit/s.
    pub bandwidth: Option<u32>,
    /// Packetization time in milliseconds.
    pub ptime: Option<u32>,
    /// Media id.
    pub mid: Option<String>,
    /// ICE candidates.
    pub candidates: Vec<Candidate>,
    /// Extra attributes, written as is.
    pub custom_attrs: Vec<String>,
}

impl LocalCapabilities {
    /// Creates capabilities without streams.
    pub fn new(origin_addr: &str) -> Self {
        LocalCapabilities {
            origin_addr: origin_addr.to_string(),
            addr: None,
            bandwidth: None,
            ice_ufrag: None,
            ice_pwd: None,
            zrtp_hash: None,
            bundle: false,
            streams: vec![],
        }
    }

    /// Add a stream.
    pub fn add_stream(mut self, stream: LocalStream) -> Self {
        self.streams.push(stream);
        self
    }

    /// Set session level ICE credentials.
    pub fn set_ice_credentials(mut self, ufrag: &str, pwd: &str) -> Self {
        self.ice_ufrag = Some(ufrag.to_string());
        self.ice_pwd = Some(pwd.to_string());
        self
    }

    /// Record the address selected by ICE for a stream.
    pub(crate) fn set_selected(&mut self, index: usize, addr: SocketAddr) {
        if let Some(s) = self.streams.get_mut(index) {
            s.addr = Some(addr.ip().to_string());
            s.port = addr.port();
        }
    }
}

impl LocalStream {
    /// Creates a stream of the type.
    pub fn new(typ: StreamType, port: u16, codecs: Vec<Codec>) -> Self {
        LocalStream {
            typ,
            port,
            rtcp_port: None,
            rtcp_mux: false,
            addr: None,
            dir: StreamDirection::SendRecv,
            codecs,
            avpf: false,
            bandwidth: None,
            ptime: None,
            mid: None,
            candidates: vec![],
            custom_attrs: vec![],
        }
    }

    /// An audio stream.
    pub fn audio(port: u16, codecs: Vec<Codec>) -> Self {
        LocalStream::new(StreamType::Audio, port, codecs)
    }

    /// A video stream.
    pub fn video(port: u16, codecs: Vec<Codec>) -> Self {
        LocalStream::new(StreamType::Video, port, codecs)
    }

    /// Set the direction.
    pub fn with_dir(mut self, dir: StreamDirection) -> Self {
        self.dir = dir;
        self
    }

    /// Set the media id.
    pub fn with_mid(mut self, mid: &str) -> Self {
        self.mid = Some(mid.to_string());
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let c = SessionConfig::new();
        assert_eq!(c.encryption_policy(), &EncryptionPolicy::Legacy(MediaEncryption::None));
        assert!(c.update_call_when_ice_completed());
        assert!(!c.update_call_when_ice_completed_with_dtls());
        assert_eq!(c.stats_interval(), Duration::from_secs(1));
        assert_eq!(c.legacy_order()[0], MediaEncryption::Zrtp);
    }

    #[test]
    fn account_overrides() {
        let account = AccountParams {
            policy: Some(EncryptionPolicy::Mandatory(MediaEncryption::Dtls)),
            update_call_when_ice_completed: Some(false),
            update_call_when_ice_completed_with_dtls: None,
        };
        let c = SessionConfig::new().with_account(&account);
        assert_eq!(c.encryption_policy(), &EncryptionPolicy::Mandatory(MediaEncryption::Dtls));
        assert!(!c.update_call_when_ice_completed());
        assert!(!c.update_call_when_ice_completed_with_dtls());
    }

    #[test]
    fn certificate_fingerprint() {
        let c = SessionConfig::new().set_dtls_certificate(b"not really a certificate");
        let fp = c.dtls_fingerprint().unwrap();
        assert_eq!(fp.hash_func, "sha-1");
        assert_eq!(fp.bytes.len(), 20);
    }

    #[test]
    fn serde_roundtrip() {
        let c = SessionConfig::new().set_low_bandwidth(true);
        let json = serde_json::to_string(&c).unwrap();
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }
}
