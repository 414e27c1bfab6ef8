use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::encryption::MediaEncryption;
use crate::id::SessionId;
use crate::sdp::SdpError;

use super::{Codec, StreamDirection};

/// The media description of one side of a session (one SDP).
///
/// Streams are matched between descriptions by their index, which is stable across
/// renegotiations unless a stream is added or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescription {
    /// Session id from the `o=` line.
    pub session_id: SessionId,
    /// Session version from the `o=` line. Bumped for every new local offer.
    pub session_version: u64,
    /// Unicast address of the `o=` line.
    pub origin_addr: String,
    /// Session level connection address (`c=`).
    pub addr: Option<String>,
    /// Session level bandwidth (`b=AS`) in kbit/s.
    pub bandwidth: Option<u32>,
    /// Session level ICE user fragment.
    pub ice_ufrag: Option<String>,
    /// Session level ICE password.
    pub ice_pwd: Option<String>,
    /// Whether the side is an ICE lite implementation.
    pub ice_lite: bool,
    /// `a=group:BUNDLE` groups, by mid.
    pub bundles: Vec<Vec<String>>,
    /// Session attributes we don't interpret, kept as-is (without `a=`).
    pub custom_attrs: Vec<String>,
    /// The streams, in m-line order.
    pub streams: Vec<StreamDescription>,
}

/// One m-line of a [`MediaDescription`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescription {
    /// Audio, video etc.
    pub typ: StreamType,
    /// Transport protocol.
    pub proto: MediaProto,
    /// RTP port. 0 means the stream is disabled.
    pub port: u16,
    /// RTCP port (`a=rtcp`), if not the default one.
    pub rtcp_port: Option<u16>,
    /// Stream level connection address (`c=`).
    pub addr: Option<String>,
    /// `a=rtcp-mux`
    pub rtcp_mux: bool,
    /// Direction of the stream.
    pub dir: StreamDirection,
    /// Codecs in order of preference.
    pub codecs: Vec<Codec>,
    /// `b=AS` in kbit/s.
    pub bandwidth: Option<u32>,
    /// `a=ptime`
    pub ptime: Option<u32>,
    /// `a=mid`
    pub mid: Option<String>,
    /// SDES crypto lines (`a=crypto`).
    pub crypto: Vec<CryptoAttribute>,
    /// DTLS certificate fingerprint.
    pub fingerprint: Option<Fingerprint>,
    /// DTLS setup role.
    pub setup: Option<Setup>,
    /// ZRTP hello hash (`a=zrtp-hash`).
    pub zrtp_hash: Option<String>,
    /// Encryptions this side is willing to use, in order of preference.
    ///
    /// Transported as RFC 5939 potential configurations. Empty when the side
    /// doesn't do capability negotiation.
    pub capabilities: Vec<MediaEncryption>,
    /// Stream level ICE user fragment.
    pub ice_ufrag: Option<String>,
    /// Stream level ICE password.
    pub ice_pwd: Option<String>,
    /// ICE candidates.
    pub candidates: Vec<Candidate>,
    /// Attributes we don't interpret, kept as-is (without `a=`).
    pub custom_attrs: Vec<String>,
}

/// Media type of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    /// Audio stream.
    Audio,
    /// Video stream.
    Video,
    /// Real time text (RFC 4103).
    Text,
    /// Anything else, such as `application`.
    Other(String),
}

/// Transport protocol of an m-line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum MediaProto {
    RtpAvp,
    RtpAvpf,
    RtpSavp,
    RtpSavpf,
    UdpTlsRtpSavp,
    UdpTlsRtpSavpf,
    Other(String),
}

/// DTLS setup attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Setup {
    ActPass,
    Active,
    Passive,
}

/// Certificate fingerprint (`a=fingerprint`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hash function used to produce the `bytes`.
    ///
    /// This is normally `sha-256`.
    pub hash_func: String,
    /// Digest of the certificate by the algorithm in `hash_func`.
    pub bytes: Vec<u8>,
}

/// One SDES crypto line, RFC 4568.
///
/// `a=crypto:1 AES_CM_128_HMAC_SHA1_80 inline:PS1uQCVeeCFCanVmcjkpPywjNWhcYD0mXXtxaVBR`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CryptoAttribute {
    /// Tag identifying this line within the stream.
    pub tag: u32,
    /// Crypto suite.
    pub suite: SrtpSuite,
    /// Key params and any session params, everything after the suite.
    pub key: String,
}

/// SRTP crypto suites usable in `a=crypto` lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum SrtpSuite {
    AesCm128HmacSha1_80,
    AesCm128HmacSha1_32,
    Aes192CmHmacSha1_80,
    Aes256CmHmacSha1_80,
    Aes256CmHmacSha1_32,
    AeadAes128Gcm,
    AeadAes256Gcm,
    Unknown(String),
}

/// ICE candidate kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum CandidateKind {
    Host,
    PeerReflexive,
    ServerReflexive,
    Relayed,
}

/// An ICE candidate as found in `a=candidate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    /// Foundation.
    pub foundation: String,
    /// Component id, 1 for RTP and 2 for RTCP.
    pub component: u16,
    /// Transport, normally `udp`.
    pub transport: String,
    /// Priority.
    pub priority: u32,
    /// Address of the candidate.
    pub addr: SocketAddr,
    /// Kind of candidate.
    pub kind: CandidateKind,
    /// Related address for reflexive and relayed candidates.
    pub raddr: Option<SocketAddr>,
    /// Extension attributes after the mandatory part, kept as-is.
    pub extensions: Option<String>,
}

impl MediaDescription {
    /// Creates an empty description for a new local session.
    pub fn new(origin_addr: &str) -> Self {
        MediaDescription {
            session_id: SessionId::new(),
            session_version: 1,
            origin_addr: origin_addr.to_string(),
            addr: None,
            bandwidth: None,
            ice_ufrag: None,
            ice_pwd: None,
            ice_lite: false,
            bundles: vec![],
            custom_attrs: vec![],
            streams: vec![],
        }
    }

    /// Parse an SDP.
    pub fn parse(input: &str) -> Result<MediaDescription, SdpError> {
        let sdp = crate::sdp::Sdp::parse(input)?;
        MediaDescription::try_from(&sdp)
    }

    /// Serialize to an SDP string.
    pub fn to_sdp_string(&self) -> String {
        crate::sdp::Sdp::from(self).to_string()
    }

    /// Stream at index, if there is one.
    pub fn stream(&self, index: usize) -> Option<&StreamDescription> {
        self.streams.get(index)
    }

    /// Iterator over the enabled streams, with their index.
    pub fn enabled_streams(&self) -> impl Iterator<Item = (usize, &StreamDescription)> {
        self.streams.iter().enumerate().filter(|(_, s)| s.is_enabled())
    }

    /// Number of enabled streams that are not inactive.
    pub fn nb_active_streams(&self) -> usize {
        self.enabled_streams()
            .filter(|(_, s)| s.dir != StreamDirection::Inactive)
            .count()
    }

    /// The encryption in use, from the first enabled stream.
    pub fn encryption(&self) -> MediaEncryption {
        self.enabled_streams()
            .next()
            .map(|(_, s)| s.encryption())
            .unwrap_or(MediaEncryption::None)
    }

    /// Whether any ICE credentials are present, at session or stream level.
    pub fn has_ice(&self) -> bool {
        self.ice_ufrag.is_some() || self.streams.iter().any(|s| s.ice_ufrag.is_some())
    }

    /// Whether every enabled stream is on hold (sendonly or inactive) as seen from the
    /// side that wrote this description.
    pub fn is_on_hold(&self) -> bool {
        let mut enabled = self.enabled_streams().peekable();
        if enabled.peek().is_none() {
            return false;
        }
        enabled.all(|(_, s)| !s.dir.is_receiving())
    }

    /// Check the internal consistency of all streams.
    pub fn check_consistent(&self) -> Option<String> {
        self.streams.iter().find_map(|s| s.check_consistent())
    }
}

impl StreamDescription {
    /// Creates an enabled, unencrypted stream.
    pub fn new(typ: StreamType, port: u16, dir: StreamDirection, codecs: Vec<Codec>) -> Self {
        StreamDescription {
            typ,
            proto: MediaProto::RtpAvp,
            port,
            rtcp_port: None,
            addr: None,
            rtcp_mux: false,
            dir,
            codecs,
            bandwidth: None,
            ptime: None,
            mid: None,
            crypto: vec![],
            fingerprint: None,
            setup: None,
            zrtp_hash: None,
            capabilities: vec![],
            ice_ufrag: None,
            ice_pwd: None,
            candidates: vec![],
            custom_attrs: vec![],
        }
    }

    /// A disabled placeholder keeping the slot of a stream that isn't used.
    pub fn absent(typ: StreamType, proto: MediaProto) -> Self {
        StreamDescription {
            proto,
            ..StreamDescription::new(typ, 0, StreamDirection::Inactive, vec![])
        }
    }

    /// Whether the stream is in use.
    pub fn is_enabled(&self) -> bool {
        self.port != 0
    }

    /// Disable the stream, moving it out of any bundle.
    pub fn disable(&mut self) {
        self.port = 0;
        self.dir = StreamDirection::Inactive;
        self.codecs.clear();
        self.crypto.clear();
        self.mid = None;
    }

    /// Streams that can't be dropped without failing the call.
    pub fn is_mandatory(&self) -> bool {
        self.typ == StreamType::Audio
    }

    /// The first codec that isn't `telephone-event`.
    pub fn selected_codec(&self) -> Option<&Codec> {
        self.codecs.iter().find(|c| !c.is_telephone_event())
    }

    /// Encryption in use for this stream, derived from its attributes.
    pub fn encryption(&self) -> MediaEncryption {
        if self.zrtp_hash.is_some() && !self.proto.is_secure() {
            MediaEncryption::Zrtp
        } else if self.proto.is_dtls() && self.fingerprint.is_some() {
            MediaEncryption::Dtls
        } else if self.proto.is_secure() && !self.proto.is_dtls() && !self.crypto.is_empty() {
            MediaEncryption::Srtp
        } else {
            MediaEncryption::None
        }
    }

    /// Returns a description of what's wrong with the stream, if anything.
    pub fn check_consistent(&self) -> Option<String> {
        let srtp_capable = self.capabilities.contains(&MediaEncryption::Srtp);
        if !self.crypto.is_empty() && !self.proto.is_secure() && !srtp_capable {
            if self.dir == StreamDirection::Inactive {
                return Some(format!(
                    "Crypto attributes on inactive unencrypted {} stream",
                    self.typ
                ));
            }
            return Some(format!(
                "Crypto attributes on {} stream with proto {}",
                self.typ, self.proto
            ));
        }

        for (i, c) in self.crypto.iter().enumerate() {
            if self.crypto[..i].iter().any(|o| o.tag == c.tag) {
                return Some(format!("Duplicate crypto tag: {}", c.tag));
            }
        }

        for (i, c) in self.codecs.iter().enumerate() {
            if self.codecs[..i].iter().any(|o| o.pt == c.pt) {
                return Some(format!("Duplicate payload type: {}", c.pt));
            }
        }

        None
    }
}

impl MediaProto {
    /// Whether the transport is SRTP based.
    pub fn is_secure(&self) -> bool {
        matches!(
            self,
            MediaProto::RtpSavp
                | MediaProto::RtpSavpf
                | MediaProto::UdpTlsRtpSavp
                | MediaProto::UdpTlsRtpSavpf
        )
    }

    /// Whether the transport is DTLS-SRTP.
    pub fn is_dtls(&self) -> bool {
        matches!(self, MediaProto::UdpTlsRtpSavp | MediaProto::UdpTlsRtpSavpf)
    }

    /// Whether the profile is the AVPF feedback profile.
    pub fn has_avpf(&self) -> bool {
        matches!(
            self,
            MediaProto::RtpAvpf | MediaProto::RtpSavpf | MediaProto::UdpTlsRtpSavpf
        )
    }

    /// Whether the proto is one of the RTP profiles.
    pub fn is_rtp(&self) -> bool {
        !matches!(self, MediaProto::Other(_))
    }

    /// The RTP profile to use for an encryption, keeping the feedback flavor.
    pub fn for_encryption(enc: MediaEncryption, avpf: bool) -> MediaProto {
        match (enc, avpf) {
            (MediaEncryption::Srtp, false) => MediaProto::RtpSavp,
            (MediaEncryption::Srtp, true) => MediaProto::RtpSavpf,
            (MediaEncryption::Dtls, false) => MediaProto::UdpTlsRtpSavp,
            (MediaEncryption::Dtls, true) => MediaProto::UdpTlsRtpSavpf,
            (_, false) => MediaProto::RtpAvp,
            (_, true) => MediaProto::RtpAvpf,
        }
    }
}

impl SrtpSuite {
    /// All the suites we know, strongest first.
    pub fn all() -> Vec<SrtpSuite> {
        vec![
            SrtpSuite::AeadAes256Gcm,
            SrtpSuite::AeadAes128Gcm,
            SrtpSuite::Aes256CmHmacSha1_80,
            SrtpSuite::Aes256CmHmacSha1_32,
            SrtpSuite::Aes192CmHmacSha1_80,
            SrtpSuite::AesCm128HmacSha1_80,
            SrtpSuite::AesCm128HmacSha1_32,
        ]
    }

    /// Length of master key plus master salt, in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            SrtpSuite::AesCm128HmacSha1_80 | SrtpSuite::AesCm128HmacSha1_32 => 30,
            SrtpSuite::Aes192CmHmacSha1_80 => 38,
            SrtpSuite::Aes256CmHmacSha1_80 | SrtpSuite::Aes256CmHmacSha1_32 => 46,
            SrtpSuite::AeadAes128Gcm => 28,
            SrtpSuite::AeadAes256Gcm => 44,
            SrtpSuite::Unknown(_) => 0,
        }
    }

    /// Name as found in SDP.
    pub fn as_str(&self) -> &str {
        match self {
            SrtpSuite::AesCm128HmacSha1_80 => "AES_CM_128_HMAC_SHA1_80",
            SrtpSuite::AesCm128HmacSha1_32 => "AES_CM_128_HMAC_SHA1_32",
            SrtpSuite::Aes192CmHmacSha1_80 => "AES_192_CM_HMAC_SHA1_80",
            SrtpSuite::Aes256CmHmacSha1_80 => "AES_256_CM_HMAC_SHA1_80",
            SrtpSuite::Aes256CmHmacSha1_32 => "AES_256_CM_HMAC_SHA1_32",
            SrtpSuite::AeadAes128Gcm => "AEAD_AES_128_GCM",
            SrtpSuite::AeadAes256Gcm => "AEAD_AES_256_GCM",
            SrtpSuite::Unknown(v) => v,
        }
    }
}

impl From<&str> for SrtpSuite {
    fn from(v: &str) -> Self {
        match v {
            "AES_CM_128_HMAC_SHA1_80" => SrtpSuite::AesCm128HmacSha1_80,
            "AES_CM_128_HMAC_SHA1_32" => SrtpSuite::AesCm128HmacSha1_32,
            "AES_192_CM_HMAC_SHA1_80" => SrtpSuite::Aes192CmHmacSha1_80,
            "AES_256_CM_HMAC_SHA1_80" => SrtpSuite::Aes256CmHmacSha1_80,
            "AES_256_CM_HMAC_SHA1_32" => SrtpSuite::Aes256CmHmacSha1_32,
            "AEAD_AES_128_GCM" => SrtpSuite::AeadAes128Gcm,
            "AEAD_AES_256_GCM" => SrtpSuite::AeadAes256Gcm,
            _ => SrtpSuite::Unknown(v.to_string()),
        }
    }
}

impl Candidate {
    /// Creates a host candidate.
    pub fn host(addr: SocketAddr, component: u16) -> Self {
        Candidate {
            foundation: "1".into(),
            component,
            transport: "udp".into(),
            priority: host_priority(component),
            addr,
            kind: CandidateKind::Host,
            raddr: None,
            extensions: None,
        }
    }

    /// The IP address of the candidate.
    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }
}

// RFC 8445 5.1.2.1 with local preference 65535.
fn host_priority(component: u16) -> u32 {
    (126 << 24) | (65535 << 8) | (256 - component.min(256) as u32)
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamType::Audio => "audio",
            StreamType::Video => "video",
            StreamType::Text => "text",
            StreamType::Other(v) => v,
        };
        write!(f, "{}", s)
    }
}

impl From<&str> for StreamType {
    fn from(v: &str) -> Self {
        match v {
            "audio" => StreamType::Audio,
            "video" => StreamType::Video,
            "text" => StreamType::Text,
            _ => StreamType::Other(v.to_string()),
        }
    }
}

impl fmt::Display for MediaProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaProto::RtpAvp => "RTP/AVP",
            MediaProto::RtpAvpf => "RTP/AVPF",
            MediaProto::RtpSavp => "RTP/SAVP",
            MediaProto::RtpSavpf => "RTP/SAVPF",
            MediaProto::UdpTlsRtpSavp => "UDP/TLS/RTP/SAVP",
            MediaProto::UdpTlsRtpSavpf => "UDP/TLS/RTP/SAVPF",
            MediaProto::Other(v) => v,
        };
        write!(f, "{}", s)
    }
}

impl From<&str> for MediaProto {
    fn from(v: &str) -> Self {
        match v {
            "RTP/AVP" => MediaProto::RtpAvp,
            "RTP/AVPF" => MediaProto::RtpAvpf,
            "RTP/SAVP" => MediaProto::RtpSavp,
            "RTP/SAVPF" => MediaProto::RtpSavpf,
            "UDP/TLS/RTP/SAVP" => MediaProto::UdpTlsRtpSavp,
            "UDP/TLS/RTP/SAVPF" => MediaProto::UdpTlsRtpSavpf,
            _ => MediaProto::Other(v.to_string()),
        }
    }
}

impl fmt::Display for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Setup::ActPass => "actpass",
            Setup::Active => "active",
            Setup::Passive => "passive",
        };
        write!(f, "{}", s)
    }
}

impl Setup {
    /// The role to answer with, given the offered role.
    pub fn answer_to(offered: Setup) -> Setup {
        match offered {
            Setup::ActPass | Setup::Passive => Setup::Active,
            Setup::Active => Setup::Passive,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.hash_func)?;
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for CryptoAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.tag, self.suite.as_str(), self.key)
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidateKind::Host => "host",
            CandidateKind::PeerReflexive => "prflx",
            CandidateKind::ServerReflexive => "srflx",
            CandidateKind::Relayed => "relay",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.transport,
            self.priority,
            self.addr.ip(),
            self.addr.port(),
            self.kind
        )?;
        if let Some(raddr) = self.raddr {
            write!(f, " raddr {} rport {}", raddr.ip(), raddr.port())?;
        }
        if let Some(ext) = &self.extensions {
            write!(f, " {}", ext)?;
        }
        Ok(())
    }
}
