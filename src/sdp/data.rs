use combine::EasyParser;
use std::fmt;

use crate::id::{Pt, SessionId};
use crate::media::{Candidate, CryptoAttribute, Fingerprint, MediaProto, Setup, StreamType};

use super::parser::sdp_parser;
use super::SdpError;

/// SDP as found on the wire, one value per line.
///
/// This is a thin layer over the text. Interpretation happens when converting
/// to and from [`MediaDescription`][crate::media::MediaDescription].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdp {
    pub session: Session,
    pub media_lines: Vec<MediaLine>,
}

impl Sdp {
    pub fn parse(input: &str) -> Result<Sdp, SdpError> {
        sdp_parser()
            .easy_parse(input)
            .map(|(sdp, _)| sdp)
            .map_err(|e| SdpError::ParseError(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub origin: Origin,
    pub name: String,
    pub conn: Option<String>,
    pub bw: Option<Bandwidth>,
    pub attrs: Vec<SessionAttribute>,
}

/// `o=<username> <sess-id> <sess-version> IN <addrtype> <unicast-address>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub id: SessionId,
    pub version: u64,
    pub addr: String,
}

/// `b=<bwtype>:<bandwidth>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bandwidth {
    pub typ: String,
    pub val: String,
}

impl Bandwidth {
    pub fn application(kbps: u32) -> Self {
        Bandwidth {
            typ: "AS".into(),
            val: kbps.to_string(),
        }
    }

    /// The kbit/s value if this is `b=AS`.
    pub fn as_kbps(&self) -> Option<u32> {
        if self.typ == "AS" {
            self.val.parse().ok()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAttribute {
    Group { typ: String, mids: Vec<String> },
    IceLite,
    IceUfrag(String),
    IcePwd(String),
    Unused(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLine {
    pub typ: StreamType,
    pub port: u16,
    pub proto: MediaProto,
    /// The `<fmt>` list. Payload types for RTP, anything for other protos.
    pub fmts: Vec<String>,
    pub conn: Option<String>,
    pub bw: Option<Bandwidth>,
    pub attrs: Vec<MediaAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaAttribute {
    // a=rtcp:9 IN IP4 0.0.0.0
    Rtcp { port: u16, rest: Option<String> },
    RtcpMux,
    IceUfrag(String),
    IcePwd(String),
    Candidate(Candidate),
    Fingerprint(Fingerprint),
    Setup(Setup),
    Mid(String),
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
    RtpMap(RtpMap),
    // a=fmtp:111 minptime=10;useinbandfec=1
    Fmtp { pt: Pt, params: String },
    Ptime(u32),
    Crypto(CryptoAttribute),
    ZrtpHash(String),
    // a=tcap:1 RTP/SAVP UDP/TLS/RTP/SAVP
    Tcap { index: u32, protos: Vec<MediaProto> },
    // a=acap:1 crypto:1 AES_CM_128_HMAC_SHA1_80 inline:...
    Acap { index: u32, value: String },
    // a=pcfg:1 t=1 a=1
    Pcfg { index: u32, tcap: Option<u32>, acaps: Vec<u32> },
    Unused(String),
}

/// `a=rtpmap:<pt> <encoding name>/<clock rate>[/<encoding parameters>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub pt: Pt,
    pub mime: String,
    pub clock_rate: u32,
    pub channels: Option<u8>,
}

impl MediaLine {
    /// Payload types of the `<fmt>` list, for RTP protos.
    pub fn pts(&self) -> Vec<Pt> {
        if !self.proto.is_rtp() {
            return vec![];
        }
        self.fmts
            .iter()
            .filter_map(|f| f.parse::<u8>().ok())
            .map(Pt::from)
            .collect()
    }

    pub fn check_consistent(&self) -> Option<String> {
        let pts = self.pts();

        for a in &self.attrs {
            let pt = match a {
                MediaAttribute::RtpMap(r) => r.pt,
                MediaAttribute::Fmtp { pt, .. } => *pt,
                _ => continue,
            };
            if !pts.contains(&pt) {
                return Some(format!(
                    "{} attribute for pt {} not in m-line",
                    self.typ, pt
                ));
            }
        }

        let dirs = self
            .attrs
            .iter()
            .filter(|a| {
                matches!(
                    a,
                    MediaAttribute::SendRecv
                        | MediaAttribute::SendOnly
                        | MediaAttribute::RecvOnly
                        | MediaAttribute::Inactive
                )
            })
            .count();

        if dirs > 1 {
            return Some(format!("Multiple direction attributes in {} m-line", self.typ));
        }

        None
    }
}

impl fmt::Display for Sdp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.session)?;
        for m in &self.media_lines {
            write!(f, "{m}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v=0\r\n")?;
        write!(f, "{}", self.origin)?;
        write!(f, "s={}\r\n", self.name)?;
        if let Some(c) = &self.conn {
            write!(f, "c={}\r\n", ConnFmt(c))?;
        }
        if let Some(bw) = &self.bw {
            write!(f, "b={}:{}\r\n", bw.typ, bw.val)?;
        }
        write!(f, "t=0 0\r\n")?;
        for a in &self.attrs {
            write!(f, "{a}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "o={} {} {} {}\r\n",
            self.username,
            self.id,
            self.version,
            ConnFmt(&self.addr)
        )
    }
}

/// `IN IP4 <addr>` or `IN IP6 <addr>`.
struct ConnFmt<'a>(&'a str);

impl fmt::Display for ConnFmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let typ = if self.0.contains(':') { "IP6" } else { "IP4" };
        write!(f, "IN {} {}", typ, self.0)
    }
}

impl fmt::Display for SessionAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SessionAttribute::*;
        match self {
            Group { typ, mids } => write!(f, "a=group:{} {}\r\n", typ, mids.join(" "))?,
            IceLite => write!(f, "a=ice-lite\r\n")?,
            IceUfrag(v) => write!(f, "a=ice-ufrag:{v}\r\n")?,
            IcePwd(v) => write!(f, "a=ice-pwd:{v}\r\n")?,
            Unused(v) => write!(f, "a={v}\r\n")?,
        }
        Ok(())
    }
}

impl fmt::Display for MediaLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m={} {} {}", self.typ, self.port, self.proto)?;
        for fmt in &self.fmts {
            write!(f, " {fmt}")?;
        }
        write!(f, "\r\n")?;
        if let Some(c) = &self.conn {
            write!(f, "c={}\r\n", ConnFmt(c))?;
        }
        if let Some(bw) = &self.bw {
            write!(f, "b={}:{}\r\n", bw.typ, bw.val)?;
        }
        for a in &self.attrs {
            write!(f, "{a}")?;
        }
        Ok(())
    }
}

impl fmt::Display for MediaAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use MediaAttribute::*;
        match self {
            Rtcp { port, rest } => match rest {
                Some(rest) => write!(f, "a=rtcp:{port} {rest}\r\n")?,
                None => write!(f, "a=rtcp:{port}\r\n")?,
            },
            RtcpMux => write!(f, "a=rtcp-mux\r\n")?,
            IceUfrag(v) => write!(f, "a=ice-ufrag:{v}\r\n")?,
            IcePwd(v) => write!(f, "a=ice-pwd:{v}\r\n")?,
            Candidate(c) => write!(f, "a=candidate:{c}\r\n")?,
            Fingerprint(v) => write!(f, "a=fingerprint:{v}\r\n")?,
            Setup(v) => write!(f, "a=setup:{v}\r\n")?,
            Mid(v) => write!(f, "a=mid:{v}\r\n")?,
            SendRecv => write!(f, "a=sendrecv\r\n")?,
            SendOnly => write!(f, "a=sendonly\r\n")?,
            RecvOnly => write!(f, "a=recvonly\r\n")?,
            Inactive => write!(f, "a=inactive\r\n")?,
            RtpMap(r) => {
                write!(f, "a=rtpmap:{} {}/{}", r.pt, r.mime, r.clock_rate)?;
                if let Some(ch) = r.channels {
                    write!(f, "/{ch}")?;
                }
                write!(f, "\r\n")?;
            }
            Fmtp { pt, params } => write!(f, "a=fmtp:{pt} {params}\r\n")?,
            Ptime(v) => write!(f, "a=ptime:{v}\r\n")?,
            Crypto(c) => write!(f, "a=crypto:{c}\r\n")?,
            ZrtpHash(v) => write!(f, "a=zrtp-hash:{v}\r\n")?,
            Tcap { index, protos } => {
                let protos: Vec<_> = protos.iter().map(|p| p.to_string()).collect();
                write!(f, "a=tcap:{} {}\r\n", index, protos.join(" "))?;
            }
            Acap { index, value } => write!(f, "a=acap:{index} {value}\r\n")?,
            Pcfg { index, tcap, acaps } => {
                write!(f, "a=pcfg:{index}")?;
                if let Some(t) = tcap {
                    write!(f, " t={t}")?;
                }
                if !acaps.is_empty() {
                    let acaps: Vec<_> = acaps.iter().map(|a| a.to_string()).collect();
                    write!(f, " a={}", acaps.join(","))?;
                }
                write!(f, "\r\n")?;
            }
            Unused(v) => write!(f, "a={v}\r\n")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn origin() -> Origin {
        Origin {
            username: "-".into(),
            id: SessionId::from(1234),
            version: 2,
            addr: "192.168.1.2".into(),
        }
    }

    #[test]
    fn write_session() {
        let s = Session {
            origin: origin(),
            name: "Talk".into(),
            conn: Some("192.168.1.2".into()),
            bw: None,
            attrs: vec![SessionAttribute::Group {
                typ: "BUNDLE".into(),
                mids: vec!["as".into(), "vs".into()],
            }],
        };
        assert_eq!(
            s.to_string(),
            "v=0\r\n\
            o=- 1234 2 IN IP4 192.168.1.2\r\n\
            s=Talk\r\n\
            c=IN IP4 192.168.1.2\r\n\
            t=0 0\r\n\
            a=group:BUNDLE as vs\r\n"
        );
    }

    #[test]
    fn write_ipv6_conn() {
        let mut o = origin();
        o.addr = "2001:db8::1".into();
        assert_eq!(o.to_string(), "o=- 1234 2 IN IP6 2001:db8::1\r\n");
    }

    #[test]
    fn write_pcfg() {
        let a = MediaAttribute::Pcfg {
            index: 2,
            tcap: Some(1),
            acaps: vec![1, 3],
        };
        assert_eq!(a.to_string(), "a=pcfg:2 t=1 a=1,3\r\n");
    }

    #[test]
    fn rtpmap_outside_mline_is_inconsistent() {
        let m = MediaLine {
            typ: StreamType::Audio,
            port: 7078,
            proto: MediaProto::RtpAvp,
            fmts: vec!["0".into()],
            conn: None,
            bw: None,
            attrs: vec![MediaAttribute::RtpMap(RtpMap {
                pt: 8.into(),
                mime: "PCMA".into(),
                clock_rate: 8000,
                channels: None,
            })],
        };
        assert!(m.check_consistent().is_some());
    }
}
