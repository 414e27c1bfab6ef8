//! Conversion between the wire lines and the media description model.

use std::collections::HashMap;

use crate::encryption::MediaEncryption;
use crate::id::Pt;
use crate::media::{static_payload, Codec, CryptoAttribute, MediaDescription, MediaProto};
use crate::media::{SrtpSuite, StreamDescription, StreamDirection};

use super::data::*;
use super::SdpError;

impl From<&MediaDescription> for Sdp {
    fn from(md: &MediaDescription) -> Self {
        let mut attrs = vec![];

        if md.ice_lite {
            attrs.push(SessionAttribute::IceLite);
        }
        if let Some(v) = &md.ice_ufrag {
            attrs.push(SessionAttribute::IceUfrag(v.clone()));
        }
        if let Some(v) = &md.ice_pwd {
            attrs.push(SessionAttribute::IcePwd(v.clone()));
        }
        for mids in &md.bundles {
            attrs.push(SessionAttribute::Group {
                typ: "BUNDLE".into(),
                mids: mids.clone(),
            });
        }
        for v in &md.custom_attrs {
            attrs.push(SessionAttribute::Unused(v.clone()));
        }

        Sdp {
            session: Session {
                origin: Origin {
                    username: "-".into(),
                    id: md.session_id,
                    version: md.session_version,
                    addr: md.origin_addr.clone(),
                },
                name: "-".into(),
                conn: md.addr.clone(),
                bw: md.bandwidth.map(Bandwidth::application),
                attrs,
            },
            media_lines: md.streams.iter().map(MediaLine::from).collect(),
        }
    }
}

impl From<&StreamDescription> for MediaLine {
    fn from(s: &StreamDescription) -> Self {
        let mut fmts: Vec<String> = s.codecs.iter().map(|c| c.pt.to_string()).collect();
        if fmts.is_empty() {
            // An m-line needs at least one format, even when disabled.
            fmts.push("0".into());
        }

        let mut attrs = vec![];

        for c in &s.codecs {
            attrs.push(MediaAttribute::RtpMap(RtpMap {
                pt: c.pt,
                mime: c.mime.clone(),
                clock_rate: c.clock_rate,
                channels: c.channels,
            }));
            if let Some(params) = &c.fmtp {
                attrs.push(MediaAttribute::Fmtp {
                    pt: c.pt,
                    params: params.clone(),
                });
            }
        }

        if let Some(v) = s.ptime {
            attrs.push(MediaAttribute::Ptime(v));
        }

        attrs.push(match s.dir {
            StreamDirection::SendRecv => MediaAttribute::SendRecv,
            StreamDirection::SendOnly => MediaAttribute::SendOnly,
            StreamDirection::RecvOnly => MediaAttribute::RecvOnly,
            StreamDirection::Inactive => MediaAttribute::Inactive,
        });

        if let Some(port) = s.rtcp_port {
            attrs.push(MediaAttribute::Rtcp { port, rest: None });
        }
        if s.rtcp_mux {
            attrs.push(MediaAttribute::RtcpMux);
        }
        if let Some(v) = &s.mid {
            attrs.push(MediaAttribute::Mid(v.clone()));
        }
        if let Some(v) = &s.ice_ufrag {
            attrs.push(MediaAttribute::IceUfrag(v.clone()));
        }
        if let Some(v) = &s.ice_pwd {
            attrs.push(MediaAttribute::IcePwd(v.clone()));
        }
        for c in &s.candidates {
            attrs.push(MediaAttribute::Candidate(c.clone()));
        }
        if s.proto.is_secure() {
            for c in &s.crypto {
                attrs.push(MediaAttribute::Crypto(c.clone()));
            }
        }
        if let Some(v) = &s.fingerprint {
            attrs.push(MediaAttribute::Fingerprint(v.clone()));
        }
        if let Some(v) = s.setup {
            attrs.push(MediaAttribute::Setup(v));
        }
        if let Some(v) = &s.zrtp_hash {
            attrs.push(MediaAttribute::ZrtpHash(v.clone()));
        }

        write_capabilities(s, &mut attrs);

        for v in &s.custom_attrs {
            attrs.push(MediaAttribute::Unused(v.clone()));
        }

        MediaLine {
            typ: s.typ.clone(),
            port: s.port,
            proto: s.proto.clone(),
            fmts,
            conn: s.addr.clone(),
            bw: s.bandwidth.map(Bandwidth::application),
            attrs,
        }
    }
}

/// RFC 5939 potential configurations, one per entry in `capabilities`.
///
/// ```text
/// a=tcap:1 RTP/SAVP UDP/TLS/RTP/SAVP RTP/AVP
/// a=acap:1 zrtp-hash:1.10 fe30efd0...
/// a=pcfg:1 t=3 a=1
/// a=pcfg:2 t=1
/// a=pcfg:3 t=2
/// ```
fn write_capabilities(s: &StreamDescription, attrs: &mut Vec<MediaAttribute>) {
    if s.capabilities.is_empty() {
        return;
    }

    let avpf = s.proto.has_avpf();
    let mut protos: Vec<MediaProto> = vec![];
    for enc in &s.capabilities {
        let proto = MediaProto::for_encryption(*enc, avpf);
        if !protos.contains(&proto) {
            protos.push(proto);
        }
    }

    attrs.push(MediaAttribute::Tcap {
        index: 1,
        protos: protos.clone(),
    });

    let mut next_acap = 1;
    let mut crypto_acaps = vec![];
    let mut zrtp_acap = None;

    // Crypto lines are only written as acap when the actual proto can't carry them.
    if s.capabilities.contains(&MediaEncryption::Srtp) && !s.proto.is_secure() {
        for c in &s.crypto {
            attrs.push(MediaAttribute::Acap {
                index: next_acap,
                value: format!("crypto:{}", c),
            });
            crypto_acaps.push(next_acap);
            next_acap += 1;
        }
    }

    if s.capabilities.contains(&MediaEncryption::Zrtp) {
        let value = match &s.zrtp_hash {
            Some(h) => format!("zrtp-hash:{}", h),
            None => "zrtp-hash".to_string(),
        };
        attrs.push(MediaAttribute::Acap {
            index: next_acap,
            value,
        });
        zrtp_acap = Some(next_acap);
    }

    for (i, enc) in s.capabilities.iter().enumerate() {
        let proto = MediaProto::for_encryption(*enc, avpf);
        let tcap = protos.iter().position(|p| *p == proto).map(|p| p as u32 + 1);
        let acaps = match enc {
            MediaEncryption::Srtp => crypto_acaps.clone(),
            MediaEncryption::Zrtp => zrtp_acap.into_iter().collect(),
            _ => vec![],
        };
        attrs.push(MediaAttribute::Pcfg {
            index: i as u32 + 1,
            tcap,
            acaps,
        });
    }
}

impl TryFrom<&Sdp> for MediaDescription {
    type Error = SdpError;

    fn try_from(sdp: &Sdp) -> Result<Self, Self::Error> {
        let session = &sdp.session;

        let mut md = MediaDescription {
            session_id: session.origin.id,
            session_version: session.origin.version,
            origin_addr: session.origin.addr.clone(),
            addr: session.conn.clone(),
            bandwidth: session.bw.as_ref().and_then(|b| b.as_kbps()),
            ice_ufrag: None,
            ice_pwd: None,
            ice_lite: false,
            bundles: vec![],
            custom_attrs: vec![],
            streams: vec![],
        };

        for a in &session.attrs {
            match a {
                SessionAttribute::Group { typ, mids } if typ == "BUNDLE" => {
                    md.bundles.push(mids.clone());
                }
                SessionAttribute::Group { typ, mids } => {
                    md.custom_attrs
                        .push(format!("group:{} {}", typ, mids.join(" ")));
                }
                SessionAttribute::IceLite => md.ice_lite = true,
                SessionAttribute::IceUfrag(v) => md.ice_ufrag = Some(v.clone()),
                SessionAttribute::IcePwd(v) => md.ice_pwd = Some(v.clone()),
                SessionAttribute::Unused(v) => md.custom_attrs.push(v.clone()),
            }
        }

        for m in &sdp.media_lines {
            md.streams.push(StreamDescription::try_from(m)?);
        }

        if let Some(err) = md.check_consistent() {
            return Err(SdpError::Inconsistent(err));
        }

        Ok(md)
    }
}

impl TryFrom<&MediaLine> for StreamDescription {
    type Error = SdpError;

    fn try_from(m: &MediaLine) -> Result<Self, Self::Error> {
        let mut s = StreamDescription::new(m.typ.clone(), m.port, StreamDirection::SendRecv, vec![]);
        s.proto = m.proto.clone();
        s.addr = m.conn.clone();
        s.bandwidth = m.bw.as_ref().and_then(|b| b.as_kbps());

        let mut rtpmaps: HashMap<Pt, &RtpMap> = HashMap::new();
        let mut fmtps: HashMap<Pt, &String> = HashMap::new();
        let mut tcaps: HashMap<u32, MediaProto> = HashMap::new();
        let mut acaps: HashMap<u32, &String> = HashMap::new();
        let mut pcfgs: Vec<(u32, Option<u32>, &Vec<u32>)> = vec![];

        for a in &m.attrs {
            use MediaAttribute::*;
            match a {
                Rtcp { port, .. } => s.rtcp_port = Some(*port),
                RtcpMux => s.rtcp_mux = true,
                IceUfrag(v) => s.ice_ufrag = Some(v.clone()),
                IcePwd(v) => s.ice_pwd = Some(v.clone()),
                Candidate(c) => s.candidates.push(c.clone()),
                Fingerprint(v) => s.fingerprint = Some(v.clone()),
                Setup(v) => s.setup = Some(*v),
                Mid(v) => s.mid = Some(v.clone()),
                SendRecv => s.dir = StreamDirection::SendRecv,
                SendOnly => s.dir = StreamDirection::SendOnly,
                RecvOnly => s.dir = StreamDirection::RecvOnly,
                Inactive => s.dir = StreamDirection::Inactive,
                RtpMap(r) => {
                    rtpmaps.insert(r.pt, r);
                }
                Fmtp { pt, params } => {
                    fmtps.insert(*pt, params);
                }
                Ptime(v) => s.ptime = Some(*v),
                Crypto(c) => s.crypto.push(c.clone()),
                ZrtpHash(v) => s.zrtp_hash = Some(v.clone()),
                Tcap { index, protos } => {
                    for (i, p) in protos.iter().enumerate() {
                        tcaps.insert(index + i as u32, p.clone());
                    }
                }
                Acap { index, value } => {
                    acaps.insert(*index, value);
                }
                Pcfg { index, tcap, acaps } => pcfgs.push((*index, *tcap, acaps)),
                Unused(v) => s.custom_attrs.push(v.clone()),
            }
        }

        if s.is_enabled() {
            for pt in m.pts() {
                let codec = match rtpmaps.get(&pt) {
                    Some(r) => Codec::new(*r.pt, &r.mime, r.clock_rate, r.channels),
                    None => match static_payload(*pt) {
                        Some(c) => c,
                        None => {
                            warn!("No rtpmap for dynamic payload type: {}", pt);
                            continue;
                        }
                    },
                };
                let codec = match fmtps.get(&pt) {
                    Some(params) => codec.with_fmtp(params),
                    None => codec,
                };
                s.codecs.push(codec);
            }
        }

        // Potential configurations, most preferred (lowest index) first.
        pcfgs.sort_by_key(|(index, _, _)| *index);

        for (_, tcap, refs) in pcfgs {
            let proto = tcap
                .and_then(|t| tcaps.get(&t).cloned())
                .unwrap_or_else(|| s.proto.clone());

            let mut zrtp = false;
            for r in refs {
                let Some(value) = acaps.get(r) else {
                    debug!("pcfg refers to missing acap: {}", r);
                    continue;
                };
                if value.starts_with("zrtp-hash") {
                    zrtp = true;
                } else if let Some(c) = parse_crypto_acap(value) {
                    if !s.crypto.contains(&c) {
                        s.crypto.push(c);
                    }
                }
            }

            let enc = if zrtp {
                MediaEncryption::Zrtp
            } else if proto.is_dtls() {
                MediaEncryption::Dtls
            } else if proto.is_secure() {
                MediaEncryption::Srtp
            } else {
                MediaEncryption::None
            };

            if !s.capabilities.contains(&enc) {
                s.capabilities.push(enc);
            }
        }

        Ok(s)
    }
}

/// `crypto:1 AES_CM_128_HMAC_SHA1_80 inline:...`
fn parse_crypto_acap(value: &str) -> Option<CryptoAttribute> {
    let value = value.strip_prefix("crypto:")?;
    let mut parts = value.splitn(3, ' ');
    let tag = parts.next()?.parse().ok()?;
    let suite = SrtpSuite::from(parts.next()?);
    let key = parts.next()?.to_string();
    Some(CryptoAttribute { tag, suite, key })
}
