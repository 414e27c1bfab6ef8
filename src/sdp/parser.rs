use combine::error::*;
use combine::parser::char::*;
use combine::parser::combinator::*;
use combine::stream::StreamErrorFor;
use combine::*;
use combine::{ParseError, Parser, Stream};
use std::net::{IpAddr, SocketAddr};

use crate::id::{Pt, SessionId};
use crate::media::{Candidate, CandidateKind, CryptoAttribute, Fingerprint};
use crate::media::{MediaProto, Setup, SrtpSuite, StreamType};

use super::data::*;

/// Creates a parser of SDP
pub fn sdp_parser<Input>() -> impl Parser<Input, Output = Sdp>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (session_parser(), many::<Vec<_>, _, _>(media_parser())).map(|(session, media)| Sdp {
        session,
        media_lines: media,
    })
}

// /////////////////////////////////////////////////// Session description

/// Everything before the first m= line.
///
/// `v=0` first, then `o=`, then `s=`. The session is over when we find the
/// attribute lines after `t=`.
pub fn session_parser<Input>() -> impl Parser<Input, Output = Session>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        typed_line('v', token('0')), // v=0
        originator_line(),           // o=- 6564425948916445306 2 IN IP4 127.0.0.1
        typed_line('s', optional(any_value())), // s=Talk
        many::<Vec<_>, _, _>(ignored_line()),
        optional(typed_line('c', connection())), // c=IN IP4 192.168.0.2
        many::<Vec<_>, _, _>(bandwidth_line()),  // b=AS:380
        many1::<Vec<_>, _, _>(typed_line('t', any_value())), // t=0 0
        many::<Vec<_>, _, _>(typed_line('r', any_value())),
        many::<Vec<_>, _, _>(ignored_line()),
        many::<Vec<_>, _, _>(session_attribute_line()),
    )
        .map(|(_, origin, name, _, conn, bws, _, _, _, attrs)| Session {
            origin,
            name: name.unwrap_or_default(),
            conn,
            bw: pick_bandwidth(bws),
            attrs,
        })
}

fn pick_bandwidth(bws: Vec<Bandwidth>) -> Option<Bandwidth> {
    let as_index = bws.iter().position(|b| b.typ == "AS").unwrap_or(0);
    bws.into_iter().nth(as_index)
}

/// `o=<username> <sess-id> <sess-version> <nettype> <addrtype> <unicast-address>`
fn originator_line<Input>() -> impl Parser<Input, Output = Origin>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    typed_line(
        'o',
        (
            not_sp(),
            token(' '),
            number::<Input, u64>(),
            token(' '),
            number::<Input, u64>(),
            token(' '),
            connection(),
        ),
    )
    .map(|(username, _, id, _, version, _, addr)| Origin {
        username,
        id: SessionId::from(id),
        version,
        addr,
    })
}

/// `IN IP4 <addr>`, returning the addr.
fn connection<Input>() -> impl Parser<Input, Output = String>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        string("IN "),
        choice((attempt(string("IP4")), string("IP6"))),
        token(' '),
        not_sp(),
    )
        .map(|(_, _, _, addr)| addr)
}

/// `b=<bwtype>:<bandwidth>`
fn bandwidth_line<Input>() -> impl Parser<Input, Output = Bandwidth>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    typed_line('b', (many1(satisfy(|c| c != ':')), token(':'), any_value()))
        .map(|(typ, _, val)| Bandwidth { typ, val })
}

/// An a= line that with value like: `a=<attribute>:<value>`.
fn attribute_line<Input, Pval, Out>(
    attribute: &'static str,
    val: Pval,
) -> impl Parser<Input, Output = Out>
where
    Input: Stream<Token = char>,
    Pval: Parser<Input, Output = Out>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    typed_line('a', (string(attribute), token(':'), val)).map(|(_, _, val)| val)
}

/// An a= line that has no value like: `a=ice-lite`.
fn attribute_line_flag<Input>(attribute: &'static str) -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    typed_line('a', (string(attribute)).map(|_| ()))
}

/// a=foo:bar lines belonging before the first m= line
fn session_attribute_line<Input>() -> impl Parser<Input, Output = SessionAttribute>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    // a=group:BUNDLE as vs
    let group = attribute_line(
        "group",
        (not_sp(), token(' '), sep_by1(not_sp(), token(' '))),
    )
    .map(|(typ, _, mids)| SessionAttribute::Group { typ, mids });

    // a=ice-lite
    let ice_lite = attribute_line_flag("ice-lite").map(|_| SessionAttribute::IceLite);

    // a=ice-ufrag:IdNYTNL1fjvjyEzL
    let ice_ufrag = attribute_line("ice-ufrag", any_value()).map(SessionAttribute::IceUfrag);

    // a=ice-pwd:4d64pT3T1xfwbZvi9fQKjoPb
    let ice_pwd = attribute_line("ice-pwd", any_value()).map(SessionAttribute::IcePwd);

    // everything else is passed through as is
    let unused = typed_line('a', any_value()).map(SessionAttribute::Unused);

    choice((
        attempt(group),
        attempt(ice_lite),
        attempt(ice_ufrag),
        attempt(ice_pwd),
        unused,
    ))
}

/// Lines we accept but don't keep (`i=`, `u=`, `e=`, `p=`, `z=`, `k=`).
fn ignored_line<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let ignored = choice((
        token('i'),
        token('u'),
        token('e'),
        token('p'),
        token('z'),
        token('k'),
    ));
    line(ignored, optional(any_value())).map(|_| ())
}

// /////////////////////////////////////////////////// Media description

/// A m= section with attributes, until next m= or EOF
fn media_parser<Input>() -> impl Parser<Input, Output = MediaLine>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        media_line(),
        many::<Vec<_>, _, _>(ignored_line()),
        optional(typed_line('c', connection())), // c=IN IP4 0.0.0.0
        many::<Vec<_>, _, _>(bandwidth_line()),  // b=AS:2500
        many::<Vec<_>, _, _>(media_attribute_line()),
    )
        .and_then(|((typ, port, proto, fmts), _, conn, bws, attrs)| {
            let m = MediaLine {
                typ,
                port,
                proto,
                fmts,
                conn,
                bw: pick_bandwidth(bws),
                attrs,
            };
            if let Some(err) = m.check_consistent() {
                warn!("{:?}", err);
                return Err(StreamErrorFor::<Input>::message_format(err));
            }
            Ok(m)
        })
}

/// The m= line
// m=audio 7078 RTP/AVP 111 110 0 8 101
// m=video 9078 RTP/AVPF 96 97
// m=text 0 RTP/AVP 98
// m=audio 7078/2 RTP/SAVP 0
// m=application 9 UDP/DTLS/SCTP webrtc-datachannel
fn media_line<Input>() -> impl Parser<Input, Output = (StreamType, u16, MediaProto, Vec<String>)>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    // <port>[/<number of ports>]
    let port = (
        number::<Input, u16>(),
        optional((token('/'), many1::<String, _, _>(digit()))),
    )
        .map(|(port, _)| port);

    typed_line(
        'm',
        (
            not_sp().map(|t| StreamType::from(t.as_str())), // type: audio, video etc.
            token(' '),
            port,
            token(' '),
            not_sp().map(|p| MediaProto::from(p.as_str())),
            many::<Vec<_>, _, _>((token(' '), not_sp()).map(|(_, f)| f)),
        ),
    )
    .map(|(typ, _, port, _, proto, fmts)| (typ, port, proto, fmts))
}

/// a= lines of a media section.
fn media_attribute_line<Input>() -> impl Parser<Input, Output = MediaAttribute>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    // a=rtcp:9 IN IP4 0.0.0.0
    let rtcp = attribute_line(
        "rtcp",
        (
            number::<Input, u16>(),
            optional((token(' '), any_value()).map(|(_, rest)| rest)),
        ),
    )
    .map(|(port, rest)| MediaAttribute::Rtcp { port, rest });

    // a=rtcp-mux
    let rtcp_mux = attribute_line_flag("rtcp-mux").map(|_| MediaAttribute::RtcpMux);

    // a=ice-ufrag:IdNYTNL1fjvjyEzL
    let ice_ufrag = attribute_line("ice-ufrag", any_value()).map(MediaAttribute::IceUfrag);

    // a=ice-pwd:4d64pT3T1xfwbZvi9fQKjoPb
    let ice_pwd = attribute_line("ice-pwd", any_value()).map(MediaAttribute::IcePwd);

    // a=candidate:1 1 UDP 2130706431 192.168.1.2 7078 typ host
    let cand = attribute_line("candidate", candidate()).map(MediaAttribute::Candidate);

    // a=fingerprint:sha-256 45:AD:5C:82:F8:BE:B5:2A:D1:74:A6:16:D0:50:CD:86:9C:97:9D:BD:06:8C:C9:85:C9:CD:AB:2B:A8:56:03:CD
    let hex_byte = count_min_max(2, 2, hex_digit()).and_then(|x: String| {
        u8::from_str_radix(&x, 16).map_err(StreamErrorFor::<Input>::message_format)
    });
    let finger = attribute_line(
        "fingerprint",
        (not_sp(), token(' '), sep_by1(hex_byte, token(':'))),
    )
    .map(|(hash_func, _, bytes)| MediaAttribute::Fingerprint(Fingerprint { hash_func, bytes }));

    let setup_val = choice((
        attempt(string("actpass").map(|_| Setup::ActPass)),
        attempt(string("active").map(|_| Setup::Active)),
        attempt(string("passive").map(|_| Setup::Passive)),
    ));

    // a=setup:actpass
    let setup = attribute_line("setup", setup_val).map(MediaAttribute::Setup);

    // a=mid:as
    let mid = attribute_line("mid", any_value()).map(MediaAttribute::Mid);

    let sendrecv = attribute_line_flag("sendrecv").map(|_| MediaAttribute::SendRecv);
    let sendonly = attribute_line_flag("sendonly").map(|_| MediaAttribute::SendOnly);
    let recvonly = attribute_line_flag("recvonly").map(|_| MediaAttribute::RecvOnly);
    let inactive = attribute_line_flag("inactive").map(|_| MediaAttribute::Inactive);

    // a=rtpmap:111 opus/48000/2
    let rtpmap = attribute_line(
        "rtpmap",
        (
            number::<Input, u8>(),
            token(' '),
            many1::<String, _, _>(satisfy(|c| c != '/' && c != '\r' && c != '\n')),
            token('/'),
            number::<Input, u32>(),
            optional((token('/'), number::<Input, u8>()).map(|(_, ch)| ch)),
        ),
    )
    .map(|(pt, _, mime, _, clock_rate, channels)| {
        MediaAttribute::RtpMap(RtpMap {
            pt: Pt::from(pt),
            mime,
            clock_rate,
            channels,
        })
    });

    // a=fmtp:111 minptime=10;useinbandfec=1
    let fmtp = attribute_line("fmtp", (number::<Input, u8>(), token(' '), any_value())).map(
        |(pt, _, params)| MediaAttribute::Fmtp {
            pt: Pt::from(pt),
            params,
        },
    );

    // a=ptime:20
    let ptime = attribute_line("ptime", number::<Input, u32>()).map(MediaAttribute::Ptime);

    // a=crypto:1 AES_CM_128_HMAC_SHA1_80 inline:PS1uQCVeeCFCanVmcjkpPywjNWhcYD0mXXtxaVBR
    let crypto = attribute_line(
        "crypto",
        (number::<Input, u32>(), token(' '), not_sp(), token(' '), any_value()),
    )
    .map(|(tag, _, suite, _, key)| {
        MediaAttribute::Crypto(CryptoAttribute {
            tag,
            suite: SrtpSuite::from(suite.as_str()),
            key,
        })
    });

    // a=zrtp-hash:1.10 fe30efd02423cb054e50efd0248742ac7a52c8f91bc2df881ae642c371ba46df
    let zrtp_hash = attribute_line("zrtp-hash", any_value()).map(MediaAttribute::ZrtpHash);

    // a=tcap:1 RTP/SAVP UDP/TLS/RTP/SAVP
    let tcap = attribute_line(
        "tcap",
        (
            number::<Input, u32>(),
            token(' '),
            sep_by1(not_sp().map(|p| MediaProto::from(p.as_str())), token(' ')),
        ),
    )
    .map(|(index, _, protos)| MediaAttribute::Tcap { index, protos });

    // a=acap:1 crypto:1 AES_CM_128_HMAC_SHA1_80 inline:WVNfX19zZW1jdGwgKCkgewkyMjA7fQp9CnVubGVz
    let acap = attribute_line("acap", (number::<Input, u32>(), token(' '), any_value()))
        .map(|(index, _, value)| MediaAttribute::Acap { index, value });

    // a=pcfg:1 t=1 a=1,2
    let pcfg = attribute_line(
        "pcfg",
        (
            number::<Input, u32>(),
            optional((token(' '), any_value()).map(|(_, v)| v)),
        ),
    )
    .map(|(index, params)| {
        let (tcap, acaps) = pcfg_params(params.as_deref().unwrap_or(""));
        MediaAttribute::Pcfg { index, tcap, acaps }
    });

    // everything else is passed through as is
    let unused = typed_line('a', any_value()).map(MediaAttribute::Unused);

    choice((
        attempt(rtcp),
        attempt(rtcp_mux),
        attempt(ice_ufrag),
        attempt(ice_pwd),
        attempt(cand),
        attempt(finger),
        attempt(setup),
        attempt(mid),
        attempt(sendrecv),
        attempt(sendonly),
        attempt(recvonly),
        attempt(inactive),
        attempt(rtpmap),
        attempt(fmtp),
        attempt(ptime),
        attempt(crypto),
        attempt(zrtp_hash),
        attempt(tcap),
        attempt(acap),
        attempt(pcfg),
        unused,
    ))
}

/// The `t=` and `a=` parts of a potential configuration.
///
/// Alternatives (`|`) and optional markers (`[]`) are reduced to the first
/// alternative, since we only ever produce one configuration per entry.
fn pcfg_params(s: &str) -> (Option<u32>, Vec<u32>) {
    let mut tcap = None;
    let mut acaps = vec![];

    for param in s.split_whitespace() {
        if let Some(t) = param.strip_prefix("t=") {
            tcap = t.split(['|', ',']).next().and_then(|v| v.parse().ok());
        } else if let Some(a) = param.strip_prefix("a=") {
            let first = a.split('|').next().unwrap_or("");
            acaps = first
                .split(',')
                .map(|v| v.trim_matches(|c| c == '[' || c == ']' || c == '-'))
                .filter_map(|v| v.parse().ok())
                .collect();
        }
    }

    (tcap, acaps)
}

/// Parser for candidate, without attribute prefix (a=candidate:).
fn candidate<Input>() -> impl Parser<Input, Output = Candidate>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let ip_addr = || {
        not_sp().and_then(|s| {
            s.parse::<IpAddr>()
                .map_err(StreamErrorFor::<Input>::message_format)
        })
    };

    let kind = choice((
        string("host").map(|_| CandidateKind::Host),
        string("prflx").map(|_| CandidateKind::PeerReflexive),
        string("srflx").map(|_| CandidateKind::ServerReflexive),
        string("relay").map(|_| CandidateKind::Relayed),
    ));

    (
        not_sp(),
        token(' '),
        number::<Input, u16>(),
        token(' '),
        not_sp(),
        token(' '),
        number::<Input, u32>(),
        token(' '),
        ip_addr(),
        token(' '),
        number::<Input, u16>(),
        string(" typ "),
        kind,
        optional(attempt((
            string(" raddr "),
            ip_addr(),
            string(" rport "),
            number::<Input, u16>(),
        ))),
        optional((token(' '), any_value()).map(|(_, ext)| ext)),
    )
        .map(
            |(
                foundation,
                _,
                component,
                _,
                transport,
                _,
                priority,
                _,
                addr,
                _,
                port,
                _,
                kind,
                raddr, // (" raddr ", addr, " rport ", port)
                extensions,
            )| Candidate {
                foundation,
                component,
                transport,
                priority,
                addr: SocketAddr::from((addr, port)),
                kind,
                raddr: raddr.map(|(_, addr, _, port)| SocketAddr::from((addr, port))),
                extensions,
            },
        )
}

/// A line with a single char type, such as `a=...`.
fn typed_line<Input, Pval, Out>(expected: char, val: Pval) -> impl Parser<Input, Output = Out>
where
    Input: Stream<Token = char>,
    Pval: Parser<Input, Output = Out>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    line(token(expected), val)
}

/// A line with some parser for value and parser for type.
fn line<Input, Ptyp, Pval, Out>(typ: Ptyp, val: Pval) -> impl Parser<Input, Output = Out>
where
    Ptyp: Parser<Input, Output = char>,
    Pval: Parser<Input, Output = Out>,
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    attempt((typ, token('='), val, line_end()))
        .map(|(_, _, value, _)| value)
        .message("sdp line")
}

/// Decimal number.
fn number<Input, N>() -> impl Parser<Input, Output = N>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
    N: std::str::FromStr,
    N::Err: std::fmt::Display,
{
    many1::<String, _, _>(digit())
        .and_then(|s| s.parse::<N>().map_err(StreamErrorFor::<Input>::message_format))
}

/// Not SP, \r or \n
fn not_sp<Input>() -> impl Parser<Input, Output = String>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(satisfy(|c| c != ' ' && c != '\r' && c != '\n'))
}

/// Any value that isn't \r or \n.
fn any_value<Input>() -> impl Parser<Input, Output = String>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(satisfy(|c| c != '\r' && c != '\n'))
}

/// Some peers send bare \n. This line end handles \r\n, \n or EOF.
fn line_end<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    choice((crlf().map(|_| ()), newline().map(|_| ()), eof()))
}
