use callsess::media::{MediaProto, StreamType};
use callsess::{MediaDescription, MediaEncryption, StreamDirection};

mod common;
use common::*;

const OFFER: &str = "v=0\r\n\
    o=alice 3724 1 IN IP4 192.168.1.10\r\n\
    s=Talk\r\n\
    c=IN IP4 192.168.1.10\r\n\
    b=AS:380\r\n\
    t=0 0\r\n\
    a=record:off\r\n\
    m=audio 7078 RTP/AVP 96 0 8 101\r\n\
    a=rtpmap:96 opus/48000/2\r\n\
    a=fmtp:96 useinbandfec=1\r\n\
    a=rtpmap:101 telephone-event/8000\r\n\
    a=ptime:20\r\n\
    a=rtcp-fb:* trr-int 1000\r\n\
    m=video 9078 RTP/AVPF 97\r\n\
    a=rtpmap:97 VP8/90000\r\n\
    a=recvonly\r\n\
    a=rtcp-fb:97 nack pli\r\n";

#[test]
pub fn parse_phone_offer() {
    init_log();

    let md = MediaDescription::parse(OFFER).unwrap();

    assert_eq!(md.origin_addr, "192.168.1.10");
    assert_eq!(md.addr.as_deref(), Some("192.168.1.10"));
    assert_eq!(md.bandwidth, Some(380));
    assert_eq!(md.custom_attrs, vec!["record:off".to_string()]);
    assert_eq!(md.streams.len(), 2);

    let audio = &md.streams[0];
    assert_eq!(audio.typ, StreamType::Audio);
    assert_eq!(audio.port, 7078);
    assert_eq!(audio.proto, MediaProto::RtpAvp);
    assert_eq!(audio.dir, StreamDirection::SendRecv);
    assert_eq!(audio.ptime, Some(20));
    assert_eq!(audio.encryption(), MediaEncryption::None);

    // Static payload types are known without rtpmap.
    let mimes: Vec<_> = audio.codecs.iter().map(|c| c.mime.as_str()).collect();
    assert_eq!(mimes, vec!["opus", "PCMU", "PCMA", "telephone-event"]);
    assert_eq!(audio.codecs[0].fmtp.as_deref(), Some("useinbandfec=1"));
    assert_eq!(audio.custom_attrs, vec!["rtcp-fb:* trr-int 1000".to_string()]);

    let video = &md.streams[1];
    assert_eq!(video.typ, StreamType::Video);
    assert!(video.proto.has_avpf());
    assert_eq!(video.dir, StreamDirection::RecvOnly);
    assert_eq!(video.custom_attrs, vec!["rtcp-fb:97 nack pli".to_string()]);
}

#[test]
pub fn write_and_read_back() {
    init_log();

    let md = MediaDescription::parse(OFFER).unwrap();
    let text = md.to_sdp_string();

    assert!(text.starts_with("v=0\r\n"));
    assert!(text.contains("a=record:off\r\n"));
    assert!(text.contains("a=rtcp-fb:97 nack pli\r\n"));
    assert!(text.contains("m=audio 7078 RTP/AVP 96 0 8 101\r\n"));

    let again = MediaDescription::parse(&text).unwrap();
    assert_eq!(again, md);
}

#[test]
pub fn disabled_stream_keeps_a_format() {
    init_log();

    let mut md = MediaDescription::parse(OFFER).unwrap();
    md.streams[1].disable();

    let text = md.to_sdp_string();
    assert!(text.contains("m=video 0 RTP/AVPF"));

    let again = MediaDescription::parse(&text).unwrap();
    assert!(!again.streams[1].is_enabled());
    assert_eq!(again.nb_active_streams(), 1);
}

#[test]
pub fn rejects_garbage() {
    init_log();

    assert!(MediaDescription::parse("").is_err());
    assert!(MediaDescription::parse("hello\r\n").is_err());
    // Payload type 120 has no rtpmap and is not static: dropped, not an error.
    let md = MediaDescription::parse(
        "v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\ns=-\r\nt=0 0\r\nm=audio 5004 RTP/AVP 0 120\r\n",
    )
    .unwrap();
    assert_eq!(md.streams[0].codecs.len(), 1);
}
