use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::Pt;

/// One payload type of a stream.
///
/// In the SDP a payload type is assembled from the m-line and a couple of attributes:
///
/// ```text
/// m=audio 7078 RTP/AVP 111 101
/// a=rtpmap:111 opus/48000/2
/// a=fmtp:111 minptime=10;useinbandfec=1
/// a=rtpmap:101 telephone-event/8000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Codec {
    /// Payload type number.
    pub pt: Pt,
    /// Encoding name, such as `opus` or `PCMU`.
    pub mime: String,
    /// Clock rate of the codec.
    pub clock_rate: u32,
    /// Number of audio channels (if any).
    pub channels: Option<u8>,
    /// Format parameters, as found after `a=fmtp:<pt> `.
    pub fmtp: Option<String>,
    /// Nominal bitrate in bits per second.
    ///
    /// This is local information used when deciding which codecs fit the available
    /// bandwidth. It is never written to, or read from, the SDP.
    #[serde(default)]
    pub bitrate: Option<u32>,
}

impl Codec {
    /// Creates a codec without format parameters.
    pub fn new(pt: u8, mime: &str, clock_rate: u32, channels: Option<u8>) -> Self {
        Codec {
            pt: pt.into(),
            mime: mime.to_string(),
            clock_rate,
            channels,
            fmtp: None,
            bitrate: None,
        }
    }

    /// Set the format parameters.
    pub fn with_fmtp(mut self, fmtp: &str) -> Self {
        self.fmtp = Some(fmtp.to_string());
        self
    }

    /// Set the nominal bitrate (bits per second).
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// Whether two codecs describe the same encoding, regardless of payload type number.
    ///
    /// Mime is compared case insensitive, and a missing channel count means one channel.
    pub fn matches(&self, other: &Codec) -> bool {
        self.mime.eq_ignore_ascii_case(&other.mime)
            && self.clock_rate == other.clock_rate
            && self.channels.unwrap_or(1) == other.channels.unwrap_or(1)
    }

    /// Whether this is the RFC 4733 DTMF pseudo codec.
    pub fn is_telephone_event(&self) -> bool {
        self.mime.eq_ignore_ascii_case("telephone-event")
    }

    /// Same payload as seen on the wire: number, encoding, rate and channels.
    ///
    /// Format parameters are not compared since media engines tend to rewrite them.
    pub(crate) fn same_payload(&self, other: &Codec) -> bool {
        self.pt == other.pt && self.matches(other)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mime, self.clock_rate)?;
        if let Some(ch) = self.channels {
            write!(f, "/{}", ch)?;
        }
        write!(f, " ({})", self.pt)
    }
}

/// Static payload types from RFC 3551 that may appear without `a=rtpmap`.
pub(crate) fn static_payload(pt: u8) -> Option<Codec> {
    let (mime, rate, ch) = match pt {
        0 => ("PCMU", 8000, Some(1)),
        3 => ("GSM", 8000, Some(1)),
        4 => ("G723", 8000, Some(1)),
        8 => ("PCMA", 8000, Some(1)),
        9 => ("G722", 8000, Some(1)),
        13 => ("CN", 8000, Some(1)),
        18 => ("G729", 8000, Some(1)),
        26 => ("JPEG", 90000, None),
        31 => ("H261", 90000, None),
        34 => ("H263", 90000, None),
        _ => return None,
    };
    Some(Codec::new(pt, mime, rate, ch))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn matches_ignores_case_and_pt() {
        let a = Codec::new(111, "opus", 48000, Some(2));
        let b = Codec::new(96, "OPUS", 48000, Some(2));
        assert!(a.matches(&b));
        assert!(!a.same_payload(&b));
    }

    #[test]
    fn mono_matches_unspecified_channels() {
        let a = Codec::new(0, "PCMU", 8000, Some(1));
        let b = Codec::new(0, "PCMU", 8000, None);
        assert!(a.matches(&b));
    }

    #[test]
    fn static_pcma() {
        let c = static_payload(8).unwrap();
        assert_eq!(c.mime, "PCMA");
        assert!(static_payload(96).is_none());
    }
}
