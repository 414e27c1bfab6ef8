//! What changed between two rounds of a media description.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::media::{MediaDescription, StreamDescription};

/// Set of changes found between two descriptions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DiffFlags(u32);

impl DiffFlags {
    /// Nothing changed.
    pub const UNCHANGED: DiffFlags = DiffFlags(0);
    /// Address, port or RTCP transport changed.
    pub const NETWORK_CHANGED: DiffFlags = DiffFlags(1);
    /// Proto, stream type or payload types changed.
    pub const CODEC_CHANGED: DiffFlags = DiffFlags(1 << 1);
    /// Keys, fingerprint, setup role or zrtp hash changed.
    pub const CRYPTO_KEYS_CHANGED: DiffFlags = DiffFlags(1 << 2);
    /// Crypto suites or potential configurations changed.
    pub const CRYPTO_POLICY_CHANGED: DiffFlags = DiffFlags(1 << 3);
    /// A stream was added, removed, enabled or disabled.
    pub const STREAMS_CHANGED: DiffFlags = DiffFlags(1 << 4);
    /// New ICE credentials.
    pub const ICE_RESTART_DETECTED: DiffFlags = DiffFlags(1 << 5);
    /// A stream direction changed.
    pub const DIRECTION_CHANGED: DiffFlags = DiffFlags(1 << 6);
    /// Session or stream bandwidth changed.
    pub const BANDWIDTH_CHANGED: DiffFlags = DiffFlags(1 << 7);
    /// Packetization time changed.
    pub const PTIME_CHANGED: DiffFlags = DiffFlags(1 << 8);

    const NAMES: [(DiffFlags, &'static str); 9] = [
        (DiffFlags::NETWORK_CHANGED, "NETWORK_CHANGED"),
        (DiffFlags::CODEC_CHANGED, "CODEC_CHANGED"),
        (DiffFlags::CRYPTO_KEYS_CHANGED, "CRYPTO_KEYS_CHANGED"),
        (DiffFlags::CRYPTO_POLICY_CHANGED, "CRYPTO_POLICY_CHANGED"),
        (DiffFlags::STREAMS_CHANGED, "STREAMS_CHANGED"),
        (DiffFlags::ICE_RESTART_DETECTED, "ICE_RESTART_DETECTED"),
        (DiffFlags::DIRECTION_CHANGED, "DIRECTION_CHANGED"),
        (DiffFlags::BANDWIDTH_CHANGED, "BANDWIDTH_CHANGED"),
        (DiffFlags::PTIME_CHANGED, "PTIME_CHANGED"),
    ];

    /// True if no flag is set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is also set here.
    pub fn contains(&self, other: DiffFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag in `other` is also set here.
    pub fn intersects(&self, other: DiffFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// The raw bits.
    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl BitOr for DiffFlags {
    type Output = DiffFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        DiffFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for DiffFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for DiffFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiffFlags({})", self)
    }
}

impl fmt::Display for DiffFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "UNCHANGED");
        }
        let mut first = true;
        for (flag, name) in DiffFlags::NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Compares the description of the previous round with the current one.
pub struct StreamDescriptionDiffer<'a> {
    prev: &'a MediaDescription,
    cur: &'a MediaDescription,
}

impl<'a> StreamDescriptionDiffer<'a> {
    /// Creates a differ for two descriptions.
    pub fn new(prev: &'a MediaDescription, cur: &'a MediaDescription) -> Self {
        StreamDescriptionDiffer { prev, cur }
    }

    /// Changes to the stream at `index`.
    pub fn diff_stream(&self, index: usize) -> DiffFlags {
        match (self.prev.stream(index), self.cur.stream(index)) {
            (None, None) => DiffFlags::UNCHANGED,
            (Some(_), None) | (None, Some(_)) => DiffFlags::STREAMS_CHANGED,
            (Some(p), Some(c)) => self.compare(p, c),
        }
    }

    /// Changes over all streams and the session level.
    pub fn diff(&self) -> DiffFlags {
        let count = self.prev.streams.len().max(self.cur.streams.len());
        let mut flags = (0..count).fold(DiffFlags::UNCHANGED, |f, i| f | self.diff_stream(i));

        if self.prev.bandwidth != self.cur.bandwidth {
            flags |= DiffFlags::BANDWIDTH_CHANGED;
        }
        if ice_restarted(
            (&self.prev.ice_ufrag, &self.prev.ice_pwd),
            (&self.cur.ice_ufrag, &self.cur.ice_pwd),
        ) {
            flags |= DiffFlags::ICE_RESTART_DETECTED;
        }
        if self.prev.bundles != self.cur.bundles {
            flags |= DiffFlags::NETWORK_CHANGED;
        }

        flags
    }

    fn compare(&self, p: &StreamDescription, c: &StreamDescription) -> DiffFlags {
        let mut flags = DiffFlags::UNCHANGED;

        if p.is_enabled() != c.is_enabled() {
            flags |= DiffFlags::STREAMS_CHANGED | DiffFlags::CODEC_CHANGED;
        } else if p.port != c.port {
            flags |= DiffFlags::NETWORK_CHANGED;
        }

        if p.typ != c.typ || p.proto != c.proto {
            flags |= DiffFlags::CODEC_CHANGED;
        }
        if p.proto != c.proto && p.encryption() != c.encryption() {
            flags |= DiffFlags::CRYPTO_POLICY_CHANGED;
        }

        let p_addr = p.addr.as_ref().or(self.prev.addr.as_ref());
        let c_addr = c.addr.as_ref().or(self.cur.addr.as_ref());
        if p_addr != c_addr {
            flags |= DiffFlags::NETWORK_CHANGED;
        }
        if p.rtcp_port != c.rtcp_port || p.rtcp_mux != c.rtcp_mux {
            flags |= DiffFlags::NETWORK_CHANGED;
        }

        let same_codecs = p.codecs.len() == c.codecs.len()
            && p.codecs.iter().zip(&c.codecs).all(|(a, b)| a.same_payload(b));
        if !same_codecs {
            flags |= DiffFlags::CODEC_CHANGED;
        }

        if p.dir != c.dir {
            flags |= DiffFlags::DIRECTION_CHANGED;
        }
        if p.bandwidth != c.bandwidth {
            flags |= DiffFlags::BANDWIDTH_CHANGED;
        }
        if p.ptime != c.ptime {
            flags |= DiffFlags::PTIME_CHANGED;
        }

        if p.crypto.len() != c.crypto.len() {
            flags |= DiffFlags::CRYPTO_POLICY_CHANGED | DiffFlags::CRYPTO_KEYS_CHANGED;
        } else {
            for (a, b) in p.crypto.iter().zip(&c.crypto) {
                if a.tag != b.tag || a.suite != b.suite {
                    flags |= DiffFlags::CRYPTO_POLICY_CHANGED;
                }
                if a.key != b.key {
                    flags |= DiffFlags::CRYPTO_KEYS_CHANGED;
                }
            }
        }

        if p.capabilities != c.capabilities {
            flags |= DiffFlags::CRYPTO_POLICY_CHANGED;
        }
        if p.fingerprint != c.fingerprint || p.setup != c.setup || p.zrtp_hash != c.zrtp_hash {
            flags |= DiffFlags::CRYPTO_KEYS_CHANGED;
        }

        if ice_restarted((&p.ice_ufrag, &p.ice_pwd), (&c.ice_ufrag, &c.ice_pwd)) {
            flags |= DiffFlags::ICE_RESTART_DETECTED;
        }

        flags
    }
}

type IceCreds<'a> = (&'a Option<String>, &'a Option<String>);

// New non-empty credentials that differ from the old ones.
fn ice_restarted(prev: IceCreds, cur: IceCreds) -> bool {
    let changed = |p: &Option<String>, c: &Option<String>| match c {
        Some(c) if !c.is_empty() => p.as_deref() != Some(c.as_str()),
        _ => false,
    };
    changed(prev.0, cur.0) || changed(prev.1, cur.1)
}
