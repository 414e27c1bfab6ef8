use base64::engine::general_purpose::STANDARD;
use base64::Engine;

mod average;
pub(crate) use average::MovingAverage;

mod pii;
pub(crate) use pii::Pii;

/// Random values for identifiers and local key material.
///
/// Keys made here are only placeholders to get a well formed description. The
/// media engine is expected to provide real key material through
/// [`LocalCapabilities`][crate::LocalCapabilities].
pub(crate) struct NonCryptographicRng;

impl NonCryptographicRng {
    #[inline(always)]
    pub fn u8() -> u8 {
        fastrand::u8(..)
    }

    #[inline(always)]
    pub fn u64() -> u64 {
        fastrand::u64(..)
    }

    #[inline(always)]
    pub fn alphanumeric() -> char {
        fastrand::alphanumeric()
    }
}

pub(crate) fn random_alphanumeric(len: usize) -> String {
    (0..len).map(|_| NonCryptographicRng::alphanumeric()).collect()
}

/// `inline:<base64 key||salt>` for an SRTP suite.
pub(crate) fn random_inline_key(len: usize) -> String {
    let bytes: Vec<u8> = (0..len).map(|_| NonCryptographicRng::u8()).collect();
    format!("inline:{}", STANDARD.encode(bytes))
}

/// `1.10 <hex>` as found in `a=zrtp-hash`.
pub(crate) fn random_zrtp_hash() -> String {
    let mut s = String::from("1.10 ");
    for _ in 0..4 {
        s.push_str(&format!("{:016x}", NonCryptographicRng::u64()));
    }
    s
}
