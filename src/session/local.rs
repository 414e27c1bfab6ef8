//! Building the local description from capabilities and config.

use crate::config::{LocalCapabilities, LocalStream, SessionConfig};
use crate::encryption::MediaEncryption;
use crate::media::{Codec, CryptoAttribute, MediaDescription, MediaProto, Setup};
use crate::media::{StreamDescription, StreamDirection};
use crate::util::{random_inline_key, random_zrtp_hash, Pii};

/// Build the local description.
///
/// With a `prev` description the session id, keys and hashes are kept and the
/// version is increased. `available` is the measured bandwidth in kbit/s, used
/// in low bandwidth mode.
pub(crate) fn build_local(
    caps: &LocalCapabilities,
    config: &SessionConfig,
    prev: Option<&MediaDescription>,
    available: Option<f64>,
) -> MediaDescription {
    let mut md = MediaDescription::new(&caps.origin_addr);

    if let Some(prev) = prev {
        md.session_id = prev.session_id;
        md.session_version = prev.session_version + 1;
    }

    md.addr = Some(caps.addr.clone().unwrap_or_else(|| caps.origin_addr.clone()));
    md.bandwidth = caps.bandwidth;
    md.ice_ufrag = caps.ice_ufrag.clone();
    md.ice_pwd = caps.ice_pwd.clone();

    for (index, ls) in caps.streams.iter().enumerate() {
        let prev_stream = prev.and_then(|p| p.stream(index));
        md.streams
            .push(build_stream(ls, caps, config, prev_stream, available));
    }

    if caps.bundle {
        let mids: Vec<String> = md.streams.iter().filter_map(|s| s.mid.clone()).collect();
        if !mids.is_empty() {
            md.bundles.push(mids);
        }
    }

    debug!(
        "Local description v{} at {} with {} streams",
        md.session_version,
        Pii(&caps.origin_addr),
        md.streams.len()
    );

    md
}

fn build_stream(
    ls: &LocalStream,
    caps: &LocalCapabilities,
    config: &SessionConfig,
    prev: Option<&StreamDescription>,
    available: Option<f64>,
) -> StreamDescription {
    let codecs = if config.low_bandwidth() {
        fit_bandwidth(&ls.codecs, available)
    } else {
        ls.codecs.clone()
    };

    let mut s = StreamDescription::new(ls.typ.clone(), ls.port, ls.dir, codecs);
    s.rtcp_port = ls.rtcp_port;
    s.rtcp_mux = ls.rtcp_mux;
    s.addr = ls.addr.clone();
    s.bandwidth = ls.bandwidth;
    s.ptime = ls.ptime;
    s.mid = ls.mid.clone();
    s.candidates = ls.candidates.clone();
    s.custom_attrs = ls.custom_attrs.clone();

    let policy = config.encryption_policy();
    let actual = policy.actual();
    let suites = policy.suites();

    s.proto = MediaProto::for_encryption(actual, ls.avpf);
    s.capabilities = policy.supported().to_vec();

    if suites.contains(&MediaEncryption::Srtp) {
        s.crypto = crypto_lines(config, prev);
    }

    if suites.contains(&MediaEncryption::Dtls) {
        match config.dtls_fingerprint() {
            Some(fp) => {
                s.fingerprint = Some(fp.clone());
                s.setup = Some(Setup::ActPass);
            }
            None => warn!("DTLS wanted without fingerprint"),
        }
    }

    if actual == MediaEncryption::Zrtp {
        let hash = caps
            .zrtp_hash
            .clone()
            .or_else(|| prev.and_then(|p| p.zrtp_hash.clone()))
            .unwrap_or_else(random_zrtp_hash);
        s.zrtp_hash = Some(hash);
    }

    s
}

// Keep the keys of the previous round if the suites are the same.
fn crypto_lines(config: &SessionConfig, prev: Option<&StreamDescription>) -> Vec<CryptoAttribute> {
    if let Some(prev) = prev {
        let same = prev.crypto.len() == config.srtp_suites().len()
            && prev
                .crypto
                .iter()
                .zip(config.srtp_suites())
                .all(|(c, s)| c.suite == *s);
        if same {
            return prev.crypto.clone();
        }
    }

    config
        .srtp_suites()
        .iter()
        .enumerate()
        .map(|(i, suite)| CryptoAttribute {
            tag: i as u32 + 1,
            suite: suite.clone(),
            key: random_inline_key(suite.key_len()),
        })
        .collect()
}

/// Add keys to the local streams answering an offer with crypto lines, even when
/// our own policy wouldn't offer SRTP. Keys from `prev` are kept.
pub(crate) fn answer_keys(
    md: &mut MediaDescription,
    config: &SessionConfig,
    offer: &MediaDescription,
    prev: Option<&MediaDescription>,
) {
    for (index, (s, o)) in md.streams.iter_mut().zip(offer.streams.iter()).enumerate() {
        if s.crypto.is_empty() && !o.crypto.is_empty() {
            let prev_stream = prev.and_then(|p| p.stream(index));
            s.crypto = crypto_lines(config, prev_stream);
        }
    }
}

// Codecs whose nominal bitrate fits the available bandwidth. If none fit, all are kept.
fn fit_bandwidth(codecs: &[Codec], available: Option<f64>) -> Vec<Codec> {
    let Some(kbps) = available else {
        return codecs.to_vec();
    };

    let fits: Vec<_> = codecs
        .iter()
        .filter(|c| c.bitrate.map_or(true, |b| b as f64 <= kbps * 1000.0))
        .cloned()
        .collect();

    if fits.iter().all(|c| c.is_telephone_event()) {
        warn!("No codec fits {:.1} kbit/s, keeping all", kbps);
        return codecs.to_vec();
    }

    fits
}

/// Set every enabled stream to inactive.
pub(crate) fn hold(md: &mut MediaDescription) {
    for s in md.streams.iter_mut().filter(|s| s.is_enabled()) {
        s.dir = StreamDirection::Inactive;
    }
}
