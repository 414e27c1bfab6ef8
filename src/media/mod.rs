//! Media descriptions exchanged in offer/answer.

mod codec;
pub(crate) use codec::static_payload;
pub use codec::Codec;

mod desc;
pub use desc::{Candidate, CandidateKind, CryptoAttribute, Fingerprint, MediaDescription};
pub use desc::{MediaProto, Setup, SrtpSuite, StreamDescription, StreamType};

mod dir;
pub use dir::StreamDirection;
