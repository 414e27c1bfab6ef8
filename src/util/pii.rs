//! Redaction of sensitive values in logs.
//!
//! Addresses, ICE passwords and SRTP keys end up in debug logs when descriptions
//! are negotiated. Wrapping them in `Pii` prints `{REDACTED}` instead when the
//! `pii` feature is enabled.

use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pii<T>(pub T);

impl<T: fmt::Display> fmt::Display for Pii<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if cfg!(feature = "pii") {
            write!(f, "{{REDACTED}}")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pii<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if cfg!(feature = "pii") {
            write!(f, "{{REDACTED}}")
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}
