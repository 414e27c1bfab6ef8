use std::fmt;
use std::ops::Deref;
use std::str::from_utf8;

use serde::{Deserialize, Serialize};

use crate::util::random_alphanumeric;

macro_rules! str_id {
    ($(#[$meta:meta])* $id:ident, $name:literal, $num:tt) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $id([u8; $num]);

        impl $id {
            /// Creates a new random id.
            pub fn new() -> $id {
                let mut array = [b' '; $num];
                array.copy_from_slice(random_alphanumeric($num).as_bytes());
                $id(array)
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s: &str = self;
                write!(f, "{}", s)
            }
        }

        impl fmt::Debug for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s: &str = self;
                write!(f, "{}({})", $name, s)
            }
        }

        impl Deref for $id {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                // Only ever constructed from ascii.
                from_utf8(&self.0).unwrap_or_default().trim()
            }
        }

        impl<'a> From<&'a str> for $id {
            fn from(v: &'a str) -> Self {
                let v = v
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                    .collect::<String>();

                let bytes = v.as_bytes();
                let bytes = &bytes[0..$num.min(bytes.len())];

                // pad with space.
                let mut array = [b' '; $num];

                let max = bytes.len().min(array.len());
                array[0..max].copy_from_slice(bytes);

                $id(array)
            }
        }

        impl Default for $id {
            fn default() -> Self {
                $id::new()
            }
        }
    };
}

macro_rules! num_id {
    ($(#[$meta:meta])* $id:ident, $t:ty) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $id($t);

        impl Deref for $id {
            type Target = $t;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$t> for $id {
            fn from(v: $t) -> Self {
                $id(v)
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

str_id!(
    /// Identifier of a call, shared by both ends of the signaling.
    CallId,
    "CallId",
    16
);
num_id!(
    /// RTP payload type.
    Pt,
    u8
);
num_id!(
    /// SDP session id, the `o=` line `sess-id`.
    SessionId,
    u64
);
num_id!(
    /// Sequence number of an offer/answer exchange.
    ///
    /// Every offer sent starts a new round, and responses carrying an older round
    /// are dropped.
    Round,
    u64
);

impl SessionId {
    /// Random session id.
    ///
    /// RFC 4566 wants it representable as a 64 bit signed integer, and RFC 3264
    /// asks for the initial value to be less than 2^62 - 1.
    pub fn new() -> Self {
        SessionId(fastrand::u64(..(1 << 62) - 1))
    }
}

impl Round {
    /// The round following this one.
    pub fn next(self) -> Round {
        Round(self.0 + 1)
    }
}
