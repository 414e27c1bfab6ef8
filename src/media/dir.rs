use std::fmt;

use serde::{Deserialize, Serialize};

/// Stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StreamDirection {
    /// Send only direction.
    SendOnly,
    /// Receive only direction.
    RecvOnly,
    /// Bi-directional.
    #[default]
    SendRecv,
    /// Disabled direction.
    Inactive,
}

impl StreamDirection {
    /// Change the direction to the opposite.
    ///
    /// `SendRecv` and `Inactive` are left unchanged.
    pub fn invert(&self) -> Self {
        match self {
            StreamDirection::SendOnly => StreamDirection::RecvOnly,
            StreamDirection::RecvOnly => StreamDirection::SendOnly,
            _ => *self,
        }
    }

    /// Whether this direction is a sending direction.
    pub fn is_sending(&self) -> bool {
        matches!(self, StreamDirection::SendOnly | StreamDirection::SendRecv)
    }

    /// Whether this direction is a receiving direction.
    pub fn is_receiving(&self) -> bool {
        matches!(self, StreamDirection::RecvOnly | StreamDirection::SendRecv)
    }

    /// Direction the answerer puts in its answer, given its own capability
    /// `local` and the direction `offered` by the remote side.
    ///
    /// See [RFC3264 6.1](https://datatracker.ietf.org/doc/html/rfc3264#section-6.1).
    pub fn answer(local: StreamDirection, offered: StreamDirection) -> StreamDirection {
        use StreamDirection::*;
        match (local, offered) {
            (_, Inactive) | (Inactive, _) => Inactive,
            (SendRecv, SendOnly) => RecvOnly,
            (SendRecv, RecvOnly) => SendOnly,
            (SendRecv, SendRecv) => SendRecv,
            (SendOnly, RecvOnly | SendRecv) => SendOnly,
            (SendOnly, SendOnly) => Inactive,
            (RecvOnly, SendOnly | SendRecv) => RecvOnly,
            (RecvOnly, RecvOnly) => Inactive,
        }
    }

    /// Direction the offerer ends up using, given what it offered (`local`) and
    /// the direction the remote side `answered` with.
    pub fn outgoing(local: StreamDirection, answered: StreamDirection) -> StreamDirection {
        use StreamDirection::*;
        match (local, answered) {
            (_, Inactive) | (Inactive, _) => Inactive,
            (SendRecv, RecvOnly) => SendOnly,
            (SendRecv, SendOnly) => RecvOnly,
            (SendRecv, SendRecv) => SendRecv,
            (SendOnly, RecvOnly | SendRecv) => SendOnly,
            (SendOnly, SendOnly) => Inactive,
            (RecvOnly, SendOnly | SendRecv) => RecvOnly,
            (RecvOnly, RecvOnly) => Inactive,
        }
    }
}

impl From<&str> for StreamDirection {
    fn from(v: &str) -> Self {
        use StreamDirection::*;
        match v {
            "sendonly" => SendOnly,
            "recvonly" => RecvOnly,
            "sendrecv" => SendRecv,
            _ => Inactive,
        }
    }
}

impl fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                StreamDirection::SendOnly => "sendonly",
                StreamDirection::RecvOnly => "recvonly",
                StreamDirection::SendRecv => "sendrecv",
                StreamDirection::Inactive => "inactive",
            }
        )
    }
}

#[cfg(test)]
mod test {
    use super::StreamDirection::*;
    use super::*;

    #[test]
    fn answer_table() {
        assert_eq!(StreamDirection::answer(SendRecv, SendRecv), SendRecv);
        assert_eq!(StreamDirection::answer(SendRecv, SendOnly), RecvOnly);
        assert_eq!(StreamDirection::answer(SendRecv, RecvOnly), SendOnly);
        assert_eq!(StreamDirection::answer(SendRecv, Inactive), Inactive);
        assert_eq!(StreamDirection::answer(Inactive, SendRecv), Inactive);
        assert_eq!(StreamDirection::answer(SendOnly, SendOnly), Inactive);
        assert_eq!(StreamDirection::answer(RecvOnly, SendRecv), RecvOnly);
    }

    #[test]
    fn outgoing_table() {
        assert_eq!(StreamDirection::outgoing(SendRecv, SendRecv), SendRecv);
        assert_eq!(StreamDirection::outgoing(SendRecv, RecvOnly), SendOnly);
        assert_eq!(StreamDirection::outgoing(SendRecv, SendOnly), RecvOnly);
        assert_eq!(StreamDirection::outgoing(SendOnly, SendRecv), SendOnly);
        assert_eq!(StreamDirection::outgoing(RecvOnly, RecvOnly), Inactive);
    }

    #[test]
    fn parse_and_print() {
        for d in [SendRecv, SendOnly, RecvOnly, Inactive] {
            assert_eq!(StreamDirection::from(d.to_string().as_str()), d);
        }
    }
}
