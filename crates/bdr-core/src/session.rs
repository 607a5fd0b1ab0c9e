//! Session correlation: random session ids and the correlation header that
//! links a synchronous ack to its asynchronous reply.
//!
//! Ids are drawn from a small range and never tracked, so collisions between
//! requests are possible and accepted.

use rand::Rng;
use std::fmt;
use std::ops::RangeInclusive;

/// Inclusive range session ids are drawn from.
pub const SESSION_ID_RANGE: RangeInclusive<u32> = 900_000_000..=900_000_050;

/// Correlation token sent with the asynchronous reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u32);

impl SessionId {
    /// Draw a session id uniformly from [`SESSION_ID_RANGE`].
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(SESSION_ID_RANGE))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for SessionId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discriminator placed between spid and session id.
const DISCRIMINATOR: &str = "0";
/// Protocol version fields trailing the session id.
const VERSION_MAJOR: &str = "1";
const VERSION_MINOR: &str = "3";

/// `spid|0|sessionId|1|3|`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationHeader {
    spid: String,
    session_id: SessionId,
}

impl CorrelationHeader {
    pub fn new(spid: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            spid: spid.into(),
            session_id,
        }
    }

    pub fn spid(&self) -> &str {
        &self.spid
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Parse a rendered header. Returns `None` unless all fields are present
    /// and the constant fields hold their fixed values.
    pub fn parse(s: &str) -> Option<Self> {
        let fields: Vec<&str> = s.split('|').collect();
        match fields.as_slice() {
            [spid, DISCRIMINATOR, session, VERSION_MAJOR, VERSION_MINOR, ""] if !spid.is_empty() => {
                let session_id = session.parse::<u32>().ok()?;
                Some(Self::new(*spid, SessionId(session_id)))
            }
            _ => None,
        }
    }
}

impl fmt::Display for CorrelationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{DISCRIMINATOR}|{}|{VERSION_MAJOR}|{VERSION_MINOR}|",
            self.spid, self.session_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn session_ids_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let id = SessionId::generate(&mut rng);
            assert!(SESSION_ID_RANGE.contains(&id.value()));
        }
    }

    #[test]
    fn range_spans_both_ends() {
        let mut rng = StdRng::seed_from_u64(42);
        let ids: Vec<u32> = (0..5000).map(|_| SessionId::generate(&mut rng).value()).collect();
        assert!(ids.contains(SESSION_ID_RANGE.start()));
        assert!(ids.contains(SESSION_ID_RANGE.end()));
    }

    #[test]
    fn header_format() {
        let h = CorrelationHeader::new("0123", SessionId::from(900_000_017));
        assert_eq!(h.to_string(), "0123|0|900000017|1|3|");
    }

    #[test]
    fn header_round_trips() {
        let h = CorrelationHeader::new("spid-9", SessionId::from(900_000_050));
        let parsed = CorrelationHeader::parse(&h.to_string()).unwrap();
        assert_eq!(parsed, h);
        assert_eq!(parsed.spid(), "spid-9");
        assert_eq!(parsed.session_id().value(), 900_000_050);
    }

    #[test]
    fn header_parse_rejects_other_shapes() {
        assert!(CorrelationHeader::parse("").is_none());
        assert!(CorrelationHeader::parse("|0|1|1|3|").is_none());
        assert!(CorrelationHeader::parse("a|1|1|1|3|").is_none());
        assert!(CorrelationHeader::parse("a|0|x|1|3|").is_none());
        assert!(CorrelationHeader::parse("a|0|1|1|3").is_none());
    }
}
