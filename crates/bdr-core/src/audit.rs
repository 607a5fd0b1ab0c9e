//! Operator audit lines: one per classified request and one per reply sent.
//!
//! Format: `<dd/mm/YYYY HH:MM:SS>|<direction>|<service>|<kind>|<status>|`

use chrono::{DateTime, Local};

/// `tracing` target the audit lines are emitted under.
pub const TARGET: &str = "bdr::audit";

pub const UNDEFINED_SERVICE: &str = "UNDEFINED_SERVICE";
pub const UNDEFINED_MESSAGE: &str = "UNDEFINED_MESSAGE";

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Gateway request received.
    Inbound,
    /// Asynchronous reply sent.
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "SPG => BDR",
            Direction::Outbound => "BDR => SPG",
        }
    }
}

/// Render one audit line.
pub fn line(at: DateTime<Local>, direction: Direction, service: &str, kind: &str, status: u16) -> String {
    format!(
        "{}|{}|{}|{}|{}|",
        at.format(TIMESTAMP_FORMAT),
        direction.as_str(),
        service,
        kind,
        status
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn outbound_line() {
        let at = Local.with_ymd_and_hms(2018, 12, 31, 23, 59, 1).unwrap();
        assert_eq!(
            line(at, Direction::Outbound, "SOA", "NewSessionReply", 500),
            "31/12/2018 23:59:01|BDR => SPG|SOA|NewSessionReply|500|"
        );
    }
}
