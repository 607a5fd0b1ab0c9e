//! Request classification.
//!
//! The inner message is matched against [`RULES`], an ordered table of
//! `(family, child element, message type)` rows under
//! `messageContent/<Family>toBDR`. The first matching row wins; the SOA
//! wildcard row is last.

use crate::audit::{self, Direction};
use crate::envelope::{child, children, BodyPayload};
use crate::message::{MessageType, ServiceFamily, LNP_NS};
use tracing::{debug, info};
use xmltree::Element;

/// How a rule matches the children of the family container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildMatch {
    /// A child element with this local name.
    Named(&'static str),
    /// Any child element.
    Any,
}

/// One row of the classification table.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub family: ServiceFamily,
    pub child: ChildMatch,
    /// Request kind written to the audit line.
    pub request: &'static str,
    pub message_type: MessageType,
}

const fn rule(
    family: ServiceFamily,
    child: ChildMatch,
    request: &'static str,
    message_type: MessageType,
) -> Rule {
    Rule {
        family,
        child,
        request,
        message_type,
    }
}

use ChildMatch::{Any, Named};
use ServiceFamily::{Bdo, Soa};

/// Classification table, highest priority first.
pub const RULES: &[Rule] = &[
    rule(Bdo, Named("NewSession"), "NewSession", MessageType::BdoNewSessionReply),
    rule(Bdo, Named("DownloadRecoveryRequest"), "DownloadRecoveryRequest", MessageType::BdoDownloadRecoveryReply),
    rule(Bdo, Named("SwimRecoveryComplete"), "SwimRecoveryComplete", MessageType::BdoSwimRecoveryCompleteReply),
    rule(Bdo, Named("RecoveryCompleteRequest"), "RecoveryCompleteRequest", MessageType::BdoRecoveryCompleteReply),
    rule(Soa, Named("NewSession"), "NewSession", MessageType::SoaNewSessionReply),
    rule(Soa, Named("NotificationRecoveryRequest"), "NotificationRecoveryRequest", MessageType::SoaNotificationRecoveryReply),
    rule(Soa, Named("SwimRecoveryComplete"), "SwimRecoveryComplete", MessageType::SoaSwimRecoveryCompleteReply),
    rule(Bdo, Named("ClientReleaseSession"), "ClientReleaseSession", MessageType::ClientReleaseSession),
    rule(Bdo, Named("ClientKeepAlive"), "ClientKeepAlive", MessageType::ClientKeepAlive),
    rule(Soa, Named("ClientReleaseSession"), "ClientReleaseSession", MessageType::ClientReleaseSession),
    rule(Soa, Named("ClientKeepAlive"), "ClientKeepAlive", MessageType::ClientKeepAlive),
    rule(Soa, Any, "RecoveryCompleteRequest", MessageType::SoaRecoveryCompleteReply),
];

/// Result of classifying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub message_type: MessageType,
    /// Family of the matched row; `None` when undefined.
    pub family: Option<ServiceFamily>,
    /// Request kind of the matched row; `None` when undefined.
    pub request: Option<&'static str>,
}

impl Classification {
    const UNDEFINED: Self = Self {
        message_type: MessageType::Undefined,
        family: None,
        request: None,
    };

    pub fn is_undefined(&self) -> bool {
        self.message_type == MessageType::Undefined
    }

    /// Audit line for this classification at the given instant.
    pub fn audit_line(&self, at: chrono::DateTime<chrono::Local>) -> String {
        match (self.family, self.request) {
            (Some(family), Some(request)) => {
                audit::line(at, Direction::Inbound, family.as_str(), request, 200)
            }
            _ => audit::line(
                at,
                Direction::Inbound,
                audit::UNDEFINED_SERVICE,
                audit::UNDEFINED_MESSAGE,
                200,
            ),
        }
    }
}

/// Index of the child that satisfies `rule`, in document order.
fn position(content: &Element, rule: &Rule) -> Option<usize> {
    let container = child(content, rule.family.container(), LNP_NS)?;
    let mut elements = children(container, LNP_NS);
    match rule.child {
        Named(name) => elements.position(|e| e.name == name),
        Any => elements.next().map(|_| 0),
    }
}

fn is_session_control(ty: MessageType) -> bool {
    matches!(ty, MessageType::ClientReleaseSession | MessageType::ClientKeepAlive)
}

/// Pure table lookup: the first rule whose family container holds a
/// matching child.
///
/// Session-control rows of one family are tied: among them the child that
/// comes first in the document wins.
pub fn classify(payload: &BodyPayload) -> Classification {
    let Some(content) = child(&payload.root, "messageContent", LNP_NS) else {
        return Classification::UNDEFINED;
    };

    let Some(first) = RULES.iter().find(|rule| position(content, rule).is_some()) else {
        return Classification::UNDEFINED;
    };

    let rule = if is_session_control(first.message_type) {
        RULES
            .iter()
            .filter(|r| r.family == first.family && is_session_control(r.message_type))
            .filter_map(|r| position(content, r).map(|at| (r, at)))
            .min_by_key(|(_, at)| *at)
            .map_or(first, |(r, _)| r)
    } else {
        first
    };

    Classification {
        message_type: rule.message_type,
        family: Some(rule.family),
        request: Some(rule.request),
    }
}

/// Classify and emit the inbound audit line.
pub fn classify_and_log(payload: &BodyPayload) -> Classification {
    let classification = classify(payload);
    info!(
        target: audit::TARGET,
        "{}",
        classification.audit_line(chrono::Local::now())
    );
    if classification.is_undefined() {
        debug!(payload = ?payload.root, "unclassified payload");
    }
    classification
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(family: &str, inner: &str) -> BodyPayload {
        let xml = format!(
            "<BDRMessage xmlns=\"urn:brazil:lnp:1.0\">\
             <messageHeader><service_prov_id>0123</service_prov_id></messageHeader>\
             <messageContent><{family}>{inner}</{family}></messageContent></BDRMessage>"
        );
        BodyPayload {
            root: Element::parse(xml.as_bytes()).unwrap(),
            convention: "test",
        }
    }

    fn type_of(family: &str, inner: &str) -> MessageType {
        classify(&payload(family, inner)).message_type
    }

    #[test]
    fn bdo_named_children() {
        assert_eq!(type_of("BDOtoBDR", "<NewSession/>"), MessageType::BdoNewSessionReply);
        assert_eq!(
            type_of("BDOtoBDR", "<DownloadRecoveryRequest><a/></DownloadRecoveryRequest>"),
            MessageType::BdoDownloadRecoveryReply
        );
        assert_eq!(
            type_of("BDOtoBDR", "<SwimRecoveryComplete/>"),
            MessageType::BdoSwimRecoveryCompleteReply
        );
        assert_eq!(
            type_of("BDOtoBDR", "<RecoveryCompleteRequest/>"),
            MessageType::BdoRecoveryCompleteReply
        );
    }

    #[test]
    fn soa_named_children() {
        assert_eq!(type_of("SOAtoBDR", "<NewSession/>"), MessageType::SoaNewSessionReply);
        assert_eq!(
            type_of("SOAtoBDR", "<NotificationRecoveryRequest/>"),
            MessageType::SoaNotificationRecoveryReply
        );
        assert_eq!(
            type_of("SOAtoBDR", "<SwimRecoveryComplete/>"),
            MessageType::SoaSwimRecoveryCompleteReply
        );
    }

    #[test]
    fn soa_wildcard_is_lowest_priority() {
        assert_eq!(
            type_of("SOAtoBDR", "<RecoveryCompleteRequest/>"),
            MessageType::SoaRecoveryCompleteReply
        );
        assert_eq!(type_of("SOAtoBDR", "<Anything/>"), MessageType::SoaRecoveryCompleteReply);
        // A named row beats the wildcard regardless of document order.
        assert_eq!(
            type_of("SOAtoBDR", "<Anything/><NewSession/>"),
            MessageType::SoaNewSessionReply
        );
    }

    #[test]
    fn session_control_for_both_families() {
        for family in ["BDOtoBDR", "SOAtoBDR"] {
            assert_eq!(type_of(family, "<ClientKeepAlive/>"), MessageType::ClientKeepAlive);
            assert_eq!(
                type_of(family, "<ClientReleaseSession/>"),
                MessageType::ClientReleaseSession
            );
        }
        let c = classify(&payload("SOAtoBDR", "<ClientKeepAlive/>"));
        assert_eq!(c.family, Some(ServiceFamily::Soa));
        assert_eq!(c.request, Some("ClientKeepAlive"));
    }

    #[test]
    fn session_control_follows_document_order() {
        for family in ["BDOtoBDR", "SOAtoBDR"] {
            assert_eq!(
                type_of(family, "<ClientKeepAlive/><ClientReleaseSession/>"),
                MessageType::ClientKeepAlive
            );
            assert_eq!(
                type_of(family, "<ClientReleaseSession/><ClientKeepAlive/>"),
                MessageType::ClientReleaseSession
            );
        }
        let c = classify(&payload("BDOtoBDR", "<ClientKeepAlive/><ClientReleaseSession/>"));
        assert_eq!(c.request, Some("ClientKeepAlive"));
        // A reply-triggering row still outranks session control.
        assert_eq!(
            type_of("BDOtoBDR", "<ClientKeepAlive/><NewSession/>"),
            MessageType::BdoNewSessionReply
        );
    }

    #[test]
    fn unknown_structures_are_undefined() {
        assert!(classify(&payload("BDOtoBDR", "<Unknown/>")).is_undefined());
        assert!(classify(&payload("BDOtoBDR", "")).is_undefined());
        assert!(classify(&payload("SOAtoBDR", "")).is_undefined());
        assert!(classify(&payload("XYZtoBDR", "<NewSession/>")).is_undefined());

        let foreign = BodyPayload {
            root: Element::parse(&b"<BDRMessage><messageContent/></BDRMessage>"[..]).unwrap(),
            convention: "test",
        };
        assert!(classify(&foreign).is_undefined());
    }

    #[test]
    fn wrong_namespace_children_do_not_match() {
        assert!(classify(&payload("BDOtoBDR", "<NewSession xmlns=\"urn:other\"/>")).is_undefined());
    }

    #[test]
    fn classification_is_deterministic() {
        let p = payload("BDOtoBDR", "<NewSession/><ClientKeepAlive/>");
        let first = classify(&p);
        for _ in 0..10 {
            assert_eq!(classify(&p), first);
        }
        assert_eq!(first.message_type, MessageType::BdoNewSessionReply);
    }

    #[test]
    fn audit_line_format() {
        use chrono::TimeZone;
        let at = chrono::Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let c = classify(&payload("BDOtoBDR", "<NewSession/>"));
        assert_eq!(c.audit_line(at), "05/03/2024 07:08:09|SPG => BDR|BDO|NewSession|200|");

        let u = classify(&payload("BDOtoBDR", "<Nope/>"));
        assert_eq!(
            u.audit_line(at),
            "05/03/2024 07:08:09|SPG => BDR|UNDEFINED_SERVICE|UNDEFINED_MESSAGE|200|"
        );
    }
}
