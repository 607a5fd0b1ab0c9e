//! Message-type identifiers shared by the classifier, templates and routes.

use std::fmt;

/// Namespace of the inner protocol message carried in the envelope payload.
pub const LNP_NS: &str = "urn:brazil:lnp:1.0";

/// The two service families the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceFamily {
    Bdo,
    Soa,
}

impl ServiceFamily {
    /// Wire label used in template names and audit lines.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceFamily::Bdo => "BDO",
            ServiceFamily::Soa => "SOA",
        }
    }

    /// Name of the payload container element for requests of this family.
    pub fn container(self) -> &'static str {
        match self {
            ServiceFamily::Bdo => "BDOtoBDR",
            ServiceFamily::Soa => "SOAtoBDR",
        }
    }
}

impl fmt::Display for ServiceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified type of an inbound request, named after the reply it triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    BdoNewSessionReply,
    BdoDownloadRecoveryReply,
    BdoSwimRecoveryCompleteReply,
    BdoRecoveryCompleteReply,
    SoaNewSessionReply,
    SoaNotificationRecoveryReply,
    SoaSwimRecoveryCompleteReply,
    SoaRecoveryCompleteReply,
    ClientReleaseSession,
    ClientKeepAlive,
    /// No known structure matched.
    Undefined,
}

impl MessageType {
    /// Every message type that produces an asynchronous reply.
    pub const REPLIES: [MessageType; 8] = [
        MessageType::BdoNewSessionReply,
        MessageType::BdoDownloadRecoveryReply,
        MessageType::BdoSwimRecoveryCompleteReply,
        MessageType::BdoRecoveryCompleteReply,
        MessageType::SoaNewSessionReply,
        MessageType::SoaNotificationRecoveryReply,
        MessageType::SoaSwimRecoveryCompleteReply,
        MessageType::SoaRecoveryCompleteReply,
    ];

    /// Protocol identifier, e.g. `BDO_NewSessionReply`. Also the template name.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::BdoNewSessionReply => "BDO_NewSessionReply",
            MessageType::BdoDownloadRecoveryReply => "BDO_DownloadRecoveryReply",
            MessageType::BdoSwimRecoveryCompleteReply => "BDO_SwimRecoveryCompleteReply",
            MessageType::BdoRecoveryCompleteReply => "BDO_RecoveryCompleteReply",
            MessageType::SoaNewSessionReply => "SOA_NewSessionReply",
            MessageType::SoaNotificationRecoveryReply => "SOA_NotificationRecoveryReply",
            MessageType::SoaSwimRecoveryCompleteReply => "SOA_SwimRecoveryCompleteReply",
            MessageType::SoaRecoveryCompleteReply => "SOA_RecoveryCompleteReply",
            MessageType::ClientReleaseSession => "ClientReleaseSession",
            MessageType::ClientKeepAlive => "ClientKeepAlive",
            MessageType::Undefined => "UNDEFINED",
        }
    }

    /// Service family encoded in the identifier prefix, if any.
    ///
    /// Session-control and undefined types carry no family.
    pub fn family(self) -> Option<ServiceFamily> {
        match self {
            MessageType::BdoNewSessionReply
            | MessageType::BdoDownloadRecoveryReply
            | MessageType::BdoSwimRecoveryCompleteReply
            | MessageType::BdoRecoveryCompleteReply => Some(ServiceFamily::Bdo),
            MessageType::SoaNewSessionReply
            | MessageType::SoaNotificationRecoveryReply
            | MessageType::SoaSwimRecoveryCompleteReply
            | MessageType::SoaRecoveryCompleteReply => Some(ServiceFamily::Soa),
            MessageType::ClientReleaseSession
            | MessageType::ClientKeepAlive
            | MessageType::Undefined => None,
        }
    }

    /// The part after the family prefix, e.g. `NewSessionReply`.
    pub fn reply_kind(self) -> &'static str {
        let name = self.as_str();
        match name.split_once('_') {
            Some((_, kind)) => kind,
            None => name,
        }
    }

    /// Whether classifying a request as this type triggers an outbound reply.
    pub fn triggers_reply(self) -> bool {
        self.family().is_some()
    }

    /// Template file name for this type.
    pub fn template_file(self) -> String {
        format!("{}.xml", self.as_str())
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
