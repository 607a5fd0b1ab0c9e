//! Reply body templates, one file per reply message type.
//!
//! Templates are loaded once at startup. Rendering strips newlines,
//! substitutes the placeholders and escapes `<` so the body can travel as
//! text inside the outer envelope's `msg` element.

use crate::ack::escape_text;
use crate::error::{BdrError, BdrResult};
use crate::message::MessageType;
use crate::envelope::{BDR_SOAP_NS, SOAP11_ENV_NS};
use crate::session::{CorrelationHeader, SessionId};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

pub const SPID_PLACEHOLDER: &str = "SPID";
pub const TIMESTAMP_PLACEHOLDER: &str = "DDDDDD";
pub const SESSION_PLACEHOLDER: &str = "SSSSSS";

/// In-memory reply templates keyed by message type.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: HashMap<MessageType, String>,
}

impl TemplateStore {
    /// Load the template for every reply type from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`BdrError::Template`] if a file is missing, unreadable, or
    /// lacks one of the placeholders.
    pub fn load_dir(dir: &Path) -> BdrResult<Self> {
        let mut store = Self::default();
        for ty in MessageType::REPLIES {
            let path = dir.join(ty.template_file());
            let text = std::fs::read_to_string(&path)
                .map_err(|e| BdrError::Template(format!("cannot read {}: {e}", path.display())))?;
            store.insert(ty, text).map_err(|e| match e {
                BdrError::Template(msg) => BdrError::Template(format!("{}: {msg}", path.display())),
                other => other,
            })?;
            debug!(path = %path.display(), "loaded template");
        }
        info!(dir = %dir.display(), count = store.templates.len(), "reply templates loaded");
        Ok(store)
    }

    /// Register a template after checking its placeholders.
    pub fn insert(&mut self, ty: MessageType, text: String) -> BdrResult<()> {
        if !ty.triggers_reply() {
            return Err(BdrError::Template(format!("{ty} has no reply")));
        }
        for placeholder in [SPID_PLACEHOLDER, TIMESTAMP_PLACEHOLDER, SESSION_PLACEHOLDER] {
            if !text.contains(placeholder) {
                return Err(BdrError::Template(format!(
                    "template for {ty} lacks placeholder {placeholder}"
                )));
            }
        }
        self.templates.insert(ty, text);
        Ok(())
    }

    /// Render the template for `ty`.
    pub fn render(
        &self,
        ty: MessageType,
        spid: &str,
        timestamp: &str,
        session_id: SessionId,
    ) -> BdrResult<String> {
        let template = self
            .templates
            .get(&ty)
            .ok_or_else(|| BdrError::Template(format!("no template for {ty}")))?;
        Ok(render(template, spid, timestamp, session_id))
    }
}

/// Substitute placeholders and escape the markup of one template body.
///
/// The spid is text inside the reply document, which itself travels as text
/// inside the envelope, so it is escaped once for each.
pub fn render(template: &str, spid: &str, timestamp: &str, session_id: SessionId) -> String {
    template
        .replace('\n', "")
        .replace(SPID_PLACEHOLDER, &escape_text(&escape_text(spid)))
        .replace(TIMESTAMP_PLACEHOLDER, timestamp)
        .replace(SESSION_PLACEHOLDER, &session_id.to_string())
        .replace('<', "&lt;")
}

/// Outer envelope carrying the correlation header and the rendered body.
pub fn reply_envelope(header: &CorrelationHeader, body: &str) -> String {
    let header = escape_text(&header.to_string());
    format!(
        "<soapenv:Envelope xmlns:soapenv=\"{SOAP11_ENV_NS}\" xmlns:soap=\"{BDR_SOAP_NS}\">\
         <soapenv:Header/><soapenv:Body><soap:sendMessage>\
         <soap:header>{header}</soap:header><soap:msg>{body}</soap:msg>\
         </soap:sendMessage></soapenv:Body></soapenv:Envelope>"
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = "<BDRMessage xmlns=\"urn:brazil:lnp:1.0\">\n\
        <messageHeader><service_prov_id>SPID</service_prov_id>\
        <invoke_id>SSSSSS</invoke_id><timestamp>DDDDDD</timestamp></messageHeader>\n\
        </BDRMessage>\n";

    /// Write a full template set into `dir`.
    pub(crate) fn write_all(dir: &Path) {
        for ty in MessageType::REPLIES {
            std::fs::write(dir.join(ty.template_file()), SAMPLE).unwrap();
        }
    }

    #[test]
    fn render_substitutes_and_escapes() {
        let out = render(SAMPLE, "0123", "2018-01-02T03:04:05Z", SessionId::from(900_000_001));
        assert!(!out.contains('\n'));
        assert!(!out.contains('<'));
        assert!(out.contains("&lt;service_prov_id>0123&lt;/service_prov_id>"));
        assert!(out.contains("900000001"));
        assert!(out.contains("2018-01-02T03:04:05Z"));
        assert!(!out.contains(SPID_PLACEHOLDER));
    }

    #[test]
    fn load_dir_reads_every_reply_type() {
        let dir = tempfile::tempdir().unwrap();
        write_all(dir.path());
        let store = TemplateStore::load_dir(dir.path()).unwrap();
        for ty in MessageType::REPLIES {
            assert!(store.render(ty, "1", "t", SessionId::from(1)).is_ok());
        }
        assert!(store
            .render(MessageType::ClientKeepAlive, "1", "t", SessionId::from(1))
            .is_err());
    }

    #[test]
    fn load_dir_fails_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        write_all(dir.path());
        std::fs::remove_file(dir.path().join("SOA_NewSessionReply.xml")).unwrap();
        let err = TemplateStore::load_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("SOA_NewSessionReply.xml"));
    }

    #[test]
    fn insert_requires_placeholders() {
        let mut store = TemplateStore::default();
        let err = store
            .insert(MessageType::BdoNewSessionReply, "<a>SPID SSSSSS</a>".into())
            .unwrap_err();
        assert!(err.to_string().contains(TIMESTAMP_PLACEHOLDER));
        assert!(store
            .insert(MessageType::ClientKeepAlive, SAMPLE.into())
            .is_err());
    }

    #[test]
    fn markup_in_spid_survives_both_layers() {
        use crate::envelope::child;
        use crate::message::LNP_NS;
        use xmltree::Element;

        let spid = "A&B<1>";
        let header = CorrelationHeader::new(spid, SessionId::from(900_000_003));
        let body = render(SAMPLE, spid, "t", SessionId::from(900_000_003));
        assert!(!body.contains("A&B"));
        let env = reply_envelope(&header, &body);

        let root = Element::parse(env.as_bytes()).unwrap();
        let send = child(child(&root, "Body", SOAP11_ENV_NS).unwrap(), "sendMessage", BDR_SOAP_NS)
            .unwrap();
        let header_text = child(send, "header", BDR_SOAP_NS).unwrap().get_text().unwrap();
        assert_eq!(header_text, "A&B<1>|0|900000003|1|3|");

        let msg = child(send, "msg", BDR_SOAP_NS).unwrap().get_text().unwrap();
        let inner = Element::parse(msg.as_bytes()).unwrap();
        let prov = child(child(&inner, "messageHeader", LNP_NS).unwrap(), "service_prov_id", LNP_NS)
            .unwrap();
        assert_eq!(prov.get_text().as_deref(), Some(spid));
    }

    #[test]
    fn envelope_wraps_header_and_body() {
        let header = CorrelationHeader::new("0123", SessionId::from(900_000_002));
        let env = reply_envelope(&header, "&lt;x/>");
        assert!(env.contains("<soap:header>0123|0|900000002|1|3|</soap:header>"));
        assert!(env.contains("<soap:msg>&lt;x/></soap:msg>"));
        // The envelope itself must stay well-formed.
        assert!(xmltree::Element::parse(env.as_bytes()).is_ok());
    }
}
