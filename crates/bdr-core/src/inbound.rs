//! Inbound request pipeline: extract, classify, correlate.
//!
//! Produces the reply job (if any) for one raw request body. The caller
//! sends the synchronous ack and later hands the job to the dispatcher.

use crate::classify::{self, Classification};
use crate::dispatch::ReplyJob;
use crate::envelope::{self, child, BodyPayload, HeaderElement};
use crate::error::{BdrError, BdrResult};
use crate::message::LNP_NS;
use crate::session::{CorrelationHeader, SessionId};
use rand::Rng;

/// Outcome of processing one accepted request.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub classification: Classification,
    /// Present only when the classification triggers a reply.
    pub job: Option<ReplyJob>,
}

/// Process one raw request body.
///
/// # Errors
///
/// Extraction errors ([`BdrError::Xml`], [`BdrError::StructuralMismatch`])
/// and [`BdrError::MissingSpid`] when a reply is due but no service provider
/// id can be found. An unclassifiable payload is not an error.
pub fn process<R: Rng + ?Sized>(raw: &[u8], rng: &mut R) -> BdrResult<Inbound> {
    let (header, payload) = envelope::extract(raw)?;
    let classification = classify::classify_and_log(&payload);

    let job = if classification.message_type.triggers_reply() {
        let spid = spid(&payload, &header).ok_or(BdrError::MissingSpid)?;
        let session_id = SessionId::generate(rng);
        Some(ReplyJob::new(
            classification.message_type,
            CorrelationHeader::new(spid, session_id),
        ))
    } else {
        None
    };

    Ok(Inbound {
        classification,
        job,
    })
}

/// Service provider id: `messageHeader/service_prov_id` in the payload,
/// else the first `|` field of the header argument.
pub fn spid(payload: &BodyPayload, header: &HeaderElement) -> Option<String> {
    let from_payload = child(&payload.root, "messageHeader", LNP_NS)
        .and_then(|h| child(h, "service_prov_id", LNP_NS))
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|s| !s.is_empty());

    from_payload.or_else(|| {
        header
            .text
            .split('|')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::tests::{soap11, soap12, INNER};
    use crate::message::MessageType;
    use crate::session::SESSION_ID_RANGE;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(1)
    }

    #[test]
    fn new_session_yields_job() {
        let doc = soap12("item0", "arg0", INNER);
        let inbound = process(doc.as_bytes(), &mut rng()).unwrap();
        assert_eq!(inbound.classification.message_type, MessageType::BdoNewSessionReply);
        let job = inbound.job.unwrap();
        assert_eq!(job.spid(), "0123");
        assert!(SESSION_ID_RANGE.contains(&job.session_id().value()));
    }

    #[test]
    fn keep_alive_yields_no_job() {
        let inner = "<BDRMessage xmlns=\"urn:brazil:lnp:1.0\"><messageContent>\
                     <BDOtoBDR><ClientKeepAlive/></BDOtoBDR></messageContent></BDRMessage>";
        let inbound = process(soap11(inner).as_bytes(), &mut rng()).unwrap();
        assert_eq!(inbound.classification.message_type, MessageType::ClientKeepAlive);
        assert!(inbound.job.is_none());
    }

    #[test]
    fn undefined_yields_no_job() {
        let inner = "<BDRMessage xmlns=\"urn:brazil:lnp:1.0\"><other/></BDRMessage>";
        let inbound = process(soap11(inner).as_bytes(), &mut rng()).unwrap();
        assert!(inbound.classification.is_undefined());
        assert!(inbound.job.is_none());
    }

    #[test]
    fn spid_falls_back_to_header_field() {
        let inner = "<BDRMessage xmlns=\"urn:brazil:lnp:1.0\"><messageContent>\
                     <SOAtoBDR><NewSession/></SOAtoBDR></messageContent></BDRMessage>";
        let inbound = process(soap11(inner).as_bytes(), &mut rng()).unwrap();
        assert_eq!(inbound.job.unwrap().spid(), "0123");
    }

    #[test]
    fn reply_without_spid_is_rejected() {
        let inner = "<BDRMessage xmlns=\"urn:brazil:lnp:1.0\"><messageContent>\
                     <SOAtoBDR><NewSession/></SOAtoBDR></messageContent></BDRMessage>";
        let doc = soap11(inner).replace("0123|0|1|1|3|", "");
        let err = process(doc.as_bytes(), &mut rng()).unwrap_err();
        assert!(matches!(err, BdrError::MissingSpid));
    }

    #[test]
    fn structural_mismatch_propagates() {
        let err = process(b"<Envelope/>", &mut rng()).unwrap_err();
        assert!(matches!(err, BdrError::StructuralMismatch(_)));
    }
}
