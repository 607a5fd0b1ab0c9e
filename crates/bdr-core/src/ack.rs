//! Synchronous acknowledgment and rejection envelopes.
//!
//! The ack is a transport-level "received": always result code 0, whatever
//! the request was classified as.

/// Content type of every envelope this service writes.
pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// The acknowledgment envelope sent for every accepted request.
pub const ACK_ENVELOPE: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
    "<SOAP-ENV:Envelope xmlns:SOAP-ENV=\"http://schemas.xmlsoap.org/soap/envelope/\" ",
    "xmlns:SOAP-ENC=\"http://schemas.xmlsoap.org/soap/encoding/\" ",
    "xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" ",
    "xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\" ",
    "xmlns:bdr=\"BDR/SoapServer\">",
    "<SOAP-ENV:Body><bdr:sendMessageResponse><bdr:result>0</bdr:result>",
    "</bdr:sendMessageResponse></SOAP-ENV:Body></SOAP-ENV:Envelope>\n",
);

/// A rendered synchronous response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    pub body: String,
}

impl SoapResponse {
    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    /// Byte length of the body, for the `Content-Length` header.
    pub fn content_length(&self) -> usize {
        self.body.len()
    }
}

/// The fixed acknowledgment.
pub fn ack() -> SoapResponse {
    SoapResponse {
        body: ACK_ENVELOPE.to_string(),
    }
}

/// A SOAP fault for a request that could not be understood.
pub fn fault(reason: &str) -> SoapResponse {
    SoapResponse {
        body: format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <SOAP-ENV:Envelope xmlns:SOAP-ENV=\"http://schemas.xmlsoap.org/soap/envelope/\">\
             <SOAP-ENV:Body><SOAP-ENV:Fault><faultcode>SOAP-ENV:Client</faultcode>\
             <faultstring>{}</faultstring></SOAP-ENV:Fault></SOAP-ENV:Body>\
             </SOAP-ENV:Envelope>\n",
            escape_text(reason)
        ),
    }
}

/// Escape text for use as XML character data.
pub(crate) fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_is_stable() {
        let a = ack();
        let b = ack();
        assert_eq!(a, b);
        assert_eq!(a.content_length(), a.body.as_bytes().len());
        assert!(a.body.contains("<bdr:result>0</bdr:result>"));
        assert_eq!(a.content_type(), "text/xml; charset=utf-8");
    }

    #[test]
    fn fault_escapes_reason() {
        let f = fault("no <header> & no body");
        assert!(f.body.contains("no &lt;header&gt; &amp; no body"));
        assert_eq!(f.content_length(), f.body.len());
    }
}
