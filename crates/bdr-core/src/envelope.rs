//! Tolerant SOAP envelope extraction.
//!
//! Gateways in the field wrap the same `sendMessage` call in three different
//! namespace conventions. Each [`Convention`] is a pure lookup from the parsed
//! document to an optional element; [`CONVENTIONS`] lists them in priority
//! order and the header and payload lookups each take the first hit.
//!
//! The payload element carries the inner protocol message as escaped XML
//! text, which is parsed into its own document.

use crate::error::{BdrError, BdrResult};
use xmltree::{Element, XMLNode};

/// SOAP 1.2 envelope namespace.
pub const SOAP12_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
/// SOAP 1.1 envelope namespace.
pub const SOAP11_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// Namespace of the BDR SOAP operation and its arguments.
pub const BDR_SOAP_NS: &str = "BDR/SoapServer";

/// Name of the SOAP operation carrying every request.
const OPERATION: &str = "sendMessage";

/// One accepted `Envelope/Body/sendMessage/<child>` layout.
#[derive(Debug, Clone, Copy)]
pub struct Convention {
    pub name: &'static str,
    /// Namespace of the `Body` element.
    pub envelope_ns: &'static str,
    /// Local name of the header argument.
    pub header: &'static str,
    /// Local name of the payload argument.
    pub payload: &'static str,
}

/// Accepted conventions, highest priority first.
pub const CONVENTIONS: &[Convention] = &[
    Convention {
        name: "soap12-positional",
        envelope_ns: SOAP12_ENV_NS,
        header: "item0",
        payload: "arg0",
    },
    Convention {
        name: "soap12-named",
        envelope_ns: SOAP12_ENV_NS,
        header: "header",
        payload: "msg",
    },
    Convention {
        name: "soap11-named",
        envelope_ns: SOAP11_ENV_NS,
        header: "header",
        payload: "msg",
    },
];

impl Convention {
    fn operation<'a>(&self, root: &'a Element) -> Option<&'a Element> {
        let body = child(root, "Body", self.envelope_ns)?;
        child(body, OPERATION, BDR_SOAP_NS)
    }

    /// Locate the header argument under this convention.
    pub fn header<'a>(&self, root: &'a Element) -> Option<&'a Element> {
        child(self.operation(root)?, self.header, BDR_SOAP_NS)
    }

    /// Locate the payload argument under this convention.
    pub fn payload<'a>(&self, root: &'a Element) -> Option<&'a Element> {
        child(self.operation(root)?, self.payload, BDR_SOAP_NS)
    }
}

/// First direct child element with the given local name and namespace.
pub(crate) fn child<'a>(parent: &'a Element, name: &str, ns: &'a str) -> Option<&'a Element> {
    children(parent, ns).find(|e| e.name == name)
}

/// Direct child elements bound to the given namespace.
pub(crate) fn children<'a>(parent: &'a Element, ns: &'a str) -> impl Iterator<Item = &'a Element> {
    parent
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .filter(move |e| e.namespace.as_deref() == Some(ns))
}

/// The located header argument.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderElement {
    /// Text content, trimmed. May be empty.
    pub text: String,
    /// Name of the convention that matched.
    pub convention: &'static str,
}

/// The located payload argument, parsed into its own document.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyPayload {
    /// Root element of the inner protocol message.
    pub root: Element,
    /// Name of the convention that matched.
    pub convention: &'static str,
}

/// Parse a raw request body and locate its header and payload.
///
/// # Errors
///
/// Returns [`BdrError::Xml`] if the envelope or the embedded message is not
/// well-formed, and [`BdrError::StructuralMismatch`] if no convention yields
/// a header or a payload element.
pub fn extract(raw: &[u8]) -> BdrResult<(HeaderElement, BodyPayload)> {
    let root = Element::parse(raw)?;

    let (convention, element) = first_match(&root, Convention::header)
        .ok_or_else(|| BdrError::StructuralMismatch("no header element found".into()))?;
    let header = HeaderElement {
        text: element
            .get_text()
            .map(|t| t.trim().to_string())
            .unwrap_or_default(),
        convention: convention.name,
    };

    let (convention, element) = first_match(&root, Convention::payload)
        .ok_or_else(|| BdrError::StructuralMismatch("no payload element found".into()))?;
    let payload = BodyPayload {
        root: payload_document(element)?,
        convention: convention.name,
    };

    Ok((header, payload))
}

fn first_match<'a>(
    root: &'a Element,
    lookup: impl Fn(&Convention, &'a Element) -> Option<&'a Element>,
) -> Option<(&'static Convention, &'a Element)> {
    CONVENTIONS
        .iter()
        .find_map(|c| lookup(c, root).map(|e| (c, e)))
}

/// Inner message: a nested element if present, otherwise the escaped text.
fn payload_document(element: &Element) -> BdrResult<Element> {
    if let Some(nested) = element.children.iter().find_map(XMLNode::as_element) {
        return Ok(nested.clone());
    }
    let text = element.get_text().unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(BdrError::StructuralMismatch("payload element is empty".into()));
    }
    Ok(Element::parse(text.as_bytes())?)
}
