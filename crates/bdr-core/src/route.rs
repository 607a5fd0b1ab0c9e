//! Outbound peer profile and reply routing.
//!
//! The destination path depends on the peer's OS family and the reply's
//! service family. [`RouteTable`] keeps the four path templates as data;
//! per-request headers live on the [`PeerProfile`].

use crate::ack::CONTENT_TYPE;
use crate::error::{BdrError, BdrResult};
use crate::message::ServiceFamily;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Token replaced by the service provider id in path templates.
pub const SPID_TOKEN: &str = "{spid}";

/// Bytes left unencoded when the spid is placed in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Operating system family of the gateway peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerOs {
    /// IIS-hosted `.asmx` receivers.
    Win,
    /// Axis2-hosted receivers.
    Linux,
}

impl PeerOs {
    pub fn as_str(self) -> &'static str {
        match self {
            PeerOs::Win => "WIN",
            PeerOs::Linux => "LINUX",
        }
    }

    /// Headers sent on every reply when the profile does not override them.
    ///
    /// Windows receivers get an explicit content type; Linux receivers get
    /// none.
    pub fn default_headers(self) -> Vec<(String, String)> {
        match self {
            PeerOs::Win => vec![("Content-Type".to_string(), CONTENT_TYPE.to_string())],
            PeerOs::Linux => Vec::new(),
        }
    }
}

impl FromStr for PeerOs {
    type Err = BdrError;

    fn from_str(s: &str) -> BdrResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "WIN" => Ok(PeerOs::Win),
            "LINUX" => Ok(PeerOs::Linux),
            _ => Err(BdrError::Config(format!("unknown peer os: {s}"))),
        }
    }
}

impl fmt::Display for PeerOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The gateway peer that receives asynchronous replies.
///
/// Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerProfile {
    pub host: String,
    pub port: u16,
    pub os: PeerOs,
    /// Headers sent with every reply.
    pub headers: Vec<(String, String)>,
}

impl PeerProfile {
    /// Profile with the OS family's default headers.
    pub fn new(host: impl Into<String>, port: u16, os: PeerOs) -> Self {
        Self {
            host: host.into(),
            port,
            os,
            headers: os.default_headers(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

/// Path templates keyed by `(peer OS, service family)`.
#[derive(Debug, Clone)]
pub struct RouteTable {
    paths: HashMap<(PeerOs, ServiceFamily), String>,
}

impl Default for RouteTable {
    fn default() -> Self {
        let paths = [
            (
                (PeerOs::Win, ServiceFamily::Bdo),
                "/{spid}_BDRBDOSOAPReceiverService/BDRBDOSOAPReceiverService.asmx",
            ),
            (
                (PeerOs::Win, ServiceFamily::Soa),
                "/{spid}_BDRSOAPReceiverService/BDRSOAPReceiverService.asmx",
            ),
            (
                (PeerOs::Linux, ServiceFamily::Bdo),
                "/axis2/services/{spid}_BDRBDOSOAPReceiverService",
            ),
            (
                (PeerOs::Linux, ServiceFamily::Soa),
                "/axis2/services/{spid}_BDRSOAPReceiverService",
            ),
        ]
        .into_iter()
        .map(|(key, path)| (key, path.to_string()))
        .collect();
        Self { paths }
    }
}

impl RouteTable {
    /// Replace one path template. The template must contain [`SPID_TOKEN`].
    pub fn set(&mut self, os: PeerOs, family: ServiceFamily, template: impl Into<String>) -> BdrResult<()> {
        let template = template.into();
        if !template.contains(SPID_TOKEN) {
            return Err(BdrError::Config(format!(
                "route template {template:?} lacks {SPID_TOKEN}"
            )));
        }
        self.paths.insert((os, family), template);
        Ok(())
    }

    /// Destination path for a reply. The spid is percent-encoded.
    pub fn path(&self, os: PeerOs, family: ServiceFamily, spid: &str) -> BdrResult<String> {
        let template = self
            .paths
            .get(&(os, family))
            .ok_or_else(|| BdrError::Config(format!("no route for {os}/{family}")))?;
        let spid = utf8_percent_encode(spid, PATH_SEGMENT).to_string();
        Ok(template.replace(SPID_TOKEN, &spid))
    }
}
