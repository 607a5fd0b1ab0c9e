use thiserror::Error;

/// Errors produced by the BDR mock protocol layer.
#[derive(Debug, Error)]
pub enum BdrError {
    #[error("xml error: {0}")]
    Xml(String),

    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    #[error("missing service provider id")]
    MissingSpid,

    #[error("template error: {0}")]
    Template(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("timeout")]
    Timeout,

    #[error("config error: {0}")]
    Config(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<xmltree::ParseError> for BdrError {
    fn from(e: xmltree::ParseError) -> Self {
        BdrError::Xml(e.to_string())
    }
}

impl BdrError {
    /// Whether the error belongs to the outbound reply leg.
    ///
    /// Such failures are reported to the operator and never affect the
    /// synchronous acknowledgment already sent to the gateway.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(self, BdrError::Dispatch(_) | BdrError::Timeout | BdrError::Tls(_))
    }
}

pub type BdrResult<T> = Result<T, BdrError>;
