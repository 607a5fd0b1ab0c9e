//! bdr-core: protocol library for the BDR mock server.
//!
//! Extracts the `sendMessage` header and payload from gateway SOAP
//! envelopes, classifies the inner message, builds the synchronous ack and
//! the correlation header, and renders and dispatches asynchronous replies.

pub mod ack;
pub mod audit;
pub mod classify;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod inbound;
pub mod message;
pub mod route;
pub mod session;
pub mod template;

// Re-export commonly used items at crate root.
pub use classify::{classify, Classification};
pub use dispatch::{DispatchOutcome, OutboundRequest, ReplyDispatcher, ReplyJob, ReplyTransport};
pub use error::{BdrError, BdrResult};
pub use message::{MessageType, ServiceFamily};
pub use route::{PeerOs, PeerProfile, RouteTable};
pub use session::{CorrelationHeader, SessionId};
pub use template::TemplateStore;
