//! Asynchronous reply dispatch.
//!
//! A [`ReplyDispatcher`] turns a classified request into one outbound POST
//! to the gateway peer. The network leg is behind [`ReplyTransport`] so the
//! HTTPS client can be swapped for an in-memory one.

use crate::audit::{self, Direction};
use crate::error::{BdrError, BdrResult};
use crate::message::MessageType;
use crate::route::{PeerProfile, RouteTable};
use crate::session::{CorrelationHeader, SessionId};
use crate::template::{reply_envelope, TemplateStore};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

/// A fully rendered outbound reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Sends one outbound request over a fresh connection and returns the
/// peer's HTTP status after reading the full response.
pub trait ReplyTransport: Send + Sync {
    fn post<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = BdrResult<u16>> + Send + 'a>>;
}

/// Everything needed to send the reply for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyJob {
    pub message_type: MessageType,
    pub header: CorrelationHeader,
}

impl ReplyJob {
    pub fn new(message_type: MessageType, header: CorrelationHeader) -> Self {
        Self {
            message_type,
            header,
        }
    }

    pub fn spid(&self) -> &str {
        self.header.spid()
    }

    pub fn session_id(&self) -> SessionId {
        self.header.session_id()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Session-control message; nothing sent.
    Skipped,
    /// Reply sent; the peer answered with this status.
    Delivered { status: u16 },
}

/// Renders and delivers asynchronous replies to one pinned peer.
pub struct ReplyDispatcher {
    profile: PeerProfile,
    routes: RouteTable,
    templates: TemplateStore,
    /// UTC timestamp captured once at process start.
    started_at: String,
    transport: Arc<dyn ReplyTransport>,
}

impl ReplyDispatcher {
    pub fn new(
        profile: PeerProfile,
        routes: RouteTable,
        templates: TemplateStore,
        started_at: impl Into<String>,
        transport: Arc<dyn ReplyTransport>,
    ) -> Self {
        Self {
            profile,
            routes,
            templates,
            started_at: started_at.into(),
            transport,
        }
    }

    pub fn profile(&self) -> &PeerProfile {
        &self.profile
    }

    /// Build the outbound request for `job`, or `None` if the message type
    /// does not trigger a reply.
    pub fn render(&self, job: &ReplyJob) -> BdrResult<Option<OutboundRequest>> {
        let Some(family) = job.message_type.family() else {
            return Ok(None);
        };
        let body = self.templates.render(
            job.message_type,
            job.spid(),
            &self.started_at,
            job.session_id(),
        )?;
        Ok(Some(OutboundRequest {
            host: self.profile.host.clone(),
            port: self.profile.port,
            path: self.routes.path(self.profile.os, family, job.spid())?,
            headers: self.profile.headers.clone(),
            body: reply_envelope(&job.header, &body),
        }))
    }

    /// Send the reply for `job`.
    ///
    /// # Errors
    ///
    /// Template and route errors, and any transport failure. Failures are
    /// not retried.
    pub async fn dispatch(&self, job: &ReplyJob) -> BdrResult<DispatchOutcome> {
        let Some(request) = self.render(job)? else {
            debug!(message_type = %job.message_type, "no reply for session-control message");
            return Ok(DispatchOutcome::Skipped);
        };

        debug!(
            host = %request.host,
            port = request.port,
            path = %request.path,
            session_id = %job.session_id(),
            "dispatching reply"
        );
        let status = self.transport.post(&request).await?;

        let family = job
            .message_type
            .family()
            .ok_or_else(|| BdrError::Other("reply without service family".into()))?;
        info!(
            target: audit::TARGET,
            "{}",
            audit::line(
                chrono::Local::now(),
                Direction::Outbound,
                family.as_str(),
                job.message_type.reply_kind(),
                status,
            )
        );
        Ok(DispatchOutcome::Delivered { status })
    }
}
