//! Core server: accepts TLS connections, acknowledges gateway requests and
//! dispatches the correlated asynchronous replies.
//!
//! Each connection carries one request (keep-alive is off). The reply job
//! produced while handling it is held until the connection has written its
//! ack and closed, then handed to the [`ReplyDispatcher`]. Dispatch failures
//! are logged and never reach the gateway.

use crate::config::ServerConfig;
use bdr_core::ack::{self, SoapResponse};
use bdr_core::{inbound, BdrError, BdrResult, DispatchOutcome, ReplyDispatcher, ReplyJob};
use hyper::body::HttpBody;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// The BDR mock server instance.
pub struct BdrServer {
    /// Server configuration.
    config: ServerConfig,
    /// Reply dispatcher bound to the configured peer.
    dispatcher: ReplyDispatcher,
    /// Held across ack + dispatch when connections are serialized.
    serial: Option<Mutex<()>>,
}

impl BdrServer {
    /// Create a new server instance.
    pub fn new(config: ServerConfig, dispatcher: ReplyDispatcher) -> Self {
        let serial = config.serial.then(|| Mutex::new(()));
        Self {
            config,
            dispatcher,
            serial,
        }
    }

    /// Bind the listener and serve until the task is dropped.
    pub async fn run(self, tls_config: Arc<rustls::ServerConfig>) -> BdrResult<()> {
        let server = Arc::new(self);
        let addr = server.config.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BdrError::Config(format!("bind {addr} failed: {e}")))?;
        let acceptor = TlsAcceptor::from(tls_config);

        let peer = server.dispatcher.profile();
        info!(
            addr = %addr,
            peer_host = %peer.host,
            peer_port = peer.port,
            peer_os = %peer.os,
            serial = server.config.serial,
            "bdr-mock-server ready"
        );

        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    let srv = server.clone();
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        if let Err(e) = srv.handle_connection(stream, remote, acceptor).await {
                            warn!(remote = %remote, error = %e, "connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
        acceptor: TlsAcceptor,
    ) -> BdrResult<()> {
        let tls = acceptor
            .accept(stream)
            .await
            .map_err(|e| BdrError::Tls(format!("handshake failed: {e}")))?;
        debug!(remote = %remote, "TLS session established");
        self.serve_connection(tls, remote).await
    }

    /// Serve one HTTP connection, then dispatch the replies it produced.
    pub async fn serve_connection<IO>(self: Arc<Self>, io: IO, remote: SocketAddr) -> BdrResult<()>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let _serial = self.serial_guard().await;

        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<ReplyJob>();
        let srv = self.clone();
        let service = service_fn(move |req| {
            let srv = srv.clone();
            let job_tx = job_tx.clone();
            async move { Ok::<_, Infallible>(srv.handle_request(req, remote, &job_tx).await) }
        });

        let served = Http::new()
            .http1_only(true)
            .http1_keep_alive(false)
            .serve_connection(io, service)
            .await;

        // The ack is on the wire (or the connection is gone); replies follow.
        while let Ok(job) = job_rx.try_recv() {
            self.deliver(job).await;
        }

        served.map_err(|e| BdrError::Other(format!("http: {e}")))
    }

    async fn serial_guard(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.serial {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }

    async fn handle_request(
        &self,
        req: Request<Body>,
        remote: SocketAddr,
        jobs: &mpsc::UnboundedSender<ReplyJob>,
    ) -> Response<Body> {
        if req.method() != Method::POST {
            debug!(remote = %remote, method = %req.method(), "rejected non-POST request");
            return plain(StatusCode::METHOD_NOT_ALLOWED, "only POST is accepted");
        }

        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.config.max_body_bytes) {
            return plain(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
        }

        let body = match read_body(req.into_body(), self.config.max_body_bytes).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                warn!(remote = %remote, limit = self.config.max_body_bytes, "request body too large");
                return plain(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
            }
            Err(e) => {
                warn!(remote = %remote, error = %e, "failed to read request body");
                return soap(StatusCode::BAD_REQUEST, ack::fault("unreadable request body"));
            }
        };

        let (status, response, job) = self.respond(&body, remote);
        if let Some(job) = job {
            if jobs.send(job).is_err() {
                warn!(remote = %remote, "reply queue closed, reply dropped");
            }
        }
        soap(status, response)
    }

    /// Synchronous part of request handling: the response to write back and
    /// the reply job, if one is due.
    pub fn respond(
        &self,
        raw: &[u8],
        remote: SocketAddr,
    ) -> (StatusCode, SoapResponse, Option<ReplyJob>) {
        match inbound::process(raw, &mut rand::thread_rng()) {
            Ok(inbound) => {
                if let Some(job) = &inbound.job {
                    debug!(
                        remote = %remote,
                        message_type = %job.message_type,
                        header = %job.header,
                        "request accepted, reply queued"
                    );
                }
                (StatusCode::OK, ack::ack(), inbound.job)
            }
            Err(e) => {
                warn!(remote = %remote, error = %e, "rejected request");
                (StatusCode::BAD_REQUEST, ack::fault(&e.to_string()), None)
            }
        }
    }

    /// Send one reply, logging any failure.
    pub async fn deliver(&self, job: ReplyJob) -> Option<DispatchOutcome> {
        match self.dispatcher.dispatch(&job).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(
                    message_type = %job.message_type,
                    spid = %job.spid(),
                    session_id = %job.session_id(),
                    dispatch_failure = e.is_dispatch_failure(),
                    error = %e,
                    "reply dispatch failed"
                );
                None
            }
        }
    }
}

/// Buffer a request body frame by frame. `None` once it grows past `limit`;
/// the rest of the stream is never read.
async fn read_body(mut body: Body, limit: usize) -> Result<Option<Vec<u8>>, hyper::Error> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > limit {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Some(buf))
}

fn soap(status: StatusCode, response: SoapResponse) -> Response<Body> {
    let content_type = HeaderValue::from_static(response.content_type());
    let length = response.content_length();
    let mut res = Response::new(Body::from(response.body));
    *res.status_mut() = status;
    res.headers_mut().insert(CONTENT_TYPE, content_type);
    res.headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(length));
    res
}

fn plain(status: StatusCode, text: &'static str) -> Response<Body> {
    let mut res = Response::new(Body::from(text));
    *res.status_mut() = status;
    res
}
