//! HTTPS reply transport.
//!
//! Every reply goes out on a fresh mutually-authenticated TLS connection:
//! the peer is verified against the configured trust anchors only, and the
//! server's own certificate is presented as the client identity.

use crate::config::ServerConfig;
use crate::tls;
use bdr_core::{BdrError, BdrResult, OutboundRequest, ReplyTransport};
use std::error::Error as _;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

pub struct HttpsReplyTransport {
    client: reqwest::Client,
}

impl HttpsReplyTransport {
    /// Build the client from the configured TLS material and timeouts.
    pub fn new(config: &ServerConfig) -> BdrResult<Self> {
        let identity = reqwest::Identity::from_pem(&tls::identity_pem(config)?)
            .map_err(|e| BdrError::Config(format!("client identity: {e}")))?;

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .identity(identity)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(0);

        for cert in tls::load_certs(&config.ca_path)? {
            let anchor = reqwest::Certificate::from_der(&cert)
                .map_err(|e| BdrError::Config(format!("trust anchor: {e}")))?;
            builder = builder.add_root_certificate(anchor);
        }

        let client = builder
            .build()
            .map_err(|e| BdrError::Config(format!("https client: {e}")))?;
        Ok(Self { client })
    }

    async fn send(&self, request: &OutboundRequest) -> BdrResult<u16> {
        let url = format!("https://{}:{}{}", request.host, request.port, request.path);
        let mut builder = self.client.post(&url).body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(dispatch_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(dispatch_error)?;
        debug!(url = %url, status, bytes = body.len(), "reply acknowledged by peer");
        Ok(status)
    }
}

impl ReplyTransport for HttpsReplyTransport {
    fn post<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = BdrResult<u16>> + Send + 'a>> {
        Box::pin(self.send(request))
    }
}

/// Map a client error, keeping the underlying cause (TLS alerts, refused
/// connections) in the message.
fn dispatch_error(e: reqwest::Error) -> BdrError {
    if e.is_timeout() {
        return BdrError::Timeout;
    }
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    BdrError::Dispatch(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::peer_cli;
    use bdr_core::PeerOs;
    use std::time::Duration;

    fn config_with_dev_pair(dir: &std::path::Path) -> ServerConfig {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

        let mut cfg = ServerConfig::load(None, &peer_cli(PeerOs::Win)).unwrap();
        cfg.cert_path = cert_path.clone();
        cfg.key_path = key_path;
        cfg.ca_path = cert_path;
        cfg.connect_timeout = Duration::from_secs(2);
        cfg.request_timeout = Duration::from_secs(2);
        cfg
    }

    #[tokio::test]
    async fn refused_connection_is_dispatch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transport = HttpsReplyTransport::new(&config_with_dev_pair(dir.path())).unwrap();

        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let request = OutboundRequest {
            host: "127.0.0.1".into(),
            port,
            path: "/axis2/services/0123_BDRSOAPReceiverService".into(),
            headers: Vec::new(),
            body: "<x/>".into(),
        };
        let err = transport.post(&request).await.unwrap_err();
        assert!(err.is_dispatch_failure());
    }

    #[tokio::test]
    async fn plain_tcp_peer_fails_handshake() {
        use tokio::io::AsyncWriteExt;

        let dir = tempfile::tempdir().unwrap();
        let transport = HttpsReplyTransport::new(&config_with_dev_pair(dir.path())).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let _ = stream.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await;
            }
        });

        let request = OutboundRequest {
            host: "127.0.0.1".into(),
            port,
            path: "/".into(),
            headers: Vec::new(),
            body: String::new(),
        };
        let err = transport.post(&request).await.unwrap_err();
        assert!(err.is_dispatch_failure());
    }

    #[test]
    fn missing_trust_anchor_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config_with_dev_pair(dir.path());
        cfg.ca_path = dir.path().join("missing.pem");
        assert!(matches!(
            HttpsReplyTransport::new(&cfg),
            Err(BdrError::Config(_))
        ));
    }
}
